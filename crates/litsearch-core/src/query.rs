//! Query variants and their rewrite into engine-neutral shard predicates.
//!
//! A [`SearchQuery`] is what callers ask for; a [`ShardPredicate`] is what a
//! shard compiles against its own analyzer and index. The rewrite owns the
//! field-specific rules (numeric ids, year ranges, reserved `_` fields,
//! tokenized text) so every shard sees the same predicate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

pub const FIELD_ID: &str = "id";
pub const FIELD_YEAR: &str = "year";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_ABSTRACT: &str = "abstract";
/// Fields starting with this prefix are internal bookkeeping and matched verbatim.
pub const INTERNAL_PREFIX: char = '_';

pub const DEFAULT_TOP: usize = 10;
pub const DEFAULT_FDIM: usize = 10;
pub const DEFAULT_SLOP: u32 = 1;
/// A single id lookup asks each shard for a handful of copies so duplicates surface.
const ID_LOOKUP_MAX: usize = 5;

/// Selected facet values per dimension. Each selection is a path; flat
/// dimensions use one-element paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetFilter(BTreeMap<String, Vec<Vec<String>>>);

static NO_FACETS: FacetFilter = FacetFilter(BTreeMap::new());

impl FacetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, dimension: &str, value: &str) {
        self.select_path(dimension, vec![value.to_string()]);
    }

    pub fn select_path(&mut self, dimension: &str, path: Vec<String>) {
        if path.is_empty() {
            return;
        }
        let selections = self.0.entry(dimension.to_string()).or_default();
        if !selections.contains(&path) {
            selections.push(path);
        }
    }

    /// Parses `dim=value`; for hierarchical dimensions the value is a dotted
    /// path (`tr=C04.588`).
    pub fn select_spec(&mut self, spec: &str, hierarchical: impl Fn(&str) -> bool) -> Result<()> {
        let (dim, value) = spec
            .split_once('=')
            .ok_or_else(|| Error::malformed(format!("facet selection '{spec}' is not dim=value")))?;
        let (dim, value) = (dim.trim(), value.trim());
        if dim.is_empty() || value.is_empty() {
            return Err(Error::malformed(format!("facet selection '{spec}' is not dim=value")));
        }
        if hierarchical(dim) {
            self.select_path(dim, value.split('.').map(str::to_string).collect());
        } else {
            self.select(dim, value);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, dimension: &str) -> Option<&[Vec<String>]> {
        self.0.get(dimension).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Vec<String>])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// The same filter with one dimension removed, for drill-sideways counts.
    pub fn without(&self, dimension: &str) -> Self {
        let mut map = self.0.clone();
        map.remove(dimension);
        Self(map)
    }
}

/// Free text over the default fields, optionally narrowed by facets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextQuery {
    pub text: Option<String>,
    #[serde(default)]
    pub facets: FacetFilter,
    pub skip: usize,
    pub top: usize,
    pub fdim: usize,
    pub slop: u32,
}

/// A payload aimed at one named field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub facets: FacetFilter,
    pub skip: usize,
    pub top: usize,
    pub fdim: usize,
    pub slop: u32,
}

/// Facet selections over the whole corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetQuery {
    #[serde(default)]
    pub facets: FacetFilter,
    pub skip: usize,
    pub top: usize,
    pub fdim: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchQuery {
    FreeText(TextQuery),
    Field(FieldQuery),
    FacetDrilldown(FacetQuery),
    Id { id: u64 },
    IdBatch { ids: Vec<u64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    FreeText,
    Field,
    FacetDrilldown,
    Id,
    IdBatch,
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl SearchQuery {
    /// Every document in the index, for facet overviews.
    pub fn all() -> Self {
        Self::FreeText(TextQuery {
            text: None,
            facets: FacetFilter::new(),
            skip: 0,
            top: DEFAULT_TOP,
            fdim: DEFAULT_FDIM,
            slop: DEFAULT_SLOP,
        })
    }

    pub fn free_text(text: &str) -> Self {
        Self::FreeText(TextQuery {
            text: non_blank(text),
            facets: FacetFilter::new(),
            skip: 0,
            top: DEFAULT_TOP,
            fdim: DEFAULT_FDIM,
            slop: DEFAULT_SLOP,
        })
    }

    pub fn field(field: &str, value: &str) -> Self {
        Self::Field(FieldQuery {
            field: field.trim().to_string(),
            value: value.trim().to_string(),
            facets: FacetFilter::new(),
            skip: 0,
            top: DEFAULT_TOP,
            fdim: DEFAULT_FDIM,
            slop: DEFAULT_SLOP,
        })
    }

    pub fn drilldown(facets: FacetFilter) -> Self {
        Self::FacetDrilldown(FacetQuery { facets, skip: 0, top: DEFAULT_TOP, fdim: DEFAULT_FDIM })
    }

    pub fn id(id: u64) -> Self {
        Self::Id { id }
    }

    /// Batch lookup; duplicate ids are dropped, first occurrence order kept.
    pub fn id_batch(ids: &[u64]) -> Self {
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        Self::IdBatch { ids: unique }
    }

    pub fn with_page(mut self, skip: usize, top: usize) -> Self {
        match &mut self {
            Self::FreeText(q) => (q.skip, q.top) = (skip, top),
            Self::Field(q) => (q.skip, q.top) = (skip, top),
            Self::FacetDrilldown(q) => (q.skip, q.top) = (skip, top),
            Self::Id { .. } | Self::IdBatch { .. } => {}
        }
        self
    }

    pub fn with_fdim(mut self, fdim: usize) -> Self {
        match &mut self {
            Self::FreeText(q) => q.fdim = fdim,
            Self::Field(q) => q.fdim = fdim,
            Self::FacetDrilldown(q) => q.fdim = fdim,
            Self::Id { .. } | Self::IdBatch { .. } => {}
        }
        self
    }

    pub fn with_slop(mut self, slop: u32) -> Self {
        match &mut self {
            Self::FreeText(q) => q.slop = slop,
            Self::Field(q) => q.slop = slop,
            _ => {}
        }
        self
    }

    pub fn with_facets(mut self, facets: FacetFilter) -> Self {
        match &mut self {
            Self::FreeText(q) => q.facets = facets,
            Self::Field(q) => q.facets = facets,
            Self::FacetDrilldown(q) => q.facets = facets,
            Self::Id { .. } | Self::IdBatch { .. } => {}
        }
        self
    }

    pub fn with_facet(self, dimension: &str, value: &str) -> Self {
        let mut facets = self.facets().clone();
        facets.select(dimension, value);
        self.with_facets(facets)
    }

    pub fn kind(&self) -> QueryKind {
        match self {
            Self::FreeText(_) => QueryKind::FreeText,
            Self::Field(_) => QueryKind::Field,
            Self::FacetDrilldown(_) => QueryKind::FacetDrilldown,
            Self::Id { .. } => QueryKind::Id,
            Self::IdBatch { .. } => QueryKind::IdBatch,
        }
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field(q) => Some(q.field.as_str()),
            Self::Id { .. } | Self::IdBatch { .. } => Some(FIELD_ID),
            _ => None,
        }
    }

    /// The textual payload, if the query carries one.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::FreeText(q) => q.text.as_deref(),
            Self::Field(q) => Some(q.value.as_str()),
            _ => None,
        }
    }

    /// Text worth sending to the concept annotator.
    pub fn annotatable_text(&self) -> Option<&str> {
        match self {
            Self::FreeText(q) => q.text.as_deref(),
            Self::Field(q) if !q.field.starts_with(INTERNAL_PREFIX) && q.field != FIELD_ID => {
                Some(q.value.as_str())
            }
            _ => None,
        }
    }

    pub fn facets(&self) -> &FacetFilter {
        match self {
            Self::FreeText(q) => &q.facets,
            Self::Field(q) => &q.facets,
            Self::FacetDrilldown(q) => &q.facets,
            Self::Id { .. } | Self::IdBatch { .. } => &NO_FACETS,
        }
    }

    pub fn skip(&self) -> usize {
        match self {
            Self::FreeText(q) => q.skip,
            Self::Field(q) => q.skip,
            Self::FacetDrilldown(q) => q.skip,
            Self::Id { .. } | Self::IdBatch { .. } => 0,
        }
    }

    pub fn top(&self) -> usize {
        match self {
            Self::FreeText(q) => q.top,
            Self::Field(q) => q.top,
            Self::FacetDrilldown(q) => q.top,
            Self::Id { .. } => 1,
            Self::IdBatch { ids } => ids.len(),
        }
    }

    pub fn fdim(&self) -> usize {
        match self {
            Self::FreeText(q) => q.fdim,
            Self::Field(q) => q.fdim,
            Self::FacetDrilldown(q) => q.fdim,
            Self::Id { .. } | Self::IdBatch { .. } => 0,
        }
    }

    pub fn slop(&self) -> u32 {
        match self {
            Self::FreeText(q) => q.slop,
            Self::Field(q) => q.slop,
            _ => DEFAULT_SLOP,
        }
    }

    /// How many documents each shard must return so the merged page is exact.
    pub fn max_docs(&self) -> usize {
        match self {
            Self::Id { .. } => ID_LOOKUP_MAX,
            Self::IdBatch { ids } => ids.len(),
            _ => self.skip().saturating_add(self.top()),
        }
    }

    /// Rewrites into the predicate every shard evaluates. Facet selections are
    /// not folded in here; shards apply them separately so they can count
    /// facets sideways. See [`SearchQuery::filtered_predicate`].
    pub fn rewrite(&self) -> Result<ShardPredicate> {
        match self {
            Self::FreeText(q) => Ok(match &q.text {
                None => ShardPredicate::AllDocuments,
                Some(text) => ShardPredicate::Text {
                    field: None,
                    query: rewrite_text(text),
                    raw: text.clone(),
                    slop: q.slop,
                },
            }),
            Self::Field(q) => rewrite_field(&q.field, &q.value, q.slop),
            Self::FacetDrilldown(_) => Ok(ShardPredicate::AllDocuments),
            Self::Id { id } => Ok(ShardPredicate::IdEquals(*id)),
            Self::IdBatch { ids } => Ok(ShardPredicate::IdIn(ids.clone())),
        }
    }

    /// The rewritten predicate with facet selections applied as hard filters.
    pub fn filtered_predicate(&self) -> Result<ShardPredicate> {
        let base = self.rewrite()?;
        if self.facets().is_empty() {
            Ok(base)
        } else {
            Ok(ShardPredicate::Drilldown { base: Box::new(base), facets: self.facets().clone() })
        }
    }
}

fn rewrite_field(field: &str, value: &str, slop: u32) -> Result<ShardPredicate> {
    if field.is_empty() {
        return Err(Error::malformed("empty field name"));
    }
    match field {
        FIELD_ID => value
            .trim()
            .parse::<u64>()
            .map(ShardPredicate::IdEquals)
            .map_err(|e| Error::malformed(format!("bogus id '{value}': {e}"))),
        FIELD_YEAR => YearRange::parse(value).map(ShardPredicate::YearRange),
        f if f.starts_with(INTERNAL_PREFIX) => {
            Ok(ShardPredicate::ExactTerm { field: f.to_string(), term: value.to_string() })
        }
        f => {
            if value.trim().is_empty() {
                return Err(Error::malformed(format!("empty query for field '{f}'")));
            }
            Ok(ShardPredicate::Text {
                field: Some(f.to_string()),
                query: rewrite_text(value),
                raw: value.to_string(),
                slop,
            })
        }
    }
}

/// Inclusive publication-year bounds; `None` leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl YearRange {
    /// Accepts `ZZZZ`, `(XXXX,YYYY)`, `(,YYYY)` and `(XXXX,)`.
    pub fn parse(input: &str) -> Result<Self> {
        let bogus = |detail: String| Error::malformed(format!("bogus year format '{input}': {detail}"));
        let bound = |s: &str| -> Result<Option<i32>> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<i32>().map(Some).map_err(|e| bogus(e.to_string()))
            }
        };

        let text = input.trim();
        if let Some(open) = text.find('(') {
            let inner = &text[open + 1..];
            let close = inner.find(')').ok_or_else(|| bogus("missing ')'".into()))?;
            let (lo, hi) = inner[..close]
                .split_once(',')
                .ok_or_else(|| bogus("expected (min,max)".into()))?;
            let range = Self { min: bound(lo)?, max: bound(hi)? };
            if let (Some(min), Some(max)) = (range.min, range.max) {
                if min > max {
                    return Err(bogus(format!("{min} is after {max}")));
                }
            }
            return Ok(range);
        }
        let year = text.parse::<i32>().map_err(|e| bogus(e.to_string()))?;
        Ok(Self { min: Some(year), max: Some(year) })
    }

    pub fn contains(&self, year: i32) -> bool {
        self.min.map_or(true, |min| year >= min) && self.max.map_or(true, |max| year <= max)
    }
}

/// What a shard must evaluate; compiled by each shard against its own index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardPredicate {
    /// Every document written by this index version.
    AllDocuments,
    /// Normalized query syntax over `field` (default text fields when `None`).
    /// `raw` is the caller's text, used for the sloppy phrase fallback.
    Text { field: Option<String>, query: String, raw: String, slop: u32 },
    IdEquals(u64),
    IdIn(Vec<u64>),
    YearRange(YearRange),
    ExactTerm { field: String, term: String },
    Drilldown { base: Box<ShardPredicate>, facets: FacetFilter },
    And(Vec<ShardPredicate>),
    AndNot { include: Box<ShardPredicate>, exclude: Box<ShardPredicate> },
}

impl ShardPredicate {
    pub fn and(a: ShardPredicate, b: ShardPredicate) -> Self {
        Self::And(vec![a, b])
    }

    pub fn and_not(include: ShardPredicate, exclude: ShardPredicate) -> Self {
        Self::AndNot { include: Box::new(include), exclude: Box::new(exclude) }
    }
}

const OPERATORS: [&str; 3] = ["AND", "OR", "NOT"];

/// Length of a quoted phrase or parenthesised group at the start of `rest`,
/// including an optional `+`/`-`/`~` prefix and a `~N` suffix. Groups may
/// nest and may hold phrases; parentheses inside quotes don't count.
fn group_len(rest: &str) -> Option<usize> {
    let first = rest.chars().next()?;
    let open_at = usize::from(matches!(first, '+' | '-' | '~'));
    let body = open_at + 1;
    let close = match rest.as_bytes().get(open_at)? {
        b'"' => body + rest[body..].find('"')?,
        b'(' => {
            let mut depth = 1usize;
            let mut quoted = false;
            let mut close = None;
            for (i, c) in rest[body..].char_indices() {
                match c {
                    '"' => quoted = !quoted,
                    '(' if !quoted => depth += 1,
                    ')' if !quoted => {
                        depth -= 1;
                        if depth == 0 {
                            close = Some(body + i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            close?
        }
        _ => return None,
    };
    if close == body {
        return None;
    }
    let mut end = close + 1;
    if let Some(after) = rest[end..].strip_prefix('~') {
        let digits = after.len() - after.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits > 0 {
            end += 1 + digits;
        }
    }
    Some(end)
}

fn query_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let len = group_len(rest)
            .unwrap_or_else(|| rest.find(char::is_whitespace).unwrap_or(rest.len()));
        tokens.push(&rest[..len]);
        rest = rest[len..].trim_start();
    }
    tokens
}

/// Normalizes user query text before it is parsed: every plain term becomes
/// required, `~term` is optional, phrases keep their slop and possessives
/// match their stem and plural too (`parkinson's` also finds `parkinson`).
pub fn rewrite_text(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for tok in query_tokens(text) {
        let rewritten = if tok.starts_with('+') || tok.starts_with('-') {
            tok.to_string()
        } else if let Some(optional) = tok.strip_prefix('~') {
            optional.to_string()
        } else if tok.starts_with('"') {
            match tok.rsplit_once('~') {
                Some((phrase, slop))
                    if phrase.ends_with('"') && !slop.is_empty() && slop.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    let slop: u32 = slop.parse().unwrap_or(0);
                    if slop > 0 {
                        format!("+{phrase}~{slop}")
                    } else {
                        format!("+{phrase}")
                    }
                }
                _ => format!("+{tok}"),
            }
        } else if let Some(stem) = tok.strip_suffix("'s") {
            format!("+({tok} {stem} {stem}s)")
        } else if OPERATORS.contains(&tok) {
            tok.to_string()
        } else {
            format!("+{tok}")
        };
        out.push(rewritten);
    }
    out.join(" ")
}

/// Case- and whitespace-normalized payload for cache keys. Boolean operators
/// keep their case since `AND` and `and` parse differently.
pub fn normalize_payload(text: &str) -> String {
    text.split_whitespace()
        .map(|tok| if OPERATORS.contains(&tok) { tok.to_string() } else { tok.to_lowercase() })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_inclusive_bounds() {
        let r = YearRange::parse("(1990,2000)").expect("range");
        assert!(r.contains(1990));
        assert!(r.contains(1995));
        assert!(r.contains(2000));
        assert!(!r.contains(1989));
        assert!(!r.contains(2001));
    }

    #[test]
    fn year_range_open_sides() {
        let upto = YearRange::parse("(,2000)").expect("open low");
        assert_eq!(upto, YearRange { min: None, max: Some(2000) });
        assert!(upto.contains(1800));
        assert!(upto.contains(2000));
        assert!(!upto.contains(2001));

        let from = YearRange::parse("(2010,)").expect("open high");
        assert!(from.contains(2010));
        assert!(from.contains(3000));
        assert!(!from.contains(2009));
    }

    #[test]
    fn year_exact_and_malformed() {
        let exact = YearRange::parse("2015").expect("exact");
        assert!(exact.contains(2015));
        assert!(!exact.contains(2014));
        assert!(!exact.contains(2016));

        for bad in ["notanumber", "(19x0,2000)", "(1990;2000)", "(2000,1990)", "(1990,2000"] {
            let err = YearRange::parse(bad).unwrap_err();
            assert!(err.is_malformed_query(), "{bad} should be malformed");
        }
    }

    #[test]
    fn field_rewrite_rules() {
        assert_eq!(SearchQuery::field("id", "42").rewrite().expect("id"), ShardPredicate::IdEquals(42));
        assert!(SearchQuery::field("id", "4x2").rewrite().unwrap_err().is_malformed_query());
        assert_eq!(
            SearchQuery::field("_indexer", "Some Version").rewrite().expect("internal"),
            ShardPredicate::ExactTerm { field: "_indexer".into(), term: "Some Version".into() }
        );
        match SearchQuery::field("title", "heart failure").rewrite().expect("title") {
            ShardPredicate::Text { field, query, raw, slop } => {
                assert_eq!(field.as_deref(), Some("title"));
                assert_eq!(query, "+heart +failure");
                assert_eq!(raw, "heart failure");
                assert_eq!(slop, DEFAULT_SLOP);
            }
            other => panic!("unexpected predicate {other:?}"),
        }
        assert!(SearchQuery::field("year", "soon").rewrite().is_err());
    }

    #[test]
    fn no_payload_means_all_documents() {
        assert_eq!(SearchQuery::all().rewrite().expect("all"), ShardPredicate::AllDocuments);
        assert_eq!(SearchQuery::free_text("   ").rewrite().expect("blank"), ShardPredicate::AllDocuments);
        let drill = SearchQuery::drilldown(FacetFilter::new());
        assert_eq!(drill.rewrite().expect("drill"), ShardPredicate::AllDocuments);
    }

    #[test]
    fn filtered_predicate_wraps_facets() {
        let q = SearchQuery::free_text("asthma").with_facet("journal", "Lancet");
        match q.filtered_predicate().expect("filtered") {
            ShardPredicate::Drilldown { facets, .. } => {
                assert_eq!(facets.get("journal"), Some(&[vec!["Lancet".to_string()]][..]));
            }
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn text_rewrite_marks_terms_required() {
        assert_eq!(rewrite_text("heart failure"), "+heart +failure");
        assert_eq!(rewrite_text("~optional -excluded +must"), "optional -excluded +must");
        assert_eq!(rewrite_text("asthma OR copd"), "+asthma OR +copd");
    }

    #[test]
    fn text_rewrite_phrases_and_possessives() {
        assert_eq!(rewrite_text("\"cardiac arrest\""), "+\"cardiac arrest\"");
        assert_eq!(rewrite_text("\"cardiac arrest\"~2 heart"), "+\"cardiac arrest\"~2 +heart");
        assert_eq!(rewrite_text("\"cardiac arrest\"~0"), "+\"cardiac arrest\"");
        assert_eq!(
            rewrite_text("parkinson's disease"),
            "+(parkinson's parkinson parkinsons) +disease"
        );
        assert_eq!(rewrite_text("-(mouse rat) human"), "-(mouse rat) +human");
        assert_eq!(rewrite_text("(mouse rat)"), "+(mouse rat)");
    }

    #[test]
    fn text_rewrite_multi_digit_slop() {
        assert_eq!(rewrite_text("\"cardiac arrest\"~10"), "+\"cardiac arrest\"~10");
        assert_eq!(rewrite_text("\"cardiac arrest\"~12 heart"), "+\"cardiac arrest\"~12 +heart");
        assert_eq!(query_tokens("\"a b\"~25 c"), vec!["\"a b\"~25", "c"]);
    }

    #[test]
    fn text_rewrite_nested_groups() {
        assert_eq!(query_tokens("((a b) c) d"), vec!["((a b) c)", "d"]);
        assert_eq!(query_tokens("(\"x y\" z) w"), vec!["(\"x y\" z)", "w"]);
        assert_eq!(query_tokens("(\"a (b\" c) d"), vec!["(\"a (b\" c)", "d"]);
        assert_eq!(rewrite_text("-((mouse rat) \"guinea pig\") human"), "-((mouse rat) \"guinea pig\") +human");
    }

    #[test]
    fn payload_normalization_keeps_operators() {
        assert_eq!(normalize_payload("  Heart   AND Lung "), "heart AND lung");
        assert_eq!(normalize_payload("heart and lung"), "heart and lung");
    }

    #[test]
    fn facet_spec_parsing() {
        let mut f = FacetFilter::new();
        f.select_spec("tr=C04.588", |d| d == "tr").expect("hierarchical");
        f.select_spec("journal=Nature Medicine", |d| d == "tr").expect("flat");
        f.select_spec("journal=Nature Medicine", |d| d == "tr").expect("duplicate");
        assert_eq!(f.get("tr"), Some(&[vec!["C04".to_string(), "588".to_string()]][..]));
        assert_eq!(f.get("journal").map(<[_]>::len), Some(1));
        assert!(f.select_spec("journal", |_| false).is_err());
        assert!(f.without("tr").get("tr").is_none());
    }

    #[test]
    fn paging_window_and_max_docs() {
        let q = SearchQuery::free_text("x").with_page(5, 5);
        assert_eq!(q.max_docs(), 10);
        assert_eq!(SearchQuery::id(3).max_docs(), 5);
        assert_eq!(SearchQuery::id_batch(&[1, 2, 2, 3]).max_docs(), 3);
    }
}
