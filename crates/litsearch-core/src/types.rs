//! Domain types shared by shards, the coordinator and callers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};
use crate::facet::Facet;
use crate::query::SearchQuery;

/// A normalized concept: a MeSH descriptor, a UMLS concept or a taxonomy heading.
///
/// Two concepts are the same concept when their ids match; name, types and
/// score are presentation details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    /// Semantic type labels, first one is the primary type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl Concept {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), types: Vec::new(), score: None, context: None }
    }

    /// Adds a type label unless it is already present.
    pub fn with_type(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        if !self.types.contains(&label) {
            self.types.push(label);
        }
        self
    }
}

impl PartialEq for Concept {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Concept {}

impl Hash for Concept {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Concept {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Concept {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// A highlighted snippet and the stored field it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedFragment {
    pub field: String,
    pub fragment: String,
}

/// One ranked result row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedDocument {
    pub id: u64,
    pub title: String,
    pub year: Option<i32>,
    pub score: Option<f32>,
    /// Revision timestamp in epoch milliseconds.
    pub revision: Option<i64>,
    pub source: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub fragments: Vec<MatchedFragment>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub headings: Vec<Concept>,
}

impl MatchedDocument {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            year: None,
            score: None,
            revision: None,
            source: None,
            journal: None,
            fragments: Vec::new(),
            concepts: Vec::new(),
            headings: Vec::new(),
        }
    }

    /// Ranking order: higher score, then higher year, then higher id, then
    /// later revision, then source and title ascending. Missing values rank
    /// after present ones.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        fn desc<T, F: Fn(&T, &T) -> Ordering>(a: &Option<T>, b: &Option<T>, cmp: F) -> Ordering {
            match (a, b) {
                (Some(a), Some(b)) => cmp(b, a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }

        desc(&self.score, &other.score, |a, b| a.total_cmp(b))
            .then_with(|| desc(&self.year, &other.year, Ord::cmp))
            .then_with(|| other.id.cmp(&self.id))
            .then_with(|| desc(&self.revision, &other.revision, Ord::cmp))
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.title.cmp(&other.title))
    }

    pub fn best_fragment(&self) -> Option<&MatchedFragment> {
        self.fragments.iter().max_by_key(|f| f.fragment.matches("<b>").count())
    }
}

impl PartialEq for MatchedDocument {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for MatchedDocument {}

impl PartialOrd for MatchedDocument {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatchedDocument {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// A facet assignment carried by an ingested document. Non-hierarchical
/// dimensions use a single-element path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetEntry {
    pub dimension: String,
    pub path: Vec<String>,
}

impl FacetEntry {
    pub fn new(dimension: impl Into<String>, path: &[&str]) -> Self {
        Self { dimension: dimension.into(), path: path.iter().map(|s| s.to_string()).collect() }
    }
}

/// A structured record pushed by the ingestion source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub year: Option<i32>,
    /// Monotonic revision timestamp (epoch milliseconds).
    pub revision: i64,
    /// Partition tag; loaders fill it from the file's directory when absent.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub facets: Vec<FacetEntry>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub headings: Vec<Concept>,
}

impl Document {
    pub fn new(id: u64, title: impl Into<String>, revision: i64, source: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            abstract_text: String::new(),
            year: None,
            revision,
            source: source.into(),
            journal: None,
            facets: Vec::new(),
            concepts: Vec::new(),
            headings: Vec::new(),
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = text.into();
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_journal(mut self, journal: impl Into<String>) -> Self {
        self.journal = Some(journal.into());
        self
    }

    pub fn with_facet(mut self, dimension: &str, path: &[&str]) -> Self {
        self.facets.push(FacetEntry::new(dimension, path));
        self
    }
}

/// Which shards contributed to a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCoverage {
    pub requested: usize,
    pub responded: Vec<String>,
    pub dropped: Vec<String>,
}

impl ShardCoverage {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty() && self.responded.len() == self.requested
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: SearchQuery,
    /// Hits across every responding shard, independent of paging.
    pub total: u64,
    pub documents: Vec<MatchedDocument>,
    pub facets: Vec<Facet>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub coverage: ShardCoverage,
}

impl SearchResult {
    pub fn empty(query: SearchQuery) -> Self {
        Self {
            query,
            total: 0,
            documents: Vec::new(),
            facets: Vec::new(),
            concepts: Vec::new(),
            coverage: ShardCoverage::default(),
        }
    }

    /// Returns a copy holding documents `skip..skip + top`. Facets, total and
    /// coverage are carried over untouched.
    pub fn page(&self, skip: usize, top: usize) -> Result<Self> {
        if skip > self.documents.len() {
            return Err(Error::Paging { skip, len: self.documents.len() });
        }
        let end = self.documents.len().min(skip.saturating_add(top));
        Ok(Self {
            query: self.query.clone(),
            total: self.total,
            documents: self.documents[skip..end].to_vec(),
            facets: self.facets.clone(),
            concepts: self.concepts.clone(),
            coverage: self.coverage.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.facets.is_empty()
    }

    /// Looks a facet up by name or display name, ignoring case.
    pub fn facet(&self, name: &str) -> Option<&Facet> {
        self.facets.iter().find(|f| {
            f.name.eq_ignore_ascii_case(name)
                || f.display.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: u64, score: Option<f32>, year: Option<i32>) -> MatchedDocument {
        let mut d = MatchedDocument::new(id, format!("title {id}"));
        d.score = score;
        d.year = year;
        d
    }

    #[test]
    fn ranking_prefers_score_then_year_then_id() {
        let mut docs = vec![
            doc(1, Some(1.0), Some(2000)),
            doc(2, Some(2.0), Some(1990)),
            doc(3, Some(1.0), Some(2010)),
            doc(4, Some(1.0), Some(2010)),
        ];
        docs.sort();
        let ids: Vec<u64> = docs.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);
    }

    #[test]
    fn ranking_breaks_ties_on_revision_source_title() {
        let mut a = doc(7, Some(1.0), Some(2000));
        let mut b = a.clone();
        a.revision = Some(10);
        b.revision = Some(20);
        assert_eq!(a.cmp(&b), Ordering::Greater, "later revision ranks first");

        b.revision = Some(10);
        a.source = Some("a".into());
        b.source = Some("b".into());
        assert_eq!(a.cmp(&b), Ordering::Less);

        b.source = a.source.clone();
        b.title = "zzz".into();
        assert_eq!(a.cmp(&b), Ordering::Less);
    }

    #[test]
    fn ranking_is_antisymmetric_for_equal_keys() {
        let samples = vec![
            doc(1, None, None),
            doc(1, Some(0.5), None),
            doc(1, Some(0.5), Some(2001)),
            doc(1, Some(f32::NAN), Some(2001)),
            doc(2, Some(0.5), Some(2001)),
        ];
        for a in &samples {
            for b in &samples {
                let ab = a.cmp(b);
                let ba = b.cmp(a);
                assert_eq!(ab, ba.reverse(), "{:?} vs {:?}", a.id, b.id);
                assert!(!(a < b && b < a));
            }
        }
    }

    #[test]
    fn missing_score_ranks_last() {
        let mut docs = vec![doc(1, None, Some(2020)), doc(2, Some(0.1), Some(1900))];
        docs.sort();
        assert_eq!(docs[0].id, 2);
    }

    #[test]
    fn concept_equality_is_by_id() {
        let a = Concept::new("D001", "Asthma").with_type("T047");
        let b = Concept::new("D001", "asthma, bronchial");
        assert_eq!(a, b);
        assert_ne!(a, Concept::new("D002", "Asthma"));
        assert_eq!(a.clone().with_type("T047").types, vec!["T047".to_string()]);
    }

    #[test]
    fn page_rejects_skip_past_end() {
        let mut result = SearchResult::empty(SearchQuery::free_text("asthma"));
        result.documents = (0..3).map(|i| doc(i, Some(1.0), None)).collect();
        assert!(result.page(3, 10).expect("skip == len is allowed").documents.is_empty());
        assert_eq!(result.page(4, 1).unwrap_err(), Error::Paging { skip: 4, len: 3 });
        assert_eq!(result.page(1, 1).expect("page").documents[0].id, 1);
    }

    #[test]
    fn document_json_uses_abstract_key() {
        let json = r#"{"id":42,"title":"T","abstract":"body","revision":5,"source":"s1"}"#;
        let d: Document = serde_json::from_str(json).expect("parse");
        assert_eq!(d.abstract_text, "body");
        assert!(d.facets.is_empty());
        assert_eq!(d.year, None);
    }
}
