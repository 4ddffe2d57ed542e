//! Canonical query keys for caching and logging.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use crate::query::{normalize_payload, QueryKind, SearchQuery, FIELD_ABSTRACT, FIELD_TITLE};

/// Everything that determines a query's matches and facets, normalized so
/// equivalent queries compare equal: payloads over analyzed text are
/// lowercased, facet selections become ordered sets. Paging is not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueryKey {
    pub kind: QueryKind,
    pub field: Option<String>,
    pub payload: Option<String>,
    pub facets: BTreeMap<String, BTreeSet<Vec<String>>>,
    pub ids: Vec<u64>,
    pub fdim: usize,
    pub slop: u32,
}

impl QueryKey {
    pub fn of(query: &SearchQuery) -> Self {
        let ids = match query {
            SearchQuery::Id { id } => vec![*id],
            SearchQuery::IdBatch { ids } => sorted_ids(ids),
            _ => Vec::new(),
        };
        let field = match query {
            SearchQuery::Field(q) => Some(q.field.clone()),
            _ => None,
        };
        let payload = query
            .payload()
            .map(|text| if folds_case(query) { normalize_payload(text) } else { text.to_string() });
        Self {
            kind: query.kind(),
            field,
            payload,
            facets: query
                .facets()
                .iter()
                .map(|(dim, paths)| (dim.to_string(), paths.iter().cloned().collect()))
                .collect(),
            ids,
            fdim: query.fdim(),
            slop: query.slop(),
        }
    }

    /// Stable 64-bit fingerprint, for log lines.
    pub fn fingerprint(&self) -> u64 {
        fingerprint(self)
    }
}

/// Free text and the analyzed fields ignore case; exact-term and untokenized
/// fields such as `journal` or `_indexer` do not.
fn folds_case(query: &SearchQuery) -> bool {
    match query {
        SearchQuery::Field(q) => [FIELD_TITLE, FIELD_ABSTRACT].contains(&q.field.as_str()),
        _ => true,
    }
}

fn sorted_ids(ids: &[u64]) -> Vec<u64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn fingerprint<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    value.hash(&mut hasher);
    hasher.finish()
}

/// Cache key: the operation plus its normalized inputs. Each operation has
/// its own namespace so their results never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CacheKey {
    Search { query: QueryKey, skip: usize, top: usize },
    Facets(QueryKey),
    Document(u64),
    Batch(Vec<u64>),
    Concepts(QueryKey),
    Ngrams(QueryKey),
    /// Unordered pair; the smaller key comes first.
    Discovery(QueryKey, QueryKey),
}

impl CacheKey {
    pub fn search(query: &SearchQuery) -> Self {
        match query {
            SearchQuery::Id { id } => Self::Batch(vec![*id]),
            SearchQuery::IdBatch { ids } => Self::Batch(sorted_ids(ids)),
            _ => Self::Search { query: QueryKey::of(query), skip: query.skip(), top: query.top() },
        }
    }

    pub fn facets(query: &SearchQuery) -> Self {
        Self::Facets(QueryKey::of(query))
    }

    pub fn document(id: u64) -> Self {
        Self::Document(id)
    }

    pub fn batch(ids: &[u64]) -> Self {
        Self::Batch(sorted_ids(ids))
    }

    pub fn concepts(query: &SearchQuery) -> Self {
        Self::Concepts(QueryKey::of(query))
    }

    pub fn ngrams(query: &SearchQuery) -> Self {
        Self::Ngrams(QueryKey::of(query))
    }

    pub fn discovery(a: &SearchQuery, b: &SearchQuery) -> Self {
        let (a, b) = (QueryKey::of(a), QueryKey::of(b));
        if a <= b { Self::Discovery(a, b) } else { Self::Discovery(b, a) }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::Facets(_) => "facets",
            Self::Document(_) => "doc",
            Self::Batch(_) => "batch",
            Self::Concepts(_) => "concepts",
            Self::Ngrams(_) => "ngrams",
            Self::Discovery(..) => "discovery",
        }
    }

    pub fn fingerprint(&self) -> u64 {
        fingerprint(self)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search { query, skip, top } => write!(f, "search/{:016x}/{skip}/{top}", query.fingerprint()),
            Self::Document(id) => write!(f, "doc/{id}"),
            other => write!(f, "{}/{:016x}", other.namespace(), other.fingerprint()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FacetFilter;

    #[test]
    fn equivalent_queries_share_a_key() {
        let a = SearchQuery::free_text("Heart   Failure AND Asthma")
            .with_facet("journal", "Lancet")
            .with_facet("journal", "BMJ");
        let b = SearchQuery::free_text("heart failure AND asthma")
            .with_facet("journal", "BMJ")
            .with_facet("journal", "Lancet");
        assert_eq!(QueryKey::of(&a), QueryKey::of(&b));
        assert_eq!(CacheKey::search(&a), CacheKey::search(&b));
        assert_eq!(QueryKey::of(&a).fingerprint(), QueryKey::of(&b).fingerprint());
    }

    #[test]
    fn operators_and_paging_distinguish_keys() {
        let and = SearchQuery::free_text("heart AND lung");
        let lower = SearchQuery::free_text("heart and lung");
        assert_ne!(QueryKey::of(&and), QueryKey::of(&lower));

        let page1 = SearchQuery::free_text("heart").with_page(0, 10);
        let page2 = SearchQuery::free_text("heart").with_page(10, 10);
        assert_ne!(CacheKey::search(&page1), CacheKey::search(&page2));
        assert_eq!(CacheKey::facets(&page1), CacheKey::facets(&page2));
    }

    #[test]
    fn untokenized_fields_keep_payload_case() {
        let lower = SearchQuery::field("journal", "lancet");
        let upper = SearchQuery::field("journal", "Lancet");
        assert_ne!(CacheKey::search(&lower), CacheKey::search(&upper));
        assert_ne!(
            QueryKey::of(&SearchQuery::field("_indexer", "Some Version")),
            QueryKey::of(&SearchQuery::field("_indexer", "some version"))
        );
        assert_eq!(
            QueryKey::of(&SearchQuery::field("title", "Heart  Failure")),
            QueryKey::of(&SearchQuery::field("title", "heart failure"))
        );
    }

    #[test]
    fn namespaces_never_collide() {
        let q = SearchQuery::free_text("asthma");
        let keys = [CacheKey::search(&q), CacheKey::facets(&q), CacheKey::concepts(&q), CacheKey::ngrams(&q)];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_ne!(CacheKey::document(7), CacheKey::batch(&[7]));
    }

    #[test]
    fn batch_and_discovery_keys_are_order_free() {
        assert_eq!(CacheKey::batch(&[3, 1, 2, 3]), CacheKey::batch(&[1, 2, 3]));
        let a = SearchQuery::free_text("raynaud");
        let b = SearchQuery::drilldown(FacetFilter::new()).with_facet("mesh", "fish oils");
        assert_eq!(CacheKey::discovery(&a, &b), CacheKey::discovery(&b, &a));
    }

    #[test]
    fn display_names_the_namespace() {
        let q = SearchQuery::free_text("asthma").with_page(5, 5);
        assert!(CacheKey::search(&q).to_string().starts_with("search/"));
        assert!(CacheKey::search(&q).to_string().ends_with("/5/5"));
        assert_eq!(CacheKey::document(42).to_string(), "doc/42");
    }
}
