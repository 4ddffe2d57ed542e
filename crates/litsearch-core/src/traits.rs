use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::facet::Facet;
use crate::query::{FacetFilter, SearchQuery, ShardPredicate};
use crate::types::{Concept, Document, MatchedDocument};

/// What the coordinator sends to every shard in a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardRequest {
    pub predicate: ShardPredicate,
    /// Applied as filters; each dimension is counted without its own filter.
    pub facets: FacetFilter,
    pub max_docs: usize,
    /// Facet values wanted after merge. Shards return twice as many.
    pub fdim: usize,
}

impl ShardRequest {
    pub fn for_query(query: &SearchQuery) -> Result<Self> {
        Ok(Self {
            predicate: query.rewrite()?,
            facets: query.facets().clone(),
            max_docs: query.max_docs(),
            fdim: query.fdim(),
        })
    }

    /// Facet counts only.
    pub fn facets_only(mut self) -> Self {
        self.max_docs = 0;
        self
    }

    pub fn shard_fdim(&self) -> usize {
        self.fdim.saturating_mul(2)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardResponse {
    pub total: u64,
    pub documents: Vec<MatchedDocument>,
    pub facets: Vec<Facet>,
}

/// One partition of the corpus. Reads may run concurrently; implementations
/// serialize their own writes.
pub trait Shard: Send + Sync {
    fn name(&self) -> &str;

    fn search(&self, request: &ShardRequest) -> Result<ShardResponse>;

    /// Top `top_n` children of `path` in a hierarchical dimension, counted
    /// over the request's matches.
    fn facet_children(&self, request: &ShardRequest, dimension: &str, path: &[String], top_n: usize) -> Result<Vec<(String, u64)>>;

    /// Children of several paths at once; one entry per path, same order.
    fn facet_children_batch(
        &self,
        request: &ShardRequest,
        dimension: &str,
        paths: &[Vec<String>],
        top_n: usize,
    ) -> Result<Vec<Vec<(String, u64)>>> {
        paths.iter().map(|p| self.facet_children(request, dimension, p, top_n)).collect()
    }

    /// Every value of a flat dimension under `predicate`.
    fn facet_counts(&self, predicate: &ShardPredicate, dimension: &str) -> Result<BTreeMap<String, u64>>;

    /// Corpus-wide document counts of the given values.
    fn facet_value_counts(&self, dimension: &str, values: &[String]) -> Result<BTreeMap<String, u64>>;

    fn insert(&self, document: &Document) -> Result<()>;

    fn delete_by_id(&self, id: u64) -> Result<u64>;

    /// Removes copies of `id` with a revision strictly below `revision`.
    fn delete_older_than(&self, id: u64, revision: i64) -> Result<u64>;

    fn has_at_least_as_new_as(&self, id: u64, revision: i64) -> Result<bool>;

    /// Makes staged mutations visible to readers.
    fn commit(&self) -> Result<()>;

    fn size(&self) -> Result<u64>;
}

pub trait ConceptAnnotator: Send + Sync {
    fn annotate(&self, text: &str) -> Result<Vec<Concept>>;
}

pub trait LabelResolver: Send + Sync {
    /// Display name of a facet value; an empty path names the dimension.
    fn display_name(&self, dimension: &str, path: &[String]) -> Option<String>;
}
