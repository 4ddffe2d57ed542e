//! Folding per-shard responses into one result.

use litsearch_core::facet::{merge_facets, trim_threshold};
use litsearch_core::query::SearchQuery;
use litsearch_core::traits::ShardResponse;
use litsearch_core::types::{MatchedDocument, SearchResult, ShardCoverage};
use std::collections::HashMap;
use tracing::warn;

/// Merges the responses of one fan-out round. Totals are summed, documents
/// are concatenated and put in ranking order, and facets are merged per
/// dimension and trimmed to the query's `fdim` against a threshold derived
/// from the merged total. No paging happens here.
pub fn merge_responses(
    query: &SearchQuery,
    responses: Vec<(String, ShardResponse)>,
    requested: usize,
    dropped: Vec<String>,
    threshold_ratio: f64,
) -> SearchResult {
    let mut total = 0u64;
    let mut documents = Vec::new();
    let mut facet_lists = Vec::with_capacity(responses.len());
    let mut responded = Vec::with_capacity(responses.len());

    for (shard, response) in responses {
        total += response.total;
        documents.extend(response.documents);
        facet_lists.push(response.facets);
        responded.push(shard);
    }
    documents.sort();
    responded.sort();

    let threshold = trim_threshold(total, threshold_ratio);
    let mut facets = merge_facets(facet_lists);
    for facet in &mut facets {
        facet.trim_with_threshold(threshold, query.fdim());
    }
    facets.retain(|f| !f.is_empty());

    SearchResult {
        query: query.clone(),
        total,
        documents,
        facets,
        concepts: Vec::new(),
        coverage: ShardCoverage { requested, responded, dropped },
    }
}

/// Collapses copies of the same id to the most recent revision, keeping
/// ranking order.
pub fn keep_latest_revisions(documents: Vec<MatchedDocument>) -> Vec<MatchedDocument> {
    let mut latest: HashMap<u64, MatchedDocument> = HashMap::with_capacity(documents.len());
    for doc in documents {
        match latest.get_mut(&doc.id) {
            Some(existing) => {
                warn!(id = doc.id, "document found more than once, keeping the latest revision");
                if doc.revision > existing.revision {
                    *existing = doc;
                }
            }
            None => {
                latest.insert(doc.id, doc);
            }
        }
    }
    let mut kept: Vec<MatchedDocument> = latest.into_values().collect();
    kept.sort();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use litsearch_core::facet::{Facet, FacetValue};

    fn doc(id: u64, score: f32) -> MatchedDocument {
        let mut d = MatchedDocument::new(id, format!("doc {id}"));
        d.score = Some(score);
        d
    }

    fn response(total: u64, docs: Vec<MatchedDocument>, values: &[(&str, u64)]) -> ShardResponse {
        let facet = Facet::new("journal").with_values(values.iter().map(|(l, c)| FacetValue::new(*l, *c)).collect());
        ShardResponse { total, documents: docs, facets: vec![facet] }
    }

    #[test]
    fn totals_sum_and_documents_interleave() {
        let query = SearchQuery::free_text("asthma");
        let merged = merge_responses(
            &query,
            vec![
                ("shard-0".into(), response(3, vec![doc(1, 0.9), doc(2, 0.1)], &[("Lancet", 3)])),
                ("shard-1".into(), response(4, vec![doc(3, 0.5)], &[("Lancet", 1), ("BMJ", 3)])),
            ],
            2,
            Vec::new(),
            0.4,
        );
        assert_eq!(merged.total, 7);
        assert_eq!(merged.documents.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 3, 2]);
        let journal = merged.facet("journal").expect("journal facet");
        assert_eq!(journal.value("Lancet").map(|v| v.count), Some(4));
        assert_eq!(journal.values[0].label, "Lancet");
        assert!(merged.coverage.is_complete());
    }

    #[test]
    fn merge_order_does_not_matter() {
        let query = SearchQuery::free_text("asthma");
        let a = ("a".to_string(), response(2, vec![doc(1, 0.2)], &[("x", 1), ("y", 2)]));
        let b = ("b".to_string(), response(5, vec![doc(2, 0.3)], &[("y", 4), ("z", 1)]));
        let ab = merge_responses(&query, vec![a.clone(), b.clone()], 2, Vec::new(), 0.4);
        let ba = merge_responses(&query, vec![b, a], 2, Vec::new(), 0.4);
        assert_eq!(ab.total, ba.total);
        assert_eq!(ab.documents, ba.documents);
        assert_eq!(ab.facets, ba.facets);
        assert_eq!(ab.coverage, ba.coverage);
    }

    #[test]
    fn facets_trim_against_merged_total() {
        let query = SearchQuery::free_text("asthma").with_fdim(2);
        // total 10 gives threshold 4: "common" at 9 is crowded out.
        let merged = merge_responses(
            &query,
            vec![("s".into(), response(10, Vec::new(), &[("common", 9), ("a", 3), ("b", 2), ("c", 1)]))],
            1,
            Vec::new(),
            0.4,
        );
        let labels: Vec<_> = merged.facets[0].values.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn duplicate_ids_keep_the_latest_revision() {
        let mut old = doc(9, 0.5);
        old.revision = Some(100);
        old.title = "old".into();
        let mut new = doc(9, 0.5);
        new.revision = Some(200);
        new.title = "new".into();
        let kept = keep_latest_revisions(vec![old, doc(1, 0.1), new]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].title, "new");
        assert_eq!(kept[1].id, 1);
    }

    #[test]
    fn dropped_shards_show_in_coverage() {
        let query = SearchQuery::free_text("asthma");
        let merged = merge_responses(&query, vec![("s0".into(), ShardResponse::default())], 2, vec!["s1".into()], 0.4);
        assert!(!merged.coverage.is_complete());
        assert_eq!(merged.coverage.dropped, vec!["s1".to_string()]);
    }
}
