//! Literature-based discovery: title n-grams that co-occur with two topics
//! separately but never together.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use litsearch_core::config::RankingStrategy;
use litsearch_core::error::Result;
use litsearch_core::facet::NGRAM_DIMENSION;
use litsearch_core::key::CacheKey;
use litsearch_core::query::{SearchQuery, ShardPredicate};
use litsearch_core::traits::Shard;

use crate::coordinator::{sum_counts, Coordinator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectedTerm {
    pub term: String,
    /// Occurrences under A-only plus B-only.
    pub count: u64,
    /// Corpus-wide frequency, when known.
    pub total: Option<u64>,
    pub score: f64,
}

/// N-gram tables of one shard for A ∧ ¬B, B ∧ ¬A and A ∧ B.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitCounts {
    pub a_only: BTreeMap<String, u64>,
    pub b_only: BTreeMap<String, u64>,
    pub both: BTreeMap<String, u64>,
}

impl SplitCounts {
    pub fn for_shard(shard: &dyn Shard, a: &ShardPredicate, b: &ShardPredicate) -> Result<Self> {
        Ok(Self {
            a_only: shard.facet_counts(&ShardPredicate::and_not(a.clone(), b.clone()), NGRAM_DIMENSION)?,
            b_only: shard.facet_counts(&ShardPredicate::and_not(b.clone(), a.clone()), NGRAM_DIMENSION)?,
            both: shard.facet_counts(&ShardPredicate::and(a.clone(), b.clone()), NGRAM_DIMENSION)?,
        })
    }

    pub fn sum<I: IntoIterator<Item = SplitCounts>>(parts: I) -> Self {
        let (mut a, mut b, mut both) = (Vec::new(), Vec::new(), Vec::new());
        for part in parts {
            a.push(part.a_only);
            b.push(part.b_only);
            both.push(part.both);
        }
        Self { a_only: sum_counts(a), b_only: sum_counts(b), both: sum_counts(both) }
    }
}

/// Terms seen under A-only and B-only but never under A and B together,
/// with their combined count.
pub fn disconnected(counts: &SplitCounts) -> BTreeMap<String, u64> {
    counts
        .a_only
        .iter()
        .filter(|(term, _)| !counts.both.contains_key(*term))
        .filter_map(|(term, a)| counts.b_only.get(term).map(|b| (term.clone(), a + b)))
        .collect()
}

/// Orders terms best first. Ties break on the term.
pub fn rank(terms: BTreeMap<String, u64>, totals: &BTreeMap<String, u64>, strategy: RankingStrategy) -> Vec<DisconnectedTerm> {
    let mut ranked: Vec<DisconnectedTerm> = terms
        .into_iter()
        .map(|(term, count)| {
            let total = totals.get(&term).copied();
            let score = match strategy {
                RankingStrategy::Count => count as f64,
                RankingStrategy::Ratio => count as f64 / total.filter(|t| *t > 0).unwrap_or(count.max(1)) as f64,
            };
            DisconnectedTerm { term, count, total, score }
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.term.cmp(&b.term)));
    ranked
}

impl Coordinator {
    /// N-grams shared by the two topics' literatures that never appear in a
    /// document matching both, ranked by the configured strategy.
    pub async fn common_disconnected(&self, a: &SearchQuery, b: &SearchQuery) -> Result<Arc<Vec<DisconnectedTerm>>> {
        let key = CacheKey::discovery(a, b);
        let complete = std::sync::atomic::AtomicBool::new(false);
        self.caches
            .discovery
            .get_or_compute_if(key.clone(), |_| complete.load(std::sync::atomic::Ordering::Relaxed), || async {
                let pa = a.filtered_predicate()?;
                let pb = b.filtered_predicate()?;
                let round = self
                    .fan_out("discovery", key.fingerprint(), move |shard: &dyn Shard| SplitCounts::for_shard(shard, &pa, &pb))
                    .await?;
                let split_complete = round.is_complete();
                let counts = SplitCounts::sum(round.responses.into_iter().map(|(_, c)| c));
                let terms = disconnected(&counts);
                let (totals, totals_complete) =
                    self.global_totals(NGRAM_DIMENSION, terms.keys().cloned().collect(), key.fingerprint()).await?;
                complete.store(split_complete && totals_complete, std::sync::atomic::Ordering::Relaxed);

                let ranked = rank(terms, &totals, self.settings.ranking);
                info!(
                    a_only = counts.a_only.len(),
                    b_only = counts.b_only.len(),
                    both = counts.both.len(),
                    common = ranked.len(),
                    "disconnected terms computed"
                );
                Ok(Arc::new(ranked))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries.iter().map(|(t, c)| (t.to_string(), *c)).collect()
    }

    #[test]
    fn terms_in_both_are_removed_before_intersecting() {
        let counts = SplitCounts {
            a_only: table(&[("blood viscosity", 3), ("platelet aggregation", 2), ("fish oil", 1)]),
            b_only: table(&[("blood viscosity", 4), ("platelet aggregation", 1), ("vascular reactivity", 2)]),
            both: table(&[("platelet aggregation", 1)]),
        };
        let terms = disconnected(&counts);
        assert_eq!(terms, table(&[("blood viscosity", 7)]));
    }

    #[test]
    fn shard_tables_sum_before_set_algebra() {
        let shard0 = SplitCounts { a_only: table(&[("x", 1)]), b_only: BTreeMap::new(), both: BTreeMap::new() };
        let shard1 = SplitCounts { a_only: BTreeMap::new(), b_only: table(&[("x", 2)]), both: BTreeMap::new() };
        let shard2 = SplitCounts { a_only: table(&[("y", 1)]), b_only: table(&[("y", 1)]), both: table(&[("y", 1)]) };
        let counts = SplitCounts::sum(vec![shard0, shard1, shard2]);
        assert_eq!(disconnected(&counts), table(&[("x", 3)]));
    }

    #[test]
    fn ratio_ranking_prefers_rare_terms() {
        let terms = table(&[("common term", 10), ("rare term", 4)]);
        let totals = table(&[("common term", 1000), ("rare term", 5)]);
        let ranked = rank(terms.clone(), &totals, RankingStrategy::Ratio);
        assert_eq!(ranked[0].term, "rare term");
        assert_eq!(ranked[0].total, Some(5));

        let by_count = rank(terms, &totals, RankingStrategy::Count);
        assert_eq!(by_count[0].term, "common term");
    }

    #[test]
    fn ties_break_on_term() {
        let ranked = rank(table(&[("b", 2), ("a", 2)]), &BTreeMap::new(), RankingStrategy::Count);
        let order: Vec<_> = ranked.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }
}
