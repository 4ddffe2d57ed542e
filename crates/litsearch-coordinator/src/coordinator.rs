use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use litsearch_core::config::SearchSettings;
use litsearch_core::error::{Error, Result};
use litsearch_core::facet::{Facet, FacetValue, NGRAM_DIMENSION};
use litsearch_core::key::CacheKey;
use litsearch_core::query::{QueryKind, SearchQuery};
use litsearch_core::traits::{ConceptAnnotator, LabelResolver, Shard, ShardRequest};
use litsearch_core::types::{Concept, MatchedDocument, SearchResult};

use crate::cache::{CacheStats, ResultCache};
use crate::discovery::DisconnectedTerm;
use crate::merge::{keep_latest_revisions, merge_responses};

/// Outcome of one fan-out: who answered with what, and who didn't.
pub(crate) struct Round<T> {
    pub responses: Vec<(String, T)>,
    pub requested: usize,
    pub dropped: Vec<String>,
}

impl<T> Round<T> {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty() && self.responses.len() == self.requested
    }
}

pub(crate) struct Caches {
    pub results: ResultCache<CacheKey, Arc<SearchResult>>,
    pub documents: ResultCache<CacheKey, Option<MatchedDocument>>,
    pub concepts: ResultCache<CacheKey, Option<Arc<Vec<Concept>>>>,
    pub ngrams: ResultCache<CacheKey, Arc<Facet>>,
    pub discovery: ResultCache<CacheKey, Arc<Vec<DisconnectedTerm>>>,
}

impl Caches {
    fn new(settings: &SearchSettings) -> Result<Self> {
        Ok(Self {
            results: ResultCache::from_settings(&settings.cache)?,
            documents: ResultCache::from_settings(&settings.cache)?,
            concepts: ResultCache::from_settings(&settings.cache)?,
            ngrams: ResultCache::from_settings(&settings.cache)?,
            discovery: ResultCache::from_settings(&settings.cache)?,
        })
    }

    pub(crate) fn clear(&self) {
        self.results.clear();
        self.documents.clear();
        self.concepts.clear();
        self.ngrams.clear();
        self.discovery.clear();
    }
}

/// Owns a set of shards and answers queries over all of them.
///
/// Every read fans out to the shards concurrently, one blocking task per
/// shard per round, and merges whatever came back inside the response
/// budget. Results are memoized per normalized query; a result missing
/// any shard is returned but never cached.
pub struct Coordinator {
    pub(crate) shards: Vec<Arc<dyn Shard>>,
    annotator: Option<Arc<dyn ConceptAnnotator>>,
    labels: Option<Arc<dyn LabelResolver>>,
    pub(crate) settings: SearchSettings,
    pub(crate) caches: Caches,
    /// Held for the length of an ingestion batch.
    pub(crate) ingest_lock: tokio::sync::Mutex<()>,
}

impl Coordinator {
    pub fn new(shards: Vec<Arc<dyn Shard>>, settings: SearchSettings) -> Result<Self> {
        if shards.is_empty() {
            return Err(Error::InvalidConfig("a coordinator needs at least one shard".into()));
        }
        if settings.max_tries == 0 {
            return Err(Error::InvalidConfig("max_tries must be at least 1".into()));
        }
        let caches = Caches::new(&settings)?;
        info!(shards = shards.len(), "coordinator ready");
        Ok(Self { shards, annotator: None, labels: None, settings, caches, ingest_lock: tokio::sync::Mutex::new(()) })
    }

    pub fn with_annotator(mut self, annotator: Arc<dyn ConceptAnnotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn with_labels(mut self, labels: Arc<dyn LabelResolver>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn shard_names(&self) -> Vec<String> {
        self.shards.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.caches.results.stats()
    }

    pub fn clear_caches(&self) {
        self.caches.clear();
    }

    /// Runs `op` on every shard, retrying shards that miss the response
    /// timeout for up to `max_tries` rounds with doubling backoff. A shard
    /// that fails outright is dropped; a malformed-query failure ends the
    /// whole fan-out.
    pub(crate) async fn fan_out<T, F>(&self, label: &'static str, fingerprint: u64, op: F) -> Result<Round<T>>
    where
        T: Send + 'static,
        F: Fn(&dyn Shard) -> Result<T> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let timeout = self.settings.response_timeout();
        let started = Instant::now();
        let mut pending: Vec<usize> = (0..self.shards.len()).collect();
        let mut failed: Vec<usize> = Vec::new();
        let mut responses = Vec::with_capacity(self.shards.len());

        for attempt in 0..self.settings.max_tries {
            if pending.is_empty() {
                break;
            }
            if attempt > 0 {
                let factor = 1u32 << (attempt - 1).min(10);
                tokio::time::sleep(self.settings.retry_backoff().saturating_mul(factor)).await;
                debug!(op = label, attempt, missing = pending.len(), "retrying shards");
            }

            let calls = pending.iter().map(|&i| {
                let shard = Arc::clone(&self.shards[i]);
                let op = Arc::clone(&op);
                let handle = tokio::task::spawn_blocking(move || (*op)(shard.as_ref()));
                async move { (i, tokio::time::timeout(timeout, handle).await) }
            });

            let mut missing = Vec::new();
            for (i, outcome) in join_all(calls).await {
                let shard = self.shards[i].name();
                match outcome {
                    Ok(Ok(Ok(value))) => responses.push((shard.to_string(), value)),
                    Ok(Ok(Err(e))) if e.is_malformed_query() => return Err(e),
                    Ok(Ok(Err(e))) => {
                        warn!(op = label, shard, error = %e, "shard failed, dropping it from the round");
                        failed.push(i);
                    }
                    Ok(Err(join_err)) => {
                        warn!(op = label, shard, error = %join_err, "shard task panicked");
                        failed.push(i);
                    }
                    Err(_) => {
                        warn!(op = label, shard, timeout_ms = timeout.as_millis() as u64, attempt, "shard timed out");
                        missing.push(i);
                    }
                }
            }
            pending = missing;
        }

        let mut dropped: Vec<String> =
            failed.iter().chain(pending.iter()).map(|&i| self.shards[i].name().to_string()).collect();
        dropped.sort();
        info!(
            op = label,
            query = %format!("{fingerprint:016x}"),
            shards = self.shards.len(),
            responded = responses.len(),
            dropped = dropped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fan-out round finished"
        );
        if !dropped.is_empty() {
            warn!(op = label, dropped = ?dropped, "returning a degraded result");
        }
        Ok(Round { responses, requested: self.shards.len(), dropped })
    }

    fn resolve_display(&self, facets: &mut [Facet]) {
        if let Some(labels) = &self.labels {
            for facet in facets {
                facet.resolve_display(labels.as_ref());
            }
        }
    }

    /// Runs the query on every shard and returns the requested page of the
    /// merged result.
    pub async fn execute(&self, query: &SearchQuery) -> Result<Arc<SearchResult>> {
        let key = CacheKey::search(query);
        self.caches
            .results
            .get_or_compute_if(key.clone(), |r| r.coverage.is_complete(), || self.compute_search(query, &key))
            .await
    }

    async fn compute_search(&self, query: &SearchQuery, key: &CacheKey) -> Result<Arc<SearchResult>> {
        let request = ShardRequest::for_query(query)?;
        let (concepts, round) = tokio::join!(
            self.concepts(query),
            self.fan_out("search", key.fingerprint(), move |shard: &dyn Shard| shard.search(&request)),
        );
        let round = round?;
        let mut merged = merge_responses(query, round.responses, round.requested, round.dropped, self.settings.threshold_ratio);
        if matches!(query.kind(), QueryKind::Id | QueryKind::IdBatch) {
            merged.documents = keep_latest_revisions(std::mem::take(&mut merged.documents));
            merged.total = merged.documents.len() as u64;
        }
        self.resolve_display(&mut merged.facets);
        let mut page = merged.page(query.skip(), query.top())?;
        page.concepts = concepts?.as_ref().clone();
        Ok(Arc::new(page))
    }

    /// Facet counts of the query's matches, without documents.
    pub async fn facets(&self, query: &SearchQuery) -> Result<Arc<SearchResult>> {
        let key = CacheKey::facets(query);
        self.caches
            .results
            .get_or_compute_if(key.clone(), |r| r.coverage.is_complete(), || async {
                let request = ShardRequest::for_query(query)?.facets_only();
                let round = self.fan_out("facets", key.fingerprint(), move |shard: &dyn Shard| shard.search(&request)).await?;
                let mut merged =
                    merge_responses(query, round.responses, round.requested, round.dropped, self.settings.threshold_ratio);
                self.resolve_display(&mut merged.facets);
                Ok(Arc::new(merged))
            })
            .await
    }

    /// Corpus-wide facet overview.
    pub async fn all_facets(&self) -> Result<Arc<SearchResult>> {
        self.facets(&SearchQuery::all().with_fdim(self.settings.overview_fdim)).await
    }

    /// The most recent revision of `id`, if any shard holds it.
    pub async fn fetch_by_id(&self, id: u64) -> Result<Option<MatchedDocument>> {
        let key = CacheKey::document(id);
        let complete = std::sync::atomic::AtomicBool::new(false);
        self.caches
            .documents
            .get_or_compute_if(key.clone(), |_| complete.load(std::sync::atomic::Ordering::Relaxed), || async {
                let request = ShardRequest::for_query(&SearchQuery::id(id))?;
                let round = self.fan_out("fetch_by_id", key.fingerprint(), move |shard: &dyn Shard| shard.search(&request)).await?;
                complete.store(round.is_complete(), std::sync::atomic::Ordering::Relaxed);
                let hits: Vec<MatchedDocument> = round
                    .responses
                    .into_iter()
                    .flat_map(|(_, r)| r.documents)
                    .filter(|d| d.id == id)
                    .collect();
                if hits.len() > 1 {
                    warn!(id, copies = hits.len(), "document found more than once, keeping the latest revision");
                }
                Ok(hits.into_iter().max_by_key(|d| d.revision))
            })
            .await
    }

    /// Looks up several ids at once. Unknown ids are skipped.
    pub async fn fetch_batch(&self, ids: &[u64]) -> Result<Arc<SearchResult>> {
        self.execute(&SearchQuery::id_batch(ids)).await
    }

    /// Concepts the annotator finds in the query's text. A failing or slow
    /// annotator yields no concepts.
    pub async fn concepts(&self, query: &SearchQuery) -> Result<Arc<Vec<Concept>>> {
        let (Some(annotator), Some(text)) = (&self.annotator, query.annotatable_text()) else {
            return Ok(Arc::new(Vec::new()));
        };
        let key = CacheKey::concepts(query);
        let annotated = self
            .caches
            .concepts
            .get_or_compute_if(key, Option::is_some, || async {
                let annotator = Arc::clone(annotator);
                let text = text.to_string();
                let call = tokio::task::spawn_blocking(move || annotator.annotate(&text));
                Ok(match tokio::time::timeout(self.settings.annotate_timeout(), call).await {
                    Ok(Ok(Ok(concepts))) => Some(Arc::new(concepts)),
                    Ok(Ok(Err(e))) => {
                        warn!(error = %e, "annotator failed, continuing without concepts");
                        None
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "annotator task panicked, continuing without concepts");
                        None
                    }
                    Err(_) => {
                        warn!(timeout_ms = self.settings.annotate_timeout_ms, "annotator timed out, continuing without concepts");
                        None
                    }
                })
            })
            .await?;
        Ok(annotated.unwrap_or_default())
    }

    /// Title n-grams of the query's matches, each with its corpus-wide
    /// total. Values without a total are left out.
    pub async fn ngram_values(&self, query: &SearchQuery) -> Result<Arc<Facet>> {
        let key = CacheKey::ngrams(query);
        let complete = std::sync::atomic::AtomicBool::new(false);
        self.caches
            .ngrams
            .get_or_compute_if(key.clone(), |_| complete.load(std::sync::atomic::Ordering::Relaxed), || async {
                let predicate = query.filtered_predicate()?;
                let round = self
                    .fan_out("ngrams", key.fingerprint(), move |shard: &dyn Shard| shard.facet_counts(&predicate, NGRAM_DIMENSION))
                    .await?;
                let local_complete = round.is_complete();
                let counts = sum_counts(round.responses.into_iter().map(|(_, c)| c));
                let (totals, totals_complete) = self.global_totals(NGRAM_DIMENSION, counts.keys().cloned().collect(), key.fingerprint()).await?;
                complete.store(local_complete && totals_complete, std::sync::atomic::Ordering::Relaxed);

                let mut values = Vec::with_capacity(counts.len());
                for (term, count) in counts {
                    match totals.get(&term) {
                        Some(&total) => values.push(FacetValue::new(term, count).with_total(total)),
                        None => warn!(term = %term, "n-gram has no corpus total, dropping it"),
                    }
                }
                let mut facet = Facet::new(NGRAM_DIMENSION).with_values(values);
                facet.sort();
                facet.trim(query.fdim());
                Ok(Arc::new(facet))
            })
            .await
    }

    /// Corpus-wide counts of `values` in `dimension`, summed over shards.
    pub(crate) async fn global_totals(&self, dimension: &'static str, values: Vec<String>, fingerprint: u64) -> Result<(BTreeMap<String, u64>, bool)> {
        if values.is_empty() {
            return Ok((BTreeMap::new(), true));
        }
        let values = Arc::new(values);
        let round = self
            .fan_out("totals", fingerprint, move |shard: &dyn Shard| shard.facet_value_counts(dimension, &values))
            .await?;
        let complete = round.is_complete();
        Ok((sum_counts(round.responses.into_iter().map(|(_, c)| c)), complete))
    }

    /// Number of documents across all shards.
    pub async fn size(&self) -> Result<u64> {
        let round = self.fan_out("size", 0, |shard: &dyn Shard| shard.size()).await?;
        Ok(round.responses.into_iter().map(|(_, n)| n).sum())
    }
}

pub(crate) fn sum_counts<I>(tables: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = BTreeMap<String, u64>>,
{
    let mut sum = BTreeMap::new();
    for table in tables {
        for (term, count) in table {
            *sum.entry(term).or_insert(0) += count;
        }
    }
    sum
}
