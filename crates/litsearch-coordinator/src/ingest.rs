//! Pushing new document revisions into the shard set.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use litsearch_core::error::{Error, Result};
use litsearch_core::traits::Shard;
use litsearch_core::types::Document;

use crate::coordinator::Coordinator;

/// What one ingestion batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Stale copies removed across all shards.
    pub deleted_older: u64,
    /// Ids skipped because a shard already holds that revision or newer.
    pub already_current: Vec<u64>,
    pub inserted: BTreeMap<u64, String>,
    pub failed: Vec<(u64, String)>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Keeps the newest revision of each id, in first-seen order.
fn newest_per_id(documents: Vec<Document>) -> Vec<Document> {
    let mut position: HashMap<u64, usize> = HashMap::new();
    let mut kept: Vec<Document> = Vec::with_capacity(documents.len());
    for doc in documents {
        match position.get(&doc.id) {
            Some(&i) if kept[i].revision >= doc.revision => {}
            Some(&i) => kept[i] = doc,
            None => {
                position.insert(doc.id, kept.len());
                kept.push(doc);
            }
        }
    }
    kept
}

/// Applies a batch to `shards`: stale copies go, documents some shard
/// already holds at the same or a newer revision are skipped, and the rest
/// are placed round-robin starting at shard `offset`. A failed insert moves
/// on to the next shard, up to `max_tries` shards per document. Documents
/// placed on a shard whose commit fails are reported as failed.
pub fn ingest(shards: &[Arc<dyn Shard>], documents: Vec<Document>, offset: usize, max_tries: usize) -> Result<IngestReport> {
    if shards.is_empty() {
        return Err(Error::InvalidConfig("no shards to ingest into".into()));
    }
    let mut report = IngestReport::default();
    let mut cursor = offset % shards.len();

    for doc in newest_per_id(documents) {
        for shard in shards {
            match shard.delete_older_than(doc.id, doc.revision) {
                Ok(n) => report.deleted_older += n,
                Err(e) => warn!(shard = shard.name(), id = doc.id, error = %e, "couldn't remove stale copies"),
            }
        }

        let current = shards.iter().any(|shard| match shard.has_at_least_as_new_as(doc.id, doc.revision) {
            Ok(found) => found,
            Err(e) => {
                warn!(shard = shard.name(), id = doc.id, error = %e, "revision check failed");
                false
            }
        });
        if current {
            debug!(id = doc.id, revision = doc.revision, "already current, skipping");
            report.already_current.push(doc.id);
            continue;
        }

        let mut last_error = String::new();
        let mut placed = false;
        for attempt in 0..max_tries.max(1) {
            let target = (cursor + attempt) % shards.len();
            let shard = &shards[target];
            match shard.insert(&doc) {
                Ok(()) => {
                    report.inserted.insert(doc.id, shard.name().to_string());
                    cursor = (target + 1) % shards.len();
                    placed = true;
                    break;
                }
                Err(e) => {
                    warn!(shard = shard.name(), id = doc.id, attempt, error = %e, "insert failed");
                    last_error = e.to_string();
                }
            }
        }
        if !placed {
            report.failed.push((doc.id, last_error));
            cursor = (cursor + 1) % shards.len();
        }
    }

    for shard in shards {
        if let Err(e) = shard.commit() {
            warn!(shard = shard.name(), error = %e, "commit failed");
            let lost: Vec<u64> =
                report.inserted.iter().filter(|(_, name)| name.as_str() == shard.name()).map(|(id, _)| *id).collect();
            for id in lost {
                report.inserted.remove(&id);
                report.failed.push((id, format!("commit on {} failed: {e}", shard.name())));
            }
        }
    }
    Ok(report)
}

impl Coordinator {
    /// Ingests a batch of documents and drops every cached result.
    ///
    /// Batches run one at a time, so an id is never placed twice by two
    /// overlapping calls. Caches are dropped even when the batch fails.
    pub async fn update(&self, documents: Vec<Document>) -> Result<IngestReport> {
        let _serial = self.ingest_lock.lock().await;
        let shards = self.shards.clone();
        let max_tries = self.settings.ingest_max_tries;
        let offset = rand::thread_rng().gen_range(0..shards.len());
        let batch = documents.len();
        let outcome = tokio::task::spawn_blocking(move || ingest(&shards, documents, offset, max_tries))
            .await
            .map_err(|e| Error::operation(format!("ingestion task failed: {e}")));
        self.caches.clear();
        let report = outcome??;
        info!(
            batch,
            inserted = report.inserted.len(),
            already_current = report.already_current.len(),
            deleted_older = report.deleted_older,
            failed = report.failed.len(),
            "ingestion batch applied"
        );
        Ok(report)
    }
}
