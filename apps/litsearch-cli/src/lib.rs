use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use litsearch_coordinator::Coordinator;
use litsearch_core::config::{expand_path, Config};
use litsearch_core::lexicon::Lexicon;
use litsearch_core::traits::Shard;
use litsearch_text::open_shards;

/// `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

pub fn index_dir(config: &Config) -> PathBuf {
    let dir: String = config.get("data.index_dir").unwrap_or_else(|_| "../dev_data/indexes/litsearch".to_string());
    expand_path(dir)
}

/// Opens the configured shard set and wraps it in a coordinator, with the
/// lexicon as annotator and label resolver when one is configured.
pub fn open_coordinator(config: &Config) -> Result<Coordinator> {
    let settings = config.search_settings()?;
    let shard_count: usize = config.get("data.shards").unwrap_or(4);
    let dir = index_dir(config);
    let shards: Vec<Arc<dyn Shard>> = open_shards(&dir, shard_count, &settings.index)
        .with_context(|| format!("opening shards under {}", dir.display()))?
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn Shard>)
        .collect();
    info!(dir = %dir.display(), shards = shards.len(), "shards opened");

    let mut coordinator = Coordinator::new(shards, settings)?;
    if let Ok(path) = config.get::<String>("data.lexicon") {
        let path = expand_path(path);
        let lexicon = Arc::new(Lexicon::load(&path).with_context(|| format!("loading lexicon {}", path.display()))?);
        info!(concepts = lexicon.len(), "lexicon loaded");
        coordinator = coordinator.with_annotator(lexicon.clone()).with_labels(lexicon);
    }
    Ok(coordinator)
}
