//! Lightweight configuration loader, typed search settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys in env vars are separated by `__` (`APP_SEARCH__MAX_TRIES`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Builds a config from an explicit figment.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[search]` table layered over the built-in defaults.
    pub fn search_settings(&self) -> anyhow::Result<SearchSettings> {
        let settings: SearchSettings = Figment::from(Serialized::defaults(SearchSettings::default()))
            .merge(self.figment.focus("search"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to get 'search': {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        if matches!(env, "prod" | "production") {
            // no dev fallback for the shard set in production
            if self.figment.find_value("data.index_dir").is_err() {
                anyhow::bail!("data.index_dir must be set for the {} environment", env);
            }
        }
        Ok(())
    }
}

fn default_response_timeout_ms() -> u64 { 10_000 }
fn default_max_tries() -> usize { 5 }
fn default_retry_backoff_ms() -> u64 { 50 }
fn default_max_hits() -> usize { 20 }
fn default_fdim() -> usize { 10 }
fn default_overview_fdim() -> usize { 100 }
fn default_threshold_ratio() -> f64 { 0.4 }
fn default_slop() -> u32 { 1 }
fn default_annotate_timeout_ms() -> u64 { 10_000 }
fn default_ingest_max_tries() -> usize { 3 }

/// Ranking applied to common disconnected n-grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RankingStrategy {
    /// Local count divided by global corpus frequency.
    #[default]
    Ratio,
    /// Raw local count.
    Count,
}

/// Coordinator behaviour: fan-out budget, paging and facet defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    #[serde(default = "default_max_tries")]
    pub max_tries: usize,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_hits")]
    pub max_hits: usize,
    #[serde(default = "default_fdim")]
    pub default_fdim: usize,
    #[serde(default = "default_overview_fdim")]
    pub overview_fdim: usize,
    #[serde(default = "default_threshold_ratio")]
    pub threshold_ratio: f64,
    #[serde(default = "default_slop")]
    pub default_slop: u32,
    #[serde(default = "default_annotate_timeout_ms")]
    pub annotate_timeout_ms: u64,
    #[serde(default)]
    pub ranking: RankingStrategy,
    #[serde(default = "default_ingest_max_tries")]
    pub ingest_max_tries: usize,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub index: IndexSettings,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            max_tries: default_max_tries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_hits: default_max_hits(),
            default_fdim: default_fdim(),
            overview_fdim: default_overview_fdim(),
            threshold_ratio: default_threshold_ratio(),
            default_slop: default_slop(),
            annotate_timeout_ms: default_annotate_timeout_ms(),
            ranking: RankingStrategy::default(),
            ingest_max_tries: default_ingest_max_tries(),
            cache: CacheSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

impl SearchSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn annotate_timeout(&self) -> Duration {
        Duration::from_millis(self.annotate_timeout_ms)
    }

    pub fn with_response_timeout_ms(mut self, ms: u64) -> Self {
        self.response_timeout_ms = ms;
        self
    }

    pub fn with_max_tries(mut self, tries: usize) -> Self {
        self.max_tries = tries;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn with_annotate_timeout_ms(mut self, ms: u64) -> Self {
        self.annotate_timeout_ms = ms;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_tries == 0 {
            anyhow::bail!("search.max_tries must be at least 1");
        }
        if self.ingest_max_tries == 0 {
            anyhow::bail!("search.ingest_max_tries must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.threshold_ratio) {
            anyhow::bail!("search.threshold_ratio must be within [0, 1], got {}", self.threshold_ratio);
        }
        if self.cache.max_entries == 0 {
            anyhow::bail!("search.cache.max_entries must be at least 1");
        }
        self.index.validate()
    }
}

fn default_cache_max_entries() -> usize { 1000 }
fn default_cache_ttl_secs() -> u64 { 600 }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { max_entries: default_cache_max_entries(), ttl_secs: default_cache_ttl_secs() }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_facet_dimensions() -> Vec<String> {
    ["year", "source", "journal", "mesh", "tr", "keyword", "pubtype", "author"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_hierarchical() -> Vec<String> { vec!["tr".to_string()] }
fn default_facet_depth() -> usize { 4 }
fn default_ngram_min() -> usize { 2 }
fn default_ngram_max() -> usize { 4 }
fn default_ngram_min_chars() -> usize { 3 }
fn default_ngram_title_max_chars() -> usize { 1024 }
fn default_snippet_chars() -> usize { 500 }
fn default_writer_memory() -> usize { 50_000_000 }

/// Per-shard index layout: which facet dimensions exist and how n-grams are cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "default_facet_dimensions")]
    pub facet_dimensions: Vec<String>,
    #[serde(default = "default_hierarchical")]
    pub hierarchical: Vec<String>,
    #[serde(default = "default_facet_depth")]
    pub facet_depth: usize,
    #[serde(default = "default_ngram_min")]
    pub ngram_min: usize,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    #[serde(default = "default_ngram_min_chars")]
    pub ngram_min_chars: usize,
    #[serde(default = "default_ngram_title_max_chars")]
    pub ngram_title_max_chars: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_writer_memory")]
    pub writer_memory: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            facet_dimensions: default_facet_dimensions(),
            hierarchical: default_hierarchical(),
            facet_depth: default_facet_depth(),
            ngram_min: default_ngram_min(),
            ngram_max: default_ngram_max(),
            ngram_min_chars: default_ngram_min_chars(),
            ngram_title_max_chars: default_ngram_title_max_chars(),
            snippet_chars: default_snippet_chars(),
            writer_memory: default_writer_memory(),
        }
    }
}

impl IndexSettings {
    pub fn is_hierarchical(&self, dimension: &str) -> bool {
        self.hierarchical.iter().any(|d| d == dimension)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max {
            anyhow::bail!(
                "search.index n-gram bounds are invalid: min={} max={}",
                self.ngram_min,
                self.ngram_max
            );
        }
        if let Some(dim) = self.facet_dimensions.iter().find(|d| d.starts_with('_')) {
            anyhow::bail!("facet dimension '{}' uses the reserved '_' prefix", dim);
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_settings_fall_back_to_defaults() {
        let config = Config::from_figment(Figment::new());
        let settings = config.search_settings().expect("defaults");
        assert_eq!(settings, SearchSettings::default());
        assert_eq!(settings.response_timeout(), Duration::from_secs(10));
        assert_eq!(settings.max_tries, 5);
        assert_eq!(settings.max_hits, 20);
    }

    #[test]
    fn search_settings_merge_partial_tables() {
        let toml = r#"
            [search]
            max_tries = 2
            ranking = "count"

            [search.index]
            hierarchical = ["tr", "grant"]
        "#;
        let config = Config::from_figment(Figment::new().merge(Toml::string(toml)));
        let settings = config.search_settings().expect("settings");
        assert_eq!(settings.max_tries, 2);
        assert_eq!(settings.ranking, RankingStrategy::Count);
        assert!(settings.index.is_hierarchical("grant"));
        assert_eq!(settings.index.ngram_max, 4);
        assert_eq!(settings.default_slop, 1);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let toml = "[search]\nmax_tries = 0\n";
        let config = Config::from_figment(Figment::new().merge(Toml::string(toml)));
        assert!(config.search_settings().is_err());
    }

    #[test]
    fn resolve_relative_against_base() {
        let base = Path::new("/srv/litsearch");
        assert_eq!(resolve_with_base(base, "shards"), PathBuf::from("/srv/litsearch/shards"));
        assert_eq!(resolve_with_base(base, "/abs/shards"), PathBuf::from("/abs/shards"));
    }
}
