use thiserror::Error;

/// Errors raised by the query model, the shards and the coordinator.
///
/// `Clone` so a single failed computation can be handed to every caller
/// waiting on the same cache key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Shard '{shard}' failed: {message}")]
    Shard { shard: String, message: String },

    #[error("Can't skip {skip} documents; only {len} available")]
    Paging { skip: usize, len: usize },

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    pub fn malformed(message: impl std::fmt::Display) -> Self {
        Self::MalformedQuery(message.to_string())
    }

    pub fn shard(shard: &str, message: impl std::fmt::Display) -> Self {
        Self::Shard { shard: shard.to_string(), message: message.to_string() }
    }

    pub fn operation(message: impl std::fmt::Display) -> Self {
        Self::Operation(message.to_string())
    }

    /// Whether retrying the same request can't change the outcome.
    pub fn is_malformed_query(&self) -> bool {
        matches!(self, Self::MalformedQuery(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
