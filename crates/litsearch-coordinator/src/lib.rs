pub mod cache;
pub mod coordinator;
pub mod discovery;
pub mod ingest;
pub mod merge;

pub use cache::{CacheStats, ResultCache};
pub use coordinator::Coordinator;
pub use discovery::DisconnectedTerm;
pub use ingest::IngestReport;
