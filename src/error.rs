use crate::client::FetchError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid trigger payload: {0}")]
    InvalidTrigger(String),

    #[error("Malformed upstream record for '{point}': {reason}")]
    MalformedUpstreamRecord { point: String, reason: String },

    #[error("Fetch failed for '{point}'")]
    Fetch {
        point: String,
        #[source]
        source: FetchError,
    },

    #[error("Partition '{key}' changed since it was read")]
    StorageConflict { key: String },

    #[error("Storage unavailable for partition '{key}'")]
    StorageUnavailable {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("Object store setup failed: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Partition '{key}' header does not match the {mode} schema (expected {expected} columns, found {found})")]
    SchemaMismatch {
        key: String,
        mode: String,
        expected: usize,
        found: usize,
    },

    #[error("Partition '{key}' is corrupt: {reason}")]
    CorruptPartition { key: String, reason: String },

    #[error("Run completed with errors: {failed} of {total} location(s) failed")]
    RunCompletedWithErrors { failed: usize, total: usize },

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// Whether the read-merge-write round trip for a partition may be retried
    pub fn is_conflict(&self) -> bool {
        matches!(self, IngestError::StorageConflict { .. })
    }
}
