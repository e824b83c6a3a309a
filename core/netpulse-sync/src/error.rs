//! Error types for the sync layer.

use netpulse_store::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while relaying records.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote sink could not be reached. Transient.
    #[error("connection error: {0}")]
    Connection(String),

    /// The remote table or column layout does not match the record.
    #[error("schema error: {0}")]
    Schema(String),

    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The metrics source failed to produce a sample.
    #[error("collector error: {0}")]
    Collector(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid sink or relay configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking store task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),

    /// Shutdown was requested while waiting.
    #[error("operation cancelled by shutdown")]
    Cancelled,
}

impl SyncError {
    /// Whether a later attempt may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Connection(_))
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Connection(err.to_string())
    }
}
