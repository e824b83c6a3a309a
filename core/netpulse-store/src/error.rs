//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The record was rejected before reaching the database.
    #[error("validation error: {0}")]
    Validation(String),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be decoded into a record.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Another thread panicked while holding the connection.
    #[error("store connection lock poisoned")]
    LockPoisoned,
}

impl From<netpulse_types::Error> for StorageError {
    fn from(err: netpulse_types::Error) -> Self {
        StorageError::Validation(err.to_string())
    }
}
