//! Core type definitions for netpulse.
//!
//! This crate defines the record model shared by the local store, the
//! remote sinks and the relay:
//! - Record kinds and their fixed field schemas
//! - Locally assigned record identifiers
//! - Capture timestamps (parsing and canonical text form)
//! - Metric records, both as inserted and as read back
//!
//! Nothing here performs I/O.

mod ids;
mod kind;
mod record;
mod timestamp;

pub use ids::RecordId;
pub use kind::{MetricKind, RecordSchema, PING_SCHEMA, SPEED_SCHEMA};
pub use record::{FieldValue, Fields, MetricRecord, NewRecord, Sample};
pub use timestamp::{check_range, format_timestamp, parse_timestamp, parse_timestamp_value};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
