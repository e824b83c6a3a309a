//! SQLite storage layer for netpulse.
//!
//! Buffers metric records on disk until the relay has confirmed their
//! delivery to the remote sink.
//!
//! # Architecture
//!
//! - One table per record kind, created on open
//! - Each record carries a `synced` flag, set once the remote confirms it
//! - Records stay visible to sync queries while unsynced, or once they are
//!   older than the staleness window (re-send safety net)
//! - Every mutating call commits its own transaction before returning

mod error;
mod local_store;

pub use error::{StorageError, StorageResult};
pub use local_store::{KindStats, LocalStore, DEFAULT_STALENESS_WINDOW};
