//! Remote sink abstraction.
//!
//! A sink hands out connections; a connection accepts batches of rows in the
//! remote schema (see [`MetricRecord::remote_row`](netpulse_types::MetricRecord::remote_row)).

use crate::error::SyncResult;
use async_trait::async_trait;
use netpulse_types::MetricKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One row in the remote schema.
pub type RemoteRow = Map<String, Value>;

/// How the relay tracks delivery for a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Rows are marked synced one by one after the remote confirms them.
    RowTracked,
    /// The whole local table is sent and cleared on full success.
    ExportAndClear,
}

/// Outcome of a batch insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    AllSucceeded,
    /// Positions (within the submitted batch) of the rejected rows.
    PartialFailure(Vec<usize>),
}

impl InsertResult {
    /// Builds a result from the rejected positions, collapsing an empty set
    /// into `AllSucceeded`.
    pub fn from_failures(mut failed: Vec<usize>) -> Self {
        failed.sort_unstable();
        failed.dedup();
        if failed.is_empty() {
            InsertResult::AllSucceeded
        } else {
            InsertResult::PartialFailure(failed)
        }
    }

    /// Positions in `0..len` the remote accepted.
    pub fn succeeded(&self, len: usize) -> Vec<usize> {
        match self {
            InsertResult::AllSucceeded => (0..len).collect(),
            InsertResult::PartialFailure(failed) => {
                (0..len).filter(|i| !failed.contains(i)).collect()
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InsertResult::AllSucceeded)
    }
}

/// A remote store that can be connected to.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Returns the name of the sink backend.
    fn provider_name(&self) -> &'static str;

    /// Returns how delivery is tracked for this sink.
    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::RowTracked
    }

    /// Establishes a session. Performs a single attempt; callers retry.
    async fn connect(&self) -> SyncResult<Arc<dyn SinkConnection>>;
}

/// An established session with a remote sink.
#[async_trait]
pub trait SinkConnection: Send + Sync {
    /// Inserts all rows in one logical call.
    ///
    /// Never touches the local store.
    async fn insert_batch(&self, kind: MetricKind, rows: &[RemoteRow]) -> SyncResult<InsertResult>;
}
