//! Decides when a kind is due for a flush.
//!
//! The decision is driven by the newest *confirmed* capture time, not by the
//! last attempt, so skipped or failed flushes are caught up on the next
//! evaluation.

use chrono::{DateTime, Utc};
use netpulse_store::{LocalStore, StorageResult};
use netpulse_types::MetricKind;
use std::time::Duration;

/// Default interval between confirmed syncs.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub interval: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl SyncPolicy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Whether `kind` should be flushed now.
    pub fn should_sync(&self, store: &LocalStore, kind: MetricKind) -> StorageResult<bool> {
        self.should_sync_at(store, kind, Utc::now())
    }

    pub fn should_sync_at(
        &self,
        store: &LocalStore,
        kind: MetricKind,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        Ok(self.is_due(store.last_synced_at(kind)?, now))
    }

    /// `true` when nothing was ever confirmed, or the newest confirmed
    /// capture is older than the interval. An interval too large to subtract
    /// from `now` is never due.
    pub fn is_due(&self, last_synced_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last) = last_synced_at else {
            return true;
        };
        chrono::Duration::from_std(self.interval)
            .ok()
            .and_then(|interval| now.checked_sub_signed(interval))
            .is_some_and(|cutoff| last < cutoff)
    }
}
