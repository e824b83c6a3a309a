//! Metrics source consumed by the relay.

use crate::error::SyncResult;
use async_trait::async_trait;
use netpulse_types::{MetricKind, Sample};

/// Produces at most one sample per kind per call.
///
/// Returning `Ok(None)` means the source had nothing to report this tick.
/// Samples use the field names of the kind's schema, plus optional
/// `timestamp`, `site_id`, `location` and `ip_address` keys.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, kind: MetricKind) -> SyncResult<Option<Sample>>;
}
