//! Bounded retry for sink connection setup.

use crate::error::{SyncError, SyncResult};
use crate::sink::{RemoteSink, SinkConnection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    /// Doubles after every failure, capped at `max_delay`.
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "initial_delay_secs", with = "secs")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_secs", with = "secs")]
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(500),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.initial_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.initial_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }
}

/// Connects to `sink`, retrying transient failures.
///
/// Only [`SyncError::Connection`] is retried. Gives up after
/// `policy.max_attempts` and returns the last error. Returns
/// [`SyncError::Cancelled`] as soon as `shutdown` flips to `true`.
pub async fn connect_with_retry(
    sink: &dyn RemoteSink,
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> SyncResult<Arc<dyn SinkConnection>> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if *shutdown.borrow() {
            return Err(SyncError::Cancelled);
        }

        info!(
            "Connecting to {} (attempt {attempt}/{max_attempts})",
            sink.provider_name()
        );

        match sink.connect().await {
            Ok(conn) => return Ok(conn),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!("Connection attempt {attempt} failed: {e}; retrying in {delay:?}");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wait_for_shutdown(shutdown) => return Err(SyncError::Cancelled),
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Resolves once the shutdown flag is set. Never resolves if the sender is
/// gone without having signalled.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
