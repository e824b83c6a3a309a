//! Relay configuration.

use crate::error::{SyncError, SyncResult};
use crate::policy::SyncPolicy;
use crate::retry::RetryPolicy;
use crate::sink::SinkConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for every configured duration (100 years).
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Configuration for the relay and its scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Local buffer database file.
    pub database_path: PathBuf,
    /// Age after which synced records are sent again.
    pub staleness_window_secs: u64,
    /// Maximum age of the newest confirmed record before a flush is due.
    pub sync_interval_secs: u64,
    pub collect_interval_secs: u64,
    pub evaluate_interval_secs: u64,
    pub retry: RetryPolicy,
    pub sink: SinkConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("netpulse.db"),
            staleness_window_secs: 7 * 24 * 60 * 60,
            sync_interval_secs: 7 * 24 * 60 * 60,
            collect_interval_secs: 300,
            evaluate_interval_secs: 300,
            retry: RetryPolicy::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Reads a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero-length timer intervals and any duration above
    /// [`MAX_DURATION_SECS`].
    pub fn validate(&self) -> SyncResult<()> {
        if self.collect_interval_secs == 0 || self.evaluate_interval_secs == 0 {
            return Err(SyncError::Config(
                "collect and evaluate intervals must be positive".to_string(),
            ));
        }
        for (name, secs) in [
            ("staleness_window_secs", self.staleness_window_secs),
            ("sync_interval_secs", self.sync_interval_secs),
            ("collect_interval_secs", self.collect_interval_secs),
            ("evaluate_interval_secs", self.evaluate_interval_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(SyncError::Config(format!(
                    "{name} is {secs}, at most {MAX_DURATION_SECS} allowed"
                )));
            }
        }
        Ok(())
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_secs)
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy::new(Duration::from_secs(self.sync_interval_secs))
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }

    pub fn evaluate_interval(&self) -> Duration {
        Duration::from_secs(self.evaluate_interval_secs)
    }
}
