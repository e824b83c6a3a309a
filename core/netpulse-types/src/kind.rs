//! Record kinds and their fixed field schemas.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two metric categories the agent records.
///
/// Both kinds share one lifecycle and one sync protocol; they differ only in
/// the measurement fields they carry (see [`RecordSchema`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Availability and HTTP latency probes.
    Ping,
    /// Speedtest throughput measurements.
    Speed,
}

impl MetricKind {
    /// Every kind, in a stable order.
    pub const ALL: [MetricKind; 2] = [MetricKind::Ping, MetricKind::Speed];

    /// Returns the schema describing this kind's table and fields.
    #[must_use]
    pub const fn schema(self) -> &'static RecordSchema {
        match self {
            MetricKind::Ping => &PING_SCHEMA,
            MetricKind::Speed => &SPEED_SCHEMA,
        }
    }

    /// Returns the lowercase name used in logs, config and URLs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricKind::Ping => "ping",
            MetricKind::Speed => "speed",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ping" => Ok(MetricKind::Ping),
            "speed" => Ok(MetricKind::Speed),
            other => Err(Error::Validation(format!("unknown record kind: {other}"))),
        }
    }
}

/// Table name and measurement field list for one record kind.
///
/// The identity columns (`id`, `timestamp`, `site_id`, `location`,
/// `ip_address`) and the local `synced` flag are common to every kind and
/// are not listed in `fields`.
#[derive(Debug, PartialEq, Eq)]
pub struct RecordSchema {
    pub kind: MetricKind,
    pub table: &'static str,
    pub fields: &'static [&'static str],
}

impl RecordSchema {
    /// Returns true if `name` is one of this kind's measurement fields.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(&name)
    }
}

pub static PING_SCHEMA: RecordSchema = RecordSchema {
    kind: MetricKind::Ping,
    table: "ping_metrics",
    fields: &[
        "google_up",
        "apple_up",
        "github_up",
        "pihole_up",
        "node_up",
        "speedtest_up",
        "http_latency",
        "http_samples",
        "http_time",
        "http_content_length",
        "http_duration",
    ],
};

pub static SPEED_SCHEMA: RecordSchema = RecordSchema {
    kind: MetricKind::Speed,
    table: "speed_metrics",
    fields: &["download_mbps", "upload_mbps", "ping_ms", "jitter_ms"],
};
