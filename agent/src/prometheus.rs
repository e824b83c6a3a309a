//! Collects samples by running PromQL instant queries.

use async_trait::async_trait;
use netpulse_sync::{Collector, SyncError, SyncResult};
use netpulse_types::{MetricKind, Sample};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Number, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// One PromQL query feeding one record field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricQuery {
    pub field: &'static str,
    pub promql: &'static str,
    /// Multiplier applied to the raw value.
    pub scale: f64,
}

const fn query(field: &'static str, promql: &'static str) -> MetricQuery {
    MetricQuery {
        field,
        promql,
        scale: 1.0,
    }
}

const BITS_TO_MEGABITS: f64 = 1.0 / 1_000_000.0;

pub static PING_QUERIES: &[MetricQuery] = &[
    query("google_up", r#"up{job="ping", instance="http://www.google.com/"}"#),
    query("apple_up", r#"up{job="ping", instance="https://www.apple.com/"}"#),
    query("github_up", r#"up{job="ping", instance="https://github.com/"}"#),
    query("pihole_up", r#"up{job="pihole", instance="pihole-exporter:9617"}"#),
    query("node_up", r#"up{job="node", instance="nodeexp:9100"}"#),
    query("speedtest_up", r#"up{job="speedtest", instance="speedtest:9798"}"#),
    query("http_latency", r#"probe_http_duration_seconds{job="ping", phase="connect"}"#),
    query("http_samples", r#"scrape_samples_scraped{job="ping"}"#),
    query("http_time", r#"scrape_duration_seconds{job="ping"}"#),
    query("http_content_length", r#"probe_http_uncompressed_body_length{job="ping"}"#),
    query("http_duration", r#"probe_duration_seconds{job="ping"}"#),
];

pub static SPEED_QUERIES: &[MetricQuery] = &[
    MetricQuery {
        field: "download_mbps",
        promql: "speedtest_download_bits_per_second",
        scale: BITS_TO_MEGABITS,
    },
    MetricQuery {
        field: "upload_mbps",
        promql: "speedtest_upload_bits_per_second",
        scale: BITS_TO_MEGABITS,
    },
    query("ping_ms", "speedtest_ping_latency_milliseconds"),
    query("jitter_ms", "speedtest_jitter_latency_milliseconds"),
];

/// Tags attached to every sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteTags {
    pub site_id: String,
    pub location: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// `[unix_seconds, "value"]`
    value: (Value, String),
}

pub struct PrometheusCollector {
    client: Client,
    base_url: String,
    tags: SiteTags,
}

impl PrometheusCollector {
    pub fn new(base_url: impl Into<String>, tags: SiteTags) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tags,
        })
    }

    pub fn queries(kind: MetricKind) -> &'static [MetricQuery] {
        match kind {
            MetricKind::Ping => PING_QUERIES,
            MetricKind::Speed => SPEED_QUERIES,
        }
    }

    /// Runs one instant query and returns the first series' value, if any.
    async fn query(&self, promql: &str) -> SyncResult<Option<f64>> {
        let response = self
            .client
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", promql)])
            .send()
            .await
            .map_err(|e| SyncError::Collector(format!("prometheus query failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SyncError::Collector(format!(
                "prometheus returned {} for {promql}",
                response.status()
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Collector(format!("invalid prometheus response: {e}")))?;

        if body.status != "success" {
            return Err(SyncError::Collector(format!(
                "prometheus query {promql} failed: {}",
                body.error.unwrap_or(body.status)
            )));
        }

        let Some(first) = body.data.and_then(|d| d.result.into_iter().next()) else {
            return Ok(None);
        };

        match first.value.1.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => {
                warn!("Ignoring non-numeric value {:?} for {promql}", first.value.1);
                Ok(None)
            }
        }
    }

    fn attach_tags(&self, sample: &mut Sample) {
        sample.insert("site_id".into(), Value::String(self.tags.site_id.clone()));
        if let Some(location) = &self.tags.location {
            sample.insert("location".into(), Value::String(location.clone()));
        }
        if let Some(ip) = &self.tags.ip_address {
            sample.insert("ip_address".into(), Value::String(ip.clone()));
        }
    }
}

#[async_trait]
impl Collector for PrometheusCollector {
    async fn collect(&self, kind: MetricKind) -> SyncResult<Option<Sample>> {
        let mut sample = Sample::new();

        for q in Self::queries(kind) {
            let Some(raw) = self.query(q.promql).await? else {
                debug!("No series for {} ({})", q.field, q.promql);
                continue;
            };
            if let Some(value) = Number::from_f64(raw * q.scale) {
                sample.insert(q.field.to_string(), Value::Number(value));
            }
        }

        if sample.is_empty() {
            return Ok(None);
        }

        self.attach_tags(&mut sample);
        Ok(Some(sample))
    }
}
