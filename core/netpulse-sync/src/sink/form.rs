//! Web-form submission sink.
//!
//! Every row becomes one urlencoded form POST. The form service keeps no row
//! identity, so the relay exports the whole local table and clears it once
//! every row was accepted.

use super::remote::{DeliveryMode, InsertResult, RemoteRow, RemoteSink, SinkConnection};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use netpulse_types::MetricKind;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Where one kind's rows are submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormTarget {
    /// The form's `formResponse` endpoint.
    pub url: String,
    /// Row field name to form entry id (e.g. `"google_up" -> "entry.1234"`).
    pub entries: BTreeMap<String, String>,
}

/// Configuration for [`FormSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSinkConfig {
    pub ping: FormTarget,
    pub speed: FormTarget,
    pub timeout_secs: u64,
}

impl Default for FormSinkConfig {
    fn default() -> Self {
        Self {
            ping: FormTarget::default(),
            speed: FormTarget::default(),
            timeout_secs: 30,
        }
    }
}

impl FormSinkConfig {
    pub fn target(&self, kind: MetricKind) -> &FormTarget {
        match kind {
            MetricKind::Ping => &self.ping,
            MetricKind::Speed => &self.speed,
        }
    }
}

/// Sink that submits each row to a web form.
pub struct FormSink {
    config: Arc<FormSinkConfig>,
    client: Client,
}

impl FormSink {
    pub fn new(config: FormSinkConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

#[async_trait]
impl RemoteSink for FormSink {
    fn provider_name(&self) -> &'static str {
        "Web form"
    }

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::ExportAndClear
    }

    // Forms are stateless endpoints; there is no session to open.
    async fn connect(&self) -> SyncResult<Arc<dyn SinkConnection>> {
        Ok(Arc::new(FormConnection {
            config: Arc::clone(&self.config),
            client: self.client.clone(),
        }))
    }
}

struct FormConnection {
    config: Arc<FormSinkConfig>,
    client: Client,
}

#[async_trait]
impl SinkConnection for FormConnection {
    async fn insert_batch(&self, kind: MetricKind, rows: &[RemoteRow]) -> SyncResult<InsertResult> {
        let target = self.config.target(kind);
        if target.url.is_empty() {
            return Err(SyncError::Schema(format!("no form configured for {kind} records")));
        }

        let mut failed = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let form = form_fields(kind, target, row);
            let response = self.client.post(&target.url).form(&form).send().await?;
            let status = response.status();

            if status.is_success() {
                continue;
            }
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(SyncError::Connection(format!(
                    "form submission for {kind} row {index} failed with {status}"
                )));
            }
            warn!("Form rejected {kind} row {index} with {status}");
            failed.push(index);
        }

        Ok(InsertResult::from_failures(failed))
    }
}

fn form_fields(kind: MetricKind, target: &FormTarget, row: &RemoteRow) -> Vec<(String, String)> {
    let mut form = Vec::with_capacity(row.len());
    for (name, value) in row {
        let Some(entry) = target.entries.get(name) else {
            debug!("Field '{name}' has no {kind} form entry, skipping");
            continue;
        };
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        form.push((entry.clone(), text));
    }
    form
}
