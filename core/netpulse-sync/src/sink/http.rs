//! Row-insert warehouse sink over HTTP.
//!
//! Speaks the BigQuery v2 REST surface: datasets and tables are created on
//! connect if missing, rows are streamed with `insertAll`.

use super::remote::{InsertResult, RemoteRow, RemoteSink, SinkConnection};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use netpulse_types::{MetricKind, RecordSchema};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for [`HttpRowSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSinkConfig {
    /// API root, e.g. `https://bigquery.googleapis.com/bigquery/v2`.
    pub base_url: String,
    pub project_id: String,
    pub dataset_id: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for HttpSinkConfig {
    fn default() -> Self {
        Self {
            base_url: "https://bigquery.googleapis.com/bigquery/v2".to_string(),
            project_id: String::new(),
            dataset_id: "netpulse".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct InsertAllResponse {
    #[serde(rename = "insertErrors", default)]
    insert_errors: Vec<InsertError>,
}

#[derive(Debug, Deserialize)]
struct InsertError {
    index: usize,
    #[serde(default)]
    errors: Vec<Value>,
}

/// Sink that streams rows into warehouse tables.
pub struct HttpRowSink {
    config: HttpSinkConfig,
    client: Client,
}

impl HttpRowSink {
    pub fn new(config: HttpSinkConfig) -> SyncResult<Self> {
        if config.project_id.is_empty() {
            return Err(SyncError::Config("http sink requires a project_id".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn datasets_url(&self) -> String {
        format!(
            "{}/projects/{}/datasets",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id
        )
    }

    fn tables_url(&self) -> String {
        format!("{}/{}/tables", self.datasets_url(), self.config.dataset_id)
    }

    async fn ensure_dataset(&self) -> SyncResult<()> {
        let url = format!("{}/{}", self.datasets_url(), self.config.dataset_id);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            debug!("Dataset {} already exists", self.config.dataset_id);
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(status_error(response, "dataset lookup").await);
        }

        let body = json!({
            "datasetReference": {
                "projectId": self.config.project_id,
                "datasetId": self.config.dataset_id,
            }
        });
        let response = self.client.post(self.datasets_url()).json(&body).send().await?;

        // 409: created concurrently by someone else
        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            info!("Created dataset {}", self.config.dataset_id);
            Ok(())
        } else {
            Err(status_error(response, "dataset creation").await)
        }
    }

    async fn ensure_table(&self, schema: &RecordSchema) -> SyncResult<()> {
        let url = format!("{}/{}", self.tables_url(), schema.table);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            debug!("Table {} already exists", schema.table);
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(status_error(response, "table lookup").await);
        }

        let body = json!({
            "tableReference": {
                "projectId": self.config.project_id,
                "datasetId": self.config.dataset_id,
                "tableId": schema.table,
            },
            "schema": { "fields": table_fields(schema) },
        });
        let response = self.client.post(self.tables_url()).json(&body).send().await?;

        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            info!("Created table {}", schema.table);
            Ok(())
        } else {
            Err(status_error(response, "table creation").await)
        }
    }
}

#[async_trait]
impl RemoteSink for HttpRowSink {
    fn provider_name(&self) -> &'static str {
        "HTTP warehouse"
    }

    async fn connect(&self) -> SyncResult<Arc<dyn SinkConnection>> {
        self.ensure_dataset().await?;
        for kind in MetricKind::ALL {
            self.ensure_table(kind.schema()).await?;
        }

        Ok(Arc::new(HttpConnection {
            client: self.client.clone(),
            tables_url: self.tables_url(),
        }))
    }
}

struct HttpConnection {
    client: Client,
    tables_url: String,
}

#[async_trait]
impl SinkConnection for HttpConnection {
    async fn insert_batch(&self, kind: MetricKind, rows: &[RemoteRow]) -> SyncResult<InsertResult> {
        if rows.is_empty() {
            return Ok(InsertResult::AllSucceeded);
        }

        let body = json!({
            "skipInvalidRows": true,
            "rows": rows.iter().map(|row| json!({ "json": row })).collect::<Vec<_>>(),
        });
        let url = format!("{}/{}/insertAll", self.tables_url, kind.schema().table);
        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(status_error(response, "insertAll").await);
        }

        let parsed: InsertAllResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Connection(format!("failed to parse insertAll response: {e}")))?;

        for err in &parsed.insert_errors {
            debug!("Row {} of {kind} batch rejected: {:?}", err.index, err.errors);
        }

        let failed = parsed
            .insert_errors
            .into_iter()
            .map(|e| e.index)
            .filter(|&i| i < rows.len())
            .collect();
        Ok(InsertResult::from_failures(failed))
    }
}

fn table_fields(schema: &RecordSchema) -> Vec<Value> {
    let mut fields = vec![json!({"name": "timestamp", "type": "TIMESTAMP", "mode": "NULLABLE"})];
    for tag in ["site_id", "location", "ip_address"] {
        fields.push(json!({"name": tag, "type": "STRING", "mode": "NULLABLE"}));
    }
    for name in schema.fields {
        fields.push(json!({"name": name, "type": "FLOAT", "mode": "NULLABLE"}));
    }
    fields
}

/// Maps a non-success response to a sync error.
///
/// Server-side and rate-limit failures are transient; any other client error
/// means the request does not fit the remote contract.
async fn status_error(response: Response, context: &str) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("{context} failed with {status}: {body}");

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        SyncError::Connection(message)
    } else {
        SyncError::Schema(message)
    }
}
