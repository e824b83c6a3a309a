//! Local HTTP API for inspecting the buffer.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use netpulse_store::{LocalStore, StorageError, StorageResult};
use netpulse_types::{MetricKind, MetricRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct KindStatus {
    pub kind: MetricKind,
    pub total: u64,
    pub unsynced: u64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusResponse {
    pub site_id: String,
    pub sink: String,
    pub kinds: Vec<KindStatus>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PendingResponse {
    pub kind: MetricKind,
    pub count: usize,
    pub records: Vec<MetricRecord>,
}

/// State shared by the API handlers.
pub struct ApiState {
    pub store: Arc<LocalStore>,
    pub site_id: String,
    pub sink: String,
}

enum ApiError {
    NotFound(String),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                error!("Status API error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn blocking<T, F>(store: &Arc<LocalStore>, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&LocalStore) -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn status_handler(State(state): State<Arc<ApiState>>) -> Result<Json<StatusResponse>, ApiError> {
    let stats = blocking(&state.store, |store| {
        MetricKind::ALL
            .into_iter()
            .map(|kind| store.stats(kind))
            .collect::<StorageResult<Vec<_>>>()
    })
    .await?;

    Ok(Json(StatusResponse {
        site_id: state.site_id.clone(),
        sink: state.sink.clone(),
        kinds: stats
            .into_iter()
            .map(|s| KindStatus {
                kind: s.kind,
                total: s.total,
                unsynced: s.unsynced,
                last_synced_at: s.last_synced_at,
            })
            .collect(),
    }))
}

async fn pending_handler(
    State(state): State<Arc<ApiState>>,
    Path(kind): Path<String>,
) -> Result<Json<PendingResponse>, ApiError> {
    let kind: MetricKind = kind
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown record kind '{kind}'")))?;

    let records = blocking(&state.store, move |store| store.records_to_sync(kind)).await?;

    Ok(Json(PendingResponse {
        kind,
        count: records.len(),
        records,
    }))
}

/// Build the HTTP API router with the given state.
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/v1/status", get(status_handler))
        .route("/api/v1/records/{kind}/pending", get(pending_handler))
        .with_state(state)
}
