use netpulse_store::LocalStore;
use netpulse_sync::{
    build_sink, InsertResult, Relay, RemoteRow, RemoteSink, SinkConfig, SinkConnection,
    SqliteSink, SqliteSinkConfig, SyncError,
};
use netpulse_types::{MetricKind, NewRecord};
use pretty_assertions::assert_eq;
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn row(value: serde_json::Value) -> RemoteRow {
    value.as_object().cloned().unwrap()
}

async fn connect(path: &Path) -> Arc<dyn SinkConnection> {
    let sink = SqliteSink::new(SqliteSinkConfig {
        path: path.to_path_buf(),
    });
    match sink.connect().await {
        Ok(conn) => conn,
        Err(e) => panic!("connect failed: {e}"),
    }
}

fn remote_count(path: &Path, table: &str) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

// ── connect ──────────────────────────────────────────────────────

#[tokio::test]
async fn connect_creates_remote_tables() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("remote.db");
    connect(&path).await;

    let conn = Connection::open(&path).unwrap();
    let columns: Vec<String> = conn
        .prepare("SELECT name FROM pragma_table_info('speed_metrics')")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        columns,
        vec![
            "timestamp", "site_id", "location", "ip_address", "download_mbps", "upload_mbps",
            "ping_ms", "jitter_ms",
        ]
    );
}

#[tokio::test]
async fn connect_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("remote.db");
    connect(&path).await;
    connect(&path).await;
}

#[tokio::test]
async fn connect_to_unopenable_path_is_transient() {
    let dir = TempDir::new().unwrap();
    let sink = SqliteSink::new(SqliteSinkConfig {
        path: dir.path().join("missing/dir/remote.db"),
    });
    let err = sink.connect().await.err().unwrap();
    assert!(matches!(err, SyncError::Connection(_)));
}

// ── insert_batch ─────────────────────────────────────────────────

#[tokio::test]
async fn inserts_all_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("remote.db");
    let conn = connect(&path).await;

    let rows = vec![
        row(json!({"timestamp": "2026-01-01T00:00:00.000000Z", "site_id": "s1", "google_up": 1.0})),
        row(json!({"timestamp": "2026-01-01T00:05:00.000000Z", "site_id": "s1", "google_up": 0.0})),
    ];
    let result = conn.insert_batch(MetricKind::Ping, &rows).await.unwrap();
    assert_eq!(result, InsertResult::AllSucceeded);
    assert_eq!(remote_count(&path, "ping_metrics"), 2);
}

#[tokio::test]
async fn constraint_violation_fails_only_that_row() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("remote.db");
    let conn = connect(&path).await;

    let rows = vec![
        row(json!({"timestamp": "2026-01-01T00:00:00.000000Z", "ping_ms": 3.0})),
        row(json!({"timestamp": null, "ping_ms": 4.0})),
        row(json!({"timestamp": "2026-01-01T00:10:00.000000Z", "ping_ms": 5.0})),
    ];
    let result = conn.insert_batch(MetricKind::Speed, &rows).await.unwrap();
    assert_eq!(result, InsertResult::PartialFailure(vec![1]));
    assert_eq!(remote_count(&path, "speed_metrics"), 2);
}

#[tokio::test]
async fn unknown_column_is_schema_error_and_rolls_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("remote.db");
    let conn = connect(&path).await;

    let rows = vec![
        row(json!({"timestamp": "2026-01-01T00:00:00.000000Z", "google_up": 1.0})),
        row(json!({"timestamp": "2026-01-01T00:05:00.000000Z", "bogus": 1.0})),
    ];
    let err = conn.insert_batch(MetricKind::Ping, &rows).await.unwrap_err();
    assert!(matches!(err, SyncError::Schema(_)));
    assert_eq!(remote_count(&path, "ping_metrics"), 0);
}

#[tokio::test]
async fn dropped_table_is_schema_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("remote.db");
    let conn = connect(&path).await;
    Connection::open(&path)
        .unwrap()
        .execute_batch("DROP TABLE ping_metrics")
        .unwrap();

    let rows = vec![row(json!({"timestamp": "2026-01-01T00:00:00.000000Z"}))];
    let err = conn.insert_batch(MetricKind::Ping, &rows).await.unwrap_err();
    assert!(matches!(err, SyncError::Schema(_)));
}

// ── End to end ───────────────────────────────────────────────────

#[tokio::test]
async fn relay_forwards_local_records() {
    let dir = TempDir::new().unwrap();
    let remote_path = dir.path().join("remote.db");
    let store = Arc::new(LocalStore::open(dir.path().join("local.db")).unwrap());
    store
        .insert(
            MetricKind::Ping,
            &NewRecord::new()
                .site_id("s1")
                .location("lab")
                .ip_address("10.0.0.2")
                .field("google_up", 1.0)
                .field("http_latency", 0.041),
        )
        .unwrap();

    let sink = build_sink(&SinkConfig::Sqlite(SqliteSinkConfig {
        path: remote_path.clone(),
    }))
    .unwrap();
    let relay = Relay::new(Arc::clone(&store), sink);

    let report = relay.flush(MetricKind::Ping).await.unwrap();
    assert_eq!(report.synced, 1);
    assert!(store.records_to_sync(MetricKind::Ping).unwrap().is_empty());

    let remote = Connection::open(&remote_path).unwrap();
    let (site, latency, apple): (String, f64, Option<f64>) = remote
        .query_row(
            "SELECT site_id, http_latency, apple_up FROM ping_metrics",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(site, "s1");
    assert_eq!(latency, 0.041);
    assert_eq!(apple, None);
}
