//! SQL database file used as the remote store.

use super::remote::{InsertResult, RemoteRow, RemoteSink, SinkConnection};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use netpulse_types::{MetricKind, RecordSchema};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Configuration for [`SqliteSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteSinkConfig {
    pub path: PathBuf,
}

/// Sink that writes rows into tables of a separate SQLite database.
pub struct SqliteSink {
    config: SqliteSinkConfig,
}

impl SqliteSink {
    pub fn new(config: SqliteSinkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteSink for SqliteSink {
    fn provider_name(&self) -> &'static str {
        "SQLite"
    }

    async fn connect(&self) -> SyncResult<Arc<dyn SinkConnection>> {
        let path = self.config.path.clone();
        let conn = tokio::task::spawn_blocking(move || -> SyncResult<Connection> {
            let mut conn = Connection::open(&path)
                .map_err(|e| SyncError::Connection(format!("open {}: {e}", path.display())))?;
            create_remote_tables(&mut conn)?;
            debug!("Connected to SQLite sink at {}", path.display());
            Ok(conn)
        })
        .await??;

        Ok(Arc::new(SqliteConnection {
            conn: Arc::new(Mutex::new(conn)),
        }))
    }
}

struct SqliteConnection {
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl SinkConnection for SqliteConnection {
    async fn insert_batch(&self, kind: MetricKind, rows: &[RemoteRow]) -> SyncResult<InsertResult> {
        if rows.is_empty() {
            return Ok(InsertResult::AllSucceeded);
        }

        let conn = Arc::clone(&self.conn);
        let rows = rows.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| SyncError::Connection("sink connection lock poisoned".to_string()))?;
            insert_rows(&mut conn, kind.schema(), &rows)
        })
        .await?
    }
}

fn insert_rows(conn: &mut Connection, schema: &RecordSchema, rows: &[RemoteRow]) -> SyncResult<InsertResult> {
    let tx = conn.transaction().map_err(classify)?;
    let mut failed = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let columns: Vec<String> = row.keys().map(|k| quote_ident(k)).collect();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote_ident(schema.table),
            columns.join(", "),
        );

        match tx.execute(&sql, params_from_iter(row.values().map(to_sql))) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                warn!("Row {index} rejected by {}: {}", schema.table, msg.unwrap_or_default());
                failed.push(index);
            }
            // Dropping the transaction rolls back the whole batch.
            Err(e) => return Err(classify(e)),
        }
    }

    tx.commit().map_err(classify)?;
    Ok(InsertResult::from_failures(failed))
}

fn create_remote_tables(conn: &mut Connection) -> SyncResult<()> {
    let tx = conn.transaction().map_err(classify)?;
    for kind in MetricKind::ALL {
        let schema = kind.schema();
        let measurements = schema
            .fields
            .iter()
            .map(|name| format!("{} REAL", quote_ident(name)))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                timestamp TEXT NOT NULL,
                site_id TEXT,
                location TEXT,
                ip_address TEXT,
                {measurements}
            );",
            quote_ident(schema.table),
        ))
        .map_err(classify)?;
    }
    tx.commit().map_err(classify)?;
    Ok(())
}

/// Sorts driver errors into layout mismatches and everything else.
fn classify(err: rusqlite::Error) -> SyncError {
    let message = err.to_string();
    if message.contains("no such table")
        || message.contains("no such column")
        || message.contains("has no column named")
    {
        SyncError::Schema(message)
    } else {
        SyncError::Connection(message)
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
