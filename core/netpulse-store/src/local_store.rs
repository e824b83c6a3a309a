//! Local record buffer backed by SQLite.
//!
//! Each record kind gets its own table. The connection is shared behind a
//! mutex so every operation is serialized; the relay is the only writer.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use netpulse_types::{
    format_timestamp, parse_timestamp, FieldValue, Fields, MetricKind, MetricRecord, NewRecord,
    RecordId, RecordSchema,
};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Synced records older than this are offered for sync again.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Summary of one kind's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindStats {
    pub kind: MetricKind,
    pub total: u64,
    pub unsynced: u64,
    /// Most recent capture time among synced records.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Durable, process-local table of metric records.
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    staleness_window: chrono::Duration,
}

impl LocalStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        debug!("Opened local store at {}", path.display());
        Self::from_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> StorageResult<Self> {
        init_schema(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            staleness_window: to_chrono(DEFAULT_STALENESS_WINDOW),
        })
    }

    /// Sets the age after which synced records are re-offered for sync.
    #[must_use]
    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = to_chrono(window);
        self
    }

    /// Returns the configured staleness window.
    pub fn staleness_window(&self) -> Duration {
        self.staleness_window.to_std().unwrap_or_default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Inserts a record and returns its newly assigned id.
    ///
    /// The capture time defaults to now. Missing fields are stored as NULL;
    /// fields outside the kind's schema are rejected.
    pub fn insert(&self, kind: MetricKind, record: &NewRecord) -> StorageResult<RecordId> {
        record.validate(kind)?;

        let schema = kind.schema();
        let captured_at = record.captured_at.unwrap_or_else(Utc::now);

        let mut values = vec![
            Value::Text(format_timestamp(&captured_at)),
            opt_text(&record.site_id),
            opt_text(&record.location),
            opt_text(&record.ip_address),
        ];
        values.extend(
            schema
                .fields
                .iter()
                .map(|name| field_to_sql(record.fields.get(*name))),
        );

        let placeholders = (1..=values.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} (timestamp, site_id, location, ip_address, {}, synced) VALUES ({placeholders}, 0)",
            schema.table,
            schema.fields.join(", "),
        );

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(&sql, params_from_iter(values.iter()))?;
        let id = RecordId::new(tx.last_insert_rowid());
        tx.commit()?;

        debug!("Inserted {kind} record {id}");
        Ok(id)
    }

    /// Marks the given records as synced.
    ///
    /// Ids that do not exist, or are already synced, are ignored. Returns the
    /// number of records that changed state. An empty slice is a no-op.
    pub fn mark_synced(&self, kind: MetricKind, ids: &[RecordId]) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE {} SET synced = 1 WHERE id = ?1 AND synced = 0",
            kind.schema().table
        );

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for id in ids {
                changed += stmt.execute(params![id.get()])?;
            }
        }
        tx.commit()?;

        debug!("Marked {changed} of {} {kind} records synced", ids.len());
        Ok(changed)
    }

    /// Deletes every record of `kind`. Returns the number removed.
    ///
    /// Used by export-and-clear delivery and maintenance tooling; ids are
    /// still never reused afterwards.
    pub fn clear(&self, kind: MetricKind) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(&format!("DELETE FROM {}", kind.schema().table), [])?;
        tx.commit()?;
        debug!("Cleared {removed} {kind} records");
        Ok(removed)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Returns the records that need to be (re)sent, ordered by id.
    pub fn records_to_sync(&self, kind: MetricKind) -> StorageResult<Vec<MetricRecord>> {
        self.records_to_sync_as_of(kind, Utc::now())
    }

    /// Same as [`records_to_sync`](Self::records_to_sync) with an explicit
    /// notion of "now".
    ///
    /// A record qualifies while it is unsynced, or once its capture time is
    /// older than the staleness window regardless of its flag.
    pub fn records_to_sync_as_of(
        &self,
        kind: MetricKind,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<MetricRecord>> {
        // A window reaching past the earliest representable time means
        // nothing is ever stale.
        match now.checked_sub_signed(self.staleness_window) {
            Some(cutoff) => self.query_records(
                kind,
                "WHERE synced = 0 OR timestamp < ?1 ORDER BY id ASC",
                &[Value::Text(format_timestamp(&cutoff))],
            ),
            None => self.query_records(kind, "WHERE synced = 0 ORDER BY id ASC", &[]),
        }
    }

    /// Returns every record of `kind`, ordered by id.
    pub fn all_records(&self, kind: MetricKind) -> StorageResult<Vec<MetricRecord>> {
        self.query_records(kind, "ORDER BY id ASC", &[])
    }

    /// Returns the most recent capture time among synced records, or `None`
    /// if nothing of this kind was ever confirmed.
    pub fn last_synced_at(&self, kind: MetricKind) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn.query_row(
            &format!("SELECT MAX(timestamp) FROM {} WHERE synced = 1", kind.schema().table),
            [],
            |row| row.get(0),
        )?;
        raw.map(|s| decode_timestamp(&s)).transpose()
    }

    /// Returns counts and the last confirmed capture time for `kind`.
    pub fn stats(&self, kind: MetricKind) -> StorageResult<KindStats> {
        let (total, unsynced) = {
            let conn = self.lock()?;
            conn.query_row(
                &format!(
                    "SELECT COUNT(*), COALESCE(SUM(CASE WHEN synced = 0 THEN 1 ELSE 0 END), 0) FROM {}",
                    kind.schema().table
                ),
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )?
        };

        Ok(KindStats {
            kind,
            total: total as u64,
            unsynced: unsynced as u64,
            last_synced_at: self.last_synced_at(kind)?,
        })
    }

    fn query_records(
        &self,
        kind: MetricKind,
        clause: &str,
        args: &[Value],
    ) -> StorageResult<Vec<MetricRecord>> {
        let schema = kind.schema();
        let sql = format!(
            "SELECT id, timestamp, site_id, location, ip_address, {}, synced FROM {} {clause}",
            schema.fields.join(", "),
            schema.table,
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| read_row(schema, row))?;

        let mut result = Vec::new();
        for row in rows {
            let raw = row?;
            result.push(MetricRecord {
                id: RecordId::new(raw.id),
                kind,
                captured_at: decode_timestamp(&raw.timestamp)?,
                site_id: raw.site_id,
                location: raw.location,
                ip_address: raw.ip_address,
                fields: raw.fields,
                synced: raw.synced != 0,
            });
        }
        Ok(result)
    }
}

struct RawRow {
    id: i64,
    timestamp: String,
    site_id: Option<String>,
    location: Option<String>,
    ip_address: Option<String>,
    fields: Fields,
    synced: i64,
}

fn read_row(schema: &RecordSchema, row: &Row<'_>) -> rusqlite::Result<RawRow> {
    let mut fields = Fields::new();
    for (offset, name) in schema.fields.iter().enumerate() {
        let value = match row.get_ref(5 + offset)? {
            ValueRef::Null | ValueRef::Blob(_) => None,
            ValueRef::Integer(i) => Some(FieldValue::Number(i as f64)),
            ValueRef::Real(f) => Some(FieldValue::Number(f)),
            ValueRef::Text(bytes) => Some(FieldValue::Text(
                String::from_utf8_lossy(bytes).into_owned(),
            )),
        };
        if let Some(value) = value {
            fields.insert((*name).to_string(), value);
        }
    }

    Ok(RawRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        site_id: row.get(2)?,
        location: row.get(3)?,
        ip_address: row.get(4)?,
        fields,
        synced: row.get(5 + schema.fields.len())?,
    })
}

fn init_schema(conn: &mut Connection) -> StorageResult<()> {
    let tx = conn.transaction()?;
    for kind in MetricKind::ALL {
        let schema = kind.schema();
        // Measurement columns carry no declared type, so there is no
        // affinity and numeric-looking text reads back as text.
        let columns = schema.fields.join(",\n                ");
        tx.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                site_id TEXT,
                location TEXT,
                ip_address TEXT,
                {columns},
                synced INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_synced ON {table} (synced, timestamp);
            ",
            table = schema.table,
        ))?;
    }
    tx.commit()?;
    Ok(())
}

fn decode_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    parse_timestamp(raw)
        .map_err(|e| StorageError::InvalidData(format!("bad timestamp {raw:?}: {e}")))
}

fn opt_text(value: &Option<String>) -> Value {
    value.clone().map(Value::Text).unwrap_or(Value::Null)
}

fn field_to_sql(value: Option<&FieldValue>) -> Value {
    match value {
        Some(FieldValue::Number(n)) => Value::Real(*n),
        Some(FieldValue::Text(s)) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

fn to_chrono(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}
