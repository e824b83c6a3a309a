//! Store-and-forward relay.
//!
//! Ties the local buffer, the sync policy and a remote sink together. The
//! same code path serves every record kind.
//!
//! Delivery is at-least-once: rows are only marked synced after the sink
//! acknowledged them, so any failure between send and mark causes a resend.

use crate::collector::Collector;
use crate::error::SyncResult;
use crate::policy::SyncPolicy;
use crate::retry::{connect_with_retry, RetryPolicy};
use crate::sink::{DeliveryMode, InsertResult, RemoteRow, RemoteSink, SinkConnection};
use netpulse_store::{LocalStore, StorageError, StorageResult};
use netpulse_types::{MetricKind, MetricRecord, NewRecord, RecordId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Outcome of one flush of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub kind: MetricKind,
    /// Rows sent to the sink.
    pub attempted: usize,
    /// Rows the sink acknowledged and that were marked synced.
    pub synced: usize,
    /// Rows the sink rejected; they stay eligible.
    pub failed: usize,
    /// Rows removed locally (export-and-clear delivery only).
    pub cleared: usize,
}

impl FlushReport {
    fn empty(kind: MetricKind) -> Self {
        Self {
            kind,
            attempted: 0,
            synced: 0,
            failed: 0,
            cleared: 0,
        }
    }
}

pub struct Relay {
    store: Arc<LocalStore>,
    sink: Arc<dyn RemoteSink>,
    policy: SyncPolicy,
    retry: RetryPolicy,
    /// Lazily opened, dropped after a connection error.
    connection: Mutex<Option<Arc<dyn SinkConnection>>>,
    /// Serializes inserts with export-and-clear flushes so that no record
    /// lands between the export read and the clear.
    write_gate: Mutex<()>,
    shutdown: watch::Sender<bool>,
}

impl Relay {
    pub fn new(store: Arc<LocalStore>, sink: Arc<dyn RemoteSink>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            sink,
            policy: SyncPolicy::default(),
            retry: RetryPolicy::default(),
            connection: Mutex::new(None),
            write_gate: Mutex::new(()),
            shutdown,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn RemoteSink> {
        &self.sink
    }

    /// Signals every loop and pending retry to stop.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Returns a receiver that observes [`request_shutdown`](Self::request_shutdown).
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    // ── Collect ──────────────────────────────────────────────────

    /// Pulls one sample of `kind` from the collector and buffers it.
    ///
    /// Returns the new record id, or `None` if the collector had nothing.
    pub async fn collect(
        &self,
        collector: &dyn Collector,
        kind: MetricKind,
    ) -> SyncResult<Option<RecordId>> {
        let Some(sample) = collector.collect(kind).await? else {
            debug!("Collector returned no {kind} sample");
            return Ok(None);
        };

        let record = NewRecord::from_sample(kind, &sample).map_err(StorageError::from)?;

        let _gate = self.write_gate.lock().await;
        let id = self.with_store(move |store| store.insert(kind, &record)).await?;
        debug!("Buffered {kind} record {id}");
        Ok(Some(id))
    }

    // ── Evaluate / flush ─────────────────────────────────────────

    /// Flushes `kind` if the sync policy says it is due.
    pub async fn evaluate(&self, kind: MetricKind) -> SyncResult<Option<FlushReport>> {
        let policy = self.policy;
        let due = self
            .with_store(move |store| policy.should_sync(store, kind))
            .await?;

        if !due {
            debug!("{kind} sync not due");
            return Ok(None);
        }

        self.flush(kind).await.map(Some)
    }

    /// Sends the records that need syncing and records the outcome locally.
    pub async fn flush(&self, kind: MetricKind) -> SyncResult<FlushReport> {
        let conn = self.connection().await?;

        match self.sink.delivery_mode() {
            DeliveryMode::RowTracked => self.flush_tracked(kind, conn.as_ref()).await,
            DeliveryMode::ExportAndClear => self.flush_export(kind, conn.as_ref()).await,
        }
    }

    async fn flush_tracked(&self, kind: MetricKind, conn: &dyn SinkConnection) -> SyncResult<FlushReport> {
        let records = self
            .with_store(move |store| store.records_to_sync(kind))
            .await?;
        if records.is_empty() {
            debug!("No {kind} records to sync");
            return Ok(FlushReport::empty(kind));
        }

        let result = self.send(kind, conn, &records).await?;
        let acked: Vec<RecordId> = result
            .succeeded(records.len())
            .into_iter()
            .map(|i| records[i].id)
            .collect();

        let report = FlushReport {
            attempted: records.len(),
            synced: acked.len(),
            failed: records.len() - acked.len(),
            ..FlushReport::empty(kind)
        };

        self.with_store(move |store| store.mark_synced(kind, &acked))
            .await?;

        if report.failed > 0 {
            warn!(
                "Synced {}/{} {kind} records, {} rejected and kept for retry",
                report.synced, report.attempted, report.failed
            );
        } else {
            info!("Synced {} {kind} records", report.synced);
        }
        Ok(report)
    }

    async fn flush_export(&self, kind: MetricKind, conn: &dyn SinkConnection) -> SyncResult<FlushReport> {
        let _gate = self.write_gate.lock().await;

        let records = self.with_store(move |store| store.all_records(kind)).await?;
        if records.is_empty() {
            debug!("No {kind} records to export");
            return Ok(FlushReport::empty(kind));
        }

        let result = self.send(kind, conn, &records).await?;
        let mut report = FlushReport {
            attempted: records.len(),
            ..FlushReport::empty(kind)
        };

        match result {
            InsertResult::AllSucceeded => {
                report.synced = records.len();
                report.cleared = self.with_store(move |store| store.clear(kind)).await?;
                info!("Exported and cleared {} {kind} records", report.cleared);
            }
            InsertResult::PartialFailure(failed) => {
                report.failed = failed.len();
                warn!(
                    "Export of {kind} records incomplete ({} of {} rejected); keeping all locally",
                    report.failed, report.attempted
                );
            }
        }
        Ok(report)
    }

    async fn send(
        &self,
        kind: MetricKind,
        conn: &dyn SinkConnection,
        records: &[MetricRecord],
    ) -> SyncResult<InsertResult> {
        let rows: Vec<RemoteRow> = records.iter().map(MetricRecord::remote_row).collect();
        debug!("Sending {} {kind} rows to {}", rows.len(), self.sink.provider_name());

        match conn.insert_batch(kind, &rows).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_retryable() {
                    self.connection.lock().await.take();
                }
                debug!("Insert of {} {kind} rows failed: {e}", rows.len());
                Err(e)
            }
        }
    }

    async fn connection(&self) -> SyncResult<Arc<dyn SinkConnection>> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(Arc::clone(conn));
        }

        let mut shutdown = self.shutdown.subscribe();
        let conn = connect_with_retry(self.sink.as_ref(), &self.retry, &mut shutdown).await?;
        info!("Connected to {}", self.sink.provider_name());
        *cached = Some(Arc::clone(&conn));
        Ok(conn)
    }

    async fn with_store<T, F>(&self, op: F) -> SyncResult<T>
    where
        F: FnOnce(&LocalStore) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || op(&store)).await??)
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("sink", &self.sink.provider_name())
            .field("policy", &self.policy)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
