//! Store-and-forward relay for netpulse metric records.
//!
//! Buffers samples in a [`LocalStore`](netpulse_store::LocalStore) and
//! forwards them in batches to a remote sink.
//!
//! # Architecture
//!
//! - **Collector**: external metrics source, polled on the collect timer
//! - **SyncPolicy**: decides whether a kind is due, based on the newest
//!   confirmed record
//! - **Sink**: one contract, three backends (HTTP warehouse, SQLite file,
//!   web form), chosen by [`SinkConfig`]
//! - **Relay**: the flush itself (`records_to_sync` → `insert_batch` →
//!   `mark_synced`)
//! - **RelayScheduler**: runs collect and evaluate-and-flush on independent
//!   timers with graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use netpulse_store::LocalStore;
//! use netpulse_sync::{build_sink, Relay, SinkConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(LocalStore::open("netpulse.db")?);
//! let sink = build_sink(&SinkConfig::default())?;
//! let relay = Relay::new(store, sink);
//! for kind in netpulse_types::MetricKind::ALL {
//!     relay.flush(kind).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
mod error;
pub mod policy;
pub mod relay;
pub mod retry;
pub mod scheduler;
pub mod sink;

pub use collector::Collector;
pub use config::{RelayConfig, MAX_DURATION_SECS};
pub use error::{SyncError, SyncResult};
pub use policy::{SyncPolicy, DEFAULT_SYNC_INTERVAL};
pub use relay::{FlushReport, Relay};
pub use retry::{connect_with_retry, Backoff, RetryPolicy};
pub use scheduler::{RelayScheduler, SchedulerHandle};
pub use sink::{
    build_sink, DeliveryMode, FormSink, FormSinkConfig, FormTarget, HttpRowSink, HttpSinkConfig,
    InsertResult, RemoteRow, RemoteSink, SinkConfig, SinkConnection, SqliteSink, SqliteSinkConfig,
};
