//! Remote sink backends.
//!
//! All backends share one contract ([`RemoteSink`] / [`SinkConnection`]) and
//! are selected by [`SinkConfig`].

pub mod form;
pub mod http;
pub mod remote;
pub mod sqlite;

pub use form::{FormSink, FormSinkConfig, FormTarget};
pub use http::{HttpRowSink, HttpSinkConfig};
pub use remote::{DeliveryMode, InsertResult, RemoteRow, RemoteSink, SinkConnection};
pub use sqlite::{SqliteSink, SqliteSinkConfig};

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which remote sink to relay to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    Http(HttpSinkConfig),
    Sqlite(SqliteSinkConfig),
    Form(FormSinkConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Sqlite(SqliteSinkConfig {
            path: "netpulse-remote.db".into(),
        })
    }
}

/// Builds the sink selected by `config`.
pub fn build_sink(config: &SinkConfig) -> SyncResult<Arc<dyn RemoteSink>> {
    Ok(match config {
        SinkConfig::Http(cfg) => Arc::new(HttpRowSink::new(cfg.clone())?),
        SinkConfig::Sqlite(cfg) => Arc::new(SqliteSink::new(cfg.clone())),
        SinkConfig::Form(cfg) => Arc::new(FormSink::new(cfg.clone())?),
    })
}
