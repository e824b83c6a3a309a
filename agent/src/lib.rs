//! Shared pieces of the netpulse agent binary: the Prometheus collector,
//! the persistent site id and the local status API.

pub mod api;
pub mod prometheus;
pub mod site_id;

pub use api::{build_router, ApiState, KindStatus, PendingResponse, StatusResponse};
pub use prometheus::{MetricQuery, PrometheusCollector, SiteTags, PING_QUERIES, SPEED_QUERIES};
pub use site_id::load_or_create_site_id;
