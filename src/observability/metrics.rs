//! Metrics collection and exposition.
//!
//! # Metrics
//! - `netpool_pool_acquire_total` (counter): checkouts by `addr`, `source` (idle|new)
//! - `netpool_pool_evicted_total` (counter): idle evictions by `addr`, `reason` (stale|unhealthy)
//! - `netpool_pool_exhausted_total` (counter): fail-fast rejections by `addr`
//! - `netpool_pool_idle_connections` (gauge): parked connections by `addr`
//! - `netpool_server_accepted_total` (counter): accepted inbound connections
//! - `netpool_server_accept_errors_total` (counter): failed accepts
//! - `netpool_server_active_connections` (gauge): connections being served
//! - `netpool_server_handler_panics_total` (counter): recovered handler panics
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_pool_acquire(addr: &str, source: &'static str) {
    ::metrics::counter!("netpool_pool_acquire_total", "addr" => addr.to_string(), "source" => source)
        .increment(1);
}

pub fn record_pool_eviction(addr: &str, reason: &'static str) {
    ::metrics::counter!("netpool_pool_evicted_total", "addr" => addr.to_string(), "reason" => reason)
        .increment(1);
}

pub fn record_pool_exhausted(addr: &str) {
    ::metrics::counter!("netpool_pool_exhausted_total", "addr" => addr.to_string()).increment(1);
}

pub fn record_pool_idle(addr: &str, idle: usize) {
    ::metrics::gauge!("netpool_pool_idle_connections", "addr" => addr.to_string()).set(idle as f64);
}

pub fn record_connection_accepted() {
    ::metrics::counter!("netpool_server_accepted_total").increment(1);
}

pub fn record_accept_error() {
    ::metrics::counter!("netpool_server_accept_errors_total").increment(1);
}

pub fn record_active_connections(active: u64) {
    ::metrics::gauge!("netpool_server_active_connections").set(active as f64);
}

pub fn record_handler_panic() {
    ::metrics::counter!("netpool_server_handler_panics_total").increment(1);
}
