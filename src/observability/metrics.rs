//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hotswap_reloads_total` (counter): reload iterations by outcome
//! - `hotswap_drains_total` (counter): retirements by outcome
//! - `hotswap_drain_duration_seconds` (histogram): time spent retiring an instance
//! - `hotswap_active_connections` (gauge): open connections across all instances
//! - `hotswap_requests_total` (counter): requests by route and status
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_reload(outcome: &'static str) {
    metrics::counter!("hotswap_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_drain(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("hotswap_drains_total", "outcome" => outcome).increment(1);
    metrics::histogram!("hotswap_drain_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

pub fn connection_opened() {
    metrics::gauge!("hotswap_active_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("hotswap_active_connections").decrement(1.0);
}

pub fn record_request(route: &'static str, status: u16) {
    metrics::counter!(
        "hotswap_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
}
