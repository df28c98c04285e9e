//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status
//! - `proxy_request_duration_seconds` (histogram): time to response head
//! - `proxy_upstream_leases` (gauge): outbound slots currently held
//! - `proxy_memory_usage_mb` (gauge): last resident-memory sample
//! - `proxy_pool_replacements_total` (counter): hot swaps of the client pool
//! - `proxy_memory_cleanups_total` (counter): cleanups by kind
//!
//! Without an installed recorder every call is a no-op, so tests never need
//! to initialize this module.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    counter!("proxy_requests_total", "method" => method.clone(), "status" => status.clone())
        .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_lease_acquired() {
    gauge!("proxy_upstream_leases").increment(1.0);
}

pub fn record_lease_released() {
    gauge!("proxy_upstream_leases").decrement(1.0);
}

pub fn record_memory_usage(mb: f64) {
    gauge!("proxy_memory_usage_mb").set(mb);
}

pub fn record_pool_replacement() {
    counter!("proxy_pool_replacements_total").increment(1);
}

pub fn record_cleanup(kind: &'static str) {
    counter!("proxy_memory_cleanups_total", "kind" => kind).increment(1);
}
