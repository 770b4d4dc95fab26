//! Prometheus metrics for booking and payment health.
//!
//! Metrics are exported on a dedicated listener configured via
//! `METRICS_BIND`; when unset, recording is a no-op.

#![allow(dead_code)] // Public API for dashboards still being wired up

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter on `addr`; metrics are scraped from
/// `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

/// Record an HTTP request with method, path and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Increment successfully created bookings.
pub fn bookings_created_total() {
    metrics::counter!("bookings_created_total").increment(1);
}

/// Increment bookings refused for lack of inventory.
pub fn booking_conflicts_total() {
    metrics::counter!("booking_conflicts_total").increment(1);
}

/// Record a gateway capture by outcome (`applied`, `duplicate`, `rejected`).
pub fn captures_total(outcome: &str) {
    metrics::counter!("captures_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Increment withdrawal requests taken.
pub fn withdrawals_requested_total() {
    metrics::counter!("withdrawals_requested_total").increment(1);
}

/// Record how many pending transactions a sweep failed.
pub fn stale_transactions_swept(count: u64) {
    metrics::counter!("stale_transactions_swept").increment(count);
}

/// Record how many bookings a completion rollover closed.
pub fn bookings_rolled_over(count: u64) {
    metrics::counter!("bookings_rolled_over").increment(count);
}
