//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_admission_rejected_total` (counter): rejections by reason
//! - `gateway_coalesced_total` (counter): leader vs joined callers
//! - `gateway_breaker_transitions_total` (counter): by dependency, new state
//! - `gateway_upstream_errors_total` (counter): by dependency, error kind
//!
//! Recording is a no-op until a recorder is installed, so tests never need
//! to set one up.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route)
        .record(elapsed.as_secs_f64());
}

pub fn record_admission_rejected(reason: &'static str) {
    metrics::counter!("gateway_admission_rejected_total", "reason" => reason).increment(1);
}

/// `outcome` is `leader` for the caller that ran the computation, `joined` otherwise.
pub fn record_coalesced(outcome: &'static str) {
    metrics::counter!("gateway_coalesced_total", "outcome" => outcome).increment(1);
}

pub fn record_breaker_transition(dependency: &'static str, state: &'static str) {
    metrics::counter!(
        "gateway_breaker_transitions_total",
        "dependency" => dependency,
        "state" => state
    )
    .increment(1);
}

pub fn record_upstream_error(dependency: &'static str, kind: &'static str) {
    metrics::counter!(
        "gateway_upstream_errors_total",
        "dependency" => dependency,
        "kind" => kind
    )
    .increment(1);
}
