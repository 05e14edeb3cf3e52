//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cinp_requests_total` (counter): requests by verb and status
//! - `cinp_request_duration_seconds` (histogram): latency by verb
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Verb labels are limited to the protocol verbs plus `INVALID`, so
//!   client-chosen method tokens never create new series

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::protocol::Verb;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(err) => tracing::error!(address = %addr, error = %err, "Failed to install metrics exporter"),
    }
}

/// Metric label for a verb token: its wire spelling, or `INVALID`.
pub fn verb_label(token: &str) -> &'static str {
    token.parse::<Verb>().map_or("INVALID", Verb::as_str)
}

/// Record one dispatched request.
pub fn record_request(verb: &str, status: u16, start: Instant) {
    let verb = verb_label(verb);
    counter!(
        "cinp_requests_total",
        "verb" => verb,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("cinp_request_duration_seconds", "verb" => verb)
        .record(start.elapsed().as_secs_f64());
}
