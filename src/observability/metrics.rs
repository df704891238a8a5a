//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_panics_recovered_total` (counter): reportable handler panics, by method
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every update is a no-op
//! - The Prometheus exporter is only installed by the binary

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::http::panic::PanicValue;
use crate::http::recovery::RequestSnapshot;
use crate::observability::monitor::Monitor;

/// Counter incremented by [`MetricsMonitor`].
pub const PANICS_RECOVERED_TOTAL: &str = "http_panics_recovered_total";

/// [`Monitor`] that counts recovered panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsMonitor;

impl Monitor for MetricsMonitor {
    fn panic_recovered(&self, request: &RequestSnapshot, _value: &PanicValue) {
        metrics::counter!(PANICS_RECOVERED_TOTAL, "method" => request.method.to_string()).increment(1);
    }
}

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
