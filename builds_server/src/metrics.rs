//! Prometheus metrics for builds service observability.

use metrics::counter;

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a push webhook and how it was answered.
pub fn webhook_received(outcome: &str) {
    counter!("snap_builds_webhooks_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a build request sent to Launchpad.
pub fn build_requested(origin: &str) {
    counter!("snap_builds_requested_total", "origin" => origin.to_string()).increment(1);
}

/// Record the combined status computed for a build row.
pub fn build_status_reconciled(status: &str) {
    counter!("snap_builds_status_total", "status" => status.to_string()).increment(1);
}

/// Record a failed call to a remote API.
pub fn upstream_error(service: &str) {
    counter!("snap_builds_upstream_errors_total", "service" => service.to_string()).increment(1);
}
