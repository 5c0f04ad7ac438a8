//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_probe_total` (counter): probes by cluster, destination, result
//! - `proxy_probe_duration_seconds` (histogram): probe latency
//! - `proxy_destination_available` (gauge): 1=available, 0=excluded
//!
//! # Design Decisions
//! - Low-overhead updates on the probing and request paths
//! - Prometheus-compatible exposition via a dedicated listener

use crate::health::transport::ProbeOutcome;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one probe outcome.
pub fn record_probe(cluster: &str, destination: &str, outcome: &ProbeOutcome) {
    counter!(
        "proxy_probe_total",
        "cluster" => cluster.to_string(),
        "destination" => destination.to_string(),
        "result" => outcome.result_label(),
    )
    .increment(1);

    if let ProbeOutcome::Response { latency, .. } = outcome {
        histogram!(
            "proxy_probe_duration_seconds",
            "cluster" => cluster.to_string(),
            "destination" => destination.to_string(),
        )
        .record(latency.as_secs_f64());
    }
}

/// Record the composite availability of a destination.
pub fn record_destination_availability(cluster: &str, destination: &str, available: bool) {
    gauge!(
        "proxy_destination_available",
        "cluster" => cluster.to_string(),
        "destination" => destination.to_string(),
    )
    .set(if available { 1.0 } else { 0.0 });
}
