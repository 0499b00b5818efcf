//! Metrics collection and exposition.
//!
//! # Metrics
//! - `service_state_transitions_total` (counter): transitions by service, target state
//! - `service_stop_signals_total` (counter): internal stop signals fired
//! - `service_shutdown_failures_total` (counter): drains that missed the deadline or failed
//! - `service_running` (gauge): 1=running, 0=not running
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are the service name and target state only

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::lifecycle::ServiceState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_transition(service: &str, to: ServiceState) {
    metrics::counter!(
        "service_state_transitions_total",
        "service" => service.to_string(),
        "to" => to.as_str()
    )
    .increment(1);

    let running = if to == ServiceState::Running { 1.0 } else { 0.0 };
    metrics::gauge!("service_running", "service" => service.to_string()).set(running);
}

pub fn record_stop_signal(service: &str) {
    metrics::counter!("service_stop_signals_total", "service" => service.to_string()).increment(1);
}

pub fn record_shutdown_failure(service: &str) {
    metrics::counter!("service_shutdown_failures_total", "service" => service.to_string())
        .increment(1);
}
