//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define counter metrics (global value, local sessions, errors)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `counter_global_value` (gauge): last global value observed on the bus
//! - `counter_local_sessions` (gauge): clients attached to this process
//! - `counter_change_events_total` (counter): change events fanned out
//! - `counter_store_errors_total` (counter): failed store/bus calls by operation
//! - `counter_integrity_warnings_total` (counter): integrity warnings by kind
//! - `counter_reconcile_total` (counter): shutdown reconciliations by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels are static strings only

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_global_value(value: i64) {
    gauge!("counter_global_value").set(value as f64);
}

pub fn record_local_sessions(value: i64) {
    gauge!("counter_local_sessions").set(value as f64);
}

pub fn record_change_event() {
    counter!("counter_change_events_total").increment(1);
}

pub fn record_store_error(operation: &'static str) {
    counter!("counter_store_errors_total", "operation" => operation).increment(1);
}

pub fn record_integrity_warning(kind: &'static str) {
    counter!("counter_integrity_warnings_total", "kind" => kind).increment(1);
}

pub fn record_reconcile(outcome: &'static str) {
    counter!("counter_reconcile_total", "outcome" => outcome).increment(1);
}
