//! Prometheus metrics for the dispatch engine.
//!
//! The engine records through the `metrics` facade; [`install_prometheus`]
//! installs the exporter whose handle backs `GET /metrics`. Without an
//! installed recorder every call is a no-op, which is what the tests rely on.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the Prometheus recorder and register metric descriptions.
///
/// # Errors
///
/// Returns [`MetricsError`] if the exporter cannot be built or a recorder is
/// already installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    Ok(handle)
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Presence
    describe_counter!(
        "dispatch_heartbeats_total",
        "Total number of driver heartbeats accepted"
    );

    // Assignment
    describe_counter!(
        "dispatch_assignments_total",
        "Assignment attempts by outcome (assigned, no_drivers, all_busy, unavailable)"
    );
    describe_counter!(
        "dispatch_bind_conflicts_total",
        "Binds rejected by the one-open-ride-per-driver constraint"
    );
    describe_counter!(
        "dispatch_search_widened_total",
        "Candidate searches that fell through to a wider tier"
    );
    describe_histogram!(
        "dispatch_assign_duration_seconds",
        "Time taken to select candidates and bind an offer"
    );

    // Lifecycle
    describe_counter!(
        "dispatch_transitions_total",
        "Persisted ride transitions by name"
    );
    describe_counter!(
        "dispatch_offers_expired_total",
        "Offers moved to expired by the sweeper or a bind"
    );

    // Storage
    describe_counter!(
        "dispatch_storage_faults_total",
        "Storage faults observed by the engine, by operation"
    );
}

/// A heartbeat was persisted.
pub fn record_heartbeat() {
    counter!("dispatch_heartbeats_total").increment(1);
}

/// One `assign` call finished with `outcome` after `seconds`.
pub fn record_assignment(outcome: &'static str, seconds: f64) {
    counter!("dispatch_assignments_total", "outcome" => outcome).increment(1);
    histogram!("dispatch_assign_duration_seconds").record(seconds);
}

/// A candidate lost the bind race.
pub fn record_bind_conflict() {
    counter!("dispatch_bind_conflicts_total").increment(1);
}

/// A storage call failed with a fault.
pub fn record_storage_fault(operation: &'static str) {
    counter!("dispatch_storage_faults_total", "operation" => operation).increment(1);
}

/// A search tier came back empty and the next one was tried.
pub fn record_search_widened() {
    counter!("dispatch_search_widened_total").increment(1);
}

/// A lifecycle transition was persisted.
pub fn record_transition(transition: &'static str) {
    counter!("dispatch_transitions_total", "transition" => transition).increment(1);
}

/// `count` offers were expired.
pub fn record_offers_expired(count: u64) {
    if count > 0 {
        counter!("dispatch_offers_expired_total").increment(count);
    }
}
