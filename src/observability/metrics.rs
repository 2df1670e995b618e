//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define breaker and pool metrics
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `resilience_breaker_calls_total` (counter): calls by breaker and outcome
//! - `resilience_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `resilience_breaker_transitions_total` (counter): transitions by target state
//! - `resilience_pool_connections` (gauge): connections by pool and status (idle, in_use)
//! - `resilience_pool_exhausted_total` (counter): acquisitions that gave up
//! - `resilience_pool_wait_seconds` (histogram): time spent acquiring
//! - `resilience_pool_cleaned_total` (counter): idle connections reclaimed
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   pay nothing unless they call [`init_metrics`]
//! - Labels are the breaker or pool name; never per-request values

use std::net::SocketAddr;
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_breaker_call(breaker: &str, outcome: &'static str) {
    ::metrics::counter!(
        "resilience_breaker_calls_total",
        "breaker" => breaker.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_breaker_state(breaker: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    ::metrics::gauge!("resilience_breaker_state", "breaker" => breaker.to_string()).set(value);
}

/// Count a transition and update the state gauge.
pub fn record_breaker_transition(breaker: &str, to: CircuitState) {
    ::metrics::counter!(
        "resilience_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.name()
    )
    .increment(1);
    record_breaker_state(breaker, to);
}

pub fn record_pool_connections(pool: &str, idle: usize, in_use: usize) {
    ::metrics::gauge!(
        "resilience_pool_connections",
        "pool" => pool.to_string(),
        "status" => "idle"
    )
    .set(idle as f64);
    ::metrics::gauge!(
        "resilience_pool_connections",
        "pool" => pool.to_string(),
        "status" => "in_use"
    )
    .set(in_use as f64);
}

pub fn record_pool_exhausted(pool: &str) {
    ::metrics::counter!("resilience_pool_exhausted_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_pool_wait(pool: &str, waited: Duration) {
    ::metrics::histogram!("resilience_pool_wait_seconds", "pool" => pool.to_string())
        .record(waited.as_secs_f64());
}

pub fn record_pool_cleaned(pool: &str, removed: usize) {
    ::metrics::counter!("resilience_pool_cleaned_total", "pool" => pool.to_string())
        .increment(removed as u64);
}
