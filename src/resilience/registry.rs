//! Process-wide breaker registry.
//!
//! # Responsibilities
//! - Hand out exactly one breaker per dependency name
//! - Expose snapshots of every breaker for health reporting
//!
//! # Design Decisions
//! - Constructed once at startup and passed to whoever protects calls
//! - Cloning the registry clones a handle, not the breakers
//! - First config wins; later callers asking for the same name share the
//!   breaker that already exists

use dashmap::DashMap;
use std::sync::Arc;

use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};

/// Name → breaker map shared across call sites.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerRegistry {
    inner: Arc<DashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The breaker for `name`, built from `config` if it does not exist yet.
    ///
    /// Concurrent first access constructs a single breaker.
    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.inner.get(name) {
            let breaker = Arc::clone(existing.value());
            drop(existing);
            if breaker.config() != &config {
                tracing::debug!(breaker = %name, "Breaker exists with different config, keeping original");
            }
            return breaker;
        }

        let entry = self.inner.entry(name.to_string()).or_insert_with(|| {
            tracing::info!(
                breaker = %name,
                failure_threshold = config.failure_threshold,
                recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
                success_threshold = config.success_threshold,
                timeout_ms = config.timeout.as_millis() as u64,
                "Circuit breaker registered"
            );
            Arc::new(CircuitBreaker::new(name, config))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.inner.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Stats for every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.inner.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut snapshots: Vec<BreakerSnapshot> = breakers.iter().map(|b| b.stats()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Force every breaker closed.
    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.inner.iter().map(|entry| Arc::clone(entry.value())).collect();
        for breaker in breakers {
            breaker.reset();
        }
    }
}
