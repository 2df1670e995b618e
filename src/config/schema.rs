//! Configuration schema definitions.
//!
//! This module defines the configuration structure for breakers, the
//! connection pool and its cleanup task. All types derive Serde traits for
//! deserialization from config files. Durations are in milliseconds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::pool::ConnectionPoolConfig;
use crate::resilience::{CircuitBreakerConfig, FailureKind};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Settings for any breaker without its own entry in `breakers`.
    pub default_breaker: BreakerSettings,

    /// Per-dependency breaker settings, keyed by dependency name.
    pub breakers: HashMap<String, BreakerSettings>,

    pub pool: PoolSettings,

    pub cleanup: CleanupSettings,
}

impl ResilienceConfig {
    /// Breaker config for `name`, falling back to `default_breaker`.
    pub fn breaker_config(&self, name: &str) -> CircuitBreakerConfig {
        self.breakers
            .get(name)
            .unwrap_or(&self.default_breaker)
            .to_config()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// One breaker's settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Qualifying failures while closed before the circuit opens.
    pub failure_threshold: u32,

    pub recovery_timeout_ms: u64,

    /// Successes while half-open before the circuit closes.
    pub success_threshold: u32,

    /// Per-call deadline.
    pub timeout_ms: u64,

    /// Error kinds that count as failures. Defaults to all of them.
    pub retryable_errors: Vec<FailureKind>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            success_threshold: 3,
            timeout_ms: 30_000,
            retryable_errors: FailureKind::ALL.to_vec(),
        }
    }
}

impl BreakerSettings {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
            success_threshold: self.success_threshold,
            timeout: Duration::from_millis(self.timeout_ms),
            retryable_errors: self.retryable_errors.iter().copied().collect(),
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Pool name used in logs and metrics.
    pub name: String,

    pub max_connections: usize,

    pub min_connections: usize,

    /// Wait for an idle connection before growing or giving up.
    pub connection_timeout_ms: u64,

    /// Idle connections older than this are closed by cleanup.
    pub idle_timeout_ms: u64,

    pub max_retries: u32,

    pub retry_delay_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            name: "datastore".to_string(),
            max_connections: 10,
            min_connections: 2,
            connection_timeout_ms: 30_000,
            idle_timeout_ms: 300_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl PoolSettings {
    pub fn to_config(&self) -> ConnectionPoolConfig {
        ConnectionPoolConfig {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Idle-connection cleanup settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub enabled: bool,

    pub interval_ms: u64,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 60_000,
        }
    }
}

impl CleanupSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_library_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.breaker_config("anything"), CircuitBreakerConfig::default());
        assert_eq!(config.pool.to_config(), ConnectionPoolConfig::default());
        assert_eq!(config.cleanup.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_named_breaker_overrides_default() {
        let config: ResilienceConfig = toml::from_str(
            r#"
            [default_breaker]
            failure_threshold = 4

            [breakers.vertex]
            failure_threshold = 3
            timeout_ms = 10000
            retryable_errors = ["timeout", "unavailable"]
            "#,
        )
        .unwrap();

        let vertex = config.breaker_config("vertex");
        assert_eq!(vertex.failure_threshold, 3);
        assert_eq!(vertex.timeout, Duration::from_secs(10));
        assert!(vertex.counts(FailureKind::Timeout));
        assert!(!vertex.counts(FailureKind::Rejected));

        let other = config.breaker_config("firestore");
        assert_eq!(other.failure_threshold, 4);
        assert_eq!(other.retryable_errors, FailureKind::all());
    }
}
