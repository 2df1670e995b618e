//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts > 0, pool bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{BreakerSettings, ResilienceConfig};

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_breaker("default_breaker", &config.default_breaker, &mut errors);
    let mut names: Vec<&String> = config.breakers.keys().collect();
    names.sort();
    for name in names {
        validate_breaker(&format!("breakers.{name}"), &config.breakers[name], &mut errors);
    }

    let pool = &config.pool;
    if pool.name.trim().is_empty() {
        errors.push(ValidationError::new("pool.name", "must not be empty"));
    }
    if pool.max_connections == 0 {
        errors.push(ValidationError::new("pool.max_connections", "must be greater than 0"));
    }
    if pool.min_connections > pool.max_connections {
        errors.push(ValidationError::new(
            "pool.min_connections",
            format!(
                "must not exceed max_connections ({} > {})",
                pool.min_connections, pool.max_connections
            ),
        ));
    }
    if pool.connection_timeout_ms == 0 {
        errors.push(ValidationError::new("pool.connection_timeout_ms", "must be greater than 0"));
    }
    if pool.idle_timeout_ms == 0 {
        errors.push(ValidationError::new("pool.idle_timeout_ms", "must be greater than 0"));
    }

    if config.cleanup.enabled && config.cleanup.interval_ms == 0 {
        errors.push(ValidationError::new("cleanup.interval_ms", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address like 0.0.0.0:9090",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(prefix: &str, settings: &BreakerSettings, errors: &mut Vec<ValidationError>) {
    if settings.failure_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.failure_threshold"), "must be greater than 0"));
    }
    if settings.success_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.success_threshold"), "must be greater than 0"));
    }
    if settings.recovery_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.recovery_timeout_ms"), "must be greater than 0"));
    }
    if settings.timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.timeout_ms"), "must be greater than 0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ResilienceConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_violation() {
        let mut config = ResilienceConfig::default();
        config.default_breaker.failure_threshold = 0;
        config.pool.max_connections = 2;
        config.pool.min_connections = 5;
        config.cleanup.interval_ms = 0;
        config.breakers.insert(
            "vertex".to_string(),
            BreakerSettings {
                timeout_ms: 0,
                ..Default::default()
            },
        );

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "default_breaker.failure_threshold",
                "breakers.vertex.timeout_ms",
                "pool.min_connections",
                "cleanup.interval_ms",
            ]
        );
        assert_eq!(errors[2].to_string(), "pool.min_connections: must not exceed max_connections (5 > 2)");
    }

    #[test]
    fn test_bad_metrics_address_only_matters_when_enabled() {
        let mut config = ResilienceConfig::default();
        config.observability.metrics_address = "not-an-address".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(validate_config(&config).unwrap_err().len(), 1);
    }
}
