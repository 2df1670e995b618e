//! Call-site wrapper around the registry.
//!
//! ```text
//! let firestore = protect(&registry, "firestore", config);
//! let doc = firestore.call(|| client.get(id)).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::resilience::classify::Classify;
use crate::resilience::error::BreakerError;
use crate::resilience::registry::CircuitBreakerRegistry;

/// Protects calls to one named dependency.
///
/// The breaker is resolved through the registry on every call, so every
/// `Protected` for the same name shares one breaker.
#[derive(Debug, Clone)]
pub struct Protected {
    registry: CircuitBreakerRegistry,
    name: String,
    config: CircuitBreakerConfig,
}

/// Wrap calls to `name` in the registry's breaker for that name.
pub fn protect(
    registry: &CircuitBreakerRegistry,
    name: impl Into<String>,
    config: CircuitBreakerConfig,
) -> Protected {
    Protected {
        registry: registry.clone(),
        name: name.into(),
        config,
    }
}

impl Protected {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared breaker; the config is only cloned the first time.
    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.registry
            .get(&self.name)
            .unwrap_or_else(|| self.registry.get_or_create(&self.name, self.config.clone()))
    }

    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.breaker().call(operation).await
    }

    pub async fn call_blocking<F, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Classify + Send + 'static,
    {
        self.breaker().call_blocking(operation).await
    }
}
