//! Shared utilities for integration and load testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use service_resilience::pool::{ConnectionPool, ConnectionPoolConfig, MemoryConnector};
use service_resilience::{CircuitBreakerConfig, Classify, FailureKind};

/// Error produced by [`ScriptedDependency`].
#[derive(Debug, thiserror::Error)]
#[error("dependency failed: {0}")]
pub struct DependencyError(pub FailureKind);

impl Classify for DependencyError {
    fn kind(&self) -> FailureKind {
        self.0
    }
}

/// A dependency whose next outcome the test decides, counting invocations.
#[derive(Clone, Default)]
pub struct ScriptedDependency {
    invocations: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl ScriptedDependency {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    pub async fn succeed(&self) -> Result<&'static str, DependencyError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok("ok")
    }

    pub async fn fail(&self, kind: FailureKind) -> Result<&'static str, DependencyError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Err(DependencyError(kind))
    }

    pub async fn hang(&self, duration: Duration) -> Result<&'static str, DependencyError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(duration).await;
        Ok("late")
    }
}

/// Breaker tuned for fast tests: 3 failures, 1s recovery, 1 trial success, 100ms deadline.
#[allow(dead_code)]
pub fn quick_breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig::default()
        .with_failure_threshold(3)
        .with_recovery_timeout(Duration::from_secs(1))
        .with_success_threshold(1)
        .with_timeout(Duration::from_millis(100))
}

#[allow(dead_code)]
pub fn memory_pool(
    min: usize,
    max: usize,
    connection_timeout: Duration,
) -> (Arc<ConnectionPool<MemoryConnector>>, MemoryConnector) {
    let connector = MemoryConnector::new();
    let config = ConnectionPoolConfig {
        max_connections: max,
        min_connections: min,
        connection_timeout,
        idle_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let pool = Arc::new(ConnectionPool::new("datastore", config, connector.clone()));
    (pool, connector)
}
