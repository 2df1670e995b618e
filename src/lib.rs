//! Dependency resilience for async services.
//!
//! Circuit breakers fail fast once a dependency looks unhealthy and test for
//! its recovery; a connection pool lends backend clients through a scoped
//! guard and trims idle ones in the background. The two compose: a protected
//! call may borrow a pooled client, and pool errors classify like any other.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod resilience;

pub use config::ResilienceConfig;
pub use lifecycle::{bootstrap, ResilienceStack, Shutdown};
pub use pool::{ConnectionPool, ConnectionPoolConfig, Connector, PoolError, PooledHandle};
pub use resilience::{
    protect, BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitState, Classify, FailureKind, Protected,
};
