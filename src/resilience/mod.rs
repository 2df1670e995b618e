//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → registry.rs (one breaker per dependency name)
//!     → circuit_breaker.rs (fail fast if open, admit otherwise)
//!     → timeouts.rs (deadline on the operation)
//!     → classify.rs (does this error count against the dependency?)
//!     → circuit_breaker.rs (update counters, transition if a threshold is hit)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every protected call has a deadline
//! - Circuit breaker prevents cascading failures
//! - The caller always gets the operation's own error back

pub mod circuit_breaker;
pub mod classify;
pub mod error;
pub mod protect;
pub mod registry;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use classify::{Classify, FailureKind};
pub use error::BreakerError;
pub use protect::{protect, Protected};
pub use registry::CircuitBreakerRegistry;
