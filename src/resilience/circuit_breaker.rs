//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: calls pass through, qualifying failures accumulate
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: calls pass through as recovery trials
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since the last failure,
//!                   evaluated when the next call arrives
//! Half-Open → Closed: success_count >= success_threshold
//! Half-Open → Open: any qualifying failure
//! ```
//!
//! # Design Decisions
//! - One breaker per logical dependency (see `registry.rs`)
//! - Transitions are lazy: nothing happens between calls, no background timer
//! - The lock covers state and counters only; the operation itself runs unlocked
//! - Errors are classified and handed back, never swallowed

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::classify::{Classify, FailureKind};
use crate::resilience::error::BreakerError;
use crate::resilience::timeouts::with_deadline;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Probing for recovery.
    HalfOpen,
}

impl CircuitState {
    /// Human-readable state name.
    pub fn name(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Tuning parameters for one breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Qualifying failures tolerated while closed before the circuit opens.
    pub failure_threshold: u32,

    /// How long the circuit stays open before a trial call is allowed.
    pub recovery_timeout: Duration,

    /// Successes needed while half-open to close the circuit.
    pub success_threshold: u32,

    /// Deadline for each call; exceeding it is a qualifying failure.
    pub timeout: Duration,

    /// Error kinds that count against the breaker. Other errors pass through untouched.
    pub retryable_errors: HashSet<FailureKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            timeout: Duration::from_secs(30),
            retryable_errors: FailureKind::all(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retryable_errors(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        self.retryable_errors = kinds.into_iter().collect();
        self
    }

    /// Whether an error of `kind` counts against the breaker.
    pub fn counts(&self, kind: FailureKind) -> bool {
        self.retryable_errors.contains(&kind)
    }
}

/// Mutable counters for one breaker, only ever touched under its lock.
///
/// `failure_count` and `success_count` describe the current state episode
/// and are reset on every transition.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerStats {
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub last_failure_time: Option<Instant>,
    pub last_success_time: Option<Instant>,
}

/// Point-in-time view of a breaker for health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub failure_rate: f64,
    /// Milliseconds since the last qualifying failure.
    pub last_failure_age_ms: Option<u64>,
    /// Milliseconds since the last success.
    pub last_success_age_ms: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    stats: CircuitBreakerStats,
}

/// Guards a single logical dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        metrics::record_breaker_state(&name, CircuitState::Closed);
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                stats: CircuitBreakerStats::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An open circuit whose recovery timeout has elapsed
    /// still reports `Open` until the next call moves it to half-open.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Execute `operation` through the breaker.
    ///
    /// # Errors
    /// - [`BreakerError::Open`] if the circuit is open; `operation` is not invoked.
    /// - [`BreakerError::Timeout`] if `operation` outlives `config.timeout`.
    /// - [`BreakerError::Inner`] with the operation's own error otherwise.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.admit::<E>()?;
        let outcome = with_deadline(self.config.timeout, operation()).await;
        self.settle(outcome)
    }

    /// Execute a blocking `operation` on Tokio's blocking pool through the breaker.
    ///
    /// A timeout stops the wait, not the thread: the operation runs to
    /// completion in the background. A panic inside `operation` resumes on
    /// the caller.
    pub async fn call_blocking<F, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Classify + Send + 'static,
    {
        self.admit::<E>()?;
        let outcome =
            with_deadline(self.config.timeout, tokio::task::spawn_blocking(operation)).await;

        match outcome {
            Ok(Ok(result)) => self.settle(Ok(result)),
            Ok(Err(join_error)) => match join_error.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                Err(_) => {
                    tracing::warn!(breaker = %self.name, "Blocking call cancelled by runtime shutdown");
                    Err(BreakerError::Interrupted { name: self.name.clone() })
                }
            },
            Err(elapsed) => self.settle(Err(elapsed)),
        }
    }

    /// Snapshot of state and counters.
    pub fn stats(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let stats = &inner.stats;
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: stats.failure_count,
            success_count: stats.success_count,
            total_requests: stats.total_requests,
            total_failures: stats.total_failures,
            total_rejections: stats.total_rejections,
            failure_rate: stats.total_failures as f64 / stats.total_requests.max(1) as f64,
            last_failure_age_ms: stats.last_failure_time.map(age_ms),
            last_success_age_ms: stats.last_success_time.map(age_ms),
        }
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        tracing::info!(breaker = %self.name, from = inner.state.name(), "Circuit manually reset");
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Count the request, move Open → Half-Open if due, and reject if still open.
    fn admit<E>(&self) -> Result<(), BreakerError<E>> {
        let mut inner = self.inner.lock();
        inner.stats.total_requests += 1;

        if inner.state == CircuitState::Open && self.recovery_due(&inner.stats) {
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        if inner.state == CircuitState::Open {
            inner.stats.total_rejections += 1;
            drop(inner);
            tracing::debug!(breaker = %self.name, "Circuit open, rejecting call");
            metrics::record_breaker_call(&self.name, "rejected");
            return Err(BreakerError::Open { name: self.name.clone() });
        }

        Ok(())
    }

    fn recovery_due(&self, stats: &CircuitBreakerStats) -> bool {
        match stats.last_failure_time {
            Some(at) => at.elapsed() >= self.config.recovery_timeout,
            None => true,
        }
    }

    fn settle<T, E: Classify>(
        &self,
        outcome: Result<Result<T, E>, Elapsed>,
    ) -> Result<T, BreakerError<E>> {
        match outcome {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                let kind = err.kind();
                if self.config.counts(kind) {
                    self.record_failure(kind);
                } else {
                    tracing::debug!(breaker = %self.name, kind = %kind, "Non-qualifying error passed through");
                    metrics::record_breaker_call(&self.name, "ignored");
                }
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                self.record_failure(FailureKind::Timeout);
                Err(BreakerError::Timeout {
                    name: self.name.clone(),
                    timeout: self.config.timeout,
                })
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.stats.last_success_time = Some(Instant::now());
        // Only consecutive half-open successes matter; Closed never resets it.
        if inner.state == CircuitState::HalfOpen {
            inner.stats.success_count = inner.stats.success_count.saturating_add(1);
        }

        if inner.state == CircuitState::HalfOpen
            && inner.stats.success_count >= self.config.success_threshold
        {
            self.transition(&mut inner, CircuitState::Closed);
        }
        drop(inner);

        metrics::record_breaker_call(&self.name, "success");
    }

    fn record_failure(&self, kind: FailureKind) {
        let mut inner = self.inner.lock();
        // A call admitted before another reopened the circuit only moves totals.
        if inner.state != CircuitState::Open {
            inner.stats.failure_count = inner.stats.failure_count.saturating_add(1);
        }
        inner.stats.total_failures += 1;
        inner.stats.last_failure_time = Some(Instant::now());

        tracing::debug!(
            breaker = %self.name,
            kind = %kind,
            state = inner.state.name(),
            failure_count = inner.stats.failure_count,
            threshold = self.config.failure_threshold,
            "Call failed"
        );

        match inner.state {
            CircuitState::Closed if inner.stats.failure_count >= self.config.failure_threshold => {
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            _ => {}
        }
        drop(inner);

        metrics::record_breaker_call(&self.name, kind.as_str());
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.stats.failure_count = 0;
        inner.stats.success_count = 0;

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = from.name(),
                recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                breaker = %self.name,
                "Circuit half-open, probing recovery"
            ),
            CircuitState::Closed => tracing::info!(
                breaker = %self.name,
                from = from.name(),
                "Circuit closed"
            ),
        }
        metrics::record_breaker_transition(&self.name, to);
    }
}

fn age_ms(at: Instant) -> u64 {
    at.elapsed().as_millis() as u64
}
