//! In-process connector for tests and simulation.
//!
//! Every knob can be flipped at runtime through any clone of the connector,
//! including the one owned by a pool.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::pool::connector::Connector;
use crate::resilience::classify::{Classify, FailureKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("authentication rejected")]
    AuthenticationFailed,

    #[error("connection refused")]
    ConnectFailed,

    #[error("failed to close client {client}")]
    CloseFailed { client: u64 },

    #[error("client {client}: backend unavailable")]
    Unavailable { client: u64 },
}

impl Classify for MemoryError {
    fn kind(&self) -> FailureKind {
        match self {
            MemoryError::AuthenticationFailed => FailureKind::Rejected,
            MemoryError::ConnectFailed => FailureKind::Connection,
            MemoryError::CloseFailed { .. } => FailureKind::Internal,
            MemoryError::Unavailable { .. } => FailureKind::Unavailable,
        }
    }
}

#[derive(Debug, Default)]
struct Settings {
    fail_authentication: bool,
    fail_connect: bool,
    /// Successful connects left before connects start failing.
    connect_budget: Option<u64>,
    fail_close: bool,
    failure_rate: f64,
    latency: Duration,
    connect_latency: Duration,
}

#[derive(Debug, Default)]
struct Shared {
    settings: Mutex<Settings>,
    authentications: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
    executed: AtomicU64,
    next_client: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

/// Credentials issued by [`MemoryConnector::authenticate`].
#[derive(Debug, Clone)]
pub struct MemoryCredentials {
    pub token: String,
}

/// A fake backend client.
#[derive(Debug)]
pub struct MemoryClient {
    id: u64,
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `execute` sleeps this long.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.shared.settings.lock().latency = latency;
        self
    }

    /// Every successful `connect` sleeps this long before handing out a client.
    pub fn with_connect_latency(self, latency: Duration) -> Self {
        self.shared.settings.lock().connect_latency = latency;
        self
    }

    /// Fraction of `execute` calls, in `[0, 1]`, that fail with `Unavailable`.
    pub fn with_failure_rate(self, rate: f64) -> Self {
        self.set_failure_rate(rate);
        self
    }

    pub fn set_failure_rate(&self, rate: f64) {
        self.shared.settings.lock().failure_rate = rate.clamp(0.0, 1.0);
    }

    pub fn set_fail_authentication(&self, fail: bool) {
        self.shared.settings.lock().fail_authentication = fail;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        let mut settings = self.shared.settings.lock();
        settings.fail_connect = fail;
        settings.connect_budget = None;
    }

    /// Let `n` more connects succeed, then fail the rest.
    pub fn fail_connect_after(&self, n: u64) {
        let mut settings = self.shared.settings.lock();
        settings.fail_connect = false;
        settings.connect_budget = Some(n);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.shared.settings.lock().fail_close = fail;
    }

    pub fn authentications(&self) -> u64 {
        self.shared.authentications.load(Ordering::Relaxed)
    }

    pub fn opened(&self) -> u64 {
        self.shared.opened.load(Ordering::Relaxed)
    }

    /// Handles passed to `close`, whether or not the close reported failure.
    pub fn closed(&self) -> u64 {
        self.shared.closed.load(Ordering::Relaxed)
    }

    pub fn open_now(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }

    pub fn executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Handle = MemoryClient;
    type Credentials = MemoryCredentials;
    type Error = MemoryError;

    async fn authenticate(&self) -> Result<MemoryCredentials, MemoryError> {
        if self.shared.settings.lock().fail_authentication {
            return Err(MemoryError::AuthenticationFailed);
        }
        let n = self.shared.authentications.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(MemoryCredentials {
            token: format!("token-{n}"),
        })
    }

    async fn connect(&self, credentials: &MemoryCredentials) -> Result<MemoryClient, MemoryError> {
        let latency = {
            let mut settings = self.shared.settings.lock();
            if settings.fail_connect {
                return Err(MemoryError::ConnectFailed);
            }
            if let Some(budget) = settings.connect_budget.as_mut() {
                if *budget == 0 {
                    return Err(MemoryError::ConnectFailed);
                }
                *budget -= 1;
            }
            settings.connect_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let id = self.shared.next_client.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.opened.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(client = id, token = %credentials.token, "Memory client opened");
        Ok(MemoryClient {
            id,
            shared: Arc::clone(&self.shared),
        })
    }

    async fn close(&self, handle: MemoryClient) -> Result<(), MemoryError> {
        self.shared.closed.fetch_add(1, Ordering::Relaxed);
        if self.shared.settings.lock().fail_close {
            return Err(MemoryError::CloseFailed { client: handle.id });
        }
        Ok(())
    }
}

impl MemoryClient {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pretend to run `operation` against the backend.
    pub async fn execute(&self, operation: &str) -> Result<String, MemoryError> {
        let (latency, failure_rate) = {
            let settings = self.shared.settings.lock();
            (settings.latency, settings.failure_rate)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.shared.executed.fetch_add(1, Ordering::Relaxed);

        if failure_rate > 0.0 && fastrand::f64() < failure_rate {
            return Err(MemoryError::Unavailable { client: self.id });
        }
        Ok(format!("{operation}: ok (client {})", self.id))
    }
}
