//! Bounded pool of backend client handles.
//!
//! # Responsibilities
//! - Authenticate lazily and pre-open `min_connections` handles
//! - Lend handles through a scoped guard that always gives them back
//! - Grow on demand up to `max_connections`
//! - Reclaim handles idle past `idle_timeout`, never below `min_connections`
//!
//! # Data Flow
//! ```text
//! acquire()
//!     → ensure_initialized (authenticate + min_connections, once)
//!     → wait up to connection_timeout for an idle handle
//!     → on timeout: open a new handle if total < max, else Exhausted
//!     → PooledHandle (Deref to the client)
//!
//! PooledHandle dropped
//!     → handle back to the idle queue, one idle permit added
//! ```
//!
//! # Design Decisions
//! - The state lock is a synchronous mutex and is never held across an await;
//!   connecting and closing always happen outside it
//! - Idle handles are counted by a fair semaphore, so waiters are served
//!   roughly in arrival order
//! - `close_all_connections` bumps a generation; guards from an older
//!   generation close their handle instead of returning it

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::pool::connection::{ConnectionId, PooledConnection};
use crate::pool::connector::Connector;
use crate::pool::error::PoolError;

/// Sizing and timing for one pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPoolConfig {
    pub max_connections: usize,
    pub min_connections: usize,

    /// How long `acquire` waits for an idle handle before trying to grow.
    pub connection_timeout: Duration,

    /// Idle handles older than this are eligible for cleanup.
    pub idle_timeout: Duration,

    /// Reserved for connection-creation backoff. Not acted on.
    pub max_retries: u32,

    /// Reserved for connection-creation backoff. Not acted on.
    pub retry_delay: Duration,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub initialized: bool,
    pub total: usize,
    pub available: usize,
    pub in_use: usize,
    pub max_connections: usize,
    pub min_connections: usize,
    /// `in_use / max_connections`.
    pub utilization: f64,
    pub total_created: u64,
    pub total_closed: u64,
    pub exhausted_count: u64,
}

struct PoolState<C: Connector> {
    idle: VecDeque<PooledConnection<C::Handle>>,
    /// Open handles, idle or lent, including slots reserved by an in-flight connect.
    total: usize,
    in_use: usize,
    generation: u64,
    /// `None` until initialized, and again after `close_all_connections`.
    credentials: Option<Arc<C::Credentials>>,
    total_created: u64,
    total_closed: u64,
    exhausted_count: u64,
}

pub struct ConnectionPool<C: Connector> {
    name: String,
    config: ConnectionPoolConfig,
    connector: Arc<C>,
    state: Mutex<PoolState<C>>,
    /// One permit per handle sitting in `state.idle`.
    idle_permits: Semaphore,
    init_lock: tokio::sync::Mutex<()>,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(name: impl Into<String>, mut config: ConnectionPoolConfig, connector: C) -> Self {
        let name = name.into();
        if config.min_connections > config.max_connections {
            tracing::warn!(
                pool = %name,
                min_connections = config.min_connections,
                max_connections = config.max_connections,
                "min_connections exceeds max_connections, clamping"
            );
            config.min_connections = config.max_connections;
        }

        Self {
            name,
            config,
            connector: Arc::new(connector),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
                in_use: 0,
                generation: 0,
                credentials: None,
                total_created: 0,
                total_closed: 0,
                exhausted_count: 0,
            }),
            idle_permits: Semaphore::new(0),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ConnectionPoolConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().credentials.is_some()
    }

    /// Authenticate and open `min_connections` handles if not done yet.
    ///
    /// `acquire` does this on first use; calling it at startup surfaces
    /// credential problems early.
    pub async fn initialize(&self) -> Result<(), PoolError<C::Error>> {
        self.ensure_initialized().await.map(|_| ())
    }

    async fn ensure_initialized(&self) -> Result<Arc<C::Credentials>, PoolError<C::Error>> {
        let existing = self.state.lock().credentials.clone();
        if let Some(credentials) = existing {
            return Ok(credentials);
        }

        let _init = self.init_lock.lock().await;
        let missing = {
            let state = self.state.lock();
            if let Some(credentials) = &state.credentials {
                return Ok(Arc::clone(credentials));
            }
            self.config.min_connections.saturating_sub(state.total)
        };

        let credentials = match self.connector.authenticate().await {
            Ok(credentials) => Arc::new(credentials),
            Err(e) => {
                tracing::error!(pool = %self.name, error = %e, "Connection pool authentication failed");
                return Err(PoolError::Backend(e));
            }
        };

        let mut pending = PendingConnections {
            pool: self,
            handles: Vec::with_capacity(missing),
        };
        for _ in 0..missing {
            match self.connector.connect(&credentials).await {
                Ok(handle) => pending.handles.push(handle),
                Err(e) => {
                    tracing::error!(
                        pool = %self.name,
                        opened = pending.handles.len(),
                        error = %e,
                        "Failed to open initial connections"
                    );
                    for handle in std::mem::take(&mut pending.handles) {
                        if let Err(close_err) = self.connector.close(handle).await {
                            tracing::warn!(pool = %self.name, error = %close_err, "Failed to close connection");
                        }
                    }
                    return Err(PoolError::Backend(e));
                }
            }
        }
        let opened = std::mem::take(&mut pending.handles);

        let count = opened.len();
        let (idle, in_use) = {
            let mut state = self.state.lock();
            state
                .idle
                .extend(opened.into_iter().map(PooledConnection::new));
            state.total += count;
            state.total_created += count as u64;
            state.credentials = Some(Arc::clone(&credentials));
            (state.idle.len(), state.in_use)
        };
        self.idle_permits.add_permits(count);

        tracing::info!(
            pool = %self.name,
            connections = count,
            max_connections = self.config.max_connections,
            idle_timeout_secs = self.config.idle_timeout.as_secs(),
            max_retries = self.config.max_retries,
            retry_delay_ms = self.config.retry_delay.as_millis() as u64,
            "Connection pool initialized"
        );
        metrics::record_pool_connections(&self.name, idle, in_use);

        Ok(credentials)
    }

    /// Borrow a handle until the returned guard is dropped.
    ///
    /// # Errors
    /// - [`PoolError::Backend`] if initialization or opening a new handle fails.
    /// - [`PoolError::Exhausted`] if no handle became idle within
    ///   `connection_timeout` and the pool is already at `max_connections`.
    pub async fn acquire(&self) -> Result<PooledHandle<'_, C>, PoolError<C::Error>> {
        let started = Instant::now();
        self.ensure_initialized().await?;

        let waited =
            tokio::time::timeout(self.config.connection_timeout, self.idle_permits.acquire()).await;
        let reused = match waited {
            Ok(Ok(permit)) => {
                permit.forget();
                self.checkout_idle()
            }
            // The semaphore is never closed; treat it like a timeout.
            Ok(Err(_)) | Err(_) => None,
        };

        let (conn, generation) = match reused {
            Some(reused) => reused,
            None => self.open_new(started).await?,
        };

        tracing::trace!(pool = %self.name, connection = %conn.id(), "Connection acquired");
        metrics::record_pool_wait(&self.name, started.elapsed());

        Ok(PooledHandle {
            pool: self,
            conn: Some(conn),
            generation,
        })
    }

    fn checkout_idle(&self) -> Option<(PooledConnection<C::Handle>, u64)> {
        let mut state = self.state.lock();
        let mut conn = state.idle.pop_front()?;
        conn.checkout();
        state.in_use += 1;
        Some((conn, state.generation))
    }

    async fn open_new(
        &self,
        started: Instant,
    ) -> Result<(PooledConnection<C::Handle>, u64), PoolError<C::Error>> {
        let credentials = self.ensure_initialized().await?;

        let reserved = {
            let mut state = self.state.lock();
            if state.total >= self.config.max_connections {
                state.exhausted_count += 1;
                None
            } else {
                state.total += 1;
                state.in_use += 1;
                Some(state.generation)
            }
        };

        let Some(generation) = reserved else {
            let waited = started.elapsed();
            tracing::warn!(
                pool = %self.name,
                max_connections = self.config.max_connections,
                waited_ms = waited.as_millis() as u64,
                "Connection pool exhausted"
            );
            metrics::record_pool_exhausted(&self.name);
            return Err(PoolError::Exhausted {
                pool: self.name.clone(),
                max_connections: self.config.max_connections,
                waited,
            });
        };

        let mut slot = SlotReservation {
            pool: self,
            generation,
            armed: true,
        };
        let handle = self.connector.connect(&credentials).await.map_err(|e| {
            tracing::warn!(pool = %self.name, error = %e, "Failed to open connection");
            PoolError::Backend(e)
        })?;
        slot.armed = false;

        let mut conn = PooledConnection::new(handle);
        conn.checkout();
        let (idle, in_use) = {
            let mut state = self.state.lock();
            state.total_created += 1;
            (state.idle.len(), state.in_use)
        };
        tracing::debug!(pool = %self.name, connection = %conn.id(), "Opened new connection");
        metrics::record_pool_connections(&self.name, idle, in_use);

        Ok((conn, generation))
    }

    fn release(&self, mut conn: PooledConnection<C::Handle>, generation: u64) {
        let id = conn.id();
        let returned = {
            let mut state = self.state.lock();
            if state.generation == generation {
                conn.checkin();
                state.idle.push_back(conn);
                state.in_use = state.in_use.saturating_sub(1);
                Ok((state.idle.len(), state.in_use))
            } else {
                state.total_closed += 1;
                Err(conn)
            }
        };

        match returned {
            Ok((idle, in_use)) => {
                self.idle_permits.add_permits(1);
                tracing::trace!(pool = %self.name, connection = %id, "Connection released");
                metrics::record_pool_connections(&self.name, idle, in_use);
            }
            Err(stale) => {
                tracing::debug!(pool = %self.name, connection = %id, "Closing connection from a closed pool generation");
                self.close_detached(stale.into_handle());
            }
        }
    }

    /// Close a handle from a synchronous context.
    fn close_detached(&self, handle: C::Handle) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(pool = %self.name, "No runtime to close connection, dropping it");
            return;
        };
        let connector = Arc::clone(&self.connector);
        let name = self.name.clone();
        runtime.spawn(async move {
            if let Err(e) = connector.close(handle).await {
                tracing::warn!(pool = %name, error = %e, "Failed to close connection");
            }
        });
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let max = self.config.max_connections;
        PoolStats {
            name: self.name.clone(),
            initialized: state.credentials.is_some(),
            total: state.total,
            available: state.idle.len(),
            in_use: state.in_use,
            max_connections: max,
            min_connections: self.config.min_connections,
            utilization: if max == 0 {
                0.0
            } else {
                state.in_use as f64 / max as f64
            },
            total_created: state.total_created,
            total_closed: state.total_closed,
            exhausted_count: state.exhausted_count,
        }
    }

    /// Close idle handles unused for longer than `idle_timeout`, keeping at
    /// least `min_connections` open. Returns how many were removed.
    ///
    /// Every removed handle is closed even if an earlier close fails; the
    /// first failure is returned.
    pub async fn cleanup_expired_connections(&self) -> Result<usize, C::Error> {
        let (expired, idle, in_use) = {
            let mut state = self.state.lock();
            let mut expired = Vec::new();
            let mut i = 0;
            while i < state.idle.len() && state.total > self.config.min_connections {
                if state.idle[i].idle_for() <= self.config.idle_timeout {
                    i += 1;
                    continue;
                }
                // A waiter already holds this permit and is about to pop.
                let Ok(permit) = self.idle_permits.try_acquire() else {
                    break;
                };
                permit.forget();
                if let Some(conn) = state.idle.remove(i) {
                    state.total -= 1;
                    state.total_closed += 1;
                    expired.push(conn);
                }
            }
            (expired, state.idle.len(), state.in_use)
        };

        if expired.is_empty() {
            return Ok(0);
        }

        let removed = expired.len();
        let mut first_error = None;
        for conn in expired {
            let id = conn.id();
            if let Err(e) = self.connector.close(conn.into_handle()).await {
                tracing::warn!(pool = %self.name, connection = %id, error = %e, "Failed to close expired connection");
                first_error.get_or_insert(e);
            }
        }

        tracing::info!(pool = %self.name, removed, idle, "Cleaned up idle connections");
        metrics::record_pool_cleaned(&self.name, removed);
        metrics::record_pool_connections(&self.name, idle, in_use);

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Close every idle handle and forget the credentials.
    ///
    /// Handles currently lent out are closed when their guard drops. The next
    /// `acquire` re-initializes the pool. Returns how many idle handles were closed.
    pub async fn close_all_connections(&self) -> Result<usize, C::Error> {
        let _init = self.init_lock.lock().await;
        let (drained, lent) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.credentials = None;
            let drained: Vec<_> = state.idle.drain(..).collect();
            let lent = state.in_use;
            state.total = 0;
            state.in_use = 0;
            state.total_closed += drained.len() as u64;
            self.idle_permits.forget_permits(drained.len());
            (drained, lent)
        };

        let closed = drained.len();
        let mut first_error = None;
        for conn in drained {
            if let Err(e) = self.connector.close(conn.into_handle()).await {
                tracing::warn!(pool = %self.name, error = %e, "Failed to close connection");
                first_error.get_or_insert(e);
            }
        }

        tracing::info!(pool = %self.name, closed, lent, "Connection pool closed");
        metrics::record_pool_connections(&self.name, 0, 0);

        match first_error {
            Some(e) => Err(e),
            None => Ok(closed),
        }
    }
}

impl<C: Connector> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("ConnectionPool")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("total", &stats.total)
            .field("in_use", &stats.in_use)
            .finish()
    }
}

/// Gives a reserved slot back if opening the handle fails or is cancelled.
struct SlotReservation<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    generation: u64,
    armed: bool,
}

impl<C: Connector> Drop for SlotReservation<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.pool.state.lock();
        if state.generation == self.generation {
            state.total = state.total.saturating_sub(1);
            state.in_use = state.in_use.saturating_sub(1);
        }
    }
}

/// Handles opened during initialization but not yet queued as idle.
///
/// Closes whatever it still holds if initialization is cancelled mid-way.
struct PendingConnections<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    handles: Vec<C::Handle>,
}

impl<C: Connector> Drop for PendingConnections<'_, C> {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        tracing::warn!(
            pool = %self.pool.name,
            connections = self.handles.len(),
            "Initialization cancelled, closing opened connections"
        );
        for handle in self.handles.drain(..) {
            self.pool.close_detached(handle);
        }
    }
}

/// A handle lent out by a [`ConnectionPool`].
///
/// Returned to the pool when dropped, including during unwinding.
pub struct PooledHandle<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    conn: Option<PooledConnection<C::Handle>>,
    generation: u64,
}

impl<C: Connector> PooledHandle<'_, C> {
    pub fn id(&self) -> ConnectionId {
        self.connection().id()
    }

    pub fn connection(&self) -> &PooledConnection<C::Handle> {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is only taken on drop"),
        }
    }

    fn connection_mut(&mut self) -> &mut PooledConnection<C::Handle> {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl<C: Connector> Deref for PooledHandle<'_, C> {
    type Target = C::Handle;
    fn deref(&self) -> &Self::Target {
        self.connection().handle()
    }
}

impl<C: Connector> DerefMut for PooledHandle<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection_mut().handle_mut()
    }
}

impl<C: Connector> Drop for PooledHandle<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.generation);
        }
    }
}

impl<C: Connector> fmt::Debug for PooledHandle<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledHandle")
            .field("pool", &self.pool.name)
            .field("connection", &self.conn.as_ref().map(|c| c.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::memory::{MemoryConnector, MemoryError};

    fn config(min: usize, max: usize) -> ConnectionPoolConfig {
        ConnectionPoolConfig {
            max_connections: max,
            min_connections: min,
            connection_timeout: Duration::from_millis(200),
            idle_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_opens_min_connections() {
        let connector = MemoryConnector::new();
        let pool = ConnectionPool::new("datastore", config(2, 5), connector.clone());
        assert!(!pool.is_initialized());

        pool.initialize().await.unwrap();
        pool.initialize().await.unwrap();

        let stats = pool.stats();
        assert!(stats.initialized);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.available, 2);
        assert_eq!(connector.authentications(), 1);
        assert_eq!(connector.opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_initialize_authenticates_once() {
        let connector = MemoryConnector::new().with_connect_latency(Duration::from_millis(10));
        let pool = ConnectionPool::new("datastore", config(2, 5), connector.clone());

        let (first, second, acquired, third) = tokio::join!(
            pool.initialize(),
            pool.initialize(),
            pool.acquire(),
            pool.initialize()
        );
        assert!(first.is_ok() && second.is_ok() && third.is_ok());
        assert!(acquired.is_ok());
        drop(acquired);

        assert_eq!(connector.authentications(), 1);
        assert_eq!(connector.opened(), 2);
        let stats = pool.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.available, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_initialize_closes_opened_connections() {
        let connector = MemoryConnector::new().with_connect_latency(Duration::from_millis(100));
        let pool = ConnectionPool::new("datastore", config(3, 5), connector.clone());

        let cancelled = tokio::time::timeout(Duration::from_millis(150), pool.initialize()).await;
        assert!(cancelled.is_err());
        assert_eq!(connector.opened(), 1);

        // The close runs on a spawned task.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(connector.open_now(), 0);
        assert!(!pool.is_initialized());
        assert_eq!(pool.stats().total, 0);

        pool.initialize().await.unwrap();
        assert_eq!(pool.stats().total, 3);
        assert_eq!(connector.open_now(), 3);
    }

    #[test]
    fn test_stale_guard_dropped_outside_runtime() {
        let connector = MemoryConnector::new();
        let pool = ConnectionPool::new("datastore", config(1, 2), connector.clone());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let guard = runtime.block_on(async {
            let guard = pool.acquire().await.unwrap();
            pool.close_all_connections().await.unwrap();
            guard
        });
        drop(runtime);
        drop(guard);

        assert_eq!(connector.closed(), 0);
        let stats = pool.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_propagates_to_first_caller() {
        let connector = MemoryConnector::new();
        connector.set_fail_authentication(true);
        let pool = ConnectionPool::new("datastore", config(2, 5), connector.clone());

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::Backend(MemoryError::AuthenticationFailed)));
        assert!(!pool.is_initialized());

        connector.set_fail_authentication(false);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_initial_connect_closes_what_was_opened() {
        let connector = MemoryConnector::new();
        connector.fail_connect_after(1);
        let pool = ConnectionPool::new("datastore", config(3, 5), connector.clone());

        assert!(pool.initialize().await.is_err());
        assert_eq!(connector.open_now(), 0);
        assert_eq!(pool.stats().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_greater_than_max_is_clamped() {
        let pool = ConnectionPool::new("datastore", config(8, 3), MemoryConnector::new());
        assert_eq!(pool.config().min_connections, 3);
        pool.initialize().await.unwrap();
        assert_eq!(pool.stats().total, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_connection_timeout() {
        let pool = ConnectionPool::new("datastore", config(2, 3), MemoryConnector::new());

        let started = Instant::now();
        let (a, b, c, d) = tokio::join!(
            pool.acquire(),
            pool.acquire(),
            pool.acquire(),
            pool.acquire()
        );
        let waited = started.elapsed();

        let results = [a, b, c, d];
        let exhausted: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(exhausted.len(), 1);
        assert!(exhausted[0].is_exhausted());
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < Duration::from_millis(300));

        let stats = pool.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.in_use, 3);
        assert_eq!(stats.exhausted_count, 1);
        assert!((stats.utilization - 1.0).abs() < f64::EPSILON);
        drop(results);
        assert_eq!(pool.stats().available, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_when_all_held() {
        let pool = ConnectionPool::new("datastore", config(1, 1), MemoryConnector::new());
        let held = pool.acquire().await.unwrap();

        let started = Instant::now();
        let err = pool.acquire().await.unwrap_err();
        assert!(err.is_exhausted());
        assert!(started.elapsed() >= Duration::from_millis(200));
        drop(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_gets_released_connection() {
        let pool = ConnectionPool::new("datastore", config(1, 1), MemoryConnector::new());
        let held = pool.acquire().await.unwrap();
        let held_id = held.id();

        let release = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        };
        let (acquired, ()) = tokio::join!(pool.acquire(), release);

        assert_eq!(acquired.unwrap().id(), held_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_returns_exactly_once() {
        let pool = ConnectionPool::new("datastore", config(1, 2), MemoryConnector::new());

        async fn failing_body(pool: &ConnectionPool<MemoryConnector>) -> Result<(), MemoryError> {
            let client = pool.acquire().await.map_err(|_| MemoryError::ConnectFailed)?;
            client.execute("insert").await?;
            Err(MemoryError::Unavailable { client: 0 })
        }

        for _ in 0..5 {
            assert!(failing_body(&pool).await.is_err());
        }

        let stats = pool.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_keeps_minimum() {
        let connector = MemoryConnector::new();
        let pool = ConnectionPool::new("datastore", config(1, 3), connector.clone());

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let c = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().total, 3);
        drop((a, b, c));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let removed = pool.cleanup_expired_connections().await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(pool.stats().total, 1);
        assert_eq!(connector.closed(), 2);
        assert_eq!(pool.cleanup_expired_connections().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_skips_recently_used() {
        let pool = ConnectionPool::new("datastore", config(0, 3), MemoryConnector::new());
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        drop(a);
        tokio::time::sleep(Duration::from_millis(900)).await;
        drop(b);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(pool.cleanup_expired_connections().await.unwrap(), 1);
        assert_eq!(pool.stats().total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_reports_close_failure_after_removing() {
        let connector = MemoryConnector::new();
        let pool = ConnectionPool::new("datastore", config(0, 2), connector.clone());
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        drop((a, b));

        connector.set_fail_close(true);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let err = pool.cleanup_expired_connections().await.unwrap_err();
        assert!(matches!(err, MemoryError::CloseFailed { .. }));
        assert_eq!(pool.stats().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_all_then_reinitialize() {
        let connector = MemoryConnector::new();
        let pool = ConnectionPool::new("datastore", config(2, 4), connector.clone());
        pool.initialize().await.unwrap();
        let lent = pool.acquire().await.unwrap();

        assert_eq!(pool.close_all_connections().await.unwrap(), 1);
        assert!(!pool.is_initialized());
        assert_eq!(pool.stats().total, 0);

        drop(lent);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(connector.open_now(), 0);
        assert_eq!(pool.stats().available, 0);

        let again = pool.acquire().await.unwrap();
        assert_eq!(connector.authentications(), 2);
        assert_eq!(pool.stats().total, 2);
        drop(again);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_use_never_exceeds_max() {
        let pool = Arc::new(ConnectionPool::new(
            "datastore",
            config(1, 4),
            MemoryConnector::new(),
        ));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    match pool.acquire().await {
                        Ok(client) => {
                            assert!(pool.stats().in_use <= 4);
                            tokio::time::sleep(Duration::from_millis(10 + i % 7)).await;
                            drop(client);
                            true
                        }
                        Err(e) => {
                            assert!(e.is_exhausted());
                            false
                        }
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let stats = pool.stats();
        assert!(stats.total <= 4);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.available, stats.total);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_returned_when_task_panics() {
        let pool = Arc::new(ConnectionPool::new(
            "datastore",
            config(1, 1),
            MemoryConnector::new(),
        ));

        let task_pool = Arc::clone(&pool);
        let result = tokio::spawn(async move {
            let _client = task_pool.acquire().await.unwrap();
            panic!("handler blew up");
        })
        .await;

        assert!(result.unwrap_err().is_panic());
        let stats = pool.stats();
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.available, 1);
    }
}
