//! Pooled connection bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough; IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A backend handle plus the timestamps the pool needs to expire it.
#[derive(Debug)]
pub struct PooledConnection<H> {
    id: ConnectionId,
    handle: H,
    created_at: Instant,
    last_used_at: Instant,
    in_use: bool,
}

impl<H> PooledConnection<H> {
    pub fn new(handle: H) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            handle,
            created_at: now,
            last_used_at: now,
            in_use: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// Mark as lent out.
    pub fn checkout(&mut self) {
        self.in_use = true;
        self.last_used_at = Instant::now();
    }

    /// Mark as back in the idle set.
    pub fn checkin(&mut self) {
        self.in_use = false;
        self.last_used_at = Instant::now();
    }

    /// Time since last use; zero while lent out.
    pub fn idle_for(&self) -> Duration {
        if self.in_use {
            Duration::ZERO
        } else {
            self.last_used_at.elapsed()
        }
    }

    pub fn into_handle(self) -> H {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert!(a.to_string().starts_with("conn-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_clock_restarts_on_checkin() {
        let mut conn = PooledConnection::new("client");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(conn.idle_for(), Duration::from_secs(5));

        conn.checkout();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(conn.is_in_use());
        assert_eq!(conn.idle_for(), Duration::ZERO);

        conn.checkin();
        assert_eq!(conn.idle_for(), Duration::ZERO);
        assert!(conn.last_used_at() > conn.created_at());
        assert_eq!(conn.into_handle(), "client");
    }
}
