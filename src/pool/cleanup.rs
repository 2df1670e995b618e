//! Periodic idle-connection cleanup.
//!
//! # Responsibilities
//! - Call `cleanup_expired_connections` on a fixed interval
//! - Keep running no matter what cleanup returns
//! - Stop promptly when shutdown is broadcast

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::pool::connector::Connector;
use crate::pool::manager::ConnectionPool;

#[derive(Debug, Clone, Copy)]
pub struct CleanupScheduler {
    interval: Duration,
}

impl CleanupScheduler {
    /// Intervals below one millisecond are raised to one millisecond.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until `shutdown` fires or its sender is dropped.
    pub async fn run<C: Connector>(
        self,
        pool: Arc<ConnectionPool<C>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(
            pool = %pool.name(),
            interval_ms = self.interval.as_millis() as u64,
            "Cleanup scheduler starting"
        );

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match pool.cleanup_expired_connections().await {
                        Ok(0) => {}
                        Ok(removed) => tracing::debug!(pool = %pool.name(), removed, "Cleanup pass finished"),
                        Err(e) => tracing::error!(pool = %pool.name(), error = %e, "Connection cleanup failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!(pool = %pool.name(), "Cleanup scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub fn spawn<C: Connector>(
        self,
        pool: Arc<ConnectionPool<C>>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(pool, shutdown))
    }
}
