//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the breaker registry and the connection pool from config
//! - Initialize the pool so credential problems surface at startup
//! - Start the cleanup scheduler
//! - Tear everything down in reverse order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::ResilienceConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::pool::{CleanupScheduler, ConnectionPool, Connector, PoolError};
use crate::resilience::{protect, CircuitBreakerRegistry, Protected};

/// Everything a service needs to protect its dependency calls.
pub struct ResilienceStack<C: Connector> {
    pub config: ResilienceConfig,
    pub registry: CircuitBreakerRegistry,
    pub pool: Arc<ConnectionPool<C>>,
    shutdown: Shutdown,
    cleanup: Option<JoinHandle<()>>,
}

impl<C: Connector> ResilienceStack<C> {
    /// A wrapper for calls to `dependency`, configured from `breakers.<dependency>`.
    pub fn protect(&self, dependency: &str) -> Protected {
        protect(&self.registry, dependency, self.config.breaker_config(dependency))
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop the cleanup scheduler, then close the pool.
    pub async fn shutdown(mut self) -> Result<(), C::Error> {
        self.shutdown.trigger();
        if let Some(task) = self.cleanup.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Cleanup scheduler task failed");
            }
        }

        let closed = self.pool.close_all_connections().await?;
        tracing::info!(
            pool = %self.pool.name(),
            closed,
            breakers = self.registry.len(),
            "Resilience stack stopped"
        );
        Ok(())
    }
}

/// Build and start the stack over `connector`.
pub async fn bootstrap<C: Connector>(
    config: ResilienceConfig,
    connector: C,
) -> Result<ResilienceStack<C>, PoolError<C::Error>> {
    let registry = CircuitBreakerRegistry::new();
    let mut names: Vec<&String> = config.breakers.keys().collect();
    names.sort();
    for name in names {
        registry.get_or_create(name, config.breaker_config(name));
    }

    let pool = Arc::new(ConnectionPool::new(
        config.pool.name.clone(),
        config.pool.to_config(),
        connector,
    ));
    pool.initialize().await?;

    let shutdown = Shutdown::new();
    let cleanup = if config.cleanup.enabled {
        let scheduler = CleanupScheduler::new(config.cleanup.interval());
        Some(scheduler.spawn(Arc::clone(&pool), shutdown.subscribe()))
    } else {
        tracing::info!("Connection cleanup disabled");
        None
    };

    tracing::info!(
        pool = %pool.name(),
        breakers = registry.len(),
        cleanup = config.cleanup.enabled,
        "Resilience stack ready"
    );

    Ok(ResilienceStack {
        config,
        registry,
        pool,
        shutdown,
        cleanup,
    })
}
