//! Resilience simulator.
//!
//! Drives a burst of concurrent calls against an in-process backend, each
//! protected by a circuit breaker and borrowing a pooled client, then prints
//! the breaker and pool snapshots as JSON.
//!
//! ```text
//! resilience-sim --calls 500 --concurrency 16 --failure-rate 0.3 --latency-ms 25
//! ```

use clap::Parser;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use service_resilience::config::{load_config, ResilienceConfig};
use service_resilience::lifecycle::{bootstrap, shutdown_signal};
use service_resilience::observability::{logging, metrics};
use service_resilience::pool::{MemoryConnector, PoolError};
use service_resilience::resilience::BreakerError;

#[derive(Parser)]
#[command(name = "resilience-sim")]
#[command(about = "Simulate dependency calls through a circuit breaker and connection pool", long_about = None)]
struct Cli {
    /// TOML config file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of calls to make
    #[arg(long, default_value_t = 200)]
    calls: u64,

    /// Calls in flight at once
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Fraction of backend operations that fail
    #[arg(long, default_value_t = 0.2)]
    failure_rate: f64,

    /// Backend latency per operation
    #[arg(long, default_value_t = 20)]
    latency_ms: u64,

    /// Dependency name the breaker is registered under
    #[arg(long, default_value = "datastore")]
    dependency: String,
}

#[derive(Default)]
struct Tally {
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
    exhausted: AtomicU64,
}

impl Tally {
    fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "succeeded": self.succeeded.load(Ordering::Relaxed),
            "failed": self.failed.load(Ordering::Relaxed),
            "rejected": self.rejected.load(Ordering::Relaxed),
            "timed_out": self.timed_out.load(Ordering::Relaxed),
            "exhausted": self.exhausted.load(Ordering::Relaxed),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("resilience-sim v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let connector = MemoryConnector::new()
        .with_latency(Duration::from_millis(cli.latency_ms))
        .with_failure_rate(cli.failure_rate);
    let stack = bootstrap(config, connector).await?;

    tracing::info!(
        dependency = %cli.dependency,
        calls = cli.calls,
        concurrency = cli.concurrency,
        failure_rate = cli.failure_rate,
        "Starting simulation"
    );

    let tally = Tally::default();
    {
        let protected = stack.protect(&cli.dependency);
        let protected = &protected;
        let pool = &stack.pool;
        let tally = &tally;

        let work = futures_util::stream::iter(0..cli.calls).for_each_concurrent(
            cli.concurrency.max(1),
            |i| async move {
                let outcome = protected
                    .call(|| async {
                        let client = pool.acquire().await?;
                        client
                            .execute(&format!("op-{i}"))
                            .await
                            .map_err(PoolError::Backend)
                    })
                    .await;

                let counter = match outcome {
                    Ok(_) => &tally.succeeded,
                    Err(BreakerError::Open { .. }) => &tally.rejected,
                    Err(BreakerError::Timeout { .. }) => &tally.timed_out,
                    Err(BreakerError::Inner(PoolError::Exhausted { .. })) => &tally.exhausted,
                    Err(_) => &tally.failed,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            },
        );

        tokio::select! {
            _ = work => tracing::info!("Simulation finished"),
            _ = shutdown_signal() => tracing::warn!("Interrupted, stopping early"),
        }
    }

    let report = serde_json::json!({
        "calls": tally.summary(),
        "breakers": stack.registry.snapshots(),
        "pool": stack.pool.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    stack.shutdown().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
