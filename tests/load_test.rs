//! Concurrency tests: many tasks sharing one breaker and one pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use service_resilience::pool::PoolError;
use service_resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};

mod common;
use common::memory_pool;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bound_holds_under_load() {
    let (pool, connector) = memory_pool(2, 5, Duration::from_millis(500));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let pool = Arc::clone(&pool);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                let client = match pool.acquire().await {
                    Ok(client) => client,
                    Err(e) => {
                        assert!(e.is_exhausted());
                        return;
                    }
                };
                peak.fetch_max(pool.stats().in_use, Ordering::SeqCst);
                client.execute(&format!("op-{i}")).await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let stats = pool.stats();
    assert!(peak.load(Ordering::SeqCst) <= 5);
    assert!(stats.total <= 5);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.available, stats.total);
    assert_eq!(connector.open_now() as usize, stats.total);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_breaker_shared_across_tasks_stays_consistent() {
    let registry = CircuitBreakerRegistry::new();
    let config = CircuitBreakerConfig::default()
        .with_failure_threshold(1_000)
        .with_timeout(Duration::from_secs(5));

    let tasks: Vec<_> = (0..200u32)
        .map(|i| {
            let registry = registry.clone();
            let config = config.clone();
            tokio::spawn(async move {
                let breaker = registry.get_or_create("firestore", config);
                let _ = breaker
                    .call(|| async move {
                        if i % 4 == 0 {
                            Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset))
                        } else {
                            Ok(i)
                        }
                    })
                    .await;
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let stats = registry.get("firestore").unwrap().stats();
    assert_eq!(registry.len(), 1);
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.total_requests, 200);
    assert_eq!(stats.total_failures, 50);
    assert_eq!(stats.failure_count, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_bodies_never_leak_connections() {
    let (pool, _connector) = memory_pool(1, 3, Duration::from_millis(500));

    let tasks: Vec<_> = (0..30)
        .map(|i| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let result: Result<(), PoolError<std::io::Error>> = async {
                    let _client = pool.acquire().await.map_err(|_| {
                        PoolError::Backend(std::io::Error::from(std::io::ErrorKind::Other))
                    })?;
                    if i % 2 == 0 {
                        return Err(PoolError::Backend(std::io::Error::from(
                            std::io::ErrorKind::InvalidData,
                        )));
                    }
                    Ok(())
                }
                .await;
                assert_eq!(result.is_err(), i % 2 == 0);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.available, stats.total);
}
