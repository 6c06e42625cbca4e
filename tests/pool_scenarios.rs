//! Connection pool behaviour against a counting in-memory factory.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use netpool::pool::{PoolStats, DEFAULT_MAX_CONNS};
use netpool::{ConnectionPool, PoolConfig, PoolError};

mod common;
use common::CountingFactory;

fn config(factory: &CountingFactory, init: usize, max: usize, idle: usize) -> PoolConfig<CountingFactory> {
    PoolConfig::new(factory.clone())
        .init_conns(init)
        .max_conns(max)
        .max_idle(idle)
}

fn assert_bounds(stats: PoolStats) {
    assert!(stats.open <= stats.max_conns, "open {} > max {}", stats.open, stats.max_conns);
    assert!(stats.idle <= stats.max_idle, "idle {} > max_idle {}", stats.idle, stats.max_idle);
}

#[tokio::test]
async fn test_exhausted_pool_reuses_released_connection() {
    let factory = CountingFactory::new();
    let pool = ConnectionPool::new("fake:1", config(&factory, 2, 2, 2)).await.unwrap();
    assert_eq!(pool.size(), 2);
    assert_eq!(factory.created(), 2);

    let first = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();
    assert_ne!(first.id, second.id);

    assert!(matches!(pool.acquire().await, Err(PoolError::Exhausted)));

    let first_id = first.id;
    pool.release(first).await.unwrap();
    let again = pool.acquire().await.unwrap();
    assert_eq!(again.id, first_id);
    assert_eq!(factory.created(), 2);
}

#[tokio::test]
async fn test_stale_connection_replaced() {
    let factory = CountingFactory::new();
    let pool = ConnectionPool::new(
        "fake:1",
        config(&factory, 1, 1, 1).idle_timeout(Duration::from_millis(100)),
    )
    .await
    .unwrap();

    let conn = pool.acquire().await.unwrap();
    pool.release(conn).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let created = factory.created();
    let closed = factory.closed();

    let fresh = pool.acquire().await.unwrap();
    assert_eq!(factory.created(), created + 1);
    assert_eq!(factory.closed(), closed + 1);
    assert_eq!(fresh.id, created);
}

#[tokio::test]
async fn test_round_trip_restores_idle_len() {
    let factory = CountingFactory::new();
    let pool = ConnectionPool::new("fake:1", config(&factory, 3, 5, 3)).await.unwrap();

    let before = pool.size();
    let conn = pool.acquire().await.unwrap();
    pool.release(conn).await.unwrap();

    assert_eq!(pool.size(), before);
    assert_eq!(pool.open_count(), 0);
}

#[tokio::test]
async fn test_zero_max_uses_default() {
    let factory = CountingFactory::new();
    let pool = ConnectionPool::new("fake:1", config(&factory, 1, 0, 1)).await.unwrap();
    assert_eq!(pool.limits().max_conns, DEFAULT_MAX_CONNS);

    let mut held = Vec::new();
    for _ in 0..DEFAULT_MAX_CONNS {
        held.push(pool.acquire().await.unwrap());
    }
    assert!(matches!(pool.acquire().await, Err(PoolError::Exhausted)));
}

#[tokio::test]
async fn test_concurrent_acquires_up_to_max() {
    const MAX: usize = 8;
    let factory = CountingFactory::new();
    let pool = Arc::new(ConnectionPool::new("fake:1", config(&factory, 2, MAX, 2)).await.unwrap());

    let mut tasks = Vec::new();
    for _ in 0..MAX {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move { pool.acquire().await }));
    }

    let mut held = Vec::new();
    for task in tasks {
        held.push(task.await.unwrap().expect("acquire within capacity"));
    }
    assert_eq!(pool.open_count(), MAX);

    let mut ids: Vec<_> = held.iter().map(|c| c.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), MAX);

    assert!(matches!(pool.acquire().await, Err(PoolError::Exhausted)));
}

#[tokio::test]
async fn test_bounds_hold_across_mixed_operations() {
    let factory = CountingFactory::new();
    let pool = ConnectionPool::new("fake:1", config(&factory, 2, 3, 2)).await.unwrap();
    assert_bounds(pool.stats());

    let mut held = Vec::new();
    for step in 0..40 {
        if step % 3 == 2 {
            if let Some(conn) = held.pop() {
                pool.release(conn).await.unwrap();
            }
        } else {
            match pool.acquire().await {
                Ok(conn) => held.push(conn),
                Err(PoolError::Exhausted) => {
                    let conn = held.remove(0);
                    pool.release(conn).await.unwrap();
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_bounds(pool.stats());
        assert_eq!(pool.open_count(), held.len());
    }
}

#[tokio::test]
async fn test_idle_queue_is_fifo() {
    let factory = CountingFactory::new();
    let pool = ConnectionPool::new("fake:1", config(&factory, 2, 2, 2)).await.unwrap();

    let oldest = pool.acquire().await.unwrap();
    assert_eq!(oldest.id, 0);
    pool.release(oldest).await.unwrap();

    // 1 has been idle longer than 0 now.
    assert_eq!(pool.acquire().await.unwrap().id, 1);
}

#[tokio::test]
async fn test_overflow_release_closes_connection() {
    let factory = CountingFactory::new();
    let pool = ConnectionPool::new("fake:1", config(&factory, 1, 2, 1)).await.unwrap();

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    pool.release(a).await.unwrap();
    pool.release(b).await.unwrap();

    assert_eq!(pool.size(), 1);
    assert_eq!(factory.closed(), 1);
    assert_eq!(pool.open_count(), 0);
}

#[tokio::test]
async fn test_failed_ping_evicts_and_dials() {
    let factory = CountingFactory::new();
    let pool = ConnectionPool::new("fake:1", config(&factory, 1, 1, 1)).await.unwrap();
    factory.fail_ping.store(true, Ordering::SeqCst);

    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.id, 1);
    assert_eq!(factory.pinged(), 1);
    assert_eq!(factory.closed_ids(), vec![0]);
}

#[tokio::test]
async fn test_shutdown_closes_each_idle_once() {
    let factory = CountingFactory::new();
    let pool = ConnectionPool::new("fake:1", config(&factory, 3, 4, 3)).await.unwrap();
    let held = pool.acquire().await.unwrap();

    pool.shutdown().await.unwrap();
    let mut closed = factory.closed_ids();
    closed.sort_unstable();
    assert_eq!(closed, vec![1, 2]);

    pool.shutdown().await.unwrap();
    assert_eq!(factory.closed(), 2);

    assert!(pool.is_closed());
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));

    // Checked-out connections are closed on their way back.
    assert!(matches!(pool.release(held).await, Err(PoolError::Closed)));
    assert_eq!(factory.closed_ids().last(), Some(&0));
}

#[tokio::test]
async fn test_acquire_timeout_handoff_between_tasks() {
    let factory = CountingFactory::new();
    let pool = Arc::new(ConnectionPool::new("fake:1", config(&factory, 1, 1, 1)).await.unwrap());

    let conn = pool.acquire().await.unwrap();
    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire_timeout(Duration::from_secs(2)).await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());
    pool.release(conn).await.unwrap();

    let handed_over = waiter.await.unwrap().unwrap();
    assert_eq!(handed_over.id, 0);
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn test_cancelled_health_check_keeps_connection() {
    let factory = CountingFactory::new();
    factory.slow_ping(Duration::from_millis(200));
    let pool = ConnectionPool::new("fake:1", config(&factory, 1, 1, 1)).await.unwrap();

    let cancelled = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
    assert!(cancelled.is_err());
    assert_eq!(factory.pinged(), 1);
    assert_eq!(pool.open_count(), 0);
    assert_eq!(pool.size(), 1);
    assert_eq!(factory.closed(), 0);

    pool.shutdown().await.unwrap();
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.closed_ids(), vec![0]);
}

#[tokio::test]
async fn test_cancelled_health_check_after_shutdown_closes_connection() {
    let factory = CountingFactory::new();
    factory.slow_ping(Duration::from_millis(200));
    let pool = Arc::new(ConnectionPool::new("fake:1", config(&factory, 1, 1, 1)).await.unwrap());

    let acquiring = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await })
    };
    common::wait_until(|| factory.pinged() == 1).await;

    // The idle queue is empty, so shutdown itself closes nothing.
    pool.shutdown().await.unwrap();
    assert_eq!(factory.closed(), 0);

    acquiring.abort();
    assert!(acquiring.await.unwrap_err().is_cancelled());
    common::wait_until(|| factory.closed() == 1).await;
    assert_eq!(factory.closed_ids(), vec![0]);
    assert_eq!(pool.open_count(), 0);
}

#[tokio::test]
async fn test_huge_acquire_timeout_does_not_overflow() {
    let factory = CountingFactory::new();
    let pool = Arc::new(ConnectionPool::new("fake:1", config(&factory, 1, 1, 1)).await.unwrap());
    let conn = pool.acquire().await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire_timeout(Duration::MAX).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());

    pool.release(conn).await.unwrap();
    let reused = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter should wake on release")
        .unwrap()
        .unwrap();
    assert_eq!(reused.id, 0);
}
