//! Injected pools, concurrency limits and repeatability.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fanout::config::ExecutorConfig;
use fanout::worker::DemoWorker;
use fanout::{BoxError, Error, Executor, FailurePolicy, WorkerPool};

use crate::fixtures::{limited_executor, shared_pool, ConcurrencyMeter};

/// Test: Concurrency limit caps running tasks
/// Given a pool limited to 2
/// When 6 tasks run
/// Then at most 2 are ever running and all 6 finish
#[test]
fn test_concurrency_limit_is_respected() {
    let executor = limited_executor(2);
    let meter = ConcurrencyMeter::new();

    let p = meter.clone();
    let values = executor
        .run_batch_blocking(6, move || {
            p.hold(Duration::from_millis(40));
            Ok::<_, BoxError>(())
        })
        .unwrap();

    assert_eq!(values.len(), 6);
    assert!(meter.peak() <= 2, "peak concurrency was {}", meter.peak());
    assert_eq!(executor.pool().available_permits(), Some(2));
}

/// Test: Limit of 1 serializes the batch but keeps order
#[test]
fn test_limit_of_one_still_preserves_order() {
    let executor = limited_executor(1);
    let started = Instant::now();

    let values = executor
        .pool()
        .block_on(executor.run_batch_indexed(3, |index| {
            std::thread::sleep(Duration::from_millis(30));
            Ok::<_, BoxError>(index)
        }))
        .unwrap()
        .unwrap();

    assert_eq!(values, vec![0, 1, 2]);
    assert!(started.elapsed() >= Duration::from_millis(90));
}

/// Test: Unlimited pool runs every task at once
#[test]
fn test_unlimited_pool_runs_all_tasks_together() {
    let pool = shared_pool(None);
    let executor = Executor::new(pool, ExecutorConfig::default());
    let meter = ConcurrencyMeter::new();

    let p = meter.clone();
    executor
        .run_batch_blocking(4, move || {
            p.hold(Duration::from_millis(100));
            Ok::<_, BoxError>(())
        })
        .unwrap();

    assert_eq!(meter.peak(), 4);
}

/// Test: Two executors share one pool
#[test]
fn test_executors_share_a_pool() {
    let pool = shared_pool(Some(3));
    let fail_fast = Executor::new(Arc::clone(&pool), ExecutorConfig::default());
    let collect_all = Executor::new(Arc::clone(&pool), ExecutorConfig::default())
        .with_policy(FailurePolicy::CollectAll);

    assert!(Arc::ptr_eq(fail_fast.pool(), collect_all.pool()));

    let values = fail_fast
        .run_batch_blocking(3, || Ok::<_, BoxError>(1))
        .unwrap();
    let outcomes = collect_all
        .run_batch_collect_blocking(3, || Ok::<_, BoxError>(2))
        .unwrap();

    assert_eq!(values, vec![1, 1, 1]);
    assert!(outcomes.iter().all(|o| matches!(o, Ok(2))));
    assert_eq!(pool.available_permits(), Some(3));
}

/// Test: Executor on the caller's runtime
#[tokio::test(flavor = "multi_thread")]
async fn test_pool_from_current_runtime() {
    let pool = Arc::new(WorkerPool::current(Some(2)).unwrap());
    let executor = Executor::new(pool, ExecutorConfig::default());
    assert!(!executor.pool().is_owned());

    let values = executor
        .run_batch(3, || Ok::<_, BoxError>("shared"))
        .await
        .unwrap();
    assert_eq!(values, vec!["shared"; 3]);
}

/// Test: Deterministic work gives the same sequence twice
#[test]
fn test_repeated_batches_are_identical() {
    let executor = limited_executor(4);
    let worker = DemoWorker::new(Duration::from_millis(5));

    let w = worker.clone();
    let first = executor
        .pool()
        .block_on(executor.run_batch_indexed(5, move |index| w.value(index)))
        .unwrap()
        .unwrap();
    let w = worker.clone();
    let second = executor
        .pool()
        .block_on(executor.run_batch_indexed(5, move |index| w.value(index)))
        .unwrap()
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first.iter().map(|v| v.value).collect::<Vec<_>>(),
        vec![1, 4, 9, 16, 25]
    );
}

/// Test: A batch abandoned at its deadline keeps its permit
/// Given a pool limited to 1 whose only task outlives a 50ms deadline
/// When a second batch runs right after the timeout
/// Then it waits for the abandoned task and never runs beside it
#[test]
fn test_limit_holds_after_deadline_abandons_batch() {
    let pool = shared_pool(Some(1));
    let hurried = Executor::new(Arc::clone(&pool), ExecutorConfig::default())
        .with_timeout(Some(Duration::from_millis(50)));
    let patient = Executor::new(Arc::clone(&pool), ExecutorConfig::default());
    let meter = ConcurrencyMeter::new();

    let p = meter.clone();
    let result = hurried.run_batch_blocking(1, move || {
        p.hold(Duration::from_millis(400));
        Ok::<_, BoxError>(())
    });
    assert!(matches!(result, Err(Error::Timeout(_))));

    let p = meter.clone();
    patient
        .run_batch_blocking(2, move || {
            p.hold(Duration::from_millis(20));
            Ok::<_, BoxError>(())
        })
        .unwrap();

    println!("peak after deadline: {}", meter.peak());
    assert_eq!(meter.peak(), 1);
    assert_eq!(pool.available_permits(), Some(1));
}

/// Test: Fail-fast leftovers still count against the limit
/// Given a pool limited to 2 where task 0 fails early and task 1 keeps running
/// When a follow-up batch of 2 runs immediately
/// Then no more than 2 tasks are ever running across both batches
#[test]
fn test_limit_holds_after_fail_fast_abandons_batch() {
    let pool = shared_pool(Some(2));
    let executor = Executor::new(Arc::clone(&pool), ExecutorConfig::default());
    let meter = ConcurrencyMeter::new();

    let p = meter.clone();
    let result = executor.run_blocking(2, move |index| {
        if index == 0 {
            std::thread::sleep(Duration::from_millis(30));
            return Err("early failure");
        }
        p.hold(Duration::from_millis(400));
        Ok(index)
    });
    assert!(matches!(result, Err(Error::WorkFailed { index: 0, .. })));

    let p = meter.clone();
    executor
        .run_batch_blocking(2, move || {
            p.hold(Duration::from_millis(50));
            Ok::<_, BoxError>(())
        })
        .unwrap();

    println!("peak after fail-fast: {}", meter.peak());
    assert!(meter.peak() <= 2, "peak concurrency was {}", meter.peak());
}
