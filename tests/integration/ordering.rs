//! Result length and launch-order tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use fanout::{BoxError, FailurePolicy};

use crate::fixtures::{
    index_after_reversed_sleep, owned_executor, shared_executor, CallCounter,
};

/// Test: Length matches n
/// Given batches of several sizes
/// When each runs to completion
/// Then exactly n values come back
#[test]
fn test_result_length_matches_n() {
    let executor = owned_executor(FailurePolicy::FailFast);
    for n in [0usize, 1, 2, 3, 10, 32] {
        let values = executor
            .run_batch_blocking(n, || Ok::<_, BoxError>("x"))
            .unwrap();
        assert_eq!(values.len(), n, "batch of {} returned {} values", n, values.len());

        let outcomes = executor
            .run_batch_collect_blocking(n, || Ok::<_, BoxError>("x"))
            .unwrap();
        assert_eq!(outcomes.len(), n);
    }
}

/// Test: Empty batch
/// Given n == 0
/// When the batch runs under either policy
/// Then the result is empty and work never runs
#[test]
fn test_empty_batch_never_invokes_work() {
    let counter = CallCounter::new();
    let executor = owned_executor(FailurePolicy::FailFast);

    let c = counter.clone();
    let values = executor
        .run_batch_blocking(0, move || {
            c.hit();
            Ok::<_, BoxError>(())
        })
        .unwrap();
    assert!(values.is_empty());

    let c = counter.clone();
    let outcomes = executor
        .run_batch_collect_blocking(0, move || {
            c.hit();
            Ok::<_, BoxError>(())
        })
        .unwrap();
    assert!(outcomes.is_empty());

    assert_eq!(counter.count(), 0, "work must not be invoked for n == 0");
}

/// Test: Work runs exactly once per slot
#[test]
fn test_each_task_invoked_once() {
    let counter = CallCounter::new();
    let executor = owned_executor(FailurePolicy::FailFast);

    let c = counter.clone();
    executor
        .run_batch_blocking(7, move || {
            c.hit();
            Ok::<_, BoxError>(())
        })
        .unwrap();

    assert_eq!(counter.count(), 7);
}

/// Test: Launch order is preserved for synchronous work
/// Given task i sleeps longest when i == 0
/// When the batch completes
/// Then the values are [0, 1, ..., n-1]
#[test]
fn test_sync_results_follow_launch_order() {
    const N: usize = 6;
    let executor = owned_executor(FailurePolicy::FailFast);

    let values = executor
        .pool()
        .block_on(executor.run_batch_indexed(N, index_after_reversed_sleep(N, 25)))
        .unwrap()
        .unwrap();

    assert_eq!(values, (0..N).collect::<Vec<_>>());
}

/// Test: Launch order is preserved under collect-all
#[test]
fn test_collect_all_results_follow_launch_order() {
    const N: usize = 5;
    let executor = owned_executor(FailurePolicy::CollectAll);

    let outcomes = executor
        .pool()
        .block_on(executor.run_batch_collect_indexed(N, index_after_reversed_sleep(N, 20)))
        .unwrap();

    let values: Vec<usize> = outcomes.into_iter().map(|o| o.unwrap()).collect();
    assert_eq!(values, (0..N).collect::<Vec<_>>());
}

/// Test: Launch order is preserved for async work
/// Given a zero-argument factory that hands out indices as it is called
/// When later tasks finish first
/// Then slot i still holds the i-th launch
#[tokio::test(flavor = "multi_thread")]
async fn test_async_results_follow_launch_order() {
    const N: usize = 8;
    let executor = shared_executor();
    let next = AtomicUsize::new(0);

    let values = executor
        .run_batch_async(N, || {
            let index = next.fetch_add(1, Ordering::SeqCst);
            async move {
                let delay = crate::fixtures::reversed_delay(index, N, 10);
                tokio::time::sleep(delay).await;
                Ok::<_, BoxError>(index)
            }
        })
        .await
        .unwrap();

    assert_eq!(values, (0..N).collect::<Vec<_>>());
}

/// Test: The report lists slots in launch order
#[test]
fn test_report_slots_follow_launch_order() {
    const N: usize = 4;
    let executor = owned_executor(FailurePolicy::CollectAll);

    let report = executor
        .run_blocking(N, index_after_reversed_sleep(N, 15))
        .unwrap();

    let indices: Vec<usize> = report.slots.iter().map(|s| s.index).collect();
    let values: Vec<usize> = report.values().copied().collect();
    assert_eq!(indices, (0..N).collect::<Vec<_>>());
    assert_eq!(values, (0..N).collect::<Vec<_>>());
}
