//! Fan-out/fan-in executor.
//!
//! An `Executor` launches N independent units of work at once on its
//! `WorkerPool`, then waits for all of them and hands back their results in
//! launch order. Completion order never leaks into the result: every task is
//! tagged with its launch index and the join loop writes each outcome into
//! that index's slot only.
//!
//! Two failure policies are offered:
//!
//! - **Fail-fast** (`run_batch*`): the first failure is returned as
//!   `Error::WorkFailed` as soon as it is observed. Outstanding async tasks
//!   are aborted; synchronous work already running on a blocking thread is
//!   left to finish and its result is discarded.
//! - **Collect-all** (`run_batch_collect*`): every task is awaited and one
//!   `Outcome` per slot is returned. Nothing is raised automatically.
//!
//! Synchronous work runs on the pool's blocking threads, so a batch executes
//! in parallel even when each unit of work blocks.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinSet;

use crate::config::{Config, ExecutorConfig};
use crate::error::{BoxError, WorkError};
use crate::pool::WorkerPool;
use crate::report::{BatchId, BatchReport};
use crate::{flog_debug, flog_trace, flog_warn, util, Error, Result};

/// Value or error produced by one task.
pub type Outcome<V> = std::result::Result<V, WorkError>;

type Joined<V> = JoinSet<(usize, Outcome<V>)>;

/// How failures inside a batch are reported.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Report the first failure and stop waiting.
    #[default]
    FailFast,
    /// Wait for every task and report each outcome.
    CollectAll,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::CollectAll => write!(f, "collect-all"),
        }
    }
}

/// Convert a caller-supplied count into a batch length.
///
/// # Errors
///
/// Returns `InvalidArgument` for negative counts.
pub fn batch_len(count: i64) -> Result<usize> {
    usize::try_from(count)
        .map_err(|_| Error::InvalidArgument(format!("task count must be >= 0, got {count}")))
}

/// Runs batches of independent work on a shared `WorkerPool`.
///
/// # Example
///
/// ```ignore
/// use fanout::Executor;
///
/// let executor = Executor::with_defaults()?;
/// let values = executor.run_batch_blocking(3, || Ok::<_, std::io::Error>(42))?;
/// assert_eq!(values, vec![42, 42, 42]);
/// ```
#[derive(Debug, Clone)]
pub struct Executor {
    pool: Arc<WorkerPool>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(pool: Arc<WorkerPool>, config: ExecutorConfig) -> Self {
        Self { pool, config }
    }

    /// Build an executor with its own pool from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.executor.validate()?;
        let pool = WorkerPool::new(&config.pool)?;
        Ok(Self::new(Arc::new(pool), config.executor.clone()))
    }

    /// Owned pool, fail-fast, no deadline.
    pub fn with_defaults() -> Result<Self> {
        Self::from_config(&Config::default())
    }

    /// Executor sharing the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        Ok(Self::new(
            Arc::new(WorkerPool::current(None)?),
            ExecutorConfig::default(),
        ))
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Set the join deadline, rounded up to whole milliseconds (at least 1).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.timeout_ms = timeout.map(|d| {
            u64::try_from(d.as_nanos().div_ceil(1_000_000))
                .unwrap_or(u64::MAX)
                .max(1)
        });
        self
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn policy(&self) -> FailurePolicy {
        self.config.policy
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config.timeout()
    }

    // ------------------------------------------------------------------
    // Fail-fast
    // ------------------------------------------------------------------

    /// Run `n` copies of synchronous `work` and return their values in launch order.
    ///
    /// # Errors
    ///
    /// `WorkFailed` for the first task that fails or panics, `Timeout` if
    /// the configured deadline passes first.
    pub async fn run_batch<V, E, F>(&self, n: usize, work: F) -> Result<Vec<V>>
    where
        F: Fn() -> std::result::Result<V, E> + Send + Sync + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.run_batch_indexed(n, move |_| work()).await
    }

    /// Like `run_batch`, but `work` is told its launch index.
    pub async fn run_batch_indexed<V, E, F>(&self, n: usize, work: F) -> Result<Vec<V>>
    where
        F: Fn(usize) -> std::result::Result<V, E> + Send + Sync + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        if n == 0 {
            return Ok(Vec::new());
        }
        let batch = BatchId::new();
        let set = self.spawn_blocking_work(batch, n, work);
        self.join_fail_fast(batch, n, set).await
    }

    /// Run `n` futures built by `work` and return their values in launch order.
    ///
    /// `work` is called once per task, in launch order, on the calling thread.
    pub async fn run_batch_async<V, E, F, Fut>(&self, n: usize, work: F) -> Result<Vec<V>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        if n == 0 {
            return Ok(Vec::new());
        }
        let batch = BatchId::new();
        let set = self.spawn_async_work(batch, n, move |_| work());
        self.join_fail_fast(batch, n, set).await
    }

    /// Blocking form of `run_batch` for synchronous callers.
    ///
    /// # Errors
    ///
    /// In addition to the `run_batch` errors, `InvalidArgument` when called
    /// from inside an async context.
    pub fn run_batch_blocking<V, E, F>(&self, n: usize, work: F) -> Result<Vec<V>>
    where
        F: Fn() -> std::result::Result<V, E> + Send + Sync + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.pool.block_on(self.run_batch(n, work))?
    }

    // ------------------------------------------------------------------
    // Collect-all
    // ------------------------------------------------------------------

    /// Run `n` copies of synchronous `work` and return every outcome in launch order.
    pub async fn run_batch_collect<V, E, F>(&self, n: usize, work: F) -> Vec<Outcome<V>>
    where
        F: Fn() -> std::result::Result<V, E> + Send + Sync + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.run_batch_collect_indexed(n, move |_| work()).await
    }

    pub async fn run_batch_collect_indexed<V, E, F>(&self, n: usize, work: F) -> Vec<Outcome<V>>
    where
        F: Fn(usize) -> std::result::Result<V, E> + Send + Sync + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        if n == 0 {
            return Vec::new();
        }
        let batch = BatchId::new();
        let set = self.spawn_blocking_work(batch, n, work);
        self.join_collect_all(batch, n, set).await
    }

    pub async fn run_batch_collect_async<V, E, F, Fut>(&self, n: usize, work: F) -> Vec<Outcome<V>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        if n == 0 {
            return Vec::new();
        }
        let batch = BatchId::new();
        let set = self.spawn_async_work(batch, n, move |_| work());
        self.join_collect_all(batch, n, set).await
    }

    pub fn run_batch_collect_blocking<V, E, F>(&self, n: usize, work: F) -> Result<Vec<Outcome<V>>>
    where
        F: Fn() -> std::result::Result<V, E> + Send + Sync + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.pool.block_on(self.run_batch_collect(n, work))
    }

    // ------------------------------------------------------------------
    // Policy-driven
    // ------------------------------------------------------------------

    /// Run a batch under the configured policy and summarize it.
    ///
    /// Under fail-fast a failure is returned as an error and no report is
    /// produced; under collect-all failures appear in their slots.
    pub async fn run<V, E, F>(&self, n: usize, work: F) -> Result<BatchReport<V>>
    where
        F: Fn(usize) -> std::result::Result<V, E> + Send + Sync + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let started = Instant::now();
        let batch = BatchId::new();
        let policy = self.policy();

        let outcomes = if n == 0 {
            Vec::new()
        } else {
            let set = self.spawn_blocking_work(batch, n, work);
            match policy {
                FailurePolicy::FailFast => self
                    .join_fail_fast(batch, n, set)
                    .await?
                    .into_iter()
                    .map(Ok)
                    .collect(),
                FailurePolicy::CollectAll => self.join_collect_all(batch, n, set).await,
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(BatchReport::from_outcomes(batch, policy, elapsed_ms, outcomes))
    }

    pub fn run_blocking<V, E, F>(&self, n: usize, work: F) -> Result<BatchReport<V>>
    where
        F: Fn(usize) -> std::result::Result<V, E> + Send + Sync + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.pool.block_on(self.run(n, work))?
    }

    // ------------------------------------------------------------------
    // Launch and join
    // ------------------------------------------------------------------

    fn spawn_blocking_work<V, E, F>(&self, batch: BatchId, n: usize, work: F) -> Joined<V>
    where
        F: Fn(usize) -> std::result::Result<V, E> + Send + Sync + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let work = Arc::new(work);
        let handle = self.pool.handle().clone();
        self.launch(batch, n, move |index| {
            let work = Arc::clone(&work);
            let handle = handle.clone();
            // Held until the closure returns, even if this task is aborted.
            move |permit: Option<OwnedSemaphorePermit>| async move {
                util::blocking(&handle, permit, move || (*work)(index)).await
            }
        })
    }

    fn spawn_async_work<V, E, F, Fut>(&self, batch: BatchId, n: usize, mut work: F) -> Joined<V>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        V: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.launch(batch, n, move |index| {
            // A factory that panics before handing back a future fails its
            // own slot like any other task.
            let made = std::panic::catch_unwind(AssertUnwindSafe(|| work(index)));
            move |permit: Option<OwnedSemaphorePermit>| async move {
                let _permit = permit;
                match made {
                    Ok(fut) => fut.await.map_err(WorkError::failed),
                    Err(payload) => Err(WorkError::from_panic(payload)),
                }
            }
        })
    }

    /// Spawn all `n` tasks without waiting on any of them.
    ///
    /// `make` is called in launch order on the calling thread. The starter
    /// it returns runs inside the spawned task once a concurrency permit is
    /// held, and owns that permit from then on.
    fn launch<V, S, Fut>(
        &self,
        batch: BatchId,
        n: usize,
        mut make: impl FnMut(usize) -> S,
    ) -> Joined<V>
    where
        S: FnOnce(Option<OwnedSemaphorePermit>) -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<V>> + Send + 'static,
        V: Send + 'static,
    {
        flog_debug!(
            "batch {} launching {} tasks (max_concurrency={:?})",
            batch.short(),
            n,
            self.pool.max_concurrency()
        );

        let mut set = JoinSet::new();
        for index in 0..n {
            let start = make(index);
            let limit = self.pool.limiter();
            set.spawn_on(
                async move {
                    let permit = WorkerPool::acquire(limit).await;
                    let outcome = match AssertUnwindSafe(start(permit)).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(payload) => Err(WorkError::from_panic(payload)),
                    };
                    (index, outcome)
                },
                self.pool.handle(),
            );
        }
        set
    }

    async fn join_fail_fast<V>(&self, batch: BatchId, n: usize, mut set: Joined<V>) -> Result<Vec<V>>
    where
        V: Send + 'static,
    {
        let mut slots: Vec<Option<V>> = (0..n).map(|_| None).collect();

        let joined = util::with_deadline(self.timeout(), async {
            while let Some(joined) = set.join_next().await {
                let (index, outcome) = joined.map_err(|e| Error::TaskJoin(e.to_string()))?;
                match outcome {
                    Ok(value) => {
                        flog_trace!("batch {} task {} completed", batch.short(), index);
                        slots[index] = Some(value);
                    }
                    Err(source) => return Err(Error::WorkFailed { index, source }),
                }
            }
            Ok::<(), Error>(())
        })
        .await;

        if let Err(err) = joined.and_then(|inner| inner) {
            flog_warn!(
                "batch {} aborted with {} tasks outstanding: {}",
                batch.short(),
                set.len(),
                err
            );
            set.abort_all();
            return Err(err);
        }

        flog_debug!("batch {} joined {} tasks", batch.short(), n);
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| Error::TaskJoin(format!("task {index} produced no result")))
            })
            .collect()
    }

    async fn join_collect_all<V>(&self, batch: BatchId, n: usize, mut set: Joined<V>) -> Vec<Outcome<V>>
    where
        V: Send + 'static,
    {
        let mut slots: Vec<Option<Outcome<V>>> = (0..n).map(|_| None).collect();

        let joined = util::with_deadline(self.timeout(), async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, outcome)) => {
                        if let Err(err) = &outcome {
                            flog_warn!("batch {} task {} failed: {}", batch.short(), index, err);
                        } else {
                            flog_trace!("batch {} task {} completed", batch.short(), index);
                        }
                        slots[index] = Some(outcome);
                    }
                    // Only happens if the pool's runtime is shutting down; the
                    // affected slot is filled as cancelled below.
                    Err(err) => flog_warn!("batch {} lost a task: {}", batch.short(), err),
                }
            }
        })
        .await;

        let deadline = match joined {
            Ok(()) => None,
            Err(Error::Timeout(duration)) => {
                flog_warn!(
                    "batch {} deadline of {:?} passed with {} tasks outstanding",
                    batch.short(),
                    duration,
                    set.len()
                );
                set.abort_all();
                Some(duration)
            }
            Err(_) => None,
        };

        flog_debug!("batch {} collected {} outcomes", batch.short(), n);
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| match deadline {
                    Some(duration) => Err(WorkError::TimedOut(duration)),
                    None => Err(WorkError::Cancelled),
                })
            })
            .collect()
    }
}
