//! Worker pool backing the executor.
//!
//! A `WorkerPool` is the explicit home of the threads a batch runs on. It
//! either owns a multi-thread tokio runtime built from `PoolConfig`, or
//! borrows a handle to a runtime owned elsewhere so several executors (or a
//! host application) can share one set of threads. An optional semaphore
//! bounds how many tasks of a batch run at the same time.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;
use crate::{flog_debug, Error, Result};

/// Threads and concurrency limit used to run a batch.
///
/// # Example
///
/// ```ignore
/// use fanout::config::PoolConfig;
/// use fanout::pool::WorkerPool;
///
/// let pool = WorkerPool::new(&PoolConfig::with_max_concurrency(4))?;
/// assert!(pool.is_owned());
/// assert_eq!(pool.max_concurrency(), Some(4));
/// ```
pub struct WorkerPool {
    /// Runtime created by and shut down with this pool; `None` when shared.
    runtime: Option<Runtime>,
    handle: Handle,
    /// Permits bounding concurrent tasks, if limited.
    limit: Option<Arc<Semaphore>>,
    max_concurrency: Option<usize>,
}

impl WorkerPool {
    /// Build a pool with its own multi-thread runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for zero-sized settings and `Io` if the
    /// runtime cannot be started.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Builder::new_multi_thread();
        builder.enable_time().thread_name(config.thread_name.clone());
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads);
        }
        if let Some(threads) = config.max_blocking_threads {
            builder.max_blocking_threads(threads);
        }
        let runtime = builder.build()?;
        let handle = runtime.handle().clone();

        flog_debug!(
            "WorkerPool::new owned runtime thread_name={} worker_threads={:?} max_concurrency={:?}",
            config.thread_name,
            config.worker_threads,
            config.max_concurrency
        );

        Ok(Self {
            runtime: Some(runtime),
            handle,
            limit: config.max_concurrency.map(|n| Arc::new(Semaphore::new(n))),
            max_concurrency: config.max_concurrency,
        })
    }

    /// Share an existing runtime.
    pub fn from_handle(handle: Handle, max_concurrency: Option<usize>) -> Result<Self> {
        if max_concurrency == Some(0) {
            return Err(Error::InvalidArgument(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            runtime: None,
            handle,
            limit: max_concurrency.map(|n| Arc::new(Semaphore::new(n))),
            max_concurrency,
        })
    }

    /// Share the runtime the caller is currently running on.
    pub fn current(max_concurrency: Option<usize>) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::InvalidArgument(format!("no tokio runtime available: {e}")))?;
        Self::from_handle(handle, max_concurrency)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_owned(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// Permits currently free, or `None` when unbounded.
    pub fn available_permits(&self) -> Option<usize> {
        self.limit.as_ref().map(|s| s.available_permits())
    }

    /// Wait for a slot to run one task. Unbounded pools return immediately.
    pub(crate) async fn acquire(limit: Option<Arc<Semaphore>>) -> Option<OwnedSemaphorePermit> {
        match limit {
            // Never closed.
            Some(semaphore) => semaphore.acquire_owned().await.ok(),
            None => None,
        }
    }

    pub(crate) fn limiter(&self) -> Option<Arc<Semaphore>> {
        self.limit.clone()
    }

    /// Drive `fut` to completion on this pool from synchronous code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when called from inside an async context,
    /// where blocking the thread would stall the runtime.
    pub fn block_on<F: Future>(&self, fut: F) -> Result<F::Output> {
        if Handle::try_current().is_ok() {
            return Err(Error::InvalidArgument(
                "cannot block on a batch from inside an async context".to_string(),
            ));
        }
        match &self.runtime {
            Some(runtime) => Ok(runtime.block_on(fut)),
            None => Ok(self.handle.block_on(fut)),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Blocking work abandoned by a fail-fast batch may still be
            // running; do not wait for it.
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("owned", &self.is_owned())
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}
