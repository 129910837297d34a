//! Demo unit of work driven by the `fanout` binary.
//!
//! Each invocation sleeps for a fixed time and then reports a value derived
//! from its launch index, so repeated batches give identical results. One
//! index can be told to fail, which makes both failure policies observable
//! from the command line.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::WorkerConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker {index} was configured to fail")]
    Injected { index: usize },
}

/// Value produced by one `DemoWorker` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerValue {
    pub index: usize,
    pub value: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DemoWorker {
    sleep: Duration,
    fail_index: Option<usize>,
}

impl DemoWorker {
    pub fn new(sleep: Duration) -> Self {
        Self {
            sleep,
            fail_index: None,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(Duration::from_millis(config.sleep_ms))
    }

    /// Make the invocation at `index` fail instead of producing a value.
    pub fn with_fail_index(mut self, fail_index: Option<usize>) -> Self {
        self.fail_index = fail_index;
        self
    }

    pub fn sleep(&self) -> Duration {
        self.sleep
    }

    /// Blocks the calling thread for the configured time.
    pub fn value(&self, index: usize) -> Result<WorkerValue, WorkerError> {
        if !self.sleep.is_zero() {
            std::thread::sleep(self.sleep);
        }
        if self.fail_index == Some(index) {
            return Err(WorkerError::Injected { index });
        }
        Ok(WorkerValue {
            index,
            value: Self::compute(index),
        })
    }

    fn compute(index: usize) -> u64 {
        let i = index as u64 + 1;
        i * i
    }
}
