pub mod config;
pub mod error;
pub mod executor;
pub mod log;
pub mod pool;
pub mod report;
pub mod util;
pub mod worker;

pub use error::{BoxError, Error, Result, WorkError};
pub use executor::{batch_len, Executor, FailurePolicy, Outcome};
pub use pool::WorkerPool;
pub use report::{BatchId, BatchReport, SlotReport};
