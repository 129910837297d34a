use std::time::Duration;

use thiserror::Error;

/// Boxed cause carried by a failed unit of work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task {index} failed: {source}")]
    WorkFailed {
        index: usize,
        #[source]
        source: WorkError,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single task, stored in its own slot.
#[derive(Error, Debug)]
pub enum WorkError {
    #[error("{0}")]
    Failed(BoxError),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("task was cancelled before it finished")]
    Cancelled,
}

impl WorkError {
    pub fn failed<E: Into<BoxError>>(cause: E) -> Self {
        WorkError::Failed(cause.into())
    }

    /// Build a `Panicked` error from a panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        WorkError::Panicked(message)
    }
}
