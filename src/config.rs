use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::FailurePolicy;
use crate::{flog_debug, Error, Result};

/// Default thread name prefix for owned pools.
pub const DEFAULT_THREAD_NAME: &str = "fanout-worker";

/// Default sleep for the demo worker, mirroring a short background job.
pub const DEFAULT_WORKER_SLEEP_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// How a batch is joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExecutorConfig {
    pub policy: FailurePolicy,
    /// Deadline for the join phase. `None` waits forever.
    pub timeout_ms: Option<u64>,
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// A zero deadline would expire before any task could finish.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == Some(0) {
            return Err(Error::InvalidArgument(
                "timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runtime and concurrency settings for a `WorkerPool`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on tasks running at once. `None` means unbounded.
    pub max_concurrency: Option<usize>,
    /// Async worker threads for an owned runtime (tokio default if unset).
    pub worker_threads: Option<usize>,
    /// Threads available to synchronous work (tokio default if unset).
    pub max_blocking_threads: Option<usize>,
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            worker_threads: None,
            max_blocking_threads: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl PoolConfig {
    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: Some(max_concurrency),
            ..Default::default()
        }
    }

    /// Reject settings tokio would panic on or that could never make progress.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == Some(0) {
            return Err(Error::InvalidArgument(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(Error::InvalidArgument(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.max_blocking_threads == Some(0) {
            return Err(Error::InvalidArgument(
                "max_blocking_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the bundled demo worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub sleep_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sleep_ms: DEFAULT_WORKER_SLEEP_MS,
        }
    }
}

impl Config {
    pub fn fanout_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".fanout"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::fanout_dir()?.join("fanout.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        flog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            flog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        flog_debug!(
            "Config loaded: policy={}, timeout_ms={:?}, max_concurrency={:?}",
            config.executor.policy,
            config.executor.timeout_ms,
            config.pool.max_concurrency
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let fanout_dir = Self::fanout_dir()?;
        if !fanout_dir.exists() {
            flog_debug!("Creating fanout directory: {}", fanout_dir.display());
            fs::create_dir_all(&fanout_dir)?;
        }
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        flog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
