//! File logger for batch runs.
//!
//! Lines are appended to `~/.fanout/fanout.log` as
//! `[time] [LEVEL] [thread] message`. The thread column shows which pool
//! worker a task ran on (`fanout-worker` by default).
//!
//! The level is picked once at startup from `--debug` and `FANOUT_DEBUG`:
//!
//! | setting                                   | level |
//! |-------------------------------------------|-------|
//! | nothing                                   | INFO: batch summaries, task failures |
//! | `--debug`, `FANOUT_DEBUG=1`/`true`/`debug` | DEBUG: launch and join of each batch |
//! | `FANOUT_DEBUG=trace`                      | TRACE: every task completion |
//! | `FANOUT_DEBUG=error`/`warn`/`info`        | that level (`--debug` still lifts it to DEBUG) |

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::config::Config;

/// Environment variable read by [`init`].
pub const DEBUG_ENV: &str = "FANOUT_DEBUG";

const LOG_FILE: &str = "fanout.log";

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a `FANOUT_DEBUG` value. Unrecognized values select nothing.
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            "0" | "false" | "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Level for a `--debug` flag and an optional `FANOUT_DEBUG` value.
pub fn select_level(debug_flag: bool, env: Option<&str>) -> LogLevel {
    let level = env
        .and_then(LogLevel::from_env_value)
        .unwrap_or(LogLevel::Info);
    if debug_flag {
        level.max(LogLevel::Debug)
    } else {
        level
    }
}

/// Start logging to `~/.fanout/fanout.log` at the level chosen by
/// `debug` and `FANOUT_DEBUG`.
pub fn init(debug: bool) {
    let env = std::env::var(DEBUG_ENV).ok();
    LOG_LEVEL.store(select_level(debug, env.as_deref()) as u8, Ordering::SeqCst);

    if let Ok(dir) = Config::fanout_dir() {
        let _ = std::fs::create_dir_all(&dir);
        init_with_path(dir.join(LOG_FILE));
    }
}

/// Send log output to an explicit file, truncating it.
///
/// Only the first call takes effect.
pub fn init_with_path(path: PathBuf) {
    if LOG_PATH.get().is_some() {
        return;
    }
    let _ = std::fs::write(&path, "");
    LOG_PATH.set(path).ok();
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Whether a message at `level` would be written.
pub fn enabled(level: LogLevel) -> bool {
    level <= self::level() && LOG_PATH.get().is_some()
}

fn format_line(level: LogLevel, msg: &str) -> String {
    let thread = std::thread::current();
    format!(
        "[{}] [{}] [{}] {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        level.as_str(),
        thread.name().unwrap_or("-"),
        msg
    )
}

/// Append one line at `level`. Prefer the `flog*` macros, which skip
/// formatting when the level is filtered out.
pub fn write(level: LogLevel, msg: &str) {
    if level > self::level() {
        return;
    }
    if let Some(path) = LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", format_line(level, msg));
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! flog_at {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            $crate::log::write($level, &format!($($arg)*))
        }
    };
}

/// Log at INFO.
#[macro_export]
macro_rules! flog {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! flog_error {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! flog_warn {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Warn, $($arg)*)
    };
}

/// Log at DEBUG (`--debug` or `FANOUT_DEBUG=1`).
#[macro_export]
macro_rules! flog_debug {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Debug, $($arg)*)
    };
}

/// Log at TRACE (`FANOUT_DEBUG=trace`).
#[macro_export]
macro_rules! flog_trace {
    ($($arg:tt)*) => {
        $crate::flog_at!($crate::log::LogLevel::Trace, $($arg)*)
    };
}
