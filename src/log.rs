//! Leveled logging to stderr.
//!
//! Levels are numbered so that a message is emitted only when its level is
//! less than or equal to the current level:
//! - ERROR (1): a pipeline step failed
//! - WARN (2): unexpected but recoverable (Tiller already gone, odd release name)
//! - DEBUG (3): rendered commands and resolved settings
//! - INFO (4): step progress
//!
//! An unrecognized level is -1 and therefore always passes the filter.
//! The current level comes from `LOG_LEVEL` or `--log-level`. An optional log
//! file receives a copy of every emitted line.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI8, Ordering};
use std::sync::OnceLock;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicI8 = AtomicI8::new(LogLevel::Info as i8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i8)]
pub enum LogLevel {
    Unrecognized = -1,
    Error = 1,
    Warn = 2,
    Debug = 3,
    Info = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Unrecognized => "LOG",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
        }
    }

    /// Accepts either the number or the name, case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "error" => LogLevel::Error,
            "2" | "warn" | "warning" => LogLevel::Warn,
            "3" | "debug" => LogLevel::Debug,
            "4" | "info" => LogLevel::Info,
            _ => LogLevel::Unrecognized,
        }
    }

    fn from_i8(v: i8) -> Self {
        match v {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Debug,
            4 => LogLevel::Info,
            _ => LogLevel::Unrecognized,
        }
    }
}

/// Initialize the level filter. An unrecognized `level` keeps the INFO default.
pub fn init(level: Option<&str>) {
    let Some(raw) = level else {
        return;
    };
    match LogLevel::parse(raw) {
        LogLevel::Unrecognized => {
            set_level(LogLevel::Info);
            warn(&format!("Unrecognized log level {:?}, using INFO", raw));
        }
        parsed => set_level(parsed),
    }
}

/// Also append every emitted line to `path`. Only the first call takes effect.
pub fn set_file(path: PathBuf) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    LOG_PATH.set(path).ok();
}

/// Set the maximum level that is emitted.
pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as i8, Ordering::SeqCst);
}

/// Get the current log level.
pub fn get_level() -> LogLevel {
    LogLevel::from_i8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Whether a message at `level` passes the current filter.
pub fn enabled(level: LogLevel) -> bool {
    (level as i8) <= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Log a message at the specified level.
pub fn log_at(level: LogLevel, msg: &str) {
    if !enabled(level) {
        return;
    }

    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] [{}] {}", timestamp, level.as_str(), msg);
    eprintln!("{}", line);

    if let Some(path) = LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", line);
        }
    }
}

pub fn error(msg: &str) {
    log_at(LogLevel::Error, msg);
}

pub fn warn(msg: &str) {
    log_at(LogLevel::Warn, msg);
}

pub fn debug(msg: &str) {
    log_at(LogLevel::Debug, msg);
}

pub fn info(msg: &str) {
    log_at(LogLevel::Info, msg);
}

/// Log macro for INFO level.
#[macro_export]
macro_rules! dlog {
    ($($arg:tt)*) => {
        $crate::log::info(&format!($($arg)*))
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! dlog_error {
    ($($arg:tt)*) => {
        $crate::log::error(&format!($($arg)*))
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! dlog_warn {
    ($($arg:tt)*) => {
        $crate::log::warn(&format!($($arg)*))
    };
}

/// Log macro for DEBUG level.
#[macro_export]
macro_rules! dlog_debug {
    ($($arg:tt)*) => {
        $crate::log::debug(&format!($($arg)*))
    };
}
