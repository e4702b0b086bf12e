//! Logging utilities
//!
//! Provides logging configuration for the console and an optional log file.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Initialize the logger.
///
/// Console output uses `level` unless `RUST_LOG` is set. When `file_prefix` is
/// given, DEBUG output is also written to `<prefix>-<date>.log`; the path of
/// that file is returned.
pub fn init_logger(level: LogLevel, file_prefix: Option<&str>) -> Result<Option<PathBuf>> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().as_str()));

    let console = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(console_filter);

    let (file_layer, path) = match file_prefix {
        Some(prefix) => {
            let path = log_file_path(prefix, &Local::now().to_string());
            let file = create_log_file(&path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(path)
}

/// Build the log file path `<prefix>-<date>.log`
pub fn log_file_path(prefix: &str, date: &str) -> PathBuf {
    PathBuf::from(format!("{}-{}.log", prefix, make_filename(date)))
}

/// Replace every character that is unsafe in a file name with `_`
pub fn make_filename(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn create_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    File::create(path).with_context(|| format!("Failed to create log file: {}", path.display()))
}
