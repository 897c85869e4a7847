//! # Logging Utilities
//!
//! Logging setup for libpatch front ends using `tracing`.
//!
//! The core library only emits `tracing` events (attach/detach, every
//! peek/poke span, file patches). This module installs the subscriber that
//! turns them into output:
//! - pretty or JSON lines on stderr, so command output on stdout stays clean
//! - an optional log file next to the console output
//! - filtering through `RUST_LOG` or an explicit level
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use libpatch_utils::init_logging;
//!
//! // Keep the guard alive until exit, or buffered file lines are lost
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::info!("Patcher started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter (e.g. `RUST_LOG=debug`, `RUST_LOG=libpatch_core=trace`)
//! - `LIBPATCH_LOG_FORMAT`: `pretty` (default) or `json`
//! - `LIBPATCH_LOG_FILE`: also log to this file, rotated daily. If it names a
//!   directory, a `YYYY-MM-DD-libpatch.log` file is created inside it.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "LIBPATCH_LOG_FORMAT";

/// Environment variable naming an optional log file.
pub const LOG_FILE_ENV: &str = "LIBPATCH_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (every peek and poke)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Everything needed to install the subscriber
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogConfig
{
    /// Explicit level; overrides `RUST_LOG` when set
    pub level: Option<LogLevel>,
    /// Output format
    pub format: LogFormat,
    /// Optional log file (or directory for a dated file)
    pub file: Option<PathBuf>,
}

impl LogConfig
{
    /// Read `LIBPATCH_LOG_FORMAT` and `LIBPATCH_LOG_FILE`
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` if `LIBPATCH_LOG_FORMAT` is set to an unknown value.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        let format = match env::var(LOG_FORMAT_ENV) {
            Ok(value) => value.parse().map_err(LoggingError::InvalidFormat)?,
            Err(_) => LogFormat::Pretty,
        };
        let file = env::var_os(LOG_FILE_ENV).filter(|v| !v.is_empty()).map(PathBuf::from);
        Ok(Self {
            level: None,
            format,
            file,
        })
    }

    /// Use `level` instead of `RUST_LOG`
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self
    {
        self.level = Some(level);
        self
    }

    /// Build the filter
    ///
    /// Priority: explicit level, then `RUST_LOG` (module filters allowed),
    /// then `info`.
    fn filter(&self) -> EnvFilter
    {
        if let Some(level) = self.level {
            return EnvFilter::new(Level::from(level).to_string());
        }
        match env::var("RUST_LOG") {
            Ok(rust_log) => EnvFilter::try_new(rust_log).unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
            Err(_) => EnvFilter::new(Level::INFO.to_string()),
        }
    }

    /// Install the global subscriber
    ///
    /// Returns the file writer's guard when a log file is configured; dropping
    /// it flushes and stops the background writer.
    ///
    /// ## Errors
    ///
    /// - `FileError`: the log directory cannot be created
    /// - `InitializationFailed`: a global subscriber is already installed
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError>
    {
        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
        layers.push(console_layer(self.format, self.filter()));

        let mut guard = None;
        if let Some(path) = &self.file {
            let (directory, file_name) = resolve_log_file(path)?;
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            let file_layer = match self.format {
                LogFormat::Pretty => fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_filter(self.filter())
                    .boxed(),
                LogFormat::Json => fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_filter(self.filter())
                    .boxed(),
            };
            layers.push(file_layer);
            guard = Some(worker_guard);
        }

        Registry::default()
            .with(layers)
            .try_init()
            .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
        Ok(guard)
    }
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> Box<dyn Layer<Registry> + Send + Sync>
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

/// Split a configured log path into the appender's directory and file name
///
/// A directory gets a dated `YYYY-MM-DD-libpatch.log` inside it.
fn resolve_log_file(path: &Path) -> Result<(PathBuf, String), LoggingError>
{
    if path.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        return Ok((path.to_path_buf(), format!("{today}-libpatch.log")));
    }

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&directory)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "libpatch.log".to_string());
    Ok((directory, file_name))
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// See [`LogConfig::from_env`] and [`LogConfig::init`].
pub fn init_logging() -> Result<Option<WorkerGuard>, LoggingError>
{
    LogConfig::from_env()?.init()
}

/// Initialize logging with an explicit level, keeping the environment's
/// format and file settings
///
/// ## Errors
///
/// See [`LogConfig::from_env`] and [`LogConfig::init`].
pub fn init_logging_with_level(level: LogLevel) -> Result<Option<WorkerGuard>, LoggingError>
{
    LogConfig::from_env()?.with_level(level).init()
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("prod").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("xml").is_err());
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("loud").is_err());
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_explicit_level_wins_over_env()
    {
        let filter = LogConfig::default().with_level(LogLevel::Debug).filter();
        assert_eq!(
            <EnvFilter as Layer<Registry>>::max_level_hint(&filter),
            Some(tracing::level_filters::LevelFilter::DEBUG)
        );
    }

    #[test]
    fn test_log_file_in_directory_is_dated()
    {
        let dir = env::temp_dir();
        let (directory, name) = resolve_log_file(&dir).unwrap();
        assert_eq!(directory, dir);
        assert!(name.ends_with("-libpatch.log"));
        assert_eq!(name.len(), "YYYY-MM-DD-libpatch.log".len());
    }

    #[test]
    fn test_bare_file_name_logs_to_current_directory()
    {
        let (directory, name) = resolve_log_file(Path::new("patch.log")).unwrap();
        assert_eq!(directory, PathBuf::from("."));
        assert_eq!(name, "patch.log");
    }
}
