//! Tracing subscriber setup driven by the `logging` config section.
//!
//! Recognized keys:
//!
//! ```yaml
//! logging:
//!   level: info          # trace | debug | info | warn | warning | error | critical | off
//!   format: pretty       # pretty | json | compact; console output only
//!   directory: logs      # optional; switches to file output
//!   app_name: site       # optional file name stem, defaults to app
//!   max_files: 5         # optional, rotated files kept per output
//! ```
//!
//! With a `directory`, three daily-rotated files are written, each through
//! its own non-blocking writer:
//!
//! - `<app_name>.<date>.log`: every event at or above `level`, plain text
//! - `<app_name>_error.<date>.log`: `ERROR` events only
//! - `<app_name>_structured.<date>.json`: every event at or above `level`, one
//!   JSON object per line
//!
//! `RUST_LOG` still takes precedence over `level` when set.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::ProjectConfig;

pub const DEFAULT_APP_NAME: &str = "app";
pub const DEFAULT_MAX_LOG_FILES: usize = 5;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoggingError {
    #[error(
        "invalid log level: {0}. Must be one of: trace, debug, info, warn, warning, error, critical, off"
    )]
    InvalidLevel(String),

    #[error("invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidFormat(String),

    #[error("logging.{0} must be a string")]
    NotAString(&'static str),

    #[error("logging.max_files must be a positive integer")]
    InvalidMaxFiles,

    #[error("failed to create log directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to open log file '{prefix}' in '{path}': {reason}")]
    Appender {
        path: PathBuf,
        prefix: String,
        reason: String,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Parsed logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
    pub directory: Option<PathBuf>,
    pub app_name: String,
    pub max_files: usize,
}

impl LogSettings {
    pub fn from_config(config: &ProjectConfig) -> Result<Self, LoggingError> {
        let logging = config.logging();

        let level = parse_level(text(logging, "level")?.unwrap_or("info"))?;
        let format = text(logging, "format")?
            .map(str::parse::<LogFormat>)
            .transpose()?
            .unwrap_or_default();
        let directory = text(logging, "directory")?.map(PathBuf::from);
        let app_name = text(logging, "app_name")?
            .unwrap_or(DEFAULT_APP_NAME)
            .to_string();
        let max_files = match logging.get("max_files") {
            None | Some(Value::Null) => DEFAULT_MAX_LOG_FILES,
            Some(value) => value
                .as_u64()
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or(LoggingError::InvalidMaxFiles)?,
        };

        Ok(Self {
            level,
            format,
            directory,
            app_name,
            max_files,
        })
    }
}

fn text<'a>(logging: &'a Mapping, key: &'static str) -> Result<Option<&'a str>, LoggingError> {
    match logging.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(LoggingError::NotAString(key)),
    }
}

/// Keeps the background file writers alive; dropping it flushes pending logs.
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

pub fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "critical" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(LoggingError::InvalidLevel(level.to_string())),
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn console_layer(settings: &LogSettings) -> BoxedLayer {
    let layer = fmt::layer().with_target(true);
    match settings.format {
        LogFormat::Json => layer
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter(settings.level))
            .boxed(),
        LogFormat::Compact => layer
            .compact()
            .with_filter(env_filter(settings.level))
            .boxed(),
        LogFormat::Pretty => layer
            .pretty()
            .with_filter(env_filter(settings.level))
            .boxed(),
    }
}

fn file_writer(
    dir: &Path,
    prefix: &str,
    suffix: &str,
    max_files: usize,
) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix(suffix)
        .max_log_files(max_files)
        .build(dir)
        .map_err(|e| LoggingError::Appender {
            path: dir.to_path_buf(),
            prefix: prefix.to_string(),
            reason: e.to_string(),
        })?;
    Ok(tracing_appender::non_blocking(appender))
}

fn file_layers(
    settings: &LogSettings,
    dir: &Path,
) -> Result<(Vec<BoxedLayer>, Vec<WorkerGuard>), LoggingError> {
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let app = settings.app_name.as_str();

    let (main, main_guard) = file_writer(dir, app, "log", settings.max_files)?;
    let (errors, error_guard) = file_writer(dir, &format!("{app}_error"), "log", settings.max_files)?;
    let (structured, structured_guard) =
        file_writer(dir, &format!("{app}_structured"), "json", settings.max_files)?;

    let layers = vec![
        fmt::layer()
            .with_writer(main)
            .with_ansi(false)
            .with_target(true)
            .with_filter(env_filter(settings.level))
            .boxed(),
        fmt::layer()
            .with_writer(errors)
            .with_ansi(false)
            .with_target(true)
            .with_filter(LevelFilter::ERROR)
            .boxed(),
        fmt::layer()
            .json()
            .with_writer(structured)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter(settings.level))
            .boxed(),
    ];
    Ok((layers, vec![main_guard, error_guard, structured_guard]))
}

/// Builds the subscriber described by `settings` without installing it.
pub fn build_subscriber(
    settings: &LogSettings,
) -> Result<(impl Subscriber + Send + Sync, LogGuard), LoggingError> {
    let (layers, guards) = match &settings.directory {
        Some(dir) => file_layers(settings, dir)?,
        None => (vec![console_layer(settings)], Vec::new()),
    };

    let subscriber = tracing_subscriber::registry().with(layers);
    Ok((subscriber, LogGuard { _guards: guards }))
}

/// Installs the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init(settings: &LogSettings) -> Result<LogGuard, LoggingError> {
    let (subscriber, guard) = build_subscriber(settings)?;
    subscriber
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::info!(
        level = %settings.level,
        format = ?settings.format,
        file_output = settings.directory.is_some(),
        "logger initialized"
    );
    Ok(guard)
}
