//! # Observability
//!
//! Logging capability for push-relay.
//!
//! ## Design
//!
//! Components never reach for a process-wide logger. The entry point calls
//! [`build`] once, gets back a [`Logging`] handle holding a
//! [`tracing::Dispatch`], and hands clones of the dispatch
//! to every component it constructs. Components attach it to the futures
//! they spawn, so every log line produced by a consumer or a delivery task
//! goes through the same, immutable pipeline:
//!
//! - stderr, one compact line per event, each line starting with the
//!   configured prefix (e.g. `[push] `)
//! - optionally, a JSONL file with one structured object per event
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tracing::instrument::WithSubscriber;
//!
//! let logging = observability::build(&observability::LogConfig {
//!     service_name: "push-relay".into(),
//!     prefix: "[push] ".into(),
//!     level: "info".parse()?,
//!     ..Default::default()
//! })?;
//!
//! async { tracing::info!("ready") }
//!     .with_subscriber(logging.dispatch())
//!     .await;
//! // dropping `logging` flushes the file sink
//! ```

mod file;
mod format;
mod json_layer;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file::open_jsonl_sink;
pub use format::PrefixedFormat;
pub use json_layer::{JsonLayer, LogEntry};

/// Minimum severity accepted by the logging pipeline.
///
/// `Fatal` has no tracing counterpart: it filters like `Error`, and fatal
/// events are emitted as errors carrying a `fatal = true` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }

    /// The tracing filter equivalent of this level.
    pub fn as_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Fatal => LevelFilter::ERROR,
        }
    }

    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Fatal => "error",
            other => other.as_str(),
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a log level string is not one of the known levels.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid log level '{0}' (expected debug, info, warn, error or fatal)")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

/// Configuration for the logging pipeline.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every JSONL entry.
    pub service_name: String,

    /// Prepended verbatim to every stderr line.
    pub prefix: String,

    /// Minimum severity. `RUST_LOG`, when set, takes precedence.
    pub level: LogLevel,

    /// Optional JSONL file sink.
    pub log_path: Option<PathBuf>,

    /// Emit prefixed lines on stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            prefix: String::new(),
            level: LogLevel::Info,
            log_path: None,
            also_stderr: true,
        }
    }
}

fn env_or_level(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()))
}

/// A built logging pipeline.
///
/// Keep it alive for as long as anything logs; dropping it flushes and
/// closes the file sink.
pub struct Logging {
    dispatch: Dispatch,
    _file_guard: Option<WorkerGuard>,
}

impl Logging {
    /// A handle to the pipeline, for components and the futures they spawn.
    pub fn dispatch(&self) -> Dispatch {
        self.dispatch.clone()
    }
}

/// Build the logging capability described by `config`.
///
/// Nothing is installed globally; the caller owns the returned handle and
/// decides which futures run under its dispatch.
///
/// # Errors
///
/// Fails if `log_path` is set and the file cannot be created or opened.
pub fn build(config: &LogConfig) -> io::Result<Logging> {
    let (file_layer, file_guard) = match &config.log_path {
        Some(path) => {
            let (writer, guard) = open_jsonl_sink(path)?;
            let layer = JsonLayer::new(config.service_name.clone(), config.prefix.clone(), writer)
                .with_filter(env_or_level(config.level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = if config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .event_format(PrefixedFormat::new(config.prefix.clone()))
                .with_writer(io::stderr)
                .with_filter(env_or_level(config.level)),
        )
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer);

    Ok(Logging {
        dispatch: Dispatch::new(subscriber),
        _file_guard: file_guard,
    })
}

/// Build a prefixed, plain-text pipeline over an arbitrary writer.
///
/// Ignores `RUST_LOG` and `log_path`; the level comes from `config` alone.
pub fn build_with_writer<W>(config: &LogConfig, make_writer: W) -> Dispatch
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .event_format(PrefixedFormat::new(config.prefix.clone()))
        .with_writer(make_writer)
        .with_ansi(false)
        .with_filter(config.level.as_filter());

    Dispatch::new(tracing_subscriber::registry().with(layer))
}
