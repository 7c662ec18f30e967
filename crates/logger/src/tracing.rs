use std::env::var;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{level_filters::LevelFilter, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Subscriber options, usually filled from the `[logging]` config section.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Default level directive; `RUST_LOG` still takes precedence.
    pub level: Option<String>,
    /// Explicit format. `RUST_LOG_FORMAT` is consulted when unset.
    pub format: Option<LogFormat>,
    /// Append to this file instead of stdout.
    pub file: Option<PathBuf>,
}

/// Install the global tracing subscriber.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for as long as logging to a file is needed.
pub fn init_with(options: &LogOptions) -> Result<Option<WorkerGuard>, TryInitError> {
    let level = options
        .level
        .as_deref()
        .map(|level| LevelFilter::from_str(level).unwrap_or(LevelFilter::INFO))
        .unwrap_or(LevelFilter::INFO);
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let format = options.format.unwrap_or_else(|| {
        var("RUST_LOG_FORMAT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    });

    let (file_writer, guard) = match options.file.as_deref().and_then(open_log_file) {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    let log_layer = match (format, file_writer) {
        (LogFormat::Json, Some(writer)) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(env_filter)
            .boxed(),
        (LogFormat::Json, None) => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        (LogFormat::Compact, Some(writer)) => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(env_filter)
            .boxed(),
        (LogFormat::Compact, None) => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(log_layer).try_init()?;

    if options.file.is_some() && guard.is_none() {
        warn!("Log file unavailable, logging to stdout instead");
    }

    Ok(guard)
}

fn open_log_file(
    path: &std::path::Path,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let file_name = path.file_name()?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if let Err(error) = std::fs::create_dir_all(&directory) {
        eprintln!("failed to create log directory {}: {error}", directory.display());
        return None;
    }

    let appender = tracing_appender::rolling::never(directory, file_name);
    Some(tracing_appender::non_blocking(appender))
}
