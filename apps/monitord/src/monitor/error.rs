use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that cross the monitoring service boundary.
///
/// Probe and storage failures never show up here; they are logged and
/// absorbed by the polling loops.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid monitor configuration: {0}")]
    InvalidConfig(#[source] ConfigError),
    #[error("failed to start monitoring {url}: {reason}")]
    Startup { url: String, reason: String },
    #[error("monitor service already started")]
    AlreadyStarted,
    #[error("monitor service is not running")]
    NotRunning,
    #[error("failed to reload configuration: {0}")]
    Reload(#[source] ConfigError),
    #[error("configuration reload task failed: {0}")]
    ReloadTask(#[from] tokio::task::JoinError),
    #[error("shutdown timed out after {deadline:?} with {outstanding} worker(s) still running")]
    ShutdownTimeout { deadline: Duration, outstanding: usize },
}
