//! Tracing subscriber setup shared by the monitord binaries.

mod tracing;

pub use crate::tracing::{LogFormat, LogOptions, init_with};
pub use tracing_appender::non_blocking::WorkerGuard;
