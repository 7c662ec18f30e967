//! monitord - endpoint uptime monitoring with live configuration reload
//!
//! The [`monitor::MonitorService`] probes every enabled endpoint on its own
//! schedule, hands each [`HealthCheck`] to a [`storage::Storage`], and
//! reconciles its running monitors whenever the configuration changes.

pub mod app;
pub mod config;
pub mod monitor;
pub mod storage;

pub use config::{Config, ConfigError, Endpoint, MonitorConfig};
pub use monitor::{CheckStatus, HealthCheck, MonitorError, MonitorService};
