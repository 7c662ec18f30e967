/// Monitoring engine - probes endpoints on their own schedules and keeps the
/// running set in line with the configuration
///
/// This module is responsible for:
/// - Probing endpoints and classifying the outcome
/// - Running one polling loop per enabled endpoint
/// - Reconciling the running loops when the configuration changes
/// - Coordinating a bounded shutdown
pub mod checker;
mod endpoint;
pub mod error;
pub mod probe;
pub mod service;
pub mod shutdown;
pub mod types;

pub use checker::{CheckError, Checker, HttpChecker, ProbeResponse};
pub use endpoint::{MonitorPhase, MonitorSnapshot};
pub use error::MonitorError;
pub use probe::perform_health_check;
pub use service::{MonitorService, ReconcileSummary, ReloadFn};
pub use shutdown::{ActiveWorker, ShutdownCoordinator};
pub use types::{CheckStatus, HealthCheck};
