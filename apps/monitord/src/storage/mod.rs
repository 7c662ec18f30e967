/// Storage collaborators for health check results
///
/// The monitoring service only depends on the [`Storage`] trait; the SQLite
/// implementation lives in [`sqlite`].
pub mod migrations;
pub mod pool;
pub mod sqlite;

pub use sqlite::LibsqlStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::monitor::HealthCheck;

/// Sink for health check results.
///
/// Called concurrently from every polling loop. Failures are logged by the
/// caller and never stop monitoring.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist one health check
    async fn save_check(&self, check: &HealthCheck) -> Result<()>;

    /// Release the underlying resources
    async fn close(&self) -> Result<()>;
}
