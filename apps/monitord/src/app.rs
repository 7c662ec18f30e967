use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::monitor::{HttpChecker, MonitorService, ReloadFn};
use crate::storage::{LibsqlStore, Storage};

/// The running daemon: storage, HTTP client and monitoring service wired
/// together from one configuration.
pub struct App {
    service: MonitorService,
    storage: Arc<LibsqlStore>,
    scope: CancellationToken,
}

impl App {
    /// Build the application. `config_path` is re-read on every reload; the
    /// default location is used when it is `None`.
    pub async fn new(config: Config, config_path: Option<PathBuf>) -> Result<Self> {
        let storage = Arc::new(
            LibsqlStore::open(&config.database.path)
                .await
                .context("failed to open health check database")?,
        );
        let checker = Arc::new(HttpChecker::new().context("failed to build HTTP client")?);
        let reload: ReloadFn = Arc::new(move || Config::from_config(config_path.as_deref()));

        let service = MonitorService::new(storage.clone(), checker, config.monitor, reload);

        Ok(Self { service, storage, scope: CancellationToken::new() })
    }

    pub fn service(&self) -> &MonitorService {
        &self.service
    }

    pub async fn start(&self) -> Result<()> {
        info!("Starting application...");
        self.service
            .start(self.scope.child_token())
            .await
            .context("failed to start monitor service")
    }

    /// Stop monitoring within `deadline`, then close the storage.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        info!("Shutting down application...");

        let stopped = self.service.shutdown(deadline).await;
        if let Err(e) = &stopped {
            warn!("Error shutting down monitor service: {}", e);
        }
        self.scope.cancel();

        self.storage.close().await.context("failed to close storage")?;
        stopped.context("monitor service did not stop cleanly")
    }
}
