use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::checker::Checker;
use super::endpoint::{EndpointMonitor, MonitorSnapshot, ProbeDeps};
use super::error::MonitorError;
use super::shutdown::{ActiveWorker, ShutdownCoordinator};
use crate::config::{Config, ConfigError, Endpoint, MonitorConfig};
use crate::storage::Storage;

/// Produces a fresh configuration on every configuration-watch tick
pub type ReloadFn = Arc<dyn Fn() -> Result<Config, ConfigError> + Send + Sync>;

/// What one reconciliation did, by endpoint url
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: Vec<String>,
    pub restarted: Vec<String>,
    pub stopped: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.restarted.is_empty() && self.stopped.is_empty()
    }
}

/// Monitoring service - runs one polling loop per enabled endpoint and keeps
/// that set in line with the configuration.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct MonitorService {
    inner: Arc<Inner>,
}

struct Inner {
    deps: ProbeDeps,
    reload: ReloadFn,
    coordinator: ShutdownCoordinator,
    next_generation: AtomicU64,
    state: Mutex<ServiceState>,
}

struct WatchTask {
    token: CancellationToken,
    task: AbortHandle,
}

struct ServiceState {
    config: MonitorConfig,
    monitors: HashMap<String, EndpointMonitor>,
    /// Scope given to `start`; every monitor token descends from it
    root: Option<CancellationToken>,
    watcher: Option<WatchTask>,
    /// Loops of replaced or removed monitors that may still be winding down
    retired: Vec<AbortHandle>,
    stopping: bool,
}

impl ServiceState {
    fn retire(&mut self, monitor: EndpointMonitor) {
        monitor.cancel();
        self.retired.retain(|task| !task.is_finished());
        self.retired.push(monitor.abort_handle());
    }
}

impl MonitorService {
    pub fn new(
        storage: Arc<dyn Storage>,
        checker: Arc<dyn Checker>,
        config: MonitorConfig,
        reload: ReloadFn,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps: ProbeDeps { checker, storage },
                reload,
                coordinator: ShutdownCoordinator::new(),
                next_generation: AtomicU64::new(1),
                state: Mutex::new(ServiceState {
                    config,
                    monitors: HashMap::new(),
                    root: None,
                    watcher: None,
                    retired: Vec::new(),
                    stopping: false,
                }),
            }),
        }
    }

    /// Start monitoring every enabled endpoint and begin watching the
    /// configuration.
    ///
    /// Cancelling `scope` stops everything this service spawns. A failure
    /// leaves already started monitors running; `shutdown` stops them. A
    /// service that has been shut down cannot be started again.
    pub async fn start(&self, scope: CancellationToken) -> Result<(), MonitorError> {
        let mut state = self.inner.state.lock().await;
        if state.stopping {
            return Err(MonitorError::NotRunning);
        }
        if state.root.is_some() {
            return Err(MonitorError::AlreadyStarted);
        }
        state.config.validate().map_err(MonitorError::InvalidConfig)?;
        state.root = Some(scope.clone());

        let endpoints: Vec<Endpoint> = state.config.enabled_endpoints().cloned().collect();
        info!("Starting monitoring for {} endpoint(s)", endpoints.len());
        for endpoint in endpoints {
            self.inner.start_endpoint(&mut state, &scope, endpoint)?;
        }

        let token = scope.child_token();
        let task = tokio::spawn(watch_config(
            self.clone(),
            token.clone(),
            self.inner.coordinator.register(),
            state.config.config_check_interval,
        ));
        state.watcher = Some(WatchTask { token, task: task.abort_handle() });

        Ok(())
    }

    /// Fetch a configuration from the reload function and reconcile with it.
    pub async fn reload(&self) -> Result<ReconcileSummary, MonitorError> {
        debug!("Reloading configuration...");
        let reload = Arc::clone(&self.inner.reload);
        let config = tokio::task::spawn_blocking(move || reload())
            .await?
            .map_err(MonitorError::Reload)?;

        self.apply_config(config.monitor).await
    }

    /// Reconcile the running monitors against `config`.
    ///
    /// Unchanged endpoints keep their loop, changed ones are restarted with a
    /// fresh schedule, disabled or missing ones are stopped. An invalid
    /// config is rejected as a whole and nothing changes; a valid one is
    /// applied completely.
    pub async fn apply_config(&self, config: MonitorConfig) -> Result<ReconcileSummary, MonitorError> {
        config.validate().map_err(MonitorError::InvalidConfig)?;

        let mut state = self.inner.state.lock().await;
        let root = match &state.root {
            Some(root) if !state.stopping && !root.is_cancelled() => root.clone(),
            _ => return Err(MonitorError::NotRunning),
        };

        let mut summary = ReconcileSummary::default();
        let mut previous = std::mem::take(&mut state.monitors);

        for endpoint in config.enabled_endpoints() {
            match previous.remove(&endpoint.url) {
                Some(monitor) if monitor.endpoint().probes_like(endpoint) => {
                    summary.unchanged.push(endpoint.url.clone());
                    state.monitors.insert(endpoint.url.clone(), monitor);
                }
                Some(monitor) => {
                    info!("Updating configuration for endpoint: {}", endpoint.url);
                    state.retire(monitor);
                    self.inner.spawn_monitor(&mut state, &root, endpoint.clone());
                    summary.restarted.push(endpoint.url.clone());
                }
                None => {
                    info!("Adding new endpoint: {}", endpoint.url);
                    self.inner.spawn_monitor(&mut state, &root, endpoint.clone());
                    summary.started.push(endpoint.url.clone());
                }
            }
        }

        let mut removed: Vec<(String, EndpointMonitor)> = previous.into_iter().collect();
        removed.sort_by(|a, b| a.0.cmp(&b.0));
        for (url, monitor) in removed {
            info!("Removing endpoint: {}", url);
            state.retire(monitor);
            summary.stopped.push(url);
        }

        state.config = config;
        Ok(summary)
    }

    /// Cancel every loop, then wait up to `deadline` for them to exit.
    ///
    /// Loops still running when the deadline passes are aborted before the
    /// timeout is reported, so none of them outlives the service. The
    /// monitors stay listed in snapshots, moving from `CancelRequested` to
    /// `Stopped` as their loops exit.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), MonitorError> {
        let lingering: Vec<AbortHandle> = {
            let mut state = self.inner.state.lock().await;
            state.stopping = true;

            let mut lingering = std::mem::take(&mut state.retired);
            for monitor in state.monitors.values() {
                monitor.cancel();
                lingering.push(monitor.abort_handle());
            }
            if let Some(watcher) = state.watcher.take() {
                watcher.token.cancel();
                lingering.push(watcher.task);
            }
            lingering
        };

        info!("Waiting up to {:?} for {} worker(s) to stop", deadline, self.inner.coordinator.outstanding());
        if self.inner.coordinator.drain_with_deadline(deadline).await {
            info!("Monitoring service stopped");
            return Ok(());
        }

        let outstanding = self.inner.coordinator.outstanding();
        warn!(
            "Shutdown deadline of {:?} elapsed with {} worker(s) still running, aborting them",
            deadline, outstanding
        );
        for task in lingering {
            task.abort();
        }
        Err(MonitorError::ShutdownTimeout { deadline, outstanding })
    }

    /// Copies of the active monitors, ordered by url
    pub async fn snapshot(&self) -> Vec<MonitorSnapshot> {
        let state = self.inner.state.lock().await;
        let mut snapshots: Vec<MonitorSnapshot> = state.monitors.values().map(|m| m.snapshot()).collect();
        snapshots.sort_by(|a, b| a.endpoint.url.cmp(&b.endpoint.url));
        snapshots
    }

    /// The most recently applied configuration
    pub async fn current_config(&self) -> MonitorConfig {
        self.inner.state.lock().await.config.clone()
    }

    /// Polling loops and watchers that have not exited yet
    pub fn outstanding_workers(&self) -> usize {
        self.inner.coordinator.outstanding()
    }
}

impl Inner {
    /// Register and spawn a monitor for `endpoint` under a child of `parent`,
    /// replacing any monitor already keyed by its url.
    ///
    /// Taking `&mut ServiceState` means the caller holds the service lock.
    fn start_endpoint(
        &self,
        state: &mut ServiceState,
        parent: &CancellationToken,
        endpoint: Endpoint,
    ) -> Result<(), MonitorError> {
        if parent.is_cancelled() {
            return Err(MonitorError::Startup {
                url: endpoint.url,
                reason: "service scope is already cancelled".into(),
            });
        }

        self.spawn_monitor(state, parent, endpoint);
        Ok(())
    }

    /// Infallible half of `start_endpoint`. Under a parent cancelled in the
    /// meantime the loop exits on its first poll.
    fn spawn_monitor(&self, state: &mut ServiceState, parent: &CancellationToken, endpoint: Endpoint) {
        let url = endpoint.url.clone();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let monitor = EndpointMonitor::spawn(
            endpoint,
            generation,
            parent.child_token(),
            self.coordinator.register(),
            self.deps.clone(),
        );

        if let Some(previous) = state.monitors.insert(url, monitor) {
            state.retire(previous);
        }
    }
}

fn config_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn watch_config(
    service: MonitorService,
    token: CancellationToken,
    worker: ActiveWorker,
    mut period: Duration,
) {
    let _worker = worker;
    let mut ticker = config_ticker(period);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                match service.reload().await {
                    Ok(summary) if summary.is_noop() => debug!("Configuration unchanged"),
                    Ok(summary) => info!(
                        "Configuration reloaded: {} started, {} restarted, {} stopped, {} unchanged",
                        summary.started.len(),
                        summary.restarted.len(),
                        summary.stopped.len(),
                        summary.unchanged.len()
                    ),
                    Err(MonitorError::NotRunning) => break,
                    Err(e) => error!("Error reloading configuration: {}", e),
                }

                let current = service.current_config().await.config_check_interval;
                if current != period {
                    info!("Configuration check interval changed to {:?}", current);
                    period = current;
                    ticker = config_ticker(period);
                }
            }
        }
    }

    debug!("Configuration watcher stopped");
}
