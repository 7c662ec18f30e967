use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::checker::Checker;
use super::probe::perform_health_check;
use super::shutdown::ActiveWorker;
use crate::config::Endpoint;
use crate::storage::Storage;

/// Lifecycle of one endpoint monitor.
///
/// `Starting → Running → CancelRequested → Stopped`. Only the polling loop
/// itself moves a monitor to `Stopped`, when it sees the cancellation.
/// Snapshots show `CancelRequested` while a shutdown drains; monitors
/// replaced or removed by reconciliation leave the snapshot at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorPhase {
    #[default]
    Starting,
    Running,
    CancelRequested,
    Stopped,
}

/// Point-in-time copy of a monitor's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub endpoint: Endpoint,
    /// Unique per start; a restart always yields a new generation
    pub generation: u64,
    pub phase: MonitorPhase,
    pub last_check: Option<DateTime<Utc>>,
}

impl MonitorSnapshot {
    pub fn url(&self) -> &str {
        &self.endpoint.url
    }
}

#[derive(Debug, Default)]
struct RunState {
    phase: MonitorPhase,
    last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SharedRunState(Mutex<RunState>);

impl SharedRunState {
    fn update<R>(&self, f: impl FnOnce(&mut RunState) -> R) -> R {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

/// Services a polling loop needs besides its endpoint
#[derive(Clone)]
pub(crate) struct ProbeDeps {
    pub checker: Arc<dyn Checker>,
    pub storage: Arc<dyn Storage>,
}

/// Run-state of one active endpoint and handle to its polling loop.
///
/// Dropping the monitor cancels its loop.
pub(crate) struct EndpointMonitor {
    endpoint: Endpoint,
    generation: u64,
    token: CancellationToken,
    run_state: Arc<SharedRunState>,
    task: AbortHandle,
}

impl EndpointMonitor {
    /// Spawn the polling loop for `endpoint`, bound to `token`.
    pub(crate) fn spawn(
        endpoint: Endpoint,
        generation: u64,
        token: CancellationToken,
        worker: ActiveWorker,
        deps: ProbeDeps,
    ) -> Self {
        let run_state = Arc::new(SharedRunState::default());
        let handle = tokio::spawn(poll_endpoint(
            endpoint.clone(),
            token.clone(),
            run_state.clone(),
            worker,
            deps,
        ));

        Self { endpoint, generation, token, run_state, task: handle.abort_handle() }
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn abort_handle(&self) -> AbortHandle {
        self.task.clone()
    }

    /// Ask the loop to stop at its next wake-up.
    pub(crate) fn cancel(&self) {
        self.run_state.update(|state| {
            if state.phase != MonitorPhase::Stopped {
                state.phase = MonitorPhase::CancelRequested;
            }
        });
        self.token.cancel();
    }

    pub(crate) fn snapshot(&self) -> MonitorSnapshot {
        let (phase, last_check) = self.run_state.update(|state| (state.phase, state.last_check));
        MonitorSnapshot {
            endpoint: self.endpoint.clone(),
            generation: self.generation,
            // An aborted loop never gets to record its own exit.
            phase: if self.task.is_finished() { MonitorPhase::Stopped } else { phase },
            last_check,
        }
    }
}

impl Drop for EndpointMonitor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn poll_endpoint(
    endpoint: Endpoint,
    token: CancellationToken,
    run_state: Arc<SharedRunState>,
    worker: ActiveWorker,
    deps: ProbeDeps,
) {
    let _worker = worker;
    run_state.update(|state| {
        if state.phase == MonitorPhase::Starting {
            state.phase = MonitorPhase::Running;
        }
    });
    info!(
        "Monitoring {} ({}) every {}",
        endpoint.url,
        endpoint.name,
        humantime::format_duration(endpoint.interval)
    );

    // First probe one full interval after start, like every later one.
    let mut ticker = interval_at(Instant::now() + endpoint.interval, endpoint.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let check = perform_health_check(deps.checker.as_ref(), &endpoint).await;
                if let Err(e) = deps.storage.save_check(&check).await {
                    warn!("Error saving check for {}: {:#}", endpoint.url, e);
                }
                run_state.update(|state| state.last_check = Some(check.timestamp));
            }
        }
    }

    info!("Stopping monitoring for endpoint: {}", endpoint.url);
    run_state.update(|state| state.phase = MonitorPhase::Stopped);
}
