use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Counts outstanding workers and lets a caller wait for them to finish.
///
/// Each worker holds an [`ActiveWorker`] for as long as it runs; dropping it
/// marks the worker done, including when the task is aborted or panics.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    outstanding: Arc<watch::Sender<usize>>,
}

/// Registration of one worker with a [`ShutdownCoordinator`]
#[derive(Debug)]
#[must_use = "the worker is counted as done as soon as this is dropped"]
pub struct ActiveWorker {
    outstanding: Arc<watch::Sender<usize>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { outstanding: Arc::new(tx) }
    }

    pub fn register(&self) -> ActiveWorker {
        self.outstanding.send_modify(|count| *count += 1);
        ActiveWorker { outstanding: self.outstanding.clone() }
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once no worker is outstanding.
    pub async fn drain(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Wait for the drain, giving up after `deadline`.
    ///
    /// Returns `false` on timeout. Workers are never stopped from here.
    pub async fn drain_with_deadline(&self, deadline: Duration) -> bool {
        tokio::time::timeout(deadline, self.drain()).await.is_ok()
    }
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        self.outstanding.send_modify(|count| *count = count.saturating_sub(1));
    }
}
