use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{MutationTracker, SyncCoordinator, SyncError};

/// Minimum pause before retrying after a failed attempt, so a zero window
/// cannot spin against a dead remote.
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Turns bursts of mutations into single commit-and-push requests.
///
/// Every mutation restarts the quiet period; once it elapses with no further
/// mutation the coordinator is asked to publish. While the vault stays dirty
/// (new writes during the attempt, or a failed attempt) the debouncer re-arms.
#[derive(Debug)]
pub struct Debouncer {
    tracker: MutationTracker,
    coordinator: SyncCoordinator,
    window: Duration,
}

impl Debouncer {
    pub fn new(coordinator: SyncCoordinator, window: Duration) -> Self {
        Self {
            tracker: coordinator.tracker().clone(),
            coordinator,
            window,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run until `shutdown` fires (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<()>) {
        tracing::info!(window_ms = self.window.as_millis() as u64, "debouncer started");
        let mut changes = self.tracker.subscribe();
        let mut failed = false;

        loop {
            while !self.tracker.is_dirty() {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return self.stopped(),
                    changed = changes.changed() => {
                        if changed.is_err() {
                            return self.stopped();
                        }
                    }
                }
            }

            let window = if failed {
                self.window.max(MIN_RETRY_DELAY)
            } else {
                self.window
            };
            if !quiet_period(window, &mut changes, &mut shutdown).await {
                return self.stopped();
            }

            let generation = self.tracker.generation();
            match self.coordinator.request_commit_and_push(generation).await {
                Ok(outcome) => {
                    tracing::debug!(generation, ?outcome, "debounced sync finished");
                    failed = false;
                }
                Err(SyncError::Stopped) => return self.stopped(),
                Err(e) => {
                    tracing::debug!(generation, error = %e, "debounced sync failed, will retry");
                    failed = true;
                }
            }
        }
    }

    fn stopped(&self) {
        tracing::info!(
            pending = self.tracker.is_dirty(),
            "debouncer stopped"
        );
    }
}

/// Wait until no mutation has arrived for `window`. Returns false on
/// shutdown.
async fn quiet_period(
    window: Duration,
    changes: &mut watch::Receiver<u64>,
    shutdown: &mut watch::Receiver<()>,
) -> bool {
    changes.borrow_and_update();
    if window.is_zero() {
        return true;
    }

    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => return false,
            _ = &mut deadline => return true,
            changed = changes.changed() => {
                if changed.is_err() {
                    return false;
                }
                deadline.as_mut().reset(Instant::now() + window);
            }
        }
    }
}
