use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{SyncCoordinator, SyncError};

/// Asks the coordinator to pull on a fixed interval, independent of writes.
#[derive(Debug)]
pub struct Puller {
    coordinator: SyncCoordinator,
    interval: Duration,
}

impl Puller {
    /// `None` when pulling is disabled: a zero interval or no remote.
    pub fn new(coordinator: SyncCoordinator, interval: Duration) -> Option<Self> {
        if interval.is_zero() || !coordinator.has_remote() {
            return None;
        }
        Some(Self {
            coordinator,
            interval,
        })
    }

    pub fn spawn(self, shutdown: watch::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// The first pull happens one full interval after start; startup has
    /// already synchronized with the remote.
    pub async fn run(self, mut shutdown: watch::Receiver<()>) {
        tracing::info!(interval_s = self.interval.as_secs(), "puller started");
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            match self.coordinator.request_pull().await {
                Ok(outcome) => tracing::debug!(?outcome, "scheduled pull finished"),
                Err(SyncError::Busy) => {
                    tracing::debug!("coordinator busy, skipping pull");
                }
                Err(SyncError::Stopped) => break,
                // logged by the coordinator; next tick retries
                Err(_) => {}
            }
        }

        tracing::info!("puller stopped");
    }
}
