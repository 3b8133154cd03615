use std::sync::Arc;

use common::repo::{GitRepository, RepositoryError};
use common::sync::{
    CoordinatorConfig, MutationTracker, PullOutcome, SyncCoordinator, SyncError,
};
use object_store::{StoreError, Vault};

use crate::service_config::Config;

/// Everything request handlers and background loops share.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct State {
    config: Arc<Config>,
    vault: Vault,
    coordinator: SyncCoordinator,
}

impl State {
    /// Open (or create) the vault repository, start the sync coordinator
    /// and bring the working tree up to date with the remote.
    ///
    /// An unreachable remote is fatal here, unlike later in the process
    /// lifetime where fetch failures are retried on the next cycle.
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        let dir = config.vault_dir.clone();
        let git = config.git.clone();
        let repo = tokio::task::spawn_blocking(move || GitRepository::open_or_init(&dir, git))
            .await
            .map_err(|e| StateSetupError::Task(e.to_string()))??;

        let vault = Vault::open(&config.vault_dir, repo.staging_dir())?;
        let tracker = MutationTracker::new();
        let (coordinator, _worker) = SyncCoordinator::spawn(
            repo,
            vault.gate().clone(),
            tracker,
            config.conflict_policy.policy(),
            CoordinatorConfig {
                git_timeout: config.git_timeout,
                ..Default::default()
            },
        );

        if coordinator.has_remote() {
            match coordinator.request_pull().await {
                Ok(PullOutcome::RemoteEmpty) => {
                    tracing::info!("remote branch does not exist yet, it will be created on first push")
                }
                Ok(outcome) => tracing::info!(?outcome, "synchronized with remote"),
                Err(SyncError::Fetch(e)) => return Err(StateSetupError::RemoteUnreachable(e)),
                // the service keeps running on local data; the status endpoint shows the error
                Err(e) => tracing::warn!(error = %e, "initial pull did not complete"),
            }
        } else {
            tracing::info!("no remote configured, commits stay local");
        }

        Ok(Self {
            config: Arc::new(config.clone()),
            vault,
            coordinator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn tracker(&self) -> &MutationTracker {
        self.coordinator.tracker()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to open vault repository: {0}")]
    Repository(#[from] RepositoryError),
    #[error("failed to open vault: {0}")]
    Vault(#[from] StoreError),
    #[error("configured remote is unreachable: {0}")]
    RemoteUnreachable(RepositoryError),
    #[error("setup task failed: {0}")]
    Task(String),
}
