use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the coordinator is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Committing,
    Pushing,
    Pulling,
}

/// Coarse state reported to operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Everything written has reached the remote.
    #[default]
    Clean,
    /// Mutations are waiting for the next commit.
    Dirty,
    /// A commit or push is running.
    Syncing,
    Pulling,
}

impl SyncState {
    pub fn derive(phase: SyncPhase, dirty: bool) -> Self {
        match phase {
            SyncPhase::Committing | SyncPhase::Pushing => Self::Syncing,
            SyncPhase::Pulling => Self::Pulling,
            SyncPhase::Idle if dirty => Self::Dirty,
            SyncPhase::Idle => Self::Clean,
        }
    }
}

/// Point-in-time view of the sync engine, served as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub phase: SyncPhase,
    pub policy: String,
    pub remote_configured: bool,

    pub generation: u64,
    pub committed_generation: u64,
    pub synced_generation: u64,

    pub local_head: Option<String>,
    pub remote_ref: Option<String>,

    pub commits: u64,
    pub pushes: u64,
    pub pulls: u64,
    pub conflicts: u64,
    pub failures: u64,
    /// Times two repository operations were found running at once. Anything
    /// but zero is a bug.
    pub overlapping_sections: u64,

    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_pull_at: Option<DateTime<Utc>>,
}
