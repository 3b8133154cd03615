//! Sync engine: mutation tracking, debounced publishing, periodic pulls.

pub mod conflict;
mod coordinator;
mod debouncer;
mod error;
mod puller;
mod status;
mod tracker;

pub use conflict::{ConflictPolicy, Divergence, LocalFirst, RemoteWins, Resolution};
pub use coordinator::{
    CommitOutcome, CoordinatorConfig, PullOutcome, SyncCoordinator, DEFAULT_GIT_TIMEOUT,
};
pub use debouncer::Debouncer;
pub use error::SyncError;
pub use puller::Puller;
pub use status::{SyncPhase, SyncState, SyncStatus};
pub use tracker::MutationTracker;
