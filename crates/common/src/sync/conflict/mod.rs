//! What to do when a pull finds new remote history while local work is still
//! pending.
//!
//! # Built-in Policies
//!
//! - **[`LocalFirst`]**: publish local work before taking anything from the
//!   remote; if that is impossible, skip the pull and report a conflict
//! - **[`RemoteWins`]**: discard unpublished local work and adopt the remote
//!   head (read replicas)
//!
//! Implement [`ConflictPolicy`] to plug in another strategy.

mod local_first;
mod remote_wins;

pub use local_first::LocalFirst;
pub use remote_wins::RemoteWins;

use crate::repo::{Relation, SnapshotId};

/// A pull that cannot simply fast-forward a clean vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// [`Relation::Behind`] with pending local edits, or
    /// [`Relation::Diverged`].
    pub relation: Relation,
    pub local_head: Option<SnapshotId>,
    pub remote_head: SnapshotId,
    /// Mutations not yet captured in a commit.
    pub uncommitted: bool,
    /// Local commits the remote has not seen.
    pub unpublished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep every local change and try to publish it before integrating.
    PublishLocal,
    /// Replace local state with the remote head.
    AcceptRemote,
}

/// Trait for conflict policies
///
/// Consulted by the coordinator, inside its critical section, whenever a
/// pull meets pending local work.
pub trait ConflictPolicy: std::fmt::Debug + Send + Sync {
    /// Short name shown in the sync status.
    fn name(&self) -> &'static str;

    fn resolve(&self, divergence: &Divergence) -> Resolution;
}

#[cfg(test)]
pub(crate) fn divergence(relation: Relation, uncommitted: bool, unpublished: bool) -> Divergence {
    Divergence {
        relation,
        local_head: Some(SnapshotId::new("1111111111111111111111111111111111111111")),
        remote_head: SnapshotId::new("2222222222222222222222222222222222222222"),
        uncommitted,
        unpublished,
    }
}
