//! Version-control boundary consumed by the sync engine.
//!
//! Every method is a blocking, possibly slow, possibly failing call. The
//! engine only schedules them and holds the right exclusion around them; it
//! never looks inside a commit.

mod error;
mod git;

pub use error::RepositoryError;
pub use git::{GitConfig, GitRepository, DEFAULT_REMOTE};

use std::fmt;

/// Identifier of a committed snapshot (a commit hash for git).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How local history relates to remote history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    /// Local contains remote plus local-only commits.
    Ahead,
    /// Remote contains local; a fast-forward is possible.
    Behind,
    /// Both sides have commits the other lacks.
    Diverged,
}

/// The primitive operations the sync engine needs from a version-control
/// system. Implementations are driven from `spawn_blocking`.
pub trait Repository: Send + 'static {
    /// Whether a remote is configured at all. Without one, commits are the
    /// end of the line and pulls are never requested.
    fn has_remote(&self) -> bool;

    /// Current local head, `None` before the first commit.
    fn head(&self) -> Result<Option<SnapshotId>, RepositoryError>;

    /// Whether the working tree differs from the head snapshot.
    fn has_changes(&self) -> Result<bool, RepositoryError>;

    /// Snapshot the whole working tree. `None` when nothing changed.
    fn commit(&mut self, message: &str) -> Result<Option<SnapshotId>, RepositoryError>;

    /// Publish the local branch to the remote.
    fn push(&mut self) -> Result<(), RepositoryError>;

    /// Download remote history and return the remote branch head, `None` if
    /// the remote does not have the branch yet.
    fn fetch(&mut self) -> Result<Option<SnapshotId>, RepositoryError>;

    fn relation(
        &self,
        local: &SnapshotId,
        remote: &SnapshotId,
    ) -> Result<Relation, RepositoryError>;

    /// Move the branch to `to` and update the working tree, refusing to
    /// touch uncommitted files.
    fn fast_forward(&mut self, to: &SnapshotId) -> Result<(), RepositoryError>;

    /// Make branch, index and working tree exactly `to`, discarding local
    /// changes.
    fn reset_hard(&mut self, to: &SnapshotId) -> Result<(), RepositoryError>;
}
