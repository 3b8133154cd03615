use crate::repo::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("commit failed: {0}")]
    Commit(RepositoryError),
    #[error("push failed: {0}")]
    Push(RepositoryError),
    #[error("fetch failed: {0}")]
    Fetch(RepositoryError),
    #[error("failed to integrate remote history: {0}")]
    Integrate(RepositoryError),
    /// Local and remote history both moved; the pull was skipped.
    #[error("remote diverged: {0}")]
    Diverged(String),
    /// The coordinator queue is full; the request was dropped.
    #[error("sync coordinator busy")]
    Busy,
    #[error("sync coordinator stopped")]
    Stopped,
}

impl SyncError {
    /// Failures worth nothing more than a retry on the next cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Push(e) | Self::Fetch(e) => e.is_transient(),
            Self::Busy => true,
            _ => false,
        }
    }
}
