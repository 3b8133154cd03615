use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Connection, transport or authentication failure talking to the remote.
    #[error("network error: {0}")]
    Network(String),
    /// The remote refused the update because it is not a fast-forward.
    #[error("remote rejected update: {0}")]
    Rejected(String),
    /// Integrating remote history would overwrite local files.
    #[error("checkout conflict: {0}")]
    CheckoutConflict(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote url not supported by this build: {0}")]
    UnsupportedRemote(String),
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("repository task failed: {0}")]
    Task(String),
}

impl RepositoryError {
    /// Transient failures are retried on the next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// The remote has history we can neither fast-forward over nor publish on
    /// top of.
    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::CheckoutConflict(_))
    }
}

/// Sort a raw libgit2 error into the taxonomy above.
pub(crate) fn classify(err: git2::Error) -> RepositoryError {
    use git2::{ErrorClass, ErrorCode};

    match (err.code(), err.class()) {
        (ErrorCode::NotFastForward, _) => RepositoryError::Rejected(err.message().to_string()),
        (ErrorCode::Conflict, _) | (_, ErrorClass::Checkout) => {
            RepositoryError::CheckoutConflict(err.message().to_string())
        }
        (ErrorCode::Auth, _)
        | (ErrorCode::Certificate, _)
        | (_, ErrorClass::Net)
        | (_, ErrorClass::Http)
        | (_, ErrorClass::Ssh)
        | (_, ErrorClass::Ssl) => RepositoryError::Network(err.message().to_string()),
        _ => RepositoryError::Git(err),
    }
}
