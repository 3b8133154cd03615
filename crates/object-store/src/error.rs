/// Errors produced by the vault object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("object not found: {0}")]
    NotFound(String),
    /// The key collides with an existing directory, or one of its parent
    /// segments is an existing object.
    #[error("object key conflicts with existing layout: {0}")]
    KeyConflict(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
