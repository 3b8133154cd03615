//! Remote-wins conflict policy

use super::{ConflictPolicy, Divergence, Resolution};

/// The remote is the source of truth.
///
/// Intended for read replicas: unpublished local changes are dropped and the
/// working tree is reset to the remote head.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteWins;

impl ConflictPolicy for RemoteWins {
    fn name(&self) -> &'static str {
        "remote-wins"
    }

    fn resolve(&self, _divergence: &Divergence) -> Resolution {
        Resolution::AcceptRemote
    }
}
