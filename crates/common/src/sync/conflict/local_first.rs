//! Local-first conflict policy

use super::{ConflictPolicy, Divergence, Resolution};

/// Local writes are never discarded.
///
/// Pending work is published before remote history is taken in. When the
/// remote has diverged so far that publishing is rejected, the pull is
/// skipped and the conflict surfaced; the vault keeps serving local data.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFirst;

impl ConflictPolicy for LocalFirst {
    fn name(&self) -> &'static str {
        "local-first"
    }

    fn resolve(&self, _divergence: &Divergence) -> Resolution {
        Resolution::PublishLocal
    }
}
