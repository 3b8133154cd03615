use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Counts vault mutations and remembers how far they have been committed and
/// published.
///
/// Three monotonic counters:
/// - `generation`: bumped by every successful write or delete
/// - `committed`: highest generation captured in a local commit
/// - `synced`: highest generation known to be on the remote
///
/// The vault is dirty while `generation > synced`. Cheap to clone; all
/// clones share the same counters.
#[derive(Debug, Clone)]
pub struct MutationTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug)]
struct TrackerInner {
    generation: AtomicU64,
    committed: AtomicU64,
    synced: AtomicU64,
    changes: watch::Sender<u64>,
}

impl MutationTracker {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(TrackerInner {
                generation: AtomicU64::new(0),
                committed: AtomicU64::new(0),
                synced: AtomicU64::new(0),
                changes,
            }),
        }
    }

    /// Record a completed mutation and wake anyone waiting for changes.
    /// Never blocks. Returns the new generation.
    pub fn mark_dirty(&self) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.changes.send_modify(|latest| {
            if generation > *latest {
                *latest = generation;
            }
        });
        generation
    }

    pub fn is_dirty(&self) -> bool {
        self.generation() > self.synced()
    }

    /// Some commits exist locally that the remote has not seen.
    pub fn has_unpublished_commits(&self) -> bool {
        self.committed() > self.synced()
    }

    /// Mutations not yet captured in any commit.
    pub fn has_uncommitted_changes(&self) -> bool {
        self.generation() > self.committed()
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> u64 {
        self.inner.committed.load(Ordering::SeqCst)
    }

    pub fn synced(&self) -> u64 {
        self.inner.synced.load(Ordering::SeqCst)
    }

    pub fn mark_committed(&self, generation: u64) {
        self.inner.committed.fetch_max(generation, Ordering::SeqCst);
    }

    /// Everything up to `generation` is on the remote, which implies it is
    /// committed as well.
    pub fn mark_synced(&self, generation: u64) {
        self.inner.committed.fetch_max(generation, Ordering::SeqCst);
        self.inner.synced.fetch_max(generation, Ordering::SeqCst);
    }

    /// Receiver that wakes on every [`mark_dirty`](Self::mark_dirty).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }
}

impl Default for MutationTracker {
    fn default() -> Self {
        Self::new()
    }
}
