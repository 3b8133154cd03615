use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::key::ObjectKey;

/// Guard returned by [`WriteGate::exclusive`].
pub type ExclusiveGuard = OwnedRwLockWriteGuard<()>;

/// Shared/exclusive gate between object mutations and tree snapshots.
///
/// Object writers hold it shared, so writes to different keys run in
/// parallel. Whoever needs a consistent tree (commit, checkout) holds it
/// exclusively. Readers never touch it.
#[derive(Debug, Clone, Default)]
pub struct WriteGate {
    inner: Arc<RwLock<()>>,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn shared(&self) -> OwnedRwLockReadGuard<()> {
        self.inner.clone().read_owned().await
    }

    pub async fn exclusive(&self) -> ExclusiveGuard {
        self.inner.clone().write_owned().await
    }

    /// Exclusive access if nobody holds the gate right now.
    pub fn try_exclusive(&self) -> Option<ExclusiveGuard> {
        self.inner.clone().try_write_owned().ok()
    }
}

/// Per-key mutexes, created on demand and dropped once unused.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: parking_lot::Mutex<HashMap<ObjectKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub async fn lock(&self, key: &ObjectKey) -> KeyGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock();
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

pub(crate) struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: ObjectKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // release our Arc first so the count below only sees the map and waiters
        self.guard.take();
        let mut locks = self.locks.locks.lock();
        if let Some(mutex) = locks.get(&self.key) {
            if Arc::strong_count(mutex) == 1 {
                locks.remove(&self.key);
            }
        }
    }
}
