//! Filesystem-backed object store for the vault.
//!
//! The vault directory is both the object namespace and a version-control
//! working copy, so there is no separate index: a key maps to a relative path,
//! deleting the file deletes the object and walking the tree lists objects.
//!
//! # Concurrency
//!
//! - Writes go to a staging file, are fsynced and then renamed into place, so
//!   readers never observe partial content.
//! - Writes and deletes of the same key are serialized by a per-key lock.
//! - Every mutation holds the [`WriteGate`] in shared mode. Snapshotting the
//!   tree (commit, checkout) takes the gate exclusively, which waits for
//!   in-flight writes and briefly holds back new ones.
//! - Reads take no locks at all.

mod error;
mod key;
mod listing;
mod locks;
mod store;

pub use error::{Result, StoreError};
pub use key::{ObjectKey, MAX_KEY_LEN, RESERVED_SEGMENT};
pub use listing::{ListPage, ListQuery, DEFAULT_MAX_KEYS};
pub use locks::{ExclusiveGuard, WriteGate};
pub use store::{ObjectMeta, Vault};
