//! Synchronization engine for a git-backed vault.
//!
//! The vault directory is mutated by object writes and periodically turned
//! into commits that are pushed to a remote, while remote history is pulled
//! back in on an interval. This crate decides *when* each of those happens and
//! guarantees they never interleave badly:
//!
//! - [`sync::MutationTracker`] counts mutations (the *generation*).
//! - [`sync::Debouncer`] turns bursts of mutations into one commit attempt.
//! - [`sync::Puller`] asks for a pull on a fixed interval.
//! - [`sync::SyncCoordinator`] owns the repository and runs commit/push and
//!   pull one at a time, applying a [`sync::ConflictPolicy`].
//!
//! The version-control primitives themselves sit behind
//! [`repo::Repository`], implemented for git by [`repo::GitRepository`].

pub mod repo;
pub mod sync;
pub mod version;
