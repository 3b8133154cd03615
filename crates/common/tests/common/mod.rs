//! Shared fixtures for sync engine tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use ::common::repo::{GitConfig, Relation, Repository, RepositoryError, SnapshotId};
use ::common::sync::{
    ConflictPolicy, CoordinatorConfig, Debouncer, LocalFirst, MutationTracker, Puller,
    SyncCoordinator,
};
use object_store::WriteGate;

/// Observable state of a [`FakeRepository`].
#[derive(Debug, Default)]
pub struct FakeState {
    /// The working tree differs from head.
    pub changes: bool,
    pub head: Option<SnapshotId>,
    pub remote_head: Option<SnapshotId>,
    /// Answer for `relation` when local and remote differ.
    pub relation: Option<Relation>,

    pub commit_messages: Vec<String>,
    pub pushes: usize,
    pub fetches: usize,
    pub fast_forwards: Vec<SnapshotId>,
    pub resets: Vec<SnapshotId>,

    /// Number of upcoming pushes that fail with a network error.
    pub failing_pushes: usize,
    /// Pushes are rejected as non-fast-forward.
    pub reject_pushes: bool,
    pub failing_fetches: usize,
    /// The next push hangs this long before reaching the remote.
    pub push_stall: Option<Duration>,
    pub fetch_stall: Option<Duration>,
    /// Checkouts refuse to overwrite local files.
    pub checkout_conflict: bool,

    next_id: u64,
}

/// In-memory [`Repository`] with scriptable failures.
#[derive(Debug, Clone)]
pub struct FakeRepository {
    pub state: Arc<Mutex<FakeState>>,
    remote: bool,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::with_remote(true)
    }

    pub fn local_only() -> Self {
        Self::with_remote(false)
    }

    fn with_remote(remote: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            remote,
        }
    }

    /// Simulate a completed write in the working tree.
    pub fn touch(&self) {
        self.state.lock().changes = true;
    }

    /// Simulate someone else pushing a commit to the remote.
    pub fn remote_commit(&self, relation: Relation) -> SnapshotId {
        let mut state = self.state.lock();
        let id = state.next_snapshot();
        state.remote_head = Some(id.clone());
        state.relation = Some(relation);
        id
    }

    pub fn commits(&self) -> usize {
        self.state.lock().commit_messages.len()
    }

    pub fn pushes(&self) -> usize {
        self.state.lock().pushes
    }

    pub fn fetches(&self) -> usize {
        self.state.lock().fetches
    }
}

impl FakeState {
    fn next_snapshot(&mut self) -> SnapshotId {
        self.next_id += 1;
        SnapshotId::new(format!("{:040x}", self.next_id))
    }
}

impl Repository for FakeRepository {
    fn has_remote(&self) -> bool {
        self.remote
    }

    fn head(&self) -> Result<Option<SnapshotId>, RepositoryError> {
        Ok(self.state.lock().head.clone())
    }

    fn has_changes(&self) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().changes)
    }

    fn commit(&mut self, message: &str) -> Result<Option<SnapshotId>, RepositoryError> {
        let mut state = self.state.lock();
        if !state.changes {
            return Ok(None);
        }
        let id = state.next_snapshot();
        state.changes = false;
        state.head = Some(id.clone());
        state.commit_messages.push(message.to_string());
        if state.remote_head.is_some() && state.relation == Some(Relation::Equal) {
            state.relation = Some(Relation::Ahead);
        }
        Ok(Some(id))
    }

    fn push(&mut self) -> Result<(), RepositoryError> {
        let stall = self.state.lock().push_stall.take();
        if let Some(stall) = stall {
            std::thread::sleep(stall);
        }
        let mut state = self.state.lock();
        if state.failing_pushes > 0 {
            state.failing_pushes -= 1;
            return Err(RepositoryError::Network("connection refused".to_string()));
        }
        if state.reject_pushes {
            return Err(RepositoryError::Rejected(
                "refs/heads/main: non-fast-forward".to_string(),
            ));
        }
        state.pushes += 1;
        state.remote_head = state.head.clone();
        state.relation = Some(Relation::Equal);
        Ok(())
    }

    fn fetch(&mut self) -> Result<Option<SnapshotId>, RepositoryError> {
        let stall = self.state.lock().fetch_stall.take();
        if let Some(stall) = stall {
            std::thread::sleep(stall);
        }
        let mut state = self.state.lock();
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(RepositoryError::Network("could not resolve host".to_string()));
        }
        state.fetches += 1;
        Ok(state.remote_head.clone())
    }

    fn relation(
        &self,
        local: &SnapshotId,
        remote: &SnapshotId,
    ) -> Result<Relation, RepositoryError> {
        if local == remote {
            return Ok(Relation::Equal);
        }
        Ok(self.state.lock().relation.unwrap_or(Relation::Diverged))
    }

    fn fast_forward(&mut self, to: &SnapshotId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        if state.checkout_conflict {
            return Err(RepositoryError::CheckoutConflict(
                "1 conflict prevents checkout".to_string(),
            ));
        }
        state.head = Some(to.clone());
        state.relation = Some(Relation::Equal);
        state.fast_forwards.push(to.clone());
        Ok(())
    }

    fn reset_hard(&mut self, to: &SnapshotId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        state.head = Some(to.clone());
        state.changes = false;
        state.relation = Some(Relation::Equal);
        state.resets.push(to.clone());
        Ok(())
    }
}

/// A coordinator over a [`FakeRepository`] plus optional background loops.
pub struct Harness {
    pub repo: FakeRepository,
    pub tracker: MutationTracker,
    pub gate: WriteGate,
    pub coordinator: SyncCoordinator,
    shutdown: watch::Sender<()>,
}

impl Harness {
    pub fn new(repo: FakeRepository) -> Self {
        Self::with_policy(repo, Arc::new(LocalFirst))
    }

    pub fn with_policy(repo: FakeRepository, policy: Arc<dyn ConflictPolicy>) -> Self {
        let config = CoordinatorConfig {
            git_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        Self::with_config(repo, policy, config, WriteGate::new())
    }

    /// A coordinator sharing `gate` with a real vault.
    pub fn with_config(
        repo: FakeRepository,
        policy: Arc<dyn ConflictPolicy>,
        config: CoordinatorConfig,
        gate: WriteGate,
    ) -> Self {
        let tracker = MutationTracker::new();
        let (coordinator, _handle) =
            SyncCoordinator::spawn(repo.clone(), gate.clone(), tracker.clone(), policy, config);
        let (shutdown, _) = watch::channel(());
        Self {
            repo,
            tracker,
            gate,
            coordinator,
            shutdown,
        }
    }

    pub fn start_debouncer(&self, window: Duration) -> tokio::task::JoinHandle<()> {
        Debouncer::new(self.coordinator.clone(), window).spawn(self.shutdown.subscribe())
    }

    pub fn start_puller(&self, interval: Duration) -> Option<tokio::task::JoinHandle<()>> {
        Puller::new(self.coordinator.clone(), interval)
            .map(|puller| puller.spawn(self.shutdown.subscribe()))
    }

    /// A completed object write.
    pub fn write(&self) {
        self.repo.touch();
        self.tracker.mark_dirty();
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Poll `condition` every 10ms until it holds or `limit` passes.
pub async fn wait_for(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A bare repository standing in for the remote.
pub fn bare_remote(dir: &Path) -> String {
    let repo = git2::Repository::init_bare(dir).expect("init bare remote");
    repo.set_head("refs/heads/main").expect("remote head");
    dir.to_string_lossy().into_owned()
}

pub fn git_config(remote: Option<String>) -> GitConfig {
    GitConfig {
        remote_url: remote,
        ..Default::default()
    }
}

/// Commit `files` on `branch` of the bare remote through a scratch clone,
/// as another writer would.
pub fn commit_to_remote(remote: &str, scratch: &Path, files: &[(&str, &str)]) -> SnapshotId {
    let repo = match git2::Repository::open(scratch) {
        Ok(repo) => repo,
        Err(_) => git2::Repository::clone(remote, scratch).expect("clone remote"),
    };
    {
        let mut origin = repo.find_remote("origin").expect("origin");
        origin
            .fetch(&["+refs/heads/*:refs/remotes/origin/*"], None, None)
            .expect("fetch");
    }
    let parent = repo
        .find_reference("refs/remotes/origin/main")
        .ok()
        .and_then(|r| r.target())
        .map(|oid| repo.find_commit(oid).expect("parent commit"));
    if let Some(parent) = &parent {
        repo.reset(parent.as_object(), git2::ResetType::Hard, None)
            .expect("reset scratch");
    }

    for (path, contents) in files {
        let full = scratch.join(path);
        if let Some(dir) = full.parent() {
            std::fs::create_dir_all(dir).expect("mkdir");
        }
        std::fs::write(full, contents).expect("write");
    }
    let mut index = repo.index().expect("index");
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .expect("add");
    index.write().expect("write index");
    let tree = repo.find_tree(index.write_tree().expect("tree")).expect("find tree");
    let signature = git2::Signature::now("other", "other@example.com").expect("signature");
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let oid = repo
        .commit(None, &signature, &signature, "remote edit", &tree, &parents)
        .expect("commit");
    repo.reference("refs/heads/main", oid, true, "remote edit")
        .expect("branch");
    let mut origin = repo.find_remote("origin").expect("origin");
    origin
        .push(&["refs/heads/main:refs/heads/main"], None)
        .expect("push");
    SnapshotId::new(oid.to_string())
}

/// Read the branch head of the bare remote.
pub fn remote_head(remote: &str) -> Option<SnapshotId> {
    let repo = git2::Repository::open_bare(remote).ok()?;
    let reference = repo.find_reference("refs/heads/main").ok()?;
    reference.target().map(|oid| SnapshotId::new(oid.to_string()))
}

/// Paths tracked in the remote head, sorted.
pub fn remote_files(remote: &str) -> Vec<String> {
    let Ok(repo) = git2::Repository::open_bare(remote) else {
        return Vec::new();
    };
    let Ok(reference) = repo.find_reference("refs/heads/main") else {
        return Vec::new();
    };
    let tree = reference.peel_to_tree().expect("tree");
    let mut files = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            files.push(format!("{root}{}", entry.name().unwrap_or_default()));
        }
        git2::TreeWalkResult::Ok
    })
    .expect("walk");
    files.sort();
    files
}
