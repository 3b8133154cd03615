//! The single owner of the repository.
//!
//! Commit/push and pull requests are queued on a bounded channel and run by
//! one worker task, one at a time. Blocking git calls go to
//! `spawn_blocking`; network calls carry a timeout. The vault write gate is
//! held exclusively only around the local steps (commit, checkout), never
//! around push or fetch. The repository lock is always taken before the
//! gate, so a network call that outlives its timeout delays the next sync
//! step but never writers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use object_store::WriteGate;
use parking_lot::RwLock;
use tokio::sync::{oneshot, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::repo::{Relation, Repository, RepositoryError, SnapshotId};

use super::conflict::{ConflictPolicy, Divergence, Resolution};
use super::{MutationTracker, SyncError, SyncPhase, SyncState, SyncStatus};

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound for a single push or fetch.
    pub git_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            git_timeout: DEFAULT_GIT_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing newer than the requested generation was pending.
    AlreadySynced,
    /// Committed (when the tree changed) and pushed.
    Synced {
        generation: u64,
        snapshot: Option<SnapshotId>,
    },
    /// Committed; there is no remote to push to.
    LocalOnly {
        generation: u64,
        snapshot: Option<SnapshotId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// No remote, or the remote does not have the branch yet.
    RemoteEmpty,
    UpToDate,
    FastForwarded { to: SnapshotId },
    /// Pending local work was published while integrating the remote.
    Published { head: Option<SnapshotId> },
    /// Local state was replaced by the remote head.
    ResetToRemote { to: SnapshotId },
}

#[derive(Debug)]
enum SyncJob {
    CommitAndPush {
        generation: u64,
        reply: oneshot::Sender<Result<CommitOutcome, SyncError>>,
    },
    Pull {
        reply: oneshot::Sender<Result<PullOutcome, SyncError>>,
    },
}

#[derive(Debug)]
struct Shared {
    status: RwLock<SyncStatus>,
    section: CriticalSection,
}

/// Handle to the coordinator task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    jobs: flume::Sender<SyncJob>,
    tracker: MutationTracker,
    shared: Arc<Shared>,
    has_remote: bool,
}

impl SyncCoordinator {
    /// Start the worker task that owns `repo`.
    ///
    /// The worker first inspects the working tree and marks the tracker
    /// dirty if it holds uncommitted changes from a previous run. It exits
    /// once every handle is dropped.
    pub fn spawn<R: Repository>(
        repo: R,
        gate: WriteGate,
        tracker: MutationTracker,
        policy: Arc<dyn ConflictPolicy>,
        config: CoordinatorConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = flume::bounded(config.queue_capacity.max(1));
        let has_remote = repo.has_remote();
        let shared = Arc::new(Shared {
            status: RwLock::new(SyncStatus {
                policy: policy.name().to_string(),
                remote_configured: has_remote,
                ..Default::default()
            }),
            section: CriticalSection::default(),
        });

        let worker = Worker {
            repo: Arc::new(Mutex::new(repo)),
            gate,
            tracker: tracker.clone(),
            policy,
            git_timeout: config.git_timeout,
            shared: shared.clone(),
            has_remote,
            local_head: None,
            remote_ref: None,
        };
        let handle = tokio::spawn(worker.run(rx));

        (
            Self {
                jobs: tx,
                tracker,
                shared,
                has_remote,
            },
            handle,
        )
    }

    /// Commit the working tree and push it, unless everything up to
    /// `generation` is already on the remote. Waits for queue space.
    pub async fn request_commit_and_push(
        &self,
        generation: u64,
    ) -> Result<CommitOutcome, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send_async(SyncJob::CommitAndPush { generation, reply })
            .await
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Fetch and integrate remote history. Fails with [`SyncError::Busy`]
    /// instead of waiting when the queue is full.
    pub async fn request_pull(&self) -> Result<PullOutcome, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .try_send(SyncJob::Pull { reply })
            .map_err(|e| match e {
                flume::TrySendError::Full(_) => SyncError::Busy,
                flume::TrySendError::Disconnected(_) => SyncError::Stopped,
            })?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Commit and push whatever is pending right now.
    pub async fn flush(&self) -> Result<CommitOutcome, SyncError> {
        self.request_commit_and_push(self.tracker.generation())
            .await
    }

    pub fn has_remote(&self) -> bool {
        self.has_remote
    }

    pub fn tracker(&self) -> &MutationTracker {
        &self.tracker
    }

    pub fn status(&self) -> SyncStatus {
        let mut status = self.shared.status.read().clone();
        status.generation = self.tracker.generation();
        status.committed_generation = self.tracker.committed();
        status.synced_generation = self.tracker.synced();
        status.overlapping_sections = self.shared.section.overlaps();
        status.state = SyncState::derive(status.phase, self.tracker.is_dirty());
        status
    }
}

struct Worker<R> {
    repo: Arc<Mutex<R>>,
    gate: WriteGate,
    tracker: MutationTracker,
    policy: Arc<dyn ConflictPolicy>,
    git_timeout: Duration,
    shared: Arc<Shared>,
    has_remote: bool,
    local_head: Option<SnapshotId>,
    /// Last remote head that was integrated or found already contained.
    remote_ref: Option<SnapshotId>,
}

impl<R: Repository> Worker<R> {
    async fn run(mut self, jobs: flume::Receiver<SyncJob>) {
        tracing::info!(
            policy = self.policy.name(),
            remote = self.has_remote,
            "sync coordinator started"
        );
        self.load_state().await;

        while let Ok(job) = jobs.recv_async().await {
            match job {
                SyncJob::CommitAndPush { generation, reply } => {
                    let result = self.commit_and_push(generation).await;
                    let _ = reply.send(result);
                }
                SyncJob::Pull { reply } => {
                    let result = self.pull().await;
                    let _ = reply.send(result);
                }
            }
        }

        tracing::info!("sync coordinator stopped");
    }

    async fn load_state(&mut self) {
        let loaded = blocking(&self.repo, |repo| Ok((repo.head()?, repo.has_changes()?))).await;
        match loaded {
            Ok((head, changed)) => {
                if changed && !self.tracker.is_dirty() {
                    tracing::info!("vault has uncommitted changes from a previous run");
                    self.tracker.mark_dirty();
                }
                self.set_local_head(head);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to inspect repository state");
                self.record_failure(&SyncError::Commit(e));
            }
        }
    }

    async fn commit_and_push(&mut self, requested: u64) -> Result<CommitOutcome, SyncError> {
        let shared = Arc::clone(&self.shared);
        let _section = shared.section.enter();

        if requested <= self.tracker.synced() || !self.tracker.is_dirty() {
            return Ok(CommitOutcome::AlreadySynced);
        }

        let result = self.publish().await;
        self.set_phase(SyncPhase::Idle);
        if let Err(e) = &result {
            self.record_failure(e);
        }
        result
    }

    /// Commit under the write gate, then push without it.
    async fn publish(&mut self) -> Result<CommitOutcome, SyncError> {
        self.set_phase(SyncPhase::Committing);
        let (generation, snapshot) = {
            let repo = self.lock_repo().await;
            let _gate = self.gate.exclusive().await;
            // no write is in flight, so this generation is exactly what the tree holds
            let generation = self.tracker.generation();
            let message = format!(
                "sync: generation {generation} ({})",
                Utc::now().to_rfc3339()
            );
            let snapshot = run_blocking(repo, move |repo| repo.commit(&message))
                .await
                .map_err(SyncError::Commit)?;
            (generation, snapshot)
        };

        self.tracker.mark_committed(generation);
        if let Some(snapshot) = &snapshot {
            tracing::info!(generation, snapshot = snapshot.short(), "committed vault");
            self.shared.status.write().commits += 1;
            self.set_local_head(Some(snapshot.clone()));
        }

        if !self.has_remote {
            self.tracker.mark_synced(generation);
            self.shared.status.write().last_sync_at = Some(Utc::now());
            return Ok(CommitOutcome::LocalOnly {
                generation,
                snapshot,
            });
        }

        self.set_phase(SyncPhase::Pushing);
        network(&self.repo, self.git_timeout, |repo| repo.push())
            .await
            .map_err(SyncError::Push)?;

        self.tracker.mark_synced(generation);
        self.set_remote_ref(self.local_head.clone());
        {
            let mut status = self.shared.status.write();
            status.pushes += 1;
            status.last_sync_at = Some(Utc::now());
        }
        tracing::info!(
            generation,
            head = self.local_head.as_ref().map(|h| h.short()).unwrap_or("none"),
            "pushed vault"
        );

        Ok(CommitOutcome::Synced {
            generation,
            snapshot,
        })
    }

    async fn pull(&mut self) -> Result<PullOutcome, SyncError> {
        let shared = Arc::clone(&self.shared);
        let _section = shared.section.enter();

        if !self.has_remote {
            return Ok(PullOutcome::RemoteEmpty);
        }

        self.set_phase(SyncPhase::Pulling);
        let result = self.integrate_remote().await;
        self.set_phase(SyncPhase::Idle);

        match &result {
            Ok(outcome) => {
                tracing::debug!(?outcome, "pull finished");
                let mut status = self.shared.status.write();
                status.pulls += 1;
                status.last_pull_at = Some(Utc::now());
            }
            Err(e) => self.record_failure(e),
        }
        result
    }

    async fn integrate_remote(&mut self) -> Result<PullOutcome, SyncError> {
        let fetched = network(&self.repo, self.git_timeout, |repo| repo.fetch())
            .await
            .map_err(SyncError::Fetch)?;

        let Some(remote) = fetched else {
            if self.local_head.is_some() && !self.tracker.is_dirty() {
                tracing::info!("remote branch missing, scheduling push of local history");
                self.tracker.mark_dirty();
            }
            return Ok(PullOutcome::RemoteEmpty);
        };

        if self.remote_ref.as_ref() == Some(&remote) {
            return Ok(PullOutcome::UpToDate);
        }

        let relation = match self.local_head.clone() {
            None => Relation::Behind,
            Some(local) => {
                let target = remote.clone();
                blocking(&self.repo, move |repo| repo.relation(&local, &target))
                    .await
                    .map_err(SyncError::Integrate)?
            }
        };

        match relation {
            Relation::Equal | Relation::Ahead => {
                if relation == Relation::Ahead && !self.tracker.is_dirty() {
                    tracing::info!(
                        remote = remote.short(),
                        "local history ahead of remote, scheduling push"
                    );
                    self.tracker.mark_dirty();
                }
                self.set_remote_ref(Some(remote));
                Ok(PullOutcome::UpToDate)
            }
            Relation::Behind if !self.tracker.is_dirty() => self.fast_forward(remote).await,
            Relation::Behind | Relation::Diverged => {
                let divergence = Divergence {
                    relation,
                    local_head: self.local_head.clone(),
                    remote_head: remote,
                    uncommitted: self.tracker.has_uncommitted_changes(),
                    unpublished: self.tracker.has_unpublished_commits(),
                };
                match self.policy.resolve(&divergence) {
                    Resolution::PublishLocal => self.publish_local_first(divergence).await,
                    Resolution::AcceptRemote => self.accept_remote(divergence.remote_head).await,
                }
            }
        }
    }

    async fn fast_forward(&mut self, remote: SnapshotId) -> Result<PullOutcome, SyncError> {
        {
            let repo = self.lock_repo().await;
            let _gate = self.gate.exclusive().await;
            let target = remote.clone();
            run_blocking(repo, move |repo| repo.fast_forward(&target))
                .await
                .map_err(SyncError::Integrate)?;
        }
        tracing::info!(to = remote.short(), "fast-forwarded to remote");
        self.set_local_head(Some(remote.clone()));
        self.set_remote_ref(Some(remote.clone()));
        Ok(PullOutcome::FastForwarded { to: remote })
    }

    /// Local work goes out before remote work comes in. When the remote is
    /// only ahead, its history is checked out underneath the pending edits
    /// (a safe checkout never overwrites them) so the publish can succeed.
    async fn publish_local_first(
        &mut self,
        divergence: Divergence,
    ) -> Result<PullOutcome, SyncError> {
        let remote = divergence.remote_head;
        tracing::info!(
            remote = remote.short(),
            relation = ?divergence.relation,
            uncommitted = divergence.uncommitted,
            unpublished = divergence.unpublished,
            "publishing local changes before pull"
        );

        if divergence.relation == Relation::Behind {
            if let Err(e) = self.fast_forward(remote.clone()).await {
                return Err(self.conflict(&remote, e));
            }
        }

        match self.publish().await {
            Ok(_) => Ok(PullOutcome::Published {
                head: self.local_head.clone(),
            }),
            Err(e) => Err(self.conflict(&remote, e)),
        }
    }

    async fn accept_remote(&mut self, remote: SnapshotId) -> Result<PullOutcome, SyncError> {
        {
            let repo = self.lock_repo().await;
            let _gate = self.gate.exclusive().await;
            let generation = self.tracker.generation();
            let target = remote.clone();
            run_blocking(repo, move |repo| repo.reset_hard(&target))
                .await
                .map_err(SyncError::Integrate)?;
            self.tracker.mark_synced(generation);
        }
        self.shared.status.write().conflicts += 1;
        tracing::warn!(
            to = remote.short(),
            "reset vault to remote head, unpublished local changes discarded"
        );
        self.set_local_head(Some(remote.clone()));
        self.set_remote_ref(Some(remote.clone()));
        Ok(PullOutcome::ResetToRemote { to: remote })
    }

    /// Turn a failed local-first publish into a reported conflict. Transient
    /// failures pass through untouched and are retried next cycle.
    fn conflict(&self, remote: &SnapshotId, cause: SyncError) -> SyncError {
        let diverged = match &cause {
            SyncError::Push(e) | SyncError::Integrate(e) => e.is_divergence(),
            _ => false,
        };
        if !diverged {
            return cause;
        }

        self.shared.status.write().conflicts += 1;
        tracing::error!(
            remote = remote.short(),
            error = %cause,
            "remote diverged from local changes, pull skipped"
        );
        SyncError::Diverged(format!(
            "local changes could not be published over {}: {cause}",
            remote.short()
        ))
    }

    /// Wait out any network call still running from an earlier timeout.
    async fn lock_repo(&self) -> OwnedMutexGuard<R> {
        Arc::clone(&self.repo).lock_owned().await
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.shared.status.write().phase = phase;
    }

    fn set_local_head(&mut self, head: Option<SnapshotId>) {
        self.shared.status.write().local_head = head.as_ref().map(|h| h.to_string());
        self.local_head = head;
    }

    fn set_remote_ref(&mut self, remote: Option<SnapshotId>) {
        self.shared.status.write().remote_ref = remote.as_ref().map(|r| r.to_string());
        self.remote_ref = remote;
    }

    fn record_failure(&self, error: &SyncError) {
        tracing::warn!(error = %error, "sync operation failed");
        let mut status = self.shared.status.write();
        status.failures += 1;
        status.last_error = Some(error.to_string());
        status.last_error_at = Some(Utc::now());
    }
}

/// Detects two repository operations running at the same time.
#[derive(Debug, Default)]
struct CriticalSection {
    active: AtomicUsize,
    overlaps: AtomicU64,
}

impl CriticalSection {
    fn enter(&self) -> SectionGuard<'_> {
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
            tracing::error!("repository operations overlapped");
        }
        SectionGuard { section: self }
    }

    fn overlaps(&self) -> u64 {
        self.overlaps.load(Ordering::SeqCst)
    }
}

struct SectionGuard<'a> {
    section: &'a CriticalSection,
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        self.section.active.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn blocking<R, T, F>(repo: &Arc<Mutex<R>>, op: F) -> Result<T, RepositoryError>
where
    R: Repository,
    T: Send + 'static,
    F: FnOnce(&mut R) -> Result<T, RepositoryError> + Send + 'static,
{
    run_blocking(Arc::clone(repo).lock_owned().await, op).await
}

async fn run_blocking<R, T, F>(
    mut repo: OwnedMutexGuard<R>,
    op: F,
) -> Result<T, RepositoryError>
where
    R: Repository,
    T: Send + 'static,
    F: FnOnce(&mut R) -> Result<T, RepositoryError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&mut *repo))
        .await
        .map_err(|e| RepositoryError::Task(e.to_string()))?
}

/// Like [`blocking`] but bounded by `limit`, including the wait for the
/// repository. On timeout the call keeps running in the background and
/// holds the repository until it returns.
async fn network<R, T, F>(
    repo: &Arc<Mutex<R>>,
    limit: Duration,
    op: F,
) -> Result<T, RepositoryError>
where
    R: Repository,
    T: Send + 'static,
    F: FnOnce(&mut R) -> Result<T, RepositoryError> + Send + 'static,
{
    tokio::time::timeout(limit, blocking(repo, op))
        .await
        .map_err(|_| RepositoryError::Timeout(limit))?
}
