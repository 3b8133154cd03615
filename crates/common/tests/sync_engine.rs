//! Timing and ordering behaviour of the sync engine over a scripted
//! repository. Time is paused unless a test stalls the blocking pool, which
//! keeps a paused clock from advancing.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tempfile::TempDir;

use ::common::repo::{Relation, RepositoryError};
use ::common::sync::{
    CommitOutcome, CoordinatorConfig, LocalFirst, PullOutcome, RemoteWins, SyncError, SyncState,
};
use object_store::{ObjectKey, Vault};

use common::{wait_for, FakeRepository, Harness};

const WINDOW: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn test_burst_of_writes_makes_one_commit() {
    let harness = Harness::new(FakeRepository::new());
    harness.start_debouncer(WINDOW);

    for _ in 0..10 {
        harness.write();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // quiet period restarts on every write
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(harness.repo.commits(), 0);

    assert!(wait_for(Duration::from_secs(2), || harness.repo.pushes() == 1).await);
    assert_eq!(harness.repo.commits(), 1);
    assert_eq!(harness.tracker.synced(), 10);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.repo.commits(), 1);
    assert_eq!(harness.coordinator.status().state, SyncState::Clean);
}

#[tokio::test(start_paused = true)]
async fn test_commit_message_names_generation() {
    let harness = Harness::new(FakeRepository::new());
    harness.start_debouncer(WINDOW);

    harness.write();
    harness.write();
    assert!(wait_for(Duration::from_secs(11), || harness.repo.commits() == 1).await);

    let message = harness.repo.state.lock().commit_messages[0].clone();
    assert!(message.starts_with("sync: generation 2 ("), "{message}");
}

#[tokio::test(start_paused = true)]
async fn test_failed_push_is_retried() {
    let repo = FakeRepository::new();
    repo.state.lock().failing_pushes = 1;
    let harness = Harness::new(repo);
    harness.start_debouncer(WINDOW);

    harness.write();
    assert!(wait_for(Duration::from_secs(11), || harness.coordinator.status().failures == 1).await);

    // committed locally, still pending replication
    let status = harness.coordinator.status();
    assert_eq!(harness.repo.commits(), 1);
    assert_eq!(harness.repo.pushes(), 0);
    assert_eq!(status.committed_generation, 1);
    assert_eq!(status.synced_generation, 0);
    assert!(status.last_error.is_some());
    assert!(harness.tracker.is_dirty());

    // next cycle pushes the existing commit without making another
    assert!(wait_for(Duration::from_secs(11), || harness.repo.pushes() == 1).await);
    assert_eq!(harness.repo.commits(), 1);
    assert_eq!(harness.tracker.synced(), 1);
    assert!(!harness.tracker.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_window_commits_immediately() {
    let harness = Harness::new(FakeRepository::new());
    harness.start_debouncer(Duration::ZERO);

    harness.write();
    assert!(wait_for(Duration::from_millis(100), || harness.repo.pushes() == 1).await);
}

#[tokio::test(start_paused = true)]
async fn test_commit_waits_for_in_flight_write() {
    let harness = Harness::new(FakeRepository::new());
    harness.start_debouncer(Duration::from_secs(1));

    harness.write();
    // a second write is mid-flight when the debounce window closes
    let in_flight = harness.gate.shared().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.repo.commits(), 0);
    assert_eq!(harness.coordinator.status().state, SyncState::Syncing);

    harness.write();
    drop(in_flight);

    assert!(wait_for(Duration::from_secs(1), || harness.repo.pushes() == 1).await);
    // the commit covered both writes
    assert_eq!(harness.repo.commits(), 1);
    assert_eq!(harness.tracker.synced(), 2);
    assert!(!harness.tracker.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_write_during_sync_is_not_lost() {
    let harness = Harness::new(FakeRepository::new());
    harness.start_debouncer(WINDOW);

    harness.write();
    assert!(wait_for(Duration::from_secs(11), || harness.repo.pushes() == 1).await);

    harness.write();
    assert!(harness.tracker.is_dirty());
    assert!(wait_for(Duration::from_secs(11), || harness.repo.pushes() == 2).await);
    assert_eq!(harness.tracker.synced(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_request_for_synced_generation_is_noop() {
    let harness = Harness::new(FakeRepository::new());
    harness.write();

    let outcome = harness.coordinator.flush().await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Synced { generation: 1, .. }));

    let outcome = harness.coordinator.request_commit_and_push(1).await.unwrap();
    assert_eq!(outcome, CommitOutcome::AlreadySynced);
    assert_eq!(harness.repo.pushes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_local_only_commits_without_push() {
    let harness = Harness::new(FakeRepository::local_only());
    harness.write();

    let outcome = harness.coordinator.flush().await.unwrap();
    assert!(matches!(outcome, CommitOutcome::LocalOnly { generation: 1, snapshot: Some(_) }));
    assert_eq!(harness.repo.pushes(), 0);
    assert!(!harness.tracker.is_dirty());
    assert!(harness.start_puller(Duration::from_secs(60)).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_leftover_changes_mark_dirty_at_startup() {
    let repo = FakeRepository::new();
    repo.touch();
    let harness = Harness::new(repo);

    assert!(wait_for(Duration::from_secs(1), || harness.tracker.is_dirty()).await);
}

#[tokio::test(start_paused = true)]
async fn test_puller_runs_on_interval() {
    let harness = Harness::new(FakeRepository::new());
    harness.start_puller(Duration::from_secs(60)).unwrap();

    // remote commit lands at 30s, becomes visible with the 60s pull
    tokio::time::sleep(Duration::from_secs(30)).await;
    let remote = harness.repo.remote_commit(Relation::Behind);
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(harness.repo.fetches(), 0);

    assert!(wait_for(Duration::from_secs(2), || harness.repo.fetches() == 1).await);
    assert!(wait_for(Duration::from_secs(1), || {
        harness.repo.state.lock().head.as_ref() == Some(&remote)
    })
    .await);

    // 120s: nothing new, nothing checked out
    assert!(wait_for(Duration::from_secs(61), || harness.repo.fetches() == 2).await);
    assert_eq!(harness.repo.state.lock().fast_forwards.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_disables_puller() {
    let harness = Harness::new(FakeRepository::new());
    assert!(harness.start_puller(Duration::ZERO).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_is_retried_next_tick() {
    let repo = FakeRepository::new();
    repo.state.lock().failing_fetches = 1;
    let harness = Harness::new(repo);
    harness.start_puller(Duration::from_secs(60)).unwrap();

    assert!(wait_for(Duration::from_secs(61), || harness.coordinator.status().failures == 1).await);
    assert!(wait_for(Duration::from_secs(61), || harness.repo.fetches() == 1).await);
    assert_eq!(harness.coordinator.status().pulls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pull_and_publish_never_overlap() {
    let harness = Harness::new(FakeRepository::new());

    let mut tasks = Vec::new();
    for i in 0..20 {
        let coordinator = harness.coordinator.clone();
        harness.write();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                let _ = coordinator.flush().await;
            } else {
                let _ = coordinator.request_pull().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let status = harness.coordinator.status();
    assert_eq!(status.overlapping_sections, 0);
    assert!(status.pushes >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_clean_vault_fast_forwards() {
    let harness = Harness::new(FakeRepository::new());
    let remote = harness.repo.remote_commit(Relation::Behind);

    let outcome = harness.coordinator.request_pull().await.unwrap();
    assert_eq!(outcome, PullOutcome::FastForwarded { to: remote.clone() });

    let outcome = harness.coordinator.request_pull().await.unwrap();
    assert_eq!(outcome, PullOutcome::UpToDate);
    assert_eq!(harness.coordinator.status().remote_ref, Some(remote.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_pending_edits_published_over_newer_remote() {
    let harness = Harness::new(FakeRepository::new());
    harness.write();
    harness.coordinator.flush().await.unwrap();

    harness.repo.remote_commit(Relation::Behind);
    harness.write();

    let outcome = harness.coordinator.request_pull().await.unwrap();
    assert!(matches!(outcome, PullOutcome::Published { head: Some(_) }));
    assert_eq!(harness.repo.state.lock().fast_forwards.len(), 1);
    assert_eq!(harness.repo.pushes(), 2);
    assert!(!harness.tracker.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_diverged_remote_defers_pull() {
    let harness = Harness::new(FakeRepository::new());
    harness.write();
    harness.coordinator.flush().await.unwrap();

    let local_head = harness.repo.state.lock().head.clone();
    harness.repo.remote_commit(Relation::Diverged);
    harness.repo.state.lock().reject_pushes = true;
    harness.write();

    let err = harness.coordinator.request_pull().await.unwrap_err();
    assert!(matches!(err, SyncError::Diverged(_)), "{err}");

    // local work kept, remote not integrated
    let state = harness.repo.state.lock();
    assert!(state.fast_forwards.is_empty());
    assert!(state.resets.is_empty());
    assert_ne!(state.head, local_head);
    drop(state);

    let status = harness.coordinator.status();
    assert_eq!(status.conflicts, 1);
    assert_eq!(status.committed_generation, 2);
    assert_eq!(status.synced_generation, 1);
    assert!(harness.tracker.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_checkout_conflict_is_reported_as_divergence() {
    let harness = Harness::new(FakeRepository::new());
    harness.repo.remote_commit(Relation::Behind);
    harness.repo.state.lock().checkout_conflict = true;
    harness.write();

    let err = harness.coordinator.request_pull().await.unwrap_err();
    assert!(matches!(err, SyncError::Diverged(_)));
    assert_eq!(harness.repo.commits(), 0);
    assert!(harness.tracker.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_while_publishing_is_not_a_conflict() {
    let harness = Harness::new(FakeRepository::new());
    harness.write();
    harness.coordinator.flush().await.unwrap();

    harness.repo.remote_commit(Relation::Behind);
    harness.repo.state.lock().failing_pushes = 1;
    harness.write();

    let err = harness.coordinator.request_pull().await.unwrap_err();
    assert!(matches!(err, SyncError::Push(_)));
    assert!(err.is_transient());
    assert_eq!(harness.coordinator.status().conflicts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_remote_wins_discards_local_changes() {
    let harness = Harness::with_policy(FakeRepository::new(), Arc::new(RemoteWins));
    harness.write();
    harness.coordinator.flush().await.unwrap();

    let remote = harness.repo.remote_commit(Relation::Diverged);
    harness.write();

    let outcome = harness.coordinator.request_pull().await.unwrap();
    assert_eq!(outcome, PullOutcome::ResetToRemote { to: remote.clone() });
    assert_eq!(harness.repo.state.lock().head, Some(remote));
    assert!(!harness.tracker.is_dirty());

    let status = harness.coordinator.status();
    assert_eq!(status.policy, "remote-wins");
    assert_eq!(status.conflicts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unpublished_history_pushed_after_pull() {
    let repo = FakeRepository::new();
    {
        let mut state = repo.state.lock();
        state.head = Some(::common::repo::SnapshotId::new("a".repeat(40)));
        state.remote_head = Some(::common::repo::SnapshotId::new("b".repeat(40)));
        state.relation = Some(Relation::Ahead);
    }
    let harness = Harness::new(repo);

    let outcome = harness.coordinator.request_pull().await.unwrap();
    assert_eq!(outcome, PullOutcome::UpToDate);
    assert!(harness.tracker.is_dirty());

    harness.coordinator.flush().await.unwrap();
    assert_eq!(harness.repo.pushes(), 1);
    assert_eq!(harness.repo.commits(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_debouncer_stops_on_shutdown() {
    let harness = Harness::new(FakeRepository::new());
    let debouncer = harness.start_debouncer(WINDOW);
    let puller = harness.start_puller(Duration::from_secs(60)).unwrap();

    harness.write();
    harness.shutdown();
    debouncer.await.unwrap();
    puller.await.unwrap();

    // pending work is left for the final flush
    assert_eq!(harness.repo.commits(), 0);
    let outcome = harness.coordinator.flush().await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Synced { .. }));
}

fn short_timeout(repo: FakeRepository, vault: &Vault) -> Harness {
    let config = CoordinatorConfig {
        git_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    Harness::with_config(repo, Arc::new(LocalFirst), config, vault.gate().clone())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_push_times_out_without_blocking_writers() {
    let temp = TempDir::new().unwrap();
    let vault = Vault::open(temp.path().join("vault"), temp.path().join("staging")).unwrap();
    let repo = FakeRepository::new();
    repo.state.lock().push_stall = Some(Duration::from_secs(3));
    let harness = short_timeout(repo, &vault);

    let first = ObjectKey::parse("a.txt").unwrap();
    vault.put(&first, Bytes::from_static(b"one")).await.unwrap();
    harness.write();

    let err = harness.coordinator.flush().await.unwrap_err();
    assert!(matches!(err, SyncError::Push(RepositoryError::Timeout(_))), "{err}");
    assert!(err.is_transient());
    let status = harness.coordinator.status();
    assert_eq!(status.failures, 1);
    assert_eq!(status.committed_generation, 1);
    assert_eq!(status.synced_generation, 0);
    assert!(harness.tracker.is_dirty());

    // the retry queues behind the push still hanging on the blocking pool
    let retry = {
        let coordinator = harness.coordinator.clone();
        tokio::spawn(async move { coordinator.flush().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let second = ObjectKey::parse("b.txt").unwrap();
    vault.put(&second, Bytes::from_static(b"two")).await.unwrap();
    let (_, data) = vault.get(&first).await.unwrap();
    assert_eq!(&data[..], b"one");
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "writer waited {:?}",
        started.elapsed()
    );
    harness.write();

    let outcome = retry.await.unwrap().unwrap();
    assert!(matches!(outcome, CommitOutcome::Synced { generation: 2, .. }), "{outcome:?}");
    assert_eq!(harness.repo.commits(), 2);
    assert!(!harness.tracker.is_dirty());
    assert_eq!(harness.coordinator.status().overlapping_sections, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_fetch_times_out_without_blocking_reads() {
    let temp = TempDir::new().unwrap();
    let vault = Vault::open(temp.path().join("vault"), temp.path().join("staging")).unwrap();
    let key = ObjectKey::parse("notes/today.md").unwrap();
    vault.put(&key, Bytes::from_static(b"draft")).await.unwrap();

    let repo = FakeRepository::new();
    repo.state.lock().fetch_stall = Some(Duration::from_secs(1));
    let harness = short_timeout(repo, &vault);

    let pull = {
        let coordinator = harness.coordinator.clone();
        tokio::spawn(async move { coordinator.request_pull().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let (meta, data) = vault.get(&key).await.unwrap();
    assert_eq!(meta.size, 5);
    assert_eq!(&data[..], b"draft");
    vault.put(&key, Bytes::from_static(b"final")).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));

    let err = pull.await.unwrap().unwrap_err();
    assert!(matches!(err, SyncError::Fetch(RepositoryError::Timeout(_))), "{err}");
    assert_eq!(harness.coordinator.status().failures, 1);

    // the next pull waits for the stalled fetch to let go of the repository
    assert!(
        wait_for(Duration::from_secs(2), || harness.repo.fetches() == 1).await,
        "stalled fetch never finished"
    );
    assert_eq!(
        harness.coordinator.request_pull().await.unwrap(),
        PullOutcome::RemoteEmpty
    );
}
