//! Tests for periodic snapshot checkpoints.
//!
//! These tests drive the state manager with a manual clock and a tree that
//! counts its persists, so the checkpoint schedule can be observed exactly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use repoferry_core::clock::{Clock, ManualClock};
use repoferry_core::config::Config;
use repoferry_core::error::Error;
use repoferry_core::snapshot::RepoTransferSnapshot;
use repoferry_core::state::{TransferState, TransferStateManager};

use common::{create_temp_dir, manager_with_clock, CountingTree};

const INTERVAL: Duration = Duration::from_secs(10 * 60);

fn config() -> Config {
    let mut config = Config::default();
    config.transfer.snapshot_save_interval = INTERVAL;
    config
}

/// A manager with a current repository backed by a [`CountingTree`].
fn setup(
    run_dir: &std::path::Path,
) -> (
    TransferStateManager<CountingTree>,
    Arc<ManualClock>,
    Arc<CountingTree>,
) {
    let (manager, clock) = manager_with_clock::<CountingTree>(run_dir, &config());
    manager
        .start_repository("libs-release", false)
        .expect("start repository");

    let tree = Arc::new(CountingTree::default());
    manager.set_repo_transfer_snapshot(RepoTransferSnapshot::from_tree(
        Arc::clone(&tree),
        false,
        clock.now(),
    ));
    (manager, clock, tree)
}

/// Test that no checkpoint is written before the interval elapses.
#[test]
fn test_no_checkpoint_within_interval() {
    let temp_dir = create_temp_dir();
    let (manager, clock, tree) = setup(temp_dir.path());

    manager
        .get_directory_snapshot_node_with_lru("org/example")
        .expect("node");
    clock.advance(INTERVAL - Duration::from_secs(1));
    manager.look_up_node("org/example").expect("node");

    assert_eq!(tree.persists(), 0);
}

/// Test that the first operation after the interval writes exactly one checkpoint.
#[test]
fn test_checkpoint_after_interval() {
    let temp_dir = create_temp_dir();
    let (manager, clock, tree) = setup(temp_dir.path());
    let created_at = manager.last_snapshot_save().expect("active snapshot");

    clock.advance(INTERVAL);
    let node = manager
        .get_directory_snapshot_node_with_lru("org/example")
        .expect("node");
    assert_eq!(node, "org/example");
    assert_eq!(tree.persists(), 1);

    let saved_at = manager.last_snapshot_save().expect("active snapshot");
    assert!(saved_at > created_at);
    assert_eq!(saved_at, clock.now());

    // The state was persisted with the tree.
    let state = TransferState::load(manager.layout())
        .expect("load")
        .expect("state exists");
    assert_eq!(state.updated_at, clock.now());

    manager.look_up_node("org/example").expect("node");
    assert_eq!(tree.persists(), 1);
}

/// Test that a held persist lock makes the operation skip its checkpoint.
#[test]
fn test_checkpoint_skipped_while_locked() {
    let temp_dir = create_temp_dir();
    let (manager, clock, tree) = setup(temp_dir.path());
    let created_at = manager.last_snapshot_save().expect("active snapshot");

    clock.advance(INTERVAL * 2);
    let guard = manager.persist_lock().try_acquire().expect("free lock");

    let node = manager.look_up_node("org").expect("operation still succeeds");
    assert_eq!(node, "org");
    assert_eq!(tree.persists(), 0);
    assert_eq!(manager.last_snapshot_save(), Some(created_at));

    drop(guard);
    manager.look_up_node("org").expect("node");
    assert_eq!(tree.persists(), 1);
}

/// Test that a failed operation neither checkpoints nor hides its error.
#[test]
fn test_failed_operation_does_not_checkpoint() {
    let temp_dir = create_temp_dir();
    let (manager, clock, tree) = setup(temp_dir.path());

    clock.advance(INTERVAL);
    let err = manager.look_up_node("missing").expect_err("unknown node");
    assert!(matches!(err, Error::SnapshotNodeNotFound(path) if path == "missing"));
    assert_eq!(tree.persists(), 0);
}

/// Test that a failed tree write is reported and the interval is still consumed.
#[test]
fn test_tree_persist_failure() {
    let temp_dir = create_temp_dir();
    let (manager, clock, tree) = setup(temp_dir.path());
    let state_before = TransferState::load(manager.layout())
        .expect("load")
        .expect("state exists");

    tree.set_failing(true);
    clock.advance(INTERVAL);
    let err = manager
        .get_directory_snapshot_node_with_lru("org")
        .expect_err("checkpoint fails");
    assert!(matches!(err, Error::Io(_)));

    // The state is only written after the tree.
    let state_after = TransferState::load(manager.layout())
        .expect("load")
        .expect("state exists");
    assert_eq!(state_after.updated_at, state_before.updated_at);

    // The failed attempt still counts as this interval's checkpoint.
    tree.set_failing(false);
    manager.get_directory_snapshot_node_with_lru("org").expect("node");
    assert_eq!(tree.persists(), 0);

    clock.advance(INTERVAL);
    manager.get_directory_snapshot_node_with_lru("org").expect("node");
    assert_eq!(tree.persists(), 1);
}

/// Test that concurrent workers produce a single checkpoint per interval.
#[test]
fn test_concurrent_operations_write_one_checkpoint() {
    let temp_dir = create_temp_dir();
    let (manager, clock, tree) = setup(temp_dir.path());
    clock.advance(INTERVAL);

    let barrier = std::sync::Barrier::new(8);
    std::thread::scope(|s| {
        for i in 0..8 {
            let manager = &manager;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                manager
                    .get_directory_snapshot_node_with_lru(&format!("dir-{i}"))
                    .expect("node");
            });
        }
    });

    assert_eq!(tree.persists(), 1);
}

/// Test that every snapshot operation fails once snapshots are disabled.
#[test]
fn test_disabled_snapshot_rejects_operations() {
    let temp_dir = create_temp_dir();
    let (manager, clock, tree) = setup(temp_dir.path());

    manager.disable_repo_transfer_snapshot();
    clock.advance(INTERVAL);

    assert!(matches!(
        manager.look_up_node("org"),
        Err(Error::SnapshotUninitialized)
    ));
    assert!(matches!(
        manager.get_directory_snapshot_node_with_lru("org"),
        Err(Error::SnapshotUninitialized)
    ));
    assert!(matches!(
        manager.was_snapshot_loaded(),
        Err(Error::SnapshotUninitialized)
    ));
    assert!(manager.last_snapshot_save().is_none());
    assert_eq!(tree.persists(), 0);
}

/// Test that a forced checkpoint ignores the interval.
#[test]
fn test_forced_checkpoint() {
    let temp_dir = create_temp_dir();
    let (manager, _clock, tree) = setup(temp_dir.path());

    assert!(manager.checkpoint().expect("checkpoint"));
    assert_eq!(tree.persists(), 1);
}

/// Test that a state write failing after the tree write is still reported.
#[test]
fn test_state_persist_failure_after_tree_write() {
    let temp_dir = create_temp_dir();
    let (manager, clock, tree) = setup(temp_dir.path());

    // A directory in place of the state file makes its write fail.
    let state_file = manager.layout().state_file();
    std::fs::remove_file(&state_file).expect("remove state file");
    std::fs::create_dir(&state_file).expect("block state file");

    clock.advance(INTERVAL);
    let err = manager.look_up_node("org").expect_err("state write fails");
    assert!(matches!(err, Error::Io(_)));

    // The tree was written and the checkpoint time is kept.
    assert_eq!(tree.persists(), 1);
    assert_eq!(manager.last_snapshot_save(), Some(clock.now()));

    manager.look_up_node("org").expect("node");
    assert_eq!(tree.persists(), 1);
}
