//! The transfer state manager.
//!
//! Transfer workers share one manager per run. It keeps the aggregate
//! counters, the progress of the repository being transferred and that
//! repository's tree snapshot.
//!
//! Every snapshot operation goes through a single gate. After the operation
//! succeeds the gate checks whether the snapshot save interval elapsed and, if
//! so, checkpoints the tree and the state to the run directory. Checkpoints
//! are best effort: when another checkpoint is already being written the new
//! one is skipped rather than queued.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::lock::PersistLock;
use super::run::RunMarker;
use super::{load_repo_progress, save_repo_progress, TransferState};
use crate::clock::{elapsed_between, Clock, SystemClock};
use crate::config::{Config, SnapshotConfig};
use crate::error::{Error, Result};
use crate::persist::{self, RunLayout};
use crate::phase::{Phase, RepoProgress};
use crate::snapshot::{DirectoryTree, RepoTransferSnapshot, TreeSnapshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn clear_previous_run(layout: &RunLayout) -> Result<()> {
    if layout.state_file().exists() || layout.repos_dir().exists() {
        tracing::info!(run_dir = %layout.root().display(), "Discarding state of a previous run");
    }
    persist::remove_dir_if_exists(&layout.repos_dir())?;
    persist::remove_if_exists(&layout.state_file())
}

/// The snapshot of the current repository, if snapshots are in use.
enum SnapshotSlot<T: TreeSnapshot> {
    Disabled,
    Active(RepoTransferSnapshot<T>),
}

#[derive(Debug)]
struct Counters {
    state: TransferState,
    current_repo: Option<RepoProgress>,
}

/// Tracks and persists the progress of a transfer run.
pub struct TransferStateManager<T: TreeSnapshot = DirectoryTree> {
    layout: RunLayout,
    save_interval: Duration,
    snapshot_config: SnapshotConfig,
    clock: Arc<dyn Clock>,
    counters: Mutex<Counters>,
    snapshot: Mutex<SnapshotSlot<T>>,
    persist_lock: PersistLock,
    state_persist_guard: Mutex<()>,
}

impl<T: TreeSnapshot> TransferStateManager<T> {
    /// Start tracking a fresh run in `run_dir`.
    ///
    /// State and repository files left in `run_dir` by an earlier run are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the run directory cannot be created or cleared.
    pub fn new(run_dir: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        Self::with_clock(run_dir, config, Arc::new(SystemClock), None)
    }

    /// Continue the run persisted in `run_dir`, or start a fresh one if
    /// nothing was persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted state cannot be read.
    pub fn resume(run_dir: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let run_dir = run_dir.into();
        let state = TransferState::load(&RunLayout::new(&run_dir))?;
        if let Some(state) = &state {
            tracing::info!(
                run_dir = %run_dir.display(),
                repositories = state.total_repositories.transferred_units,
                current_repo = %state.current_repo_key,
                "Resuming transfer state"
            );
        }
        Self::with_clock(run_dir, config, Arc::new(SystemClock), state)
    }

    /// Build a manager with an explicit time source and optional initial state.
    ///
    /// Without an initial state the run starts fresh: the state and repository
    /// files of any earlier run in `run_dir` are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the run directory cannot be created or cleared.
    pub fn with_clock(
        run_dir: impl Into<PathBuf>,
        config: &Config,
        clock: Arc<dyn Clock>,
        state: Option<TransferState>,
    ) -> Result<Self> {
        let layout = RunLayout::new(run_dir);
        std::fs::create_dir_all(layout.root())?;

        let state = match state {
            Some(state) => state,
            None => {
                clear_previous_run(&layout)?;
                TransferState::new(clock.now())
            }
        };

        Ok(Self {
            layout,
            save_interval: config.transfer.snapshot_save_interval,
            snapshot_config: config.snapshot.clone(),
            clock,
            counters: Mutex::new(Counters {
                state,
                current_repo: None,
            }),
            snapshot: Mutex::new(SnapshotSlot::Disabled),
            persist_lock: PersistLock::new(),
            state_persist_guard: Mutex::new(()),
        })
    }

    /// Layout of the run directory.
    #[must_use]
    pub const fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// The lock held while a checkpoint is being written.
    #[must_use]
    pub const fn persist_lock(&self) -> &PersistLock {
        &self.persist_lock
    }

    /// A copy of the aggregate state.
    #[must_use]
    pub fn state(&self) -> TransferState {
        lock(&self.counters).state.clone()
    }

    /// A copy of the current repository's progress.
    #[must_use]
    pub fn current_repo(&self) -> Option<RepoProgress> {
        lock(&self.counters).current_repo.clone()
    }

    // Run lifecycle

    /// Mark the run as started so status commands see it as running.
    ///
    /// # Errors
    ///
    /// Returns an error if the state or the run marker cannot be written.
    pub fn start_run(&self) -> Result<()> {
        self.persist_state()?;
        RunMarker::new(self.clock.now()).write(&self.layout)?;
        tracing::info!(run_dir = %self.layout.root().display(), "Transfer run started");
        Ok(())
    }

    /// Persist the final state and mark the run as no longer running.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written or the marker removed.
    pub fn finish_run(&self) -> Result<()> {
        self.persist_state()?;
        RunMarker::remove(&self.layout)?;
        tracing::info!(run_dir = %self.layout.root().display(), "Transfer run finished");
        Ok(())
    }

    // Aggregate counters

    /// Set the number of repositories in the run. Never lowers it.
    pub fn set_total_repositories(&self, total: u64) {
        let mut counters = lock(&self.counters);
        let repos = &mut counters.state.total_repositories;
        repos.total_units = repos.total_units.max(total);
    }

    /// Set the number of bytes in the run. Never lowers it.
    pub fn set_total_size(&self, total_size_bytes: u64) {
        let mut counters = lock(&self.counters);
        let overall = &mut counters.state.overall_transfer;
        overall.total_size_bytes = overall.total_size_bytes.max(total_size_bytes);
    }

    /// Set the number of active worker threads.
    pub fn set_working_threads(&self, threads: usize) {
        lock(&self.counters).state.working_threads = threads;
    }

    /// Count failed transfers.
    pub fn increment_failures(&self, count: u64) {
        let mut counters = lock(&self.counters);
        counters.state.transfer_failures = counters.state.transfer_failures.saturating_add(count);
    }

    // Repository lifecycle

    /// Make `repo_key` the current repository.
    ///
    /// Progress persisted by a previous run is picked up. With
    /// `build_snapshot`, the repository's tree snapshot is loaded, or created
    /// if none was persisted; otherwise snapshot operations are disabled until
    /// the next repository.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted progress or snapshot cannot be read, or the
    /// state cannot be written.
    pub fn start_repository(&self, repo_key: &str, build_snapshot: bool) -> Result<()> {
        let progress = load_repo_progress(&self.layout, repo_key)?
            .unwrap_or_else(|| RepoProgress::new(repo_key, self.clock.now()));

        let slot = if build_snapshot && self.snapshot_config.enabled {
            let path = self.layout.snapshot_file(repo_key);
            let now = self.clock.now();
            let snapshot =
                match RepoTransferSnapshot::load(repo_key, &path, &self.snapshot_config, now)? {
                    Some(snapshot) => snapshot,
                    None => {
                        RepoTransferSnapshot::create(repo_key, &path, &self.snapshot_config, now)
                    }
                };
            SnapshotSlot::Active(snapshot)
        } else {
            SnapshotSlot::Disabled
        };
        *lock(&self.snapshot) = slot;

        {
            let mut counters = lock(&self.counters);
            counters.state.current_repo_key = repo_key.to_string();
            counters.state.current_repo_phase = Some(progress.phase);
            counters.current_repo = Some(progress);
        }

        tracing::info!(repo = repo_key, snapshot = build_snapshot, "Started repository");
        self.persist_state()
    }

    /// Move the current repository to `phase`.
    ///
    /// # Errors
    ///
    /// Returns an error if no repository is current, if `phase` comes before the
    /// current phase, or if the state cannot be written.
    pub fn set_repo_phase(&self, phase: Phase) -> Result<()> {
        {
            let mut counters = lock(&self.counters);
            let repo = counters
                .current_repo
                .as_mut()
                .ok_or(Error::NoCurrentRepository)?;
            if phase < repo.phase {
                return Err(Error::InvalidPhaseTransition {
                    from: repo.phase,
                    to: phase,
                });
            }
            repo.phase = phase;
            tracing::info!(repo = %repo.repo_key, phase = phase.number(), "Repository phase changed");
            counters.state.current_repo_phase = Some(phase);
        }
        self.persist_state()
    }

    /// Raise the totals of the current repository's phase.
    ///
    /// # Errors
    ///
    /// Returns an error if no repository is current.
    pub fn set_repo_totals(&self, units: u64, size_bytes: u64) -> Result<()> {
        let mut counters = lock(&self.counters);
        let now = self.clock.now();
        counters
            .current_repo
            .as_mut()
            .ok_or(Error::NoCurrentRepository)?
            .set_totals(units, size_bytes, now);
        Ok(())
    }

    /// Record transferred work in the current repository's phase.
    ///
    /// # Errors
    ///
    /// Returns an error if no repository is current.
    pub fn increment_repo_transferred(&self, units: u64, size_bytes: u64) -> Result<()> {
        let mut counters = lock(&self.counters);
        // Read under the lock so speed samples stay in time order.
        let now = self.clock.now();
        counters
            .current_repo
            .as_mut()
            .ok_or(Error::NoCurrentRepository)?
            .add_transferred(units, size_bytes, now);

        let overall = &mut counters.state.overall_transfer;
        overall.transferred_size_bytes = overall.transferred_size_bytes.saturating_add(size_bytes);
        counters.state.speed.add_sample(now, size_bytes);
        Ok(())
    }

    /// Count the current repository as transferred and leave it.
    ///
    /// # Errors
    ///
    /// Returns an error if no repository is current or the state cannot be
    /// written.
    pub fn finish_repository(&self) -> Result<()> {
        {
            let mut counters = lock(&self.counters);
            if counters.current_repo.is_none() {
                return Err(Error::NoCurrentRepository);
            }
            let repos = &mut counters.state.total_repositories;
            repos.transferred_units = repos.transferred_units.saturating_add(1);
        }
        self.persist_state()?;

        let repo_key = {
            let mut counters = lock(&self.counters);
            counters.state.current_repo_phase = None;
            counters.current_repo = None;
            std::mem::take(&mut counters.state.current_repo_key)
        };
        self.disable_repo_transfer_snapshot();

        tracing::info!(repo = %repo_key, "Finished repository");
        self.persist_state()
    }

    // Snapshot gate

    /// Resolve an existing node of the current repository's tree.
    ///
    /// # Errors
    ///
    /// Returns an error if no snapshot is active, the node is unknown, or a
    /// checkpoint triggered by this call failed.
    pub fn look_up_node(&self, relative_path: &str) -> Result<T::Node> {
        self.apply_to_snapshot(|rts| rts.look_up_node(relative_path))
    }

    /// Whether the current repository resumed from a persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if no snapshot is active or a checkpoint triggered by
    /// this call failed.
    pub fn was_snapshot_loaded(&self) -> Result<bool> {
        self.apply_to_snapshot(|rts| Ok(rts.was_snapshot_loaded()))
    }

    /// Resolve or create a directory node of the current repository's tree.
    ///
    /// # Errors
    ///
    /// Returns an error if no snapshot is active, the path is invalid, or a
    /// checkpoint triggered by this call failed.
    pub fn get_directory_snapshot_node_with_lru(&self, relative_path: &str) -> Result<T::Node> {
        self.apply_to_snapshot(|rts| rts.get_directory_node_with_lru(relative_path))
    }

    /// Stop using a tree snapshot for the current repository.
    pub fn disable_repo_transfer_snapshot(&self) {
        *lock(&self.snapshot) = SnapshotSlot::Disabled;
    }

    /// Whether snapshot operations are available.
    #[must_use]
    pub fn is_repo_transfer_snapshot_enabled(&self) -> bool {
        matches!(*lock(&self.snapshot), SnapshotSlot::Active(_))
    }

    /// Replace the current repository's snapshot.
    pub fn set_repo_transfer_snapshot(&self, snapshot: RepoTransferSnapshot<T>) {
        *lock(&self.snapshot) = SnapshotSlot::Active(snapshot);
    }

    /// When the active snapshot was last saved, `None` if none is active.
    #[must_use]
    pub fn last_snapshot_save(&self) -> Option<DateTime<Utc>> {
        match &*lock(&self.snapshot) {
            SnapshotSlot::Active(snapshot) => Some(snapshot.last_save_timestamp()),
            SnapshotSlot::Disabled => None,
        }
    }

    /// Run `action` on the active snapshot, then checkpoint if due.
    fn apply_to_snapshot<R>(
        &self,
        action: impl FnOnce(&RepoTransferSnapshot<T>) -> Result<R>,
    ) -> Result<R> {
        let (value, guard, tree) = {
            let mut slot = lock(&self.snapshot);
            let SnapshotSlot::Active(snapshot) = &mut *slot else {
                return Err(Error::SnapshotUninitialized);
            };

            let value = action(snapshot)?;

            let now = self.clock.now();
            if elapsed_between(snapshot.last_save_timestamp(), now) < self.save_interval {
                return Ok(value);
            }

            let Some(guard) = self.persist_lock.try_acquire() else {
                tracing::trace!("Checkpoint already in progress, skipping");
                return Ok(value);
            };

            // Claim this interval before writing so concurrent callers skip it.
            snapshot.mark_saved(now);
            (value, guard, Arc::clone(snapshot.tree()))
        };

        let result = self.write_checkpoint(&tree);
        drop(guard);
        result.map(|()| value)
    }

    /// Persist the tree snapshot and state regardless of the save interval.
    ///
    /// Returns `Ok(false)` if another checkpoint was in progress and nothing
    /// was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree or the state cannot be written.
    pub fn checkpoint(&self) -> Result<bool> {
        let Some(guard) = self.persist_lock.try_acquire() else {
            return Ok(false);
        };

        let tree = match &mut *lock(&self.snapshot) {
            SnapshotSlot::Active(snapshot) => {
                snapshot.mark_saved(self.clock.now());
                Some(Arc::clone(snapshot.tree()))
            }
            SnapshotSlot::Disabled => None,
        };

        let result = match tree {
            Some(tree) => self.write_checkpoint(&tree),
            None => self.persist_state(),
        };
        drop(guard);
        result.map(|()| true)
    }

    fn write_checkpoint(&self, tree: &T) -> Result<()> {
        if let Err(e) = tree.persist() {
            tracing::warn!(error = %e, "Failed to persist repository snapshot");
            return Err(e);
        }

        // The tree is authoritative for resuming; a failure here leaves a
        // state file one checkpoint behind it.
        if let Err(e) = self.persist_state() {
            tracing::warn!(error = %e, "Persisted repository snapshot but not transfer state");
            return Err(e);
        }

        tracing::debug!(run_dir = %self.layout.root().display(), "Checkpoint written");
        Ok(())
    }

    /// Persist the aggregate state and the current repository's progress.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn persist_state(&self) -> Result<()> {
        let _guard = lock(&self.state_persist_guard);

        let (state, current_repo) = {
            let mut counters = lock(&self.counters);
            counters.state.updated_at = self.clock.now();
            (counters.state.clone(), counters.current_repo.clone())
        };

        if let Some(progress) = &current_repo {
            save_repo_progress(&self.layout, progress)?;
        }
        state.save(&self.layout)
    }
}
