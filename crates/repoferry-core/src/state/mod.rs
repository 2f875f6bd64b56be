//! Transfer state and its persistence.
//!
//! [`TransferState`] holds the aggregate counters of a run. The
//! [`TransferStateManager`] owns it together with the progress and tree
//! snapshot of the repository currently being transferred, and checkpoints
//! all of them into the run directory.

pub mod lock;
pub mod manager;
pub mod run;
pub mod speed;

pub use lock::{PersistGuard, PersistLock};
pub use manager::TransferStateManager;
pub use run::{running_time, RunMarker};
pub use speed::SpeedEstimator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::persist::{self, RunLayout};
use crate::phase::{Phase, RepoProgress};

/// Current version of the state file format.
pub const STATE_FILE_VERSION: u32 = 1;

/// Bytes transferred out of a total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeProgress {
    /// Bytes transferred so far
    pub transferred_size_bytes: u64,
    /// Bytes to transfer
    pub total_size_bytes: u64,
}

impl SizeProgress {
    /// Bytes left to transfer.
    #[must_use]
    pub const fn remaining_bytes(&self) -> u64 {
        self.total_size_bytes.saturating_sub(self.transferred_size_bytes)
    }
}

/// Units transferred out of a total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProgress {
    /// Units transferred so far
    pub transferred_units: u64,
    /// Units to transfer
    pub total_units: u64,
}

/// Aggregate state of a transfer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    /// File format version
    pub version: u32,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the state was last persisted
    pub updated_at: DateTime<Utc>,
    /// Storage transferred across all repositories
    pub overall_transfer: SizeProgress,
    /// Repositories transferred
    pub total_repositories: UnitProgress,
    /// Active transfer worker threads
    pub working_threads: usize,
    /// Items that failed to transfer
    pub transfer_failures: u64,
    /// Repository currently being transferred, empty if none
    pub current_repo_key: String,
    /// Phase of the current repository
    pub current_repo_phase: Option<Phase>,
    /// Throughput estimator
    #[serde(default)]
    pub speed: SpeedEstimator,
}

impl TransferState {
    /// State of a run starting at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: STATE_FILE_VERSION,
            started_at: now,
            updated_at: now,
            overall_transfer: SizeProgress::default(),
            total_repositories: UnitProgress::default(),
            working_threads: 0,
            transfer_failures: 0,
            current_repo_key: String::new(),
            current_repo_phase: None,
            speed: SpeedEstimator::default(),
        }
    }

    /// Whether a repository is currently being transferred.
    #[must_use]
    pub fn has_current_repo(&self) -> bool {
        !self.current_repo_key.is_empty()
    }

    /// Transfer speed rendered for display.
    #[must_use]
    pub fn speed_string(&self) -> String {
        self.speed.speed_string()
    }

    /// Estimated remaining time rendered for display.
    #[must_use]
    pub fn estimated_remaining_time_string(&self) -> String {
        self.speed
            .estimated_remaining_string(self.overall_transfer.remaining_bytes())
    }

    /// Load the aggregate state of a run directory, `None` if never persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file exists but cannot be read or parsed.
    pub fn load(layout: &RunLayout) -> Result<Option<Self>> {
        persist::read_json_if_exists(&layout.state_file())
    }

    /// Persist the aggregate state into a run directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub fn save(&self, layout: &RunLayout) -> Result<()> {
        persist::write_json_atomic(&layout.state_file(), self)
    }
}

/// Load the persisted progress of a repository, `None` if never persisted.
///
/// # Errors
///
/// Returns an error if the progress file exists but cannot be read or parsed.
pub fn load_repo_progress(layout: &RunLayout, repo_key: &str) -> Result<Option<RepoProgress>> {
    persist::read_json_if_exists(&layout.repo_progress_file(repo_key))
}

/// Load the persisted progress of a repository that must exist.
///
/// # Errors
///
/// Returns [`Error::MissingStateFile`] if the repository has no progress file.
pub fn require_repo_progress(layout: &RunLayout, repo_key: &str) -> Result<RepoProgress> {
    load_repo_progress(layout, repo_key)?
        .ok_or_else(|| Error::MissingStateFile(repo_key.to_string()))
}

/// Persist the progress of a repository.
///
/// # Errors
///
/// Returns an error if the progress file cannot be written.
pub fn save_repo_progress(layout: &RunLayout, progress: &RepoProgress) -> Result<()> {
    persist::write_json_atomic(&layout.repo_progress_file(&progress.repo_key), progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_save_load() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let layout = RunLayout::new(temp_dir.path());

        assert!(TransferState::load(&layout).expect("load").is_none());

        let mut state = TransferState::new(Utc::now());
        state.overall_transfer.total_size_bytes = 4096;
        state.current_repo_key = "generic-local".to_string();
        state.current_repo_phase = Some(Phase::Phase2);
        state.save(&layout).expect("save");

        let loaded = TransferState::load(&layout).expect("load").expect("exists");
        assert_eq!(loaded, state);
        assert!(loaded.has_current_repo());
    }

    #[test]
    fn test_require_missing_repo_progress() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let layout = RunLayout::new(temp_dir.path());

        let err = require_repo_progress(&layout, "docker-remote").expect_err("should fail");
        assert!(matches!(err, Error::MissingStateFile(key) if key == "docker-remote"));
    }

    #[test]
    fn test_repo_progress_save_load() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let layout = RunLayout::new(temp_dir.path());

        let mut progress = RepoProgress::new("pypi/remote", Utc::now());
        progress.set_totals(3, 300, Utc::now());
        save_repo_progress(&layout, &progress).expect("save");

        let loaded = require_repo_progress(&layout, "pypi/remote").expect("load");
        assert_eq!(loaded, progress);
    }

    #[test]
    fn test_remaining_time_not_available_without_speed() {
        let state = TransferState::new(Utc::now());
        assert_eq!(state.speed_string(), speed::NOT_AVAILABLE);
        assert_eq!(state.estimated_remaining_time_string(), speed::NOT_AVAILABLE);
    }
}
