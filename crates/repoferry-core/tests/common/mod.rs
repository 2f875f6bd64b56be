//! Common test utilities for `Repoferry` integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use repoferry_core::clock::{Clock, ManualClock};
use repoferry_core::config::{Config, SnapshotConfig};
use repoferry_core::error::{Error, Result};
use repoferry_core::snapshot::TreeSnapshot;
use repoferry_core::state::TransferStateManager;

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// A tree that records how often it was persisted instead of writing files.
#[derive(Debug, Default)]
pub struct CountingTree {
    persists: AtomicUsize,
    fail: AtomicBool,
}

impl CountingTree {
    /// Number of successful persists.
    pub fn persists(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    /// Make subsequent persists fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl TreeSnapshot for CountingTree {
    type Node = String;

    fn create(_repo_key: &str, _path: &Path, _config: &SnapshotConfig) -> Self {
        Self::default()
    }

    fn load(_repo_key: &str, _path: &Path, _config: &SnapshotConfig) -> Result<Option<Self>> {
        Ok(None)
    }

    fn look_up_node(&self, relative_path: &str) -> Result<String> {
        if relative_path == "missing" {
            return Err(Error::SnapshotNodeNotFound(relative_path.to_string()));
        }
        Ok(relative_path.to_string())
    }

    fn get_directory_node_with_lru(&self, relative_path: &str) -> Result<String> {
        Ok(relative_path.to_string())
    }

    fn persist(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("disk full")));
        }
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Build a manager over `run_dir` driven by a manual clock.
pub fn manager_with_clock<T: TreeSnapshot>(
    run_dir: &Path,
    config: &Config,
) -> (TransferStateManager<T>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let manager = TransferStateManager::with_clock(
        run_dir,
        config,
        Arc::clone(&clock) as Arc<dyn Clock>,
        None,
    )
    .expect("Failed to create state manager");
    (manager, clock)
}
