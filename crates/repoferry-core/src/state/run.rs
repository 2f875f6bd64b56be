//! Run marker: tells other processes a transfer is in progress.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::elapsed_between;
use crate::error::Result;
use crate::persist::{self, RunLayout};

/// Marker file written when a run starts and removed when it finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMarker {
    /// Unique run identifier
    pub run_id: Uuid,
    /// Process running the transfer
    pub pid: u32,
    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl RunMarker {
    /// Create a marker for the current process.
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pid: std::process::id(),
            started_at,
        }
    }

    /// Write the marker into the run directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn write(&self, layout: &RunLayout) -> Result<()> {
        persist::write_json_atomic(&layout.run_marker_file(), self)?;
        tracing::debug!(run_id = %self.run_id, pid = self.pid, "Wrote run marker");
        Ok(())
    }

    /// Read the marker of the run directory, `None` if no run is in progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read.
    pub fn read(layout: &RunLayout) -> Result<Option<Self>> {
        persist::read_json_if_exists(&layout.run_marker_file())
    }

    /// Remove the marker of the run directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be removed.
    pub fn remove(layout: &RunLayout) -> Result<()> {
        persist::remove_if_exists(&layout.run_marker_file())
    }
}

/// How long the run in `layout` has been going, `None` if it is not running.
///
/// # Errors
///
/// Returns an error if the run marker cannot be read.
pub fn running_time(layout: &RunLayout, now: DateTime<Utc>) -> Result<Option<Duration>> {
    Ok(RunMarker::read(layout)?.map(|marker| elapsed_between(marker.started_at, now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_not_running_without_marker() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let layout = RunLayout::new(temp_dir.path());

        assert!(running_time(&layout, Utc::now()).expect("read").is_none());
    }

    #[test]
    fn test_running_time_from_marker() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let layout = RunLayout::new(temp_dir.path());
        let started = Utc::now();

        let marker = RunMarker::new(started);
        marker.write(&layout).expect("write");
        assert_eq!(RunMarker::read(&layout).expect("read"), Some(marker));

        let elapsed = running_time(&layout, started + chrono::Duration::minutes(3))
            .expect("read")
            .expect("running");
        assert_eq!(elapsed, Duration::from_secs(180));

        RunMarker::remove(&layout).expect("remove");
        assert!(running_time(&layout, Utc::now()).expect("read").is_none());
    }
}
