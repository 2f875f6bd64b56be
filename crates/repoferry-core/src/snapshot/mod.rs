//! Repository tree snapshots.
//!
//! A tree snapshot records the directory structure of the repository being
//! transferred, so an interrupted run can pick up where it stopped without
//! walking the whole source repository again.
//!
//! - [`TreeSnapshot`] is the capability a tree implementation provides.
//! - [`RepoTransferSnapshot`] wraps a tree with the bookkeeping needed for
//!   periodic checkpoints.
//! - [`DirectoryTree`] is the implementation used by default.

pub mod tree;

pub use tree::{DirectoryNode, DirectoryTree};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::SnapshotConfig;
use crate::error::Result;

/// Operations the transfer core needs from a repository tree snapshot.
///
/// Implementations must be safe to use from several threads at once.
pub trait TreeSnapshot: Send + Sync + Sized + 'static {
    /// Handle to a directory or file position in the tree.
    type Node: Clone + Send + Sync + fmt::Debug;

    /// Create an empty tree for `repo_key`, persisted to `path`.
    fn create(repo_key: &str, path: &Path, config: &SnapshotConfig) -> Self;

    /// Load the tree persisted at `path`.
    ///
    /// Returns `Ok(None)` when nothing was persisted yet.
    fn load(repo_key: &str, path: &Path, config: &SnapshotConfig) -> Result<Option<Self>>;

    /// Resolve an existing node, failing if it is unknown.
    fn look_up_node(&self, relative_path: &str) -> Result<Self::Node>;

    /// Resolve a directory node, creating it if needed, and keep it in the
    /// recently used set.
    fn get_directory_node_with_lru(&self, relative_path: &str) -> Result<Self::Node>;

    /// Write the tree to its path.
    fn persist(&self) -> Result<()>;
}

/// The tree snapshot of one repository together with its checkpoint state.
pub struct RepoTransferSnapshot<T: TreeSnapshot> {
    tree: Arc<T>,
    last_save_timestamp: DateTime<Utc>,
    // Set when the tree continues a previous run. A fresh tree only holds
    // nodes created during this run, so existence checks can be skipped.
    loaded_from_snapshot: bool,
}

impl<T: TreeSnapshot> RepoTransferSnapshot<T> {
    /// Wrap a newly created, empty tree.
    #[must_use]
    pub fn create(
        repo_key: &str,
        path: &Path,
        config: &SnapshotConfig,
        now: DateTime<Utc>,
    ) -> Self {
        tracing::debug!(repo = repo_key, path = %path.display(), "Creating repository snapshot");
        Self::from_tree(Arc::new(T::create(repo_key, path, config)), false, now)
    }

    /// Wrap the tree persisted by a previous run.
    ///
    /// Returns `Ok(None)` if the repository has no persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read or parsed.
    pub fn load(
        repo_key: &str,
        path: &Path,
        config: &SnapshotConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>> {
        let Some(tree) = T::load(repo_key, path, config)? else {
            return Ok(None);
        };

        tracing::info!(repo = repo_key, path = %path.display(), "Loaded repository snapshot");
        Ok(Some(Self::from_tree(Arc::new(tree), true, now)))
    }

    /// Wrap an existing tree.
    #[must_use]
    pub const fn from_tree(tree: Arc<T>, loaded_from_snapshot: bool, now: DateTime<Utc>) -> Self {
        Self {
            tree,
            last_save_timestamp: now,
            loaded_from_snapshot,
        }
    }

    /// The wrapped tree.
    #[must_use]
    pub const fn tree(&self) -> &Arc<T> {
        &self.tree
    }

    /// Resolve an existing node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn look_up_node(&self, relative_path: &str) -> Result<T::Node> {
        self.tree.look_up_node(relative_path)
    }

    /// Resolve or create a directory node under LRU retention.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid.
    pub fn get_directory_node_with_lru(&self, relative_path: &str) -> Result<T::Node> {
        self.tree.get_directory_node_with_lru(relative_path)
    }

    /// Whether this repository resumed from a persisted snapshot.
    #[must_use]
    pub const fn was_snapshot_loaded(&self) -> bool {
        self.loaded_from_snapshot
    }

    /// When the snapshot was last saved (or created).
    #[must_use]
    pub const fn last_save_timestamp(&self) -> DateTime<Utc> {
        self.last_save_timestamp
    }

    /// Record a save started at `at`. Never moves the timestamp backwards.
    pub fn mark_saved(&mut self, at: DateTime<Utc>) {
        if at > self.last_save_timestamp {
            self.last_save_timestamp = at;
        }
    }
}

impl<T: TreeSnapshot> fmt::Debug for RepoTransferSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoTransferSnapshot")
            .field("last_save_timestamp", &self.last_save_timestamp)
            .field("loaded_from_snapshot", &self.loaded_from_snapshot)
            .finish_non_exhaustive()
    }
}
