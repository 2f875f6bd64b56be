//! Directory tree of a repository, persisted as JSON.
//!
//! Nodes form a nested tree rooted at the repository root. Resolving a path
//! walks it one component at a time, so directories the transfer keeps coming
//! back to are held in an LRU cache keyed by their normalized path.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::TreeSnapshot;
use crate::config::SnapshotConfig;
use crate::error::{Error, Result};
use crate::persist;

/// Version of the snapshot file format.
const SNAPSHOT_FILE_VERSION: u32 = 1;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Split a repository-relative path into its components.
///
/// Leading, trailing and repeated separators and `.` components are ignored.
/// The repository root is the empty path.
fn split_path(relative_path: &str) -> Result<Vec<&str>> {
    let mut components = Vec::new();
    for component in relative_path.split('/') {
        match component {
            "" | "." => {}
            ".." => return Err(Error::InvalidPath(relative_path.to_string())),
            name => components.push(name),
        }
    }
    Ok(components)
}

#[derive(Debug, Default)]
struct NodeState {
    files_count: u64,
    size_bytes: u64,
    completed: bool,
    children: BTreeMap<String, DirectoryNode>,
}

/// Handle to a directory in the tree.
///
/// Handles are cheap to clone and stay valid for the lifetime of the tree.
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    path: Arc<str>,
    state: Arc<Mutex<NodeState>>,
}

impl DirectoryNode {
    fn new(path: &str) -> Self {
        Self {
            path: Arc::from(path),
            state: Arc::default(),
        }
    }

    /// Normalized path relative to the repository root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Record a file transferred directly inside this directory.
    pub fn add_file(&self, size_bytes: u64) {
        let mut state = lock(&self.state);
        state.files_count += 1;
        state.size_bytes = state.size_bytes.saturating_add(size_bytes);
    }

    /// Number of files recorded in this directory.
    #[must_use]
    pub fn files_count(&self) -> u64 {
        lock(&self.state).files_count
    }

    /// Total size of the files recorded in this directory.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        lock(&self.state).size_bytes
    }

    /// Mark the directory as fully transferred.
    pub fn mark_completed(&self) {
        lock(&self.state).completed = true;
    }

    /// Whether the directory was fully transferred.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        lock(&self.state).completed
    }

    /// Names of the known child directories, sorted.
    #[must_use]
    pub fn child_names(&self) -> Vec<String> {
        lock(&self.state).children.keys().cloned().collect()
    }

    fn child(&self, name: &str) -> Option<Self> {
        lock(&self.state).children.get(name).cloned()
    }

    fn child_or_insert(&self, name: &str) -> Self {
        let mut state = lock(&self.state);
        state
            .children
            .entry(name.to_string())
            .or_insert_with(|| {
                let path = if self.path.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{name}", self.path)
                };
                Self::new(&path)
            })
            .clone()
    }

    fn to_persisted(&self) -> PersistedNode {
        let children: Vec<(String, Self)> = {
            let state = lock(&self.state);
            state
                .children
                .iter()
                .map(|(name, node)| (name.clone(), node.clone()))
                .collect()
        };

        let (files_count, size_bytes, completed) = {
            let state = lock(&self.state);
            (state.files_count, state.size_bytes, state.completed)
        };

        PersistedNode {
            files_count,
            size_bytes,
            completed,
            children: children
                .into_iter()
                .map(|(name, node)| (name, node.to_persisted()))
                .collect(),
        }
    }

    fn from_persisted(path: &str, persisted: PersistedNode) -> Self {
        let children = persisted
            .children
            .into_iter()
            .map(|(name, child)| {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}/{name}")
                };
                let node = Self::from_persisted(&child_path, child);
                (name, node)
            })
            .collect();

        Self {
            path: Arc::from(path),
            state: Arc::new(Mutex::new(NodeState {
                files_count: persisted.files_count,
                size_bytes: persisted.size_bytes,
                completed: persisted.completed,
                children,
            })),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedNode {
    #[serde(default)]
    files_count: u64,
    #[serde(default)]
    size_bytes: u64,
    #[serde(default)]
    completed: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    children: BTreeMap<String, PersistedNode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedTree {
    version: u32,
    repo_key: String,
    root: PersistedNode,
}

/// Directory tree of one repository.
pub struct DirectoryTree {
    repo_key: String,
    path: PathBuf,
    root: DirectoryNode,
    lru: Mutex<LruCache<String, DirectoryNode>>,
}

impl DirectoryTree {
    fn with_root(repo_key: &str, path: &Path, root: DirectoryNode, config: &SnapshotConfig) -> Self {
        let capacity = NonZeroUsize::new(config.lru_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            repo_key: repo_key.to_string(),
            path: path.to_path_buf(),
            root,
            lru: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Repository the tree belongs to.
    #[must_use]
    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    /// File the tree is persisted to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The repository root node.
    #[must_use]
    pub const fn root(&self) -> &DirectoryNode {
        &self.root
    }

    /// Number of directory nodes currently held in the LRU cache.
    #[must_use]
    pub fn cached_nodes(&self) -> usize {
        lock(&self.lru).len()
    }
}

impl TreeSnapshot for DirectoryTree {
    type Node = DirectoryNode;

    fn create(repo_key: &str, path: &Path, config: &SnapshotConfig) -> Self {
        Self::with_root(repo_key, path, DirectoryNode::new(""), config)
    }

    fn load(repo_key: &str, path: &Path, config: &SnapshotConfig) -> Result<Option<Self>> {
        let Some(persisted) = persist::read_json_if_exists::<PersistedTree>(path)? else {
            return Ok(None);
        };

        if persisted.repo_key != repo_key {
            return Err(Error::Serialization(format!(
                "snapshot at {} belongs to repository '{}', expected '{repo_key}'",
                path.display(),
                persisted.repo_key
            )));
        }

        let root = DirectoryNode::from_persisted("", persisted.root);
        Ok(Some(Self::with_root(repo_key, path, root, config)))
    }

    fn look_up_node(&self, relative_path: &str) -> Result<DirectoryNode> {
        let mut node = self.root.clone();
        for component in split_path(relative_path)? {
            node = node
                .child(component)
                .ok_or_else(|| Error::SnapshotNodeNotFound(relative_path.to_string()))?;
        }
        Ok(node)
    }

    fn get_directory_node_with_lru(&self, relative_path: &str) -> Result<DirectoryNode> {
        let components = split_path(relative_path)?;
        let key = components.join("/");

        if let Some(node) = lock(&self.lru).get(&key) {
            return Ok(node.clone());
        }

        let node = components
            .into_iter()
            .fold(self.root.clone(), |node, component| node.child_or_insert(component));

        lock(&self.lru).put(key, node.clone());
        Ok(node)
    }

    fn persist(&self) -> Result<()> {
        let persisted = PersistedTree {
            version: SNAPSHOT_FILE_VERSION,
            repo_key: self.repo_key.clone(),
            root: self.root.to_persisted(),
        };

        persist::write_json_atomic(&self.path, &persisted)?;

        tracing::debug!(
            repo = %self.repo_key,
            path = %self.path.display(),
            "Persisted repository snapshot"
        );

        Ok(())
    }
}
