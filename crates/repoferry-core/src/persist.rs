//! Durable JSON files and the layout of a run directory.
//!
//! Every file is written to a temporary sibling, synced, then renamed over the
//! target so a crash never leaves a half-written file behind.
//!
//! ```text
//! <run_dir>/
//!   state.json                      aggregate transfer state
//!   running.json                    run marker
//!   repos/<repo key>/progress.json  progress of one repository
//!   repos/<repo key>/snapshot.json  tree snapshot of one repository
//! ```

use std::fs;
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// File name of the aggregate transfer state.
pub const STATE_FILE_NAME: &str = "state.json";

/// File name of the run marker.
pub const RUN_MARKER_FILE_NAME: &str = "running.json";

/// File name of a repository's progress.
pub const REPO_PROGRESS_FILE_NAME: &str = "progress.json";

/// File name of a repository's tree snapshot.
pub const SNAPSHOT_FILE_NAME: &str = "snapshot.json";

const REPOS_DIR_NAME: &str = "repos";

/// Paths of the files making up one run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    /// Layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the run directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Aggregate state file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE_NAME)
    }

    /// Run marker file.
    #[must_use]
    pub fn run_marker_file(&self) -> PathBuf {
        self.root.join(RUN_MARKER_FILE_NAME)
    }

    /// Directory holding the files of every repository.
    #[must_use]
    pub fn repos_dir(&self) -> PathBuf {
        self.root.join(REPOS_DIR_NAME)
    }

    /// Directory holding the files of one repository.
    #[must_use]
    pub fn repo_dir(&self, repo_key: &str) -> PathBuf {
        self.repos_dir().join(encode_repo_key(repo_key))
    }

    /// Progress file of one repository.
    #[must_use]
    pub fn repo_progress_file(&self, repo_key: &str) -> PathBuf {
        self.repo_dir(repo_key).join(REPO_PROGRESS_FILE_NAME)
    }

    /// Tree snapshot file of one repository.
    #[must_use]
    pub fn snapshot_file(&self, repo_key: &str) -> PathBuf {
        self.repo_dir(repo_key).join(SNAPSHOT_FILE_NAME)
    }
}

/// Encode a repository key into a single safe path component.
///
/// Characters outside `[A-Za-z0-9._-]` are percent-encoded, and so are
/// leading dots, so keys like `..` cannot escape the run directory.
#[must_use]
pub fn encode_repo_key(repo_key: &str) -> String {
    use std::fmt::Write as _;

    let mut encoded = String::with_capacity(repo_key.len());
    for (i, b) in repo_key.bytes().enumerate() {
        let safe = b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-') || (b == b'.' && i > 0);
        if safe {
            encoded.push(char::from(b));
        } else {
            let _ = write!(encoded, "%{b:02X}");
        }
    }
    encoded
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized or the file cannot be written.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(value)?;
    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    sync_parent_dir(path)?;

    tracing::debug!(path = %path.display(), bytes = json.len(), "Wrote state file");

    Ok(())
}

/// Flush the directory entry of `path` so a completed rename survives a crash.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::File::open(parent)?.sync_all()?;
    }
    Ok(())
}

// Directories cannot be opened for syncing outside Unix.
#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

/// Read a JSON file, returning `Ok(None)` when it does not exist.
///
/// # Errors
///
/// Returns an error for any failure other than the file being absent.
pub fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    let value = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        Error::Serialization(format!("Failed to parse {}: {e}", path.display()))
    })?;

    tracing::debug!(path = %path.display(), "Loaded state file");

    Ok(Some(value))
}

/// Remove a file, treating an already absent file as success.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Remove a directory and everything in it, treating an absent directory as
/// success.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_encode_repo_key() {
        assert_eq!(encode_repo_key("libs-release_1.0"), "libs-release_1.0");
        assert_eq!(encode_repo_key("docker/remote"), "docker%2Fremote");
        assert_eq!(encode_repo_key(".."), "%2E.");
        assert_eq!(encode_repo_key("a b"), "a%20b");
    }

    #[test]
    fn test_layout_paths() {
        let layout = RunLayout::new("/run");
        assert_eq!(layout.state_file(), PathBuf::from("/run/state.json"));
        assert_eq!(
            layout.snapshot_file("npm/local"),
            PathBuf::from("/run/repos/npm%2Flocal/snapshot.json")
        );
        assert_eq!(
            layout.repo_progress_file("npm"),
            PathBuf::from("/run/repos/npm/progress.json")
        );
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join("nested").join("value.json");

        let mut value = BTreeMap::new();
        value.insert("files".to_string(), 3u64);
        write_json_atomic(&path, &value).expect("write");

        let loaded: BTreeMap<String, u64> = read_json_if_exists(&path)
            .expect("read")
            .expect("should exist");
        assert_eq!(loaded, value);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join("state.json");

        write_json_atomic(&path, &1u64).expect("first write");
        write_json_atomic(&path, &2u64).expect("second write");

        let loaded: u64 = read_json_if_exists(&path).expect("read").expect("exists");
        assert_eq!(loaded, 2);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_remove_dir_if_exists() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let layout = RunLayout::new(temp_dir.path());
        remove_dir_if_exists(&layout.repos_dir()).expect("absent is fine");

        write_json_atomic(&layout.repo_progress_file("npm"), &1u64).expect("write");
        remove_dir_if_exists(&layout.repos_dir()).expect("remove");
        assert!(!layout.repos_dir().exists());
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let loaded: Option<u64> =
            read_json_if_exists(&temp_dir.path().join("absent.json")).expect("read");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_read_corrupted_file() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ not json").expect("write");

        let err = read_json_if_exists::<u64>(&path).expect_err("should fail");
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_remove_if_exists() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join("marker.json");
        remove_if_exists(&path).expect("absent is fine");
        fs::write(&path, "{}").expect("write");
        remove_if_exists(&path).expect("remove");
        assert!(!path.exists());
    }
}
