//! Configuration management for Repoferry.
//!
//! This module handles loading, saving, and managing Repoferry configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/repoferry/config.toml` |
//! | macOS | `~/Library/Application Support/Repoferry/config.toml` |
//! | Windows | `%APPDATA%\Repoferry\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use repoferry_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Run directory: {}", config.run_dir().display());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main configuration struct for Repoferry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Repository snapshot settings
    pub snapshot: SnapshotConfig,
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Minimum time between two checkpoints of the repository snapshot
    #[serde(with = "humantime_serde")]
    pub snapshot_save_interval: Duration,
    /// Number of transfer worker threads
    pub threads: usize,
    /// Directory holding the persisted state of the run (None for the default)
    pub run_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            snapshot_save_interval: crate::DEFAULT_SNAPSHOT_SAVE_INTERVAL,
            threads: crate::DEFAULT_WORKING_THREADS,
            run_dir: None,
        }
    }
}

/// Repository snapshot configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Build and persist a tree snapshot for each repository
    pub enabled: bool,
    /// Number of recently used directory nodes kept for fast look-ups
    pub lru_capacity: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lru_capacity: crate::DEFAULT_LRU_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| crate::error::Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::error::Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = self.to_toml()?;

        std::fs::write(&path, content)
            .map_err(|e| crate::error::Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            crate::error::Error::ConfigError(format!("Failed to serialize config: {e}"))
        })
    }

    /// Directory holding the persisted state of the transfer run.
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.transfer
            .run_dir
            .clone()
            .unwrap_or_else(Self::default_run_dir)
    }

    /// Get the default run directory path.
    #[must_use]
    pub fn default_run_dir() -> PathBuf {
        directories::ProjectDirs::from("com", "repoferry", "Repoferry").map_or_else(
            || PathBuf::from(".repoferry").join("transfer"),
            |dirs| dirs.data_dir().join("transfer"),
        )
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "repoferry", "Repoferry")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = duration.as_secs();
        if secs > 0 && secs % 60 == 0 {
            serializer.serialize_str(&format!("{}m", secs / 60))
        } else {
            serializer.serialize_str(&format!("{secs}s"))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let multiplier = match s.chars().last() {
            Some('s') => 1,
            Some('m') => 60,
            Some('h') => 60 * 60,
            _ => return Err(serde::de::Error::custom("invalid duration format")),
        };
        let n = s[..s.len() - 1]
            .parse::<u64>()
            .map_err(serde::de::Error::custom)?;
        n.checked_mul(multiplier)
            .map(Duration::from_secs)
            .ok_or_else(|| serde::de::Error::custom("duration is too large"))
    }
}
