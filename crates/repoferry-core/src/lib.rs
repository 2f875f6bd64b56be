//! # Repoferry Core Library
//!
//! `repoferry-core` tracks and persists the progress of a bulk repository
//! transfer, so that an interrupted run can resume where it stopped and a
//! separate process can report how far along it is.
//!
//! ## Features
//!
//! - **Three-phase progress**: Per-repository counters for the full copy, the
//!   delta of newly created files, and the retry of failures
//! - **Tree snapshots**: A directory tree per repository, checkpointed at a
//!   configurable interval and reloaded on resume
//! - **Coalesced checkpoints**: Concurrent workers never wait on each other to
//!   persist; an in-progress checkpoint covers the rest
//! - **Status reports**: Human readable progress built from the run directory
//!
//! ## Modules
//!
//! - [`clock`] - Time source, replaceable in tests
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`persist`] - Run directory layout and atomic file writes
//! - [`phase`] - Transfer phases and per-repository progress
//! - [`snapshot`] - Repository tree snapshots
//! - [`state`] - Aggregate state and the state manager
//! - [`status`] - Status report rendering
//!
//! ## Example
//!
//! ```rust,ignore
//! use repoferry_core::{config::Config, state::TransferStateManager};
//!
//! let config = Config::load()?;
//! let manager: TransferStateManager = TransferStateManager::resume(config.run_dir(), &config)?;
//! manager.start_run()?;
//! manager.start_repository("libs-release", true)?;
//! let node = manager.get_directory_snapshot_node_with_lru("org/example")?;
//! node.add_file(1024);
//! manager.increment_repo_transferred(1, 1024)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod clock;
pub mod config;
pub mod error;
pub mod persist;
pub mod phase;
pub mod snapshot;
pub mod state;
pub mod status;

use std::time::Duration;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default interval between tree snapshot checkpoints (10 minutes)
pub const DEFAULT_SNAPSHOT_SAVE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default number of transfer worker threads
pub const DEFAULT_WORKING_THREADS: usize = 8;

/// Default number of directory nodes kept in a snapshot's lookup cache
pub const DEFAULT_LRU_CAPACITY: usize = 1000;
