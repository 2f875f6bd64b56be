//! Error types for Repoferry.
//!
//! This module provides a unified error type for all Repoferry operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

use crate::phase::Phase;

/// A specialized `Result` type for Repoferry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Repoferry.
#[derive(Error, Debug)]
pub enum Error {
    /// A snapshot operation was attempted while no repository snapshot is active
    #[error("invalid call to snapshot manager before it was initialized")]
    SnapshotUninitialized,

    /// The requested node is not part of the repository snapshot
    #[error("node '{0}' not found in the repository snapshot")]
    SnapshotNodeNotFound(String),

    /// The persisted state of the current repository could not be found
    #[error("could not find the state file of repository '{0}'. Aborting")]
    MissingStateFile(String),

    /// A run is in progress but its aggregate state file is absent
    #[error("could not find the transfer state file at '{0}'. Aborting")]
    MissingRunState(String),

    /// Phase change that would move the repository backwards
    #[error("invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition {
        /// Phase the repository is currently in
        from: Phase,
        /// Phase that was requested
        to: Phase,
    },

    /// A repository operation was attempted while no repository is current
    #[error("no repository is currently being transferred")]
    NoCurrentRepository,

    /// Invalid path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns whether the error indicates a corrupted or tampered run directory.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::MissingStateFile(_) | Self::MissingRunState(_) | Self::Serialization(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingStateFile(_) | Self::MissingRunState(_) => Some(
                "The run directory appears to be incomplete or modified.\n\
                 Restart the transfer to rebuild the repository state.",
            ),
            Self::ConfigError(_) => Some(
                "Check the configuration file for syntax errors:\n\
                   repoferry config path",
            ),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_state_file_message() {
        let err = Error::MissingStateFile("libs-release".to_string());
        assert_eq!(
            err.to_string(),
            "could not find the state file of repository 'libs-release'. Aborting"
        );
        assert!(err.is_corruption());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_phase_transition_message() {
        let err = Error::InvalidPhaseTransition {
            from: Phase::Phase3,
            to: Phase::Phase1,
        };
        assert_eq!(err.to_string(), "invalid phase transition from phase 3 to phase 1");
    }

    #[test]
    fn test_io_error_conversion() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_corruption());
    }
}
