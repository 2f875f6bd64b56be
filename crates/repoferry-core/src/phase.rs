//! Per-repository transfer phases and their progress counters.
//!
//! Every repository goes through three ordered phases:
//!
//! 1. A full scan that transfers every item in the repository.
//! 2. A delta pass over items created or modified since phase 1 began. The
//!    amount of work is unknown in advance, so it has no totals.
//! 3. A retry of the items that failed in phase 1 or an earlier phase 3 run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three sequential stages of processing a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Full scan and transfer
    Phase1,
    /// Transfer of newly created and modified items
    Phase2,
    /// Retry of transfer failures
    Phase3,
}

impl Phase {
    /// All phases, in execution order.
    pub const ALL: [Self; 3] = [Self::Phase1, Self::Phase2, Self::Phase3];

    /// One-based phase number.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Phase1 => 1,
            Self::Phase2 => 2,
            Self::Phase3 => 3,
        }
    }

    /// The phase that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Phase1 => Some(Self::Phase2),
            Self::Phase2 => Some(Self::Phase3),
            Self::Phase3 => None,
        }
    }

    /// Whether the phase has a known amount of work to report as a ratio.
    #[must_use]
    pub const fn has_totals(self) -> bool {
        !matches!(self, Self::Phase2)
    }

    /// Human description used by the status report.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Phase1 => "Transferring all files in the repository (1/3)",
            Self::Phase2 => "Transferring newly created and modified files (2/3)",
            Self::Phase3 => "Retrying transfer failures (3/3)",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {}", self.number())
    }
}

/// Progress counters of a phase with a known amount of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    /// Units (files) transferred so far
    pub transferred_units: u64,
    /// Units to transfer
    pub total_units: u64,
    /// Bytes transferred so far
    pub transferred_size_bytes: u64,
    /// Bytes to transfer
    pub total_size_bytes: u64,
}

impl PhaseProgress {
    /// Raise the totals. Totals never shrink.
    pub fn set_totals(&mut self, units: u64, size_bytes: u64) {
        self.total_units = self.total_units.max(units);
        self.total_size_bytes = self.total_size_bytes.max(size_bytes);
    }

    /// Add transferred units and bytes.
    pub fn add_transferred(&mut self, units: u64, size_bytes: u64) {
        self.transferred_units = self.transferred_units.saturating_add(units);
        self.transferred_size_bytes = self.transferred_size_bytes.saturating_add(size_bytes);
    }
}

/// Phase 2 only accumulates what was moved; there is no total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaProgress {
    /// Units (files) transferred so far
    pub transferred_units: u64,
    /// Bytes transferred so far
    pub transferred_size_bytes: u64,
}

/// Progress of the repository currently being transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoProgress {
    /// Repository key
    pub repo_key: String,
    /// Phase the repository is in
    pub phase: Phase,
    /// Full transfer counters
    pub phase1_info: PhaseProgress,
    /// Delta transfer counters
    #[serde(default)]
    pub delta_info: DeltaProgress,
    /// Failure retry counters
    pub phase3_info: PhaseProgress,
    /// When work on the repository started
    pub started_at: DateTime<Utc>,
    /// When the progress was last updated
    pub updated_at: DateTime<Utc>,
}

impl RepoProgress {
    /// Create progress for a repository entering phase 1 at `now`.
    #[must_use]
    pub fn new(repo_key: &str, now: DateTime<Utc>) -> Self {
        Self {
            repo_key: repo_key.to_string(),
            phase: Phase::Phase1,
            phase1_info: PhaseProgress::default(),
            delta_info: DeltaProgress::default(),
            phase3_info: PhaseProgress::default(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Counters of the given phase, `None` for phase 2.
    #[must_use]
    pub const fn phase_info(&self, phase: Phase) -> Option<&PhaseProgress> {
        match phase {
            Phase::Phase1 => Some(&self.phase1_info),
            Phase::Phase2 => None,
            Phase::Phase3 => Some(&self.phase3_info),
        }
    }

    /// Counters of the current phase, `None` while in phase 2.
    #[must_use]
    pub const fn current_info(&self) -> Option<&PhaseProgress> {
        self.phase_info(self.phase)
    }

    /// Raise the totals of the current phase. Ignored during phase 2.
    pub fn set_totals(&mut self, units: u64, size_bytes: u64, now: DateTime<Utc>) {
        match self.phase {
            Phase::Phase1 => self.phase1_info.set_totals(units, size_bytes),
            Phase::Phase2 => {
                tracing::debug!(repo = %self.repo_key, "Ignoring totals during delta phase");
            }
            Phase::Phase3 => self.phase3_info.set_totals(units, size_bytes),
        }
        self.updated_at = now;
    }

    /// Record transferred work in the current phase.
    pub fn add_transferred(&mut self, units: u64, size_bytes: u64, now: DateTime<Utc>) {
        match self.phase {
            Phase::Phase1 => self.phase1_info.add_transferred(units, size_bytes),
            Phase::Phase2 => {
                self.delta_info.transferred_units =
                    self.delta_info.transferred_units.saturating_add(units);
                self.delta_info.transferred_size_bytes =
                    self.delta_info.transferred_size_bytes.saturating_add(size_bytes);
            }
            Phase::Phase3 => self.phase3_info.add_transferred(units, size_bytes),
        }
        self.updated_at = now;
    }
}
