//! Transfer speed and remaining time estimation.
//!
//! Speed is computed over a sliding window of recent samples. The samples are
//! part of the persisted state, so a status command running in another
//! process sees the same figures as the transfer itself.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_between;
use crate::status::format::{format_duration, size_to_string};

/// Text shown while there is not enough data for an estimate.
pub const NOT_AVAILABLE: &str = "Not available yet";

/// Time window the speed is averaged over.
const WINDOW: Duration = Duration::from_secs(5 * 60);

/// Maximum retained samples.
const MAX_SAMPLES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SpeedSample {
    at: DateTime<Utc>,
    bytes: u64,
}

/// Sliding-window throughput estimator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedEstimator {
    samples: VecDeque<SpeedSample>,
}

impl SpeedEstimator {
    /// Record `bytes` transferred at `at`.
    pub fn add_sample(&mut self, at: DateTime<Utc>, bytes: u64) {
        self.samples.push_back(SpeedSample { at, bytes });

        while self
            .samples
            .front()
            .is_some_and(|first| elapsed_between(first.at, at) > WINDOW)
        {
            self.samples.pop_front();
        }

        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// Average speed in bytes per second, `None` with fewer than two samples.
    #[must_use]
    pub fn bytes_per_second(&self) -> Option<f64> {
        let (first, last) = (self.samples.front()?, self.samples.back()?);
        let elapsed = elapsed_between(first.at, last.at);
        if self.samples.len() < 2 || elapsed.is_zero() {
            return None;
        }

        // The first sample marks the start of the window.
        let bytes: u64 = self.samples.iter().skip(1).map(|s| s.bytes).sum();
        Some(bytes as f64 / elapsed.as_secs_f64())
    }

    /// Speed rendered for display, e.g. `"1.5 MiB/s"`.
    #[must_use]
    pub fn speed_string(&self) -> String {
        self.bytes_per_second().map_or_else(
            || NOT_AVAILABLE.to_string(),
            |bps| format!("{}/s", size_to_string(bps as u64)),
        )
    }

    /// Estimated time to move `remaining_bytes` at the current speed.
    ///
    /// `None` without a speed, or when the estimate does not fit a `Duration`.
    #[must_use]
    pub fn estimated_remaining(&self, remaining_bytes: u64) -> Option<Duration> {
        let bps = self.bytes_per_second().filter(|bps| *bps > 0.0)?;
        Duration::try_from_secs_f64(remaining_bytes as f64 / bps).ok()
    }

    /// Estimated remaining time rendered for display.
    #[must_use]
    pub fn estimated_remaining_string(&self, remaining_bytes: u64) -> String {
        self.estimated_remaining(remaining_bytes)
            .map_or_else(|| NOT_AVAILABLE.to_string(), format_duration)
    }
}
