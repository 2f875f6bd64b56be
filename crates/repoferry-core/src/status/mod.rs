//! Human readable status of a transfer run.
//!
//! The report is built from the files in the run directory only, so it can
//! be produced by a different process than the one running the transfer. It
//! never writes anything.

pub mod format;

pub use format::{calc_percentage, format_duration, size_to_string};

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::persist::RunLayout;
use crate::phase::RepoProgress;
use crate::state::{require_repo_progress, running_time, TransferState};

/// Appended to the failure count, since failures are retried in phase 3.
pub const RETRY_FAILURE_CONTENT_NOTE: &str =
    "In Phase 3 and in subsequent executions, we'll retry transferring the failed files";

/// Render the status of the run in `layout` as of now.
///
/// # Errors
///
/// Returns an error if a run is in progress and its state is missing or
/// unreadable.
pub fn show_status(layout: &RunLayout) -> Result<String> {
    render_status(layout, Utc::now())
}

/// Render the status of the run in `layout` as of `now`.
///
/// # Errors
///
/// Returns an error if a run is in progress and its state is missing or
/// unreadable.
pub fn render_status(layout: &RunLayout, now: DateTime<Utc>) -> Result<String> {
    let mut output = String::new();

    let Some(running_for) = running_time(layout, now)? else {
        add_string(&mut output, "🔴", "Status", "Not running", 0);
        return Ok(output);
    };

    let state = TransferState::load(layout)?
        .ok_or_else(|| Error::MissingRunState(layout.state_file().display().to_string()))?;
    add_overall_status(&mut output, &state, running_for);

    if state.has_current_repo() {
        let progress = require_repo_progress(layout, &state.current_repo_key)?;
        output.push('\n');
        add_repository_status(&mut output, &progress);
    }

    Ok(output)
}

fn add_overall_status(output: &mut String, state: &TransferState, running_for: Duration) {
    let overall = &state.overall_transfer;
    let repos = &state.total_repositories;

    add_title(output, "Overall Transfer Status");
    add_string(output, "🟢", "Status", "Running", 3);
    add_string(
        output,
        "🏃🏼",
        "Running for",
        &format!("  {}", format_duration(running_for)),
        2,
    );
    add_string(
        output,
        "🗄 ",
        "Storage",
        &format!(
            "{} / {}{}",
            size_to_string(overall.transferred_size_bytes),
            size_to_string(overall.total_size_bytes),
            calc_percentage(overall.transferred_size_bytes, overall.total_size_bytes)
        ),
        3,
    );
    add_string(
        output,
        "📦",
        "Repositories",
        &format!(
            "{} / {}{}",
            repos.transferred_units,
            repos.total_units,
            calc_percentage(repos.transferred_units, repos.total_units)
        ),
        2,
    );
    add_string(
        output,
        "🧵",
        "Working threads",
        &state.working_threads.to_string(),
        2,
    );
    add_string(output, "⚡", "Transfer speed", &state.speed_string(), 2);
    add_string(
        output,
        "⌛",
        "Estimated time remaining",
        &state.estimated_remaining_time_string(),
        1,
    );

    let mut failures = state.transfer_failures.to_string();
    if state.transfer_failures > 0 {
        let _ = write!(failures, " ({RETRY_FAILURE_CONTENT_NOTE})");
    }
    add_string(output, "❌", "Transfer failures", &failures, 2);
}

fn add_repository_status(output: &mut String, progress: &RepoProgress) {
    add_title(output, "Current Repository Status");
    add_string(output, "🏷 ", "Name", &progress.repo_key, 2);
    add_string(output, "🔢", "Phase", progress.phase.description(), 2);

    // Phase 2 has no totals to report.
    let Some(info) = progress.current_info() else {
        return;
    };

    add_string(
        output,
        "🗄 ",
        "Storage",
        &format!(
            "{} / {}{}",
            size_to_string(info.transferred_size_bytes),
            size_to_string(info.total_size_bytes),
            calc_percentage(info.transferred_size_bytes, info.total_size_bytes)
        ),
        2,
    );
    add_string(
        output,
        "📄",
        "Files",
        &format!(
            "{} / {}{}",
            info.transferred_units,
            info.total_units,
            calc_percentage(info.transferred_units, info.total_units)
        ),
        2,
    );
}

fn add_title(output: &mut String, title: &str) {
    let _ = writeln!(output, "{title}");
    let _ = writeln!(output, "{}", "─".repeat(title.chars().count()));
}

fn add_string(output: &mut String, emoji: &str, key: &str, value: &str, tabs: usize) {
    if !emoji.is_empty() {
        output.push_str(emoji);
        output.push(' ');
    }
    let _ = writeln!(output, "{key}: {}{value}", "\t".repeat(tabs));
}
