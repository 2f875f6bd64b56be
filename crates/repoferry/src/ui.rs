//! UI utilities for Repoferry CLI.

use std::io::{self, Write};
use std::time::Duration;

/// Parse a duration like `"30s"`, `"5m"`, `"1h"` or `"1m30s"`.
///
/// Returns `None` if the string is empty or malformed.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            _ => return None,
        };
        let num: u64 = digits.parse().ok()?;
        total = total.checked_add(num.checked_mul(unit)?)?;
        digits.clear();
    }

    if !digits.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}

/// Clear the terminal and move the cursor home.
pub fn clear_screen() {
    print!("\x1b[2J\x1b[H");
    let _ = io::stdout().flush();
}

/// Print a hint for resolving `error` to stderr, if there is one.
pub fn print_suggestion(error: &repoferry_core::Error) {
    if let Some(suggestion) = error.suggestion() {
        eprintln!();
        eprintln!("{}", suggestion);
        eprintln!();
    }
}
