//! Human readable rendering of sizes, ratios and durations.

use std::time::Duration;

const SIZE_UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Render a byte count using binary units, e.g. `"1.5 KiB"`.
///
/// The smallest unit is KiB, so sizes below 1 KiB render as a fraction of it.
/// The largest is EiB; every `u64` fits below 1024 EiB.
#[must_use]
pub fn size_to_string(size_in_bytes: u64) -> String {
    let mut divider: u64 = 1024;
    let mut unit = 0;
    while unit < SIZE_UNITS.len() - 1 && size_in_bytes / divider >= 1024 {
        divider <<= 10;
        unit += 1;
    }
    format!(
        "{:.1} {}iB",
        size_in_bytes as f64 / divider as f64,
        SIZE_UNITS[unit]
    )
}

/// Render `transferred / total` as `" (X.Y%)"`.
///
/// Returns an empty string when either value is zero.
#[must_use]
pub fn calc_percentage(transferred: u64, total: u64) -> String {
    if transferred == 0 || total == 0 {
        return String::new();
    }
    format!(" ({:.1}%)", transferred as f64 / total as f64 * 100.0)
}

/// Render a duration as days, hours and minutes, e.g. `"2h 05m"`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total_mins = duration.as_secs() / 60;
    if total_mins == 0 {
        return "Less than a minute".to_string();
    }

    let days = total_mins / (24 * 60);
    let hours = (total_mins / 60) % 24;
    let mins = total_mins % 60;

    if days > 0 {
        format!("{days}d {hours:02}h {mins:02}m")
    } else if hours > 0 {
        format!("{hours}h {mins:02}m")
    } else {
        format!("{mins}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_to_string() {
        assert_eq!(size_to_string(0), "0.0 KiB");
        assert_eq!(size_to_string(512), "0.5 KiB");
        assert_eq!(size_to_string(1024), "1.0 KiB");
        assert_eq!(size_to_string(1536), "1.5 KiB");
        // The unit is picked before rounding to one decimal.
        assert_eq!(size_to_string(1024 * 1024 - 1), "1024.0 KiB");
        assert_eq!(size_to_string(1024 * 1024), "1.0 MiB");
        assert_eq!(size_to_string(5 * 1024 * 1024 * 1024), "5.0 GiB");
        assert_eq!(size_to_string(1 << 40), "1.0 TiB");
        assert_eq!(size_to_string(1 << 50), "1.0 PiB");
        assert_eq!(size_to_string(1 << 60), "1.0 EiB");
        assert_eq!(size_to_string(u64::MAX), "16.0 EiB");
    }

    #[test]
    fn test_size_unit_is_monotonic() {
        let unit_of = |s: String| {
            let suffix = s.rsplit(' ').next().unwrap_or_default().to_string();
            SIZE_UNITS
                .iter()
                .position(|c| suffix.starts_with(*c))
                .expect("known unit")
        };

        let mut last_unit = 0;
        let mut bytes: u64 = 1;
        while let Some(next) = bytes.checked_mul(3) {
            let rendered = size_to_string(bytes);
            let value: f64 = rendered
                .split(' ')
                .next()
                .and_then(|v| v.parse().ok())
                .expect("numeric value");
            // Just below the next unit the value rounds up to "1024.0".
            assert!((0.0..1024.5).contains(&value), "{rendered} out of range");

            let unit = unit_of(rendered);
            assert!(unit >= last_unit);
            last_unit = unit;
            bytes = next;
        }
    }

    #[test]
    fn test_calc_percentage() {
        assert_eq!(calc_percentage(0, 100), "");
        assert_eq!(calc_percentage(100, 0), "");
        assert_eq!(calc_percentage(50, 100), " (50.0%)");
        assert_eq!(calc_percentage(1, 3), " (33.3%)");
        assert_eq!(calc_percentage(100, 100), " (100.0%)");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "Less than a minute");
        assert_eq!(format_duration(Duration::from_secs(5 * 60)), "5m");
        assert_eq!(format_duration(Duration::from_secs(2 * 3600 + 5 * 60)), "2h 05m");
        assert_eq!(
            format_duration(Duration::from_secs(3 * 86400 + 3600 + 60)),
            "3d 01h 01m"
        );
    }
}
