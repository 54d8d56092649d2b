//! Duration, quantity and formatting helpers shared by the tools

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::UnitError;

/// Longest window any tool looks back over (3650 days)
pub const MAX_DURATION_SECS: u64 = 3650 * 86400;

/// Parse a duration like `30m`, `2h` or `7d` into seconds, at most [`MAX_DURATION_SECS`]
pub fn parse_duration(duration: &str) -> Result<u64, UnitError> {
    let normalized = duration.trim().to_lowercase();
    let invalid = || UnitError::InvalidDuration(normalized.clone());

    let (digits, multiplier) = match normalized.chars().last() {
        Some('s') => (&normalized[..normalized.len() - 1], 1),
        Some('m') => (&normalized[..normalized.len() - 1], 60),
        Some('h') => (&normalized[..normalized.len() - 1], 3600),
        Some('d') => (&normalized[..normalized.len() - 1], 86400),
        _ => return Err(invalid()),
    };

    let value = digits.parse::<u64>().map_err(|_| invalid())?;
    value
        .checked_mul(multiplier)
        .filter(|secs| *secs <= MAX_DURATION_SECS)
        .ok_or_else(|| UnitError::DurationOutOfRange(normalized.clone()))
}

/// Whole days as seconds; negative or overlong counts are rejected
pub fn days_to_seconds(days: i64) -> Result<u64, UnitError> {
    u64::try_from(days)
        .ok()
        .and_then(|d| d.checked_mul(86400))
        .filter(|secs| *secs <= MAX_DURATION_SECS)
        .ok_or_else(|| UnitError::DurationOutOfRange(format!("{days}d")))
}

/// The instant `seconds` before `end`
pub fn seconds_before(end: DateTime<Utc>, seconds: u64) -> Result<DateTime<Utc>, UnitError> {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| end.checked_sub_signed(delta))
        .ok_or_else(|| UnitError::DurationOutOfRange(format!("{seconds}s")))
}

/// Parse a CPU quantity (`4`, `250m`, `500000n`) into cores
pub fn parse_cpu_quantity(quantity: &str) -> Result<f64, UnitError> {
    let value = quantity.trim();
    let invalid = || UnitError::InvalidQuantity(value.to_string());

    let (number, divisor) = if let Some(milli) = value.strip_suffix('m') {
        (milli, 1_000.0)
    } else if let Some(nano) = value.strip_suffix('n') {
        (nano, 1_000_000_000.0)
    } else {
        (value, 1.0)
    };

    number
        .parse::<f64>()
        .map(|n| n / divisor)
        .map_err(|_| invalid())
}

const MEMORY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
];

/// Parse a memory quantity (`512Mi`, `2Gi`, `1048576`) into bytes
pub fn parse_memory_quantity(quantity: &str) -> Result<u64, UnitError> {
    let value = quantity.trim();
    let invalid = || UnitError::InvalidQuantity(value.to_string());

    let (number, multiplier) = MEMORY_SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| value.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((value, 1.0));

    let parsed = number.parse::<f64>().map_err(|_| invalid())?;
    if parsed < 0.0 || !parsed.is_finite() {
        return Err(invalid());
    }
    Ok((parsed * multiplier).round() as u64)
}

/// Human-readable byte count (`1.50MB`)
pub fn format_bytes(bytes: f64) -> String {
    let mut value = bytes;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value.abs() < 1024.0 {
            return format!("{value:.2}{unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2}PB")
}

/// Human-readable CPU amount (`250m`, `1.50`)
pub fn format_cpu(cores: f64) -> String {
    if cores < 0.001 {
        format!("{:.0}n", cores * 1_000_000.0)
    } else if cores < 1.0 {
        format!("{:.0}m", cores * 1000.0)
    } else {
        format!("{cores:.2}")
    }
}

/// Bytes rendered as binary gibibytes with two decimals (`3.50Gi`)
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2}Gi", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

/// Keep the last `max_lines` lines; returns the text and whether anything was dropped
pub fn truncate_logs(logs: &str, max_lines: usize) -> (String, bool) {
    let lines: Vec<&str> = logs.split('\n').collect();
    if lines.len() <= max_lines {
        return (logs.to_string(), false);
    }
    (lines[lines.len() - max_lines..].join("\n"), true)
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30m"), Ok(1800));
        assert_eq!(parse_duration("2h"), Ok(7200));
        assert_eq!(parse_duration("3d"), Ok(259200));
        assert_eq!(parse_duration(" 45S "), Ok(45));
    }

    #[test]
    fn test_parse_duration_rejects_unknown_suffix() {
        assert!(matches!(
            parse_duration("2w"),
            Err(UnitError::InvalidDuration(_))
        ));
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overlong_windows() {
        assert_eq!(parse_duration("3650d"), Ok(MAX_DURATION_SECS));
        assert!(matches!(
            parse_duration("3651d"),
            Err(UnitError::DurationOutOfRange(_))
        ));
        assert!(matches!(
            parse_duration("999999999999999999d"),
            Err(UnitError::DurationOutOfRange(_))
        ));
        assert!(matches!(
            parse_duration("100000000000000s"),
            Err(UnitError::DurationOutOfRange(_))
        ));
    }

    #[test]
    fn test_days_to_seconds() {
        assert_eq!(days_to_seconds(7), Ok(604_800));
        assert_eq!(days_to_seconds(0), Ok(0));
        assert!(days_to_seconds(-1).is_err());
        assert!(days_to_seconds(1_000_000_000_000_000).is_err());
        assert!(days_to_seconds(i64::MAX).is_err());
    }

    #[test]
    fn test_seconds_before() {
        let end = Utc::now();
        assert_eq!(seconds_before(end, 3600), Ok(end - TimeDelta::hours(1)));
        assert!(seconds_before(end, u64::MAX).is_err());
        assert!(seconds_before(DateTime::<Utc>::MIN_UTC, 1).is_err());
    }

    #[test]
    fn test_parse_quantities() {
        assert_eq!(parse_memory_quantity("512Mi"), Ok(536_870_912));
        assert_eq!(parse_memory_quantity("2Gi"), Ok(2_147_483_648));
        assert_eq!(parse_memory_quantity("1024"), Ok(1024));
        assert_eq!(parse_memory_quantity("16318412Ki"), Ok(16_710_053_888));
        assert_eq!(parse_cpu_quantity("1000m"), Ok(1.0));
        assert_eq!(parse_cpu_quantity("4"), Ok(4.0));
        assert_eq!(parse_cpu_quantity("250m"), Ok(0.25));
        assert!(parse_memory_quantity("lots").is_err());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_bytes(512.0), "512.00B");
        assert_eq!(format_bytes(1_572_864.0), "1.50MB");
        assert_eq!(format_cpu(0.25), "250m");
        assert_eq!(format_cpu(2.5), "2.50");
        assert_eq!(format_gib(3 * 1024 * 1024 * 1024), "3.00Gi");
    }

    #[test]
    fn test_truncate_logs_keeps_most_recent_lines() {
        let (kept, truncated) = truncate_logs("a\nb\nc\nd", 2);
        assert!(truncated);
        assert_eq!(kept, "c\nd");

        let (kept, truncated) = truncate_logs("a\nb", 5);
        assert!(!truncated);
        assert_eq!(kept, "a\nb");
    }
}
