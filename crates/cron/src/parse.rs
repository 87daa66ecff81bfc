//! Parsing utilities for durations and absolute timestamps.

use anyhow::{Result, bail};

/// Parse a human-friendly duration string into milliseconds.
///
/// Supported suffixes: `s` (seconds), `m` (minutes), `h` (hours), `d` (days).
/// Examples: `"30s"`, `"5m"`, `"2h"`, `"1d"`.
pub fn parse_duration_ms(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty duration string");
    }

    let (num_str, suffix) = match input.find(|c: char| c.is_alphabetic()) {
        Some(i) => (&input[..i], &input[i..]),
        None => bail!("duration missing unit suffix (s/m/h/d): {input}"),
    };

    let value: u64 = num_str
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid number in duration: {num_str}"))?;

    if value == 0 {
        bail!("duration must be > 0");
    }

    let ms = match suffix {
        "s" => value * 1_000,
        "m" => value * 60_000,
        "h" => value * 3_600_000,
        "d" => value * 86_400_000,
        _ => bail!("unknown duration suffix: {suffix} (expected s/m/h/d)"),
    };

    Ok(ms)
}

/// Parse an ISO 8601 timestamp string into epoch milliseconds.
///
/// Accepts formats like `"2026-01-12T18:00:00Z"` or with timezone offset.
pub fn parse_absolute_time_ms(input: &str) -> Result<u64> {
    use chrono::{DateTime, Utc};

    let dt: DateTime<Utc> = input
        .parse::<DateTime<Utc>>()
        .map_err(|e| anyhow::anyhow!("invalid ISO 8601 timestamp: {e}"))?;

    let ms = dt.timestamp_millis();
    if ms < 0 {
        bail!("timestamp is before epoch");
    }
    Ok(ms as u64)
}
