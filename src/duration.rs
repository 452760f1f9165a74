//! Parsing of human-readable durations for `--timeout` and `--duration`.

use crate::config::ConfigError;
use std::time::Duration;

/// Nanoseconds per unit suffix. `ms` must be tried before `m`.
const UNITS: [(&str, f64); 4] = [
    ("ms", 1e6),
    ("h", 3600.0 * 1e9),
    ("m", 60.0 * 1e9),
    ("s", 1e9),
];

/// Parse a duration from a human-readable string.
///
/// Accepts a number followed by `ms`, `s`, `m` or `h`, several of those in a
/// row (`1m30s`), fractions (`1.5s`), or a bare number of seconds.
///
/// # Examples
/// ```
/// use switchbot_meter::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(src.to_string());
    let mut rest = src.trim();

    if rest.is_empty() {
        return Err(invalid());
    }

    // No suffix, treat as seconds
    if rest.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = rest.parse().map_err(|_| invalid())?;
        return Ok(Duration::from_secs(secs));
    }

    let mut total = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = rest[number_len..].trim_start();

        let (suffix, scale) = UNITS
            .iter()
            .find(|(suffix, _)| rest.starts_with(suffix))
            .ok_or_else(invalid)?;
        total += value * scale;
        rest = rest[suffix.len()..].trim_start();
    }

    let nanos = total.round();
    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos as u64))
}
