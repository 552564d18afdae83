//! Retention durations: bare seconds or a number with a unit suffix.
//!
//! | Suffix | Unit |
//! |---|---|
//! | `s` | second |
//! | `m` | minute |
//! | `h` | hour |
//! | `d` | 24 hours |
//! | `w` | 7 days |
//! | `mo` | 30 days |
//! | `y` | 365 days |

use std::time::Duration;

use crate::core::error::PipelineError;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Parse a retention duration such as `30d`, `2w` or `3600`
pub fn parse_duration(input: &str) -> Result<Duration, PipelineError> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);

    let invalid = || {
        PipelineError::Configuration(format!(
            "invalid duration '{}': expected seconds or a value like 12h, 30d, 2w, 6mo, 1y",
            input
        ))
    };

    if digits.is_empty() {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let unit = match suffix.to_ascii_lowercase().as_str() {
        "" | "s" => 1,
        "m" => MINUTE,
        "h" => HOUR,
        "d" => DAY,
        "w" => 7 * DAY,
        "mo" => 30 * DAY,
        "y" => 365 * DAY,
        _ => return Err(invalid()),
    };

    value
        .checked_mul(unit)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}
