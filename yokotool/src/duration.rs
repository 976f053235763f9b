//! Human readable durations such as `90`, `4m30s` or `1h`.

use std::time::Duration;

use thiserror::Error;

/// The duration could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("bad duration '{0}', use for example '90', '4m30s' or '1h'")]
pub struct DurationError(pub String);

/// Parse a duration. A plain number is seconds, otherwise `h`, `m` and `s` components are
/// accepted in this order, each at most once.
pub fn parse_duration(raw: &str) -> Result<Duration, DurationError> {
    let err = || DurationError(raw.to_string());
    let text: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if text.is_empty() {
        return Err(err());
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut last_rank = 4;
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let (rank, factor) = match c {
            'h' => (3, 3600),
            'm' => (2, 60),
            's' => (1, 1),
            _ => return Err(err()),
        };
        if digits.is_empty() || rank >= last_rank {
            return Err(err());
        }
        let value: u64 = digits.parse().map_err(|_| err())?;
        total = value
            .checked_mul(factor)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(err)?;
        digits.clear();
        last_rank = rank;
    }
    if !digits.is_empty() {
        return Err(err());
    }
    Ok(Duration::from_secs(total))
}
