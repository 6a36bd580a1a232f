//! Parsing of short human-written duration strings (`"35m"`, `"2h"`, `"30s"`) into
//! absolute `std::time::Duration` values. Used for `keep_alive` on providers and for
//! the handful of env-var timeouts the gateway reads at startup.

use duration_string::DurationString;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration string '{0}'")]
pub struct DurationParseError(pub String);

/// Parse a duration string of the form `<integer><unit>` where unit is one of
/// `ms`, `s`, `m`, `h`, `d`, `w`, `y` (the set supported by `duration-string`).
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    DurationString::try_from(input.to_string())
        .map(Into::into)
        .map_err(|_| DurationParseError(input.to_string()))
}

/// Same as [`parse_duration`] but returns whole seconds, which is the unit the
/// keep-alive schedule and the coordination store lock TTLs are kept in.
pub fn parse_duration_secs(input: &str) -> Result<u64, DurationParseError> {
    parse_duration(input).map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_minutes_hours() {
        assert_eq!(parse_duration_secs("30s").unwrap(), 30);
        assert_eq!(parse_duration_secs("35m").unwrap(), 35 * 60);
        assert_eq!(parse_duration_secs("2h").unwrap(), 2 * 3600);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("banana").is_err());
        assert!(parse_duration("").is_err());
    }
}
