//! Cache-control duration derivation.
//!
//! A page declares a default max-age; responses it aggregated from upstream
//! services may carry shorter ones, and the shortest value wins.
//!
//! ```
//! use pageflow_core::cache_control::{duration, header_value};
//!
//! assert_eq!(duration("1hr", &[]), Ok(3600));
//! assert_eq!(duration("1hr", &[Some(360), None, Some(350)]), Ok(350));
//! assert_eq!(header_value(0), "private, no-cache");
//! ```

use crate::error::CacheControlError;

/// Name of the header written by [`crate::context::Response::cache_control`].
pub const HEADER: &str = "Cache-Control";

/// A default max-age as a page declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaxAge {
    /// Caching disabled (`false` or `0`)
    Disabled,
    /// Max-age in seconds
    Seconds(u64),
    /// Human-readable duration such as `"1hr"`, `"30s"` or `"2 days"`.
    /// A bare number is read as milliseconds.
    Formatted(String),
}

impl From<bool> for MaxAge {
    fn from(enabled: bool) -> Self {
        // `true` carries no duration and is rejected as invalid
        if enabled {
            Self::Formatted(String::from("true"))
        } else {
            Self::Disabled
        }
    }
}

impl From<u64> for MaxAge {
    fn from(seconds: u64) -> Self {
        if seconds == 0 {
            Self::Disabled
        } else {
            Self::Seconds(seconds)
        }
    }
}

impl From<&str> for MaxAge {
    fn from(value: &str) -> Self {
        Self::Formatted(value.to_string())
    }
}

impl From<String> for MaxAge {
    fn from(value: String) -> Self {
        Self::Formatted(value)
    }
}

/// Resolve the max-age in seconds.
///
/// `upstream` holds the max-ages reported by upstream responses; `None`
/// entries (no cache-control header) are skipped.
///
/// # Errors
///
/// Returns [`CacheControlError::Invalid`] if `default` is a string that does
/// not describe a duration.
pub fn duration(
    default: impl Into<MaxAge>,
    upstream: &[Option<u64>],
) -> Result<u64, CacheControlError> {
    let seconds = match default.into() {
        MaxAge::Disabled => return Ok(0),
        MaxAge::Seconds(seconds) => seconds,
        MaxAge::Formatted(value) => parse_millis(&value)
            .map(|millis| millis / 1000)
            .ok_or(CacheControlError::Invalid(value))?,
    };

    Ok(upstream.iter().flatten().fold(seconds, |min, age| min.min(*age)))
}

/// Header value for a max-age in seconds.
#[must_use]
pub fn header_value(seconds: u64) -> String {
    if seconds == 0 {
        String::from("private, no-cache")
    } else {
        format!("public, max-age={seconds}")
    }
}

/// Extract `max-age=N` from an upstream `Cache-Control` header.
#[must_use]
pub fn parse_max_age(header: &str) -> Option<u64> {
    header.split(',').find_map(|directive| {
        let (key, value) = directive.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("max-age") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Parse a human-readable duration into milliseconds.
fn parse_millis(value: &str) -> Option<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);
    let amount: f64 = amount.parse().ok()?;

    let factor: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "week" | "weeks" => 604_800_000.0,
        "y" | "yr" | "yrs" | "year" | "years" => 31_557_600_000.0,
        _ => return None,
    };

    let millis = amount * factor;
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    // Sub-millisecond fractions are dropped
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let millis = millis as u64;
    Some(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_values() {
        assert_eq!(duration(false, &[]), Ok(0));
        assert_eq!(duration(0_u64, &[Some(30)]), Ok(0));
        assert_eq!(header_value(0), "private, no-cache");
    }

    #[test]
    fn test_formatted_values() {
        assert_eq!(duration("1hr", &[]), Ok(3600));
        assert_eq!(duration("30s", &[]), Ok(30));
        assert_eq!(duration("2 days", &[]), Ok(172_800));
        // Bare numbers are milliseconds
        assert_eq!(duration("5000", &[]), Ok(5));
    }

    #[test]
    fn test_seconds_value() {
        assert_eq!(duration(3600_u64, &[]), Ok(3600));
        assert_eq!(header_value(3600), "public, max-age=3600");
    }

    #[test]
    fn test_shortest_upstream_wins() {
        assert_eq!(duration("1hr", &[Some(360)]), Ok(360));
        assert_eq!(duration("1hr", &[Some(360), Some(350)]), Ok(350));
        assert_eq!(duration(60_u64, &[Some(360)]), Ok(60));
    }

    #[test]
    fn test_missing_upstream_falls_back() {
        assert_eq!(duration("1hr", &[None]), Ok(3600));
        assert_eq!(duration("1hr", &[None, None]), Ok(3600));
    }

    #[test]
    fn test_invalid_values() {
        assert!(duration(true, &[]).is_err());
        assert!(duration("", &[]).is_err());
        assert_eq!(
            duration("foo", &[]),
            Err(CacheControlError::Invalid("foo".to_string()))
        );
    }

    #[test]
    fn test_parse_max_age() {
        assert_eq!(parse_max_age("public, max-age=360"), Some(360));
        assert_eq!(parse_max_age("Max-Age=12, private"), Some(12));
        assert_eq!(parse_max_age("no-store"), None);
        assert_eq!(parse_max_age("max-age=soon"), None);
    }
}
