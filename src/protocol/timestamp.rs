//! Date-stamped payloads.
//!
//! The "send data" action of both roles writes the current time as text.
//! RFC 3339 in UTC with whole seconds, e.g. `2024-01-01T00:00:00Z`.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

// ============================================================================
// Formatting
// ============================================================================

/// Formats a timestamp the way it goes on the wire.
#[inline]
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Returns the current time as a wire payload.
#[inline]
#[must_use]
pub fn timestamp_payload() -> String {
    format_timestamp(Utc::now())
}

/// Parses a received timestamp payload.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the text is not RFC 3339.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::invalid_argument(format!("Not an RFC 3339 timestamp {text:?}: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    #[test]
    fn test_format_epoch_of_year() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_parse_accepts_offsets() {
        let parsed = parse_timestamp("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(parsed), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_payload_is_parseable() {
        let payload = timestamp_payload();
        assert!(payload.ends_with('Z'));
        assert!(parse_timestamp(&payload).is_ok());
    }
}
