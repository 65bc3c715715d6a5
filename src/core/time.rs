//! Canonical UTC timestamp handling for contracts, events, and artifacts.
//!
//! Millisecond precision keeps traces readable while preserving triage value.
//! Every writer goes through these helpers so artifact diffs never disagree
//! on timestamp shape.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Formats a timestamp as `YYYY-MM-DDTHH:MM:SS.sssZ`.
#[must_use]
pub fn format_utc_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn to_epoch_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Microseconds since the Unix epoch.
#[must_use]
pub fn to_epoch_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Reconstructs a timestamp from epoch milliseconds, clamping out-of-range
/// values to the epoch.
#[must_use]
pub fn from_epoch_millis(epoch_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .unwrap_or_default()
}

/// Reconstructs a timestamp from epoch microseconds.
#[must_use]
pub fn from_epoch_micros(epoch_us: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(epoch_us).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_millisecond_precision_and_z_suffix() {
        let ts = from_epoch_millis(1_700_000_000_123);
        let text = format_utc_millis(ts);
        assert!(text.ends_with('Z'), "missing Z suffix: {text}");
        assert!(text.contains(".123Z"), "missing millis: {text}");
    }

    #[test]
    fn epoch_round_trips_at_millisecond_resolution() {
        let ts = from_epoch_millis(1_700_000_000_456);
        assert_eq!(to_epoch_millis(ts), 1_700_000_000_456);
    }

    #[test]
    fn micros_round_trip() {
        let ts = from_epoch_micros(1_700_000_000_123_456);
        assert_eq!(to_epoch_micros(ts), 1_700_000_000_123_456);
    }
}
