//! Ledger timestamps.
//!
//! Events carry their creation time as an RFC 3339 UTC string with a fixed
//! six-digit subsecond field, so lexicographic order over the stored
//! strings equals chronological order. The string itself is part of the
//! hash material, which is why formatting lives in one place.

use time::macros::format_description;
use time::format_description::FormatItem;
use time::{Duration, OffsetDateTime};

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z");

/// Format an instant as a ledger timestamp string.
pub fn format(ts: OffsetDateTime) -> String {
    ts.format(&TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00.000000Z"))
}

/// The current UTC instant as a ledger timestamp string.
pub fn now() -> String {
    format(OffsetDateTime::now_utc())
}

/// Parse a ledger timestamp string back into an instant.
pub fn parse(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &TIMESTAMP_FORMAT).ok()
}

/// Seconds elapsed between a stored timestamp and `now`.
///
/// Returns `None` when the stored string does not parse.
pub fn age_seconds(created_at: &str, now: OffsetDateTime) -> Option<i64> {
    parse(created_at).map(|ts| (now - ts).whole_seconds())
}

/// The stored timestamp advanced by the given number of seconds.
pub fn offset_by_seconds(created_at: &str, seconds: i64) -> Option<String> {
    parse(created_at).map(|ts| format(ts + Duration::seconds(seconds)))
}

/// The next representable timestamp after `previous`.
///
/// Append paths use this to keep `created_at` strictly increasing when the
/// wall clock has not advanced past the current tail.
pub fn next_after(previous: &str) -> Option<String> {
    parse(previous).map(|ts| format(ts + Duration::microseconds(1)))
}
