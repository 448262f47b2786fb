//! Lenient parsing of Megaphone timestamps.
//!
//! A malformed timestamp must never block the rest of a record from being
//! mirrored, so everything here maps bad input to `None` instead of failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses an ISO-8601 timestamp into UTC.
///
/// Accepts RFC 3339 (`Z` or numeric offset), offset-less date-times (taken as
/// UTC) and bare dates (midnight UTC). Returns `None` for `None`, blank or
/// unparseable input.
///
/// # Examples
///
/// ```
/// use adsync_core::datetime::parse_remote_timestamp;
///
/// let ts = parse_remote_timestamp(Some("2024-04-22T09:00:00Z")).unwrap();
/// assert_eq!(ts.to_rfc3339(), "2024-04-22T09:00:00+00:00");
/// assert!(parse_remote_timestamp(Some("not-a-date")).is_none());
/// assert!(parse_remote_timestamp(None).is_none());
/// ```
pub fn parse_remote_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Serde adapter for optional timestamp fields on remote records.
///
/// Any JSON value is accepted; non-strings and unparseable strings become
/// `None`.
pub(crate) fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| parse_remote_timestamp(Some(s))))
}
