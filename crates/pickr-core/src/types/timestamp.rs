//! Lenient timestamp decoding.
//!
//! The backend mixes epoch milliseconds (`Date.now()` style), RFC 3339
//! strings and SQLite `YYYY-MM-DD HH:MM:SS` values. All are normalized to
//! `DateTime<Utc>`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

/// Parse a timestamp string in any of the accepted shapes.
pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    value.parse::<i64>().ok().and_then(from_millis)
}

/// Convert epoch milliseconds.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// `deserialize_with` helper for optional timestamps.
///
/// Unparseable values decode as `None` rather than failing the whole payload.
pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(RawTimestamp::Millis(ms)) => from_millis(ms),
        Some(RawTimestamp::Fractional(ms)) => from_millis(ms as i64),
        Some(RawTimestamp::Text(text)) => parse(&text),
    })
}
