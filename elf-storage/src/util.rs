//! Row-mapping and timestamp helpers shared by the storage modules.

use chrono::{DateTime, NaiveDate, Utc};
use elf_core::error::Error;

/// Map a libsql error to the core's database error kind.
pub(crate) fn db_err(e: libsql::Error) -> Error {
    Error::Database(e.to_string())
}

/// UTC timestamp to the stored millisecond integer.
pub(crate) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Stored millisecond integer back to a UTC timestamp.
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

pub(crate) fn opt_from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(from_millis)
}

/// Stored `YYYY-MM-DD` date column.
pub(crate) fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

pub(crate) fn format_date(d: Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Parse a JSON column into a value, None on NULL or junk.
pub(crate) fn parse_json(s: Option<String>) -> Option<serde_json::Value> {
    s.and_then(|s| serde_json::from_str(&s).ok())
}

/// Parse a JSON string-array column (session id lists).
pub(crate) fn parse_string_list(s: Option<String>) -> Vec<String> {
    s.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn millis_round_trip() {
        let dt = Utc.with_ymd_and_hms(2026, 7, 1, 12, 30, 45).unwrap();
        assert_eq!(from_millis(to_millis(dt)), dt);
    }

    #[test]
    fn date_round_trip() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        assert_eq!(parse_date(format_date(Some(date))), Some(date));
        assert_eq!(parse_date(Some("garbage".into())), None);
    }

    #[test]
    fn string_list_tolerates_junk() {
        assert_eq!(parse_string_list(Some(r#"["a","b"]"#.into())), vec!["a", "b"]);
        assert!(parse_string_list(Some("not json".into())).is_empty());
        assert!(parse_string_list(None).is_empty());
    }
}
