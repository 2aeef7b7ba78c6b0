// ABOUTME: SQLite value coercion into typed record fields
// ABOUTME: Reads columns by name and converts TEXT/INTEGER/REAL/BLOB storage into Rust types

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::types::ValueRef;
use rusqlite::Row;
use uuid::Uuid;

/// Formats tried, in order, for timestamps carrying an explicit offset
const OFFSET_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Formats tried for timestamps without an offset; these are read as UTC
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn value_ref<'a>(row: &'a Row<'_>, column: &str) -> Result<ValueRef<'a>> {
    row.get_ref(column)
        .with_context(|| format!("Failed to read column '{}'", column))
}

fn text_of<'a>(bytes: &'a [u8], column: &str) -> Result<&'a str> {
    std::str::from_utf8(bytes)
        .with_context(|| format!("Column '{}' contains invalid UTF-8 text", column))
}

fn storage_class(value: &ValueRef<'_>) -> &'static str {
    match value {
        ValueRef::Null => "NULL",
        ValueRef::Integer(_) => "INTEGER",
        ValueRef::Real(_) => "REAL",
        ValueRef::Text(_) => "TEXT",
        ValueRef::Blob(_) => "BLOB",
    }
}

/// Read a UUID stored as hyphenated TEXT or as a 16-byte BLOB
pub fn read_uuid(row: &Row<'_>, column: &str) -> Result<Uuid> {
    match value_ref(row, column)? {
        ValueRef::Text(bytes) => {
            let text = text_of(bytes, column)?;
            Uuid::parse_str(text.trim())
                .with_context(|| format!("Column '{}' is not a valid UUID: '{}'", column, text))
        }
        ValueRef::Blob(bytes) => Uuid::from_slice(bytes)
            .with_context(|| format!("Column '{}' BLOB is not a 16-byte UUID", column)),
        other => bail!(
            "Column '{}' expected UUID, found {}",
            column,
            storage_class(&other)
        ),
    }
}

/// Read a nullable text column
///
/// Numbers are rendered with their natural formatting; BLOBs are rejected.
pub fn read_optional_text(row: &Row<'_>, column: &str) -> Result<Option<String>> {
    match value_ref(row, column)? {
        ValueRef::Null => Ok(None),
        ValueRef::Text(bytes) => Ok(Some(text_of(bytes, column)?.to_string())),
        ValueRef::Integer(i) => Ok(Some(i.to_string())),
        ValueRef::Real(f) => Ok(Some(f.to_string())),
        ValueRef::Blob(_) => bail!("Column '{}' expected TEXT, found BLOB", column),
    }
}

/// Read a non-null text column
pub fn read_text(row: &Row<'_>, column: &str) -> Result<String> {
    read_optional_text(row, column)?
        .ok_or_else(|| anyhow!("Column '{}' is NULL but a value is required", column))
}

/// Read a nullable floating point column
///
/// Empty or whitespace-only TEXT is treated as NULL.
pub fn read_optional_float(row: &Row<'_>, column: &str) -> Result<Option<f64>> {
    match value_ref(row, column)? {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(i as f64)),
        ValueRef::Real(f) => Ok(Some(f)),
        ValueRef::Text(bytes) => {
            let text = text_of(bytes, column)?.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<f64>()
                .map(Some)
                .with_context(|| format!("Column '{}' is not a number: '{}'", column, text))
        }
        ValueRef::Blob(_) => bail!("Column '{}' expected REAL, found BLOB", column),
    }
}

/// Read a nullable calendar date column
pub fn read_optional_date(row: &Row<'_>, column: &str) -> Result<Option<NaiveDate>> {
    match value_ref(row, column)? {
        ValueRef::Null => Ok(None),
        ValueRef::Text(bytes) => {
            let text = text_of(bytes, column)?.trim();
            if text.is_empty() {
                return Ok(None);
            }
            parse_date(text)
                .map(Some)
                .with_context(|| format!("Column '{}' is not a valid date", column))
        }
        other => bail!(
            "Column '{}' expected DATE text, found {}",
            column,
            storage_class(&other)
        ),
    }
}

/// Read a non-null timestamp column
///
/// INTEGER values are taken as seconds since the Unix epoch.
pub fn read_timestamp(row: &Row<'_>, column: &str) -> Result<DateTime<Utc>> {
    match value_ref(row, column)? {
        ValueRef::Text(bytes) => parse_timestamp(text_of(bytes, column)?)
            .with_context(|| format!("Column '{}' is not a valid timestamp", column)),
        ValueRef::Integer(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| anyhow!("Column '{}' epoch seconds out of range: {}", column, secs)),
        other => bail!(
            "Column '{}' expected TIMESTAMP, found {}",
            column,
            storage_class(&other)
        ),
    }
}

/// Parse a timestamp as written by SQLite or PostgreSQL text output
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.ffffff]` followed by an offset
/// such as `+00` or `+03:00`, and the same forms without an offset (UTC).
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_TIMESTAMP_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    bail!("Unrecognised timestamp '{}'", text)
}

/// Parse `YYYY-MM-DD`, or the date part of a full timestamp
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    parse_timestamp(text)
        .map(|ts| ts.date_naive())
        .with_context(|| format!("Unrecognised date '{}'", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use rusqlite::Connection;

    /// Evaluate a single-row SELECT and apply a reader to its only column
    fn with_value<T>(sql_value: &str, read: fn(&Row<'_>, &str) -> Result<T>) -> Result<T> {
        let conn = Connection::open_in_memory().unwrap();
        let query = format!("SELECT {} AS v", sql_value);
        conn.query_row(&query, [], |row| Ok(read(row, "v")))
            .unwrap()
    }

    #[test]
    fn test_read_uuid_from_text() {
        let id = with_value("'3d8d9bf5-0d90-4353-88ba-4ccc5d2c07ff'", read_uuid).unwrap();
        assert_eq!(id.to_string(), "3d8d9bf5-0d90-4353-88ba-4ccc5d2c07ff");
    }

    #[test]
    fn test_read_uuid_from_blob() {
        let id = with_value("X'3d8d9bf50d90435388ba4ccc5d2c07ff'", read_uuid).unwrap();
        assert_eq!(id.to_string(), "3d8d9bf5-0d90-4353-88ba-4ccc5d2c07ff");
    }

    #[test]
    fn test_read_uuid_rejects_garbage() {
        let err = with_value("'not-a-uuid'", read_uuid).unwrap_err();
        assert!(err.to_string().contains("not a valid UUID"));

        let err = with_value("42", read_uuid).unwrap_err();
        assert!(err.to_string().contains("found INTEGER"));
    }

    #[test]
    fn test_read_text_requires_value() {
        assert_eq!(with_value("'Drama'", read_text).unwrap(), "Drama");
        assert!(with_value("NULL", read_text).is_err());
        assert_eq!(with_value("NULL", read_optional_text).unwrap(), None);
        assert!(with_value("X'00'", read_optional_text).is_err());
    }

    #[test]
    fn test_read_optional_float() {
        assert_eq!(with_value("75", read_optional_float).unwrap(), Some(75.0));
        assert_eq!(with_value("8.5", read_optional_float).unwrap(), Some(8.5));
        assert_eq!(with_value("'6.1'", read_optional_float).unwrap(), Some(6.1));
        assert_eq!(with_value("''", read_optional_float).unwrap(), None);
        assert_eq!(with_value("NULL", read_optional_float).unwrap(), None);
        assert!(with_value("'high'", read_optional_float).is_err());
    }

    #[test]
    fn test_read_optional_date() {
        let date = with_value("'2021-06-16'", read_optional_date)
            .unwrap()
            .unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2021, 6, 16));
        assert_eq!(with_value("NULL", read_optional_date).unwrap(), None);
        assert!(with_value("'sometime'", read_optional_date).is_err());
    }

    #[test]
    fn test_parse_timestamp_short_offset() {
        let ts = parse_timestamp("2021-06-16 20:14:09.221855+00").unwrap();
        assert_eq!(ts.hour(), 20);
        assert_eq!(ts.nanosecond(), 221_855_000);
    }

    #[test]
    fn test_parse_timestamp_converts_offset_to_utc() {
        let ts = parse_timestamp("2021-06-16T23:14:09+03:00").unwrap();
        assert_eq!(ts.hour(), 20);
    }

    #[test]
    fn test_parse_timestamp_naive_is_utc() {
        let ts = parse_timestamp("2021-06-16 20:14:09").unwrap();
        assert_eq!(ts, parse_timestamp("2021-06-16T20:14:09Z").unwrap());
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_read_timestamp_from_epoch() {
        let ts = with_value("0", read_timestamp).unwrap();
        assert_eq!(ts.year(), 1970);
        assert!(with_value("NULL", read_timestamp).is_err());
    }
}
