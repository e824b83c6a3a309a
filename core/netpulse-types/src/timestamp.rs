//! Capture timestamp parsing and canonical formatting.
//!
//! Callers hand us timestamps in whatever shape their source produced:
//! RFC 3339 text, a naive `YYYY-MM-DD HH:MM:SS` string, or Unix seconds.
//! Everything is normalized to UTC and persisted in one fixed-width text
//! form, so that text comparison in SQL matches chronological order.

use crate::{Error, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Latest year whose canonical form is still four digits wide.
const MAX_YEAR: i32 = 9999;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Formats a timestamp in the canonical persisted form
/// (`2026-01-01T00:00:00.000000Z`).
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a textual timestamp.
///
/// Accepts RFC 3339 with any offset, naive date-times (interpreted as UTC),
/// and decimal Unix seconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidTimestamp("empty timestamp".to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return check_range(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return check_range(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(secs) = trimmed.parse::<f64>() {
        return from_unix_seconds(secs);
    }

    Err(Error::InvalidTimestamp(format!("unrecognized timestamp: {trimmed}")))
}

/// Parses a timestamp carried in a JSON value (string or number).
pub fn parse_timestamp_value(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            let secs = n
                .as_f64()
                .ok_or_else(|| Error::InvalidTimestamp(format!("unrepresentable number: {n}")))?;
            from_unix_seconds(secs)
        }
        other => Err(Error::InvalidTimestamp(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn from_unix_seconds(secs: f64) -> Result<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::InvalidTimestamp(format!("out of range: {secs}")));
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999))
        .ok_or_else(|| Error::InvalidTimestamp(format!("out of range: {secs}")))
        .and_then(check_range)
}

/// Rejects timestamps whose canonical form would not be four-digit-year
/// RFC 3339 (years 0000 to 9999). Such values could not be read back and
/// would break text ordering.
pub fn check_range(ts: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if (0..=MAX_YEAR).contains(&ts.year()) {
        Ok(ts)
    } else {
        Err(Error::InvalidTimestamp(format!(
            "year {} outside 0000-{MAX_YEAR}",
            ts.year()
        )))
    }
}
