//! Timestamp helpers
//!
//! Providers report times in many shapes (full RFC 3339, naive date-times,
//! bare dates). Everything is normalized to UTC. Stored timestamps use a
//! fixed-width format so that text comparison in SQL matches time order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};

use crate::error::{IsbError, Result};

/// Fixed-width storage format with microsecond precision
pub const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a provider timestamp leniently.
///
/// Accepts RFC 3339, `+hhmm` offsets, naive date-times (taken as UTC) and
/// bare `YYYY-MM-DD` dates (taken as midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts.and_utc());
        }
    }

    Err(IsbError::InvalidTimestamp(value.to_string()))
}

/// Truncate to the precision kept in storage
pub fn to_storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

pub fn to_storage(ts: DateTime<Utc>) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

pub fn from_storage(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, STORAGE_FORMAT)
        .map(|ts| ts.and_utc())
        .map_err(|_| IsbError::InvalidTimestamp(value.to_string()))
}

/// Second-granularity UTC datestamp, as used by OAI-PMH `from`/`until`
pub fn to_datestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
