//! Record types persisted by the store

use chrono::{DateTime, Utc};
use isb_common::time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::StoreError;

pub const STATUS_OK: i32 = 200;
pub const STATUS_NOT_FOUND: i32 = 404;

/// 200-class fetch outcomes
pub fn is_success(status: i32) -> bool {
    (200..300).contains(&status)
}

/// A stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub primary_key: i64,
    pub external_id: String,
    pub authority: String,
    pub aliases: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub fetch_status: i32,
    pub source_url: Option<String>,
    pub media_type: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl Record {
    pub fn is_success(&self) -> bool {
        is_success(self.fetch_status)
    }
}

/// Data written by an upsert. The store assigns `primary_key` and `updated_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub external_id: String,
    pub authority: String,
    pub created_at: Option<DateTime<Utc>>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub fetch_status: i32,
    pub source_url: Option<String>,
    pub media_type: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl NewRecord {
    pub fn new(external_id: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            authority: authority.into(),
            created_at: None,
            fetched_at: Some(Utc::now()),
            fetch_status: STATUS_OK,
            source_url: None,
            media_type: None,
            payload: None,
        }
    }

    /// Stub for an identifier that could not be retrieved
    pub fn not_found(
        external_id: impl Into<String>,
        authority: impl Into<String>,
        source_url: Option<String>,
    ) -> Self {
        Self {
            fetched_at: None,
            fetch_status: STATUS_NOT_FOUND,
            source_url,
            ..Self::new(external_id, authority)
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_source(mut self, url: impl Into<String>, media_type: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.fetch_status = status;
        self
    }
}

/// Which fetch statuses a scan returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Any 200-class status
    Success,
    Exact(i32),
}

/// Filters for a paged scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFilter {
    pub authority: Option<String>,
    pub status: StatusFilter,
    pub min_created: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `primary_key`
    pub max_primary_key: Option<i64>,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self::success()
    }
}

impl ScanFilter {
    pub fn success() -> Self {
        Self {
            authority: None,
            status: StatusFilter::Success,
            min_created: None,
            max_primary_key: None,
        }
    }

    /// Only rows with exactly this status
    pub fn status(mut self, status: i32) -> Self {
        self.status = StatusFilter::Exact(status);
        self
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn created_since(mut self, min_created: Option<DateTime<Utc>>) -> Self {
        self.min_created = min_created;
        self
    }
}

/// Raw row as stored in SQLite
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub primary_key: i64,
    pub external_id: String,
    pub authority: String,
    pub created_at: Option<String>,
    pub fetched_at: Option<String>,
    pub updated_at: String,
    pub fetch_status: i64,
    pub source_url: Option<String>,
    pub media_type: Option<String>,
    pub payload: Option<String>,
}

pub(crate) const RECORD_COLUMNS: &str = "primary_key, external_id, authority, created_at, \
     fetched_at, updated_at, fetch_status, source_url, media_type, payload";

impl TryFrom<RecordRow> for Record {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let primary_key = row.primary_key;
        let corrupt = |message: String| StoreError::CorruptRow {
            primary_key,
            message,
        };
        let parse_ts = |value: &str| time::from_storage(value).map_err(|e| corrupt(e.to_string()));

        let payload = row
            .payload
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .map_err(|e| corrupt(format!("payload is not JSON: {}", e)))?;

        Ok(Record {
            primary_key,
            external_id: row.external_id,
            authority: row.authority,
            aliases: BTreeSet::new(),
            created_at: row.created_at.as_deref().map(parse_ts).transpose()?,
            fetched_at: row.fetched_at.as_deref().map(parse_ts).transpose()?,
            updated_at: parse_ts(&row.updated_at)?,
            fetch_status: row.fetch_status as i32,
            source_url: row.source_url,
            media_type: row.media_type,
            payload,
        })
    }
}
