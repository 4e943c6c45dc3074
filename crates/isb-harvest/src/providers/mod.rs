//! Record fetchers for each upstream provider
//!
//! Each fetcher turns a cursor entry into a [`FetchedRecord`]: the store
//! identifier, the raw JSON payload, the provider's creation time and the
//! aliases the record should also resolve under.

pub mod geome;
pub mod opencontext;
pub mod sesar;
pub mod thing;

pub use geome::GeomeFetcher;
pub use opencontext::OpenContextFetcher;
pub use sesar::SesarFetcher;
pub use thing::ThingFetcher;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::fetch::FetchError;
use crate::http::{self, Fetched};
use crate::store::NewRecord;
use isb_common::time::parse_timestamp;

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_JSON_LD: &str = "application/ld+json";

/// GET `url` and parse the body as JSON. An unparseable body is logged and
/// comes back as `None` so the record is still written.
async fn fetch_json(
    client: &Client,
    url: &str,
    accept: &str,
) -> Result<(Fetched, Option<Value>), FetchError> {
    let response = http::get(client, url, Some(accept)).await?;
    let payload = match response.json() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(url = %url, error = %e, "Unparseable payload, storing record without body");
            None
        },
    };
    Ok((response, payload))
}

fn record_from_response(
    external_id: impl Into<String>,
    authority: impl Into<String>,
    response: &Fetched,
    payload: Option<Value>,
) -> NewRecord {
    let media_type = response
        .content_type
        .clone()
        .unwrap_or_else(|| MEDIA_TYPE_JSON.to_string());
    let record = NewRecord::new(external_id, authority)
        .with_source(response.url.as_str(), media_type)
        .with_status(i32::from(response.status));
    match payload {
        Some(payload) => record.with_payload(payload),
        None => record,
    }
}

/// Timestamp string at a JSON pointer, if present and parseable
fn timestamp_at(payload: Option<&Value>, pointer: &str) -> Option<DateTime<Utc>> {
    let value = payload?.pointer(pointer)?.as_str()?;
    match parse_timestamp(value) {
        Ok(ts) => Some(ts),
        Err(e) => {
            warn!(pointer, value, error = %e, "Ignoring unparseable timestamp");
            None
        },
    }
}

/// String values of an array at a JSON pointer, optionally picking `field`
/// out of each element
fn strings_at(payload: Option<&Value>, pointer: &str, field: Option<&str>) -> Vec<String> {
    payload
        .and_then(|p| p.pointer(pointer))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match field {
                    Some(field) => item.get(field),
                    None => Some(item),
                })
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
