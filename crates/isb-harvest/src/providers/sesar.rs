//! SESAR samples, identified by IGSN

use async_trait::async_trait;
use reqwest::Client;

use super::{fetch_json, record_from_response, strings_at, timestamp_at, MEDIA_TYPE_JSON_LD};
use crate::cursor::CursorEntry;
use crate::fetch::{FetchError, FetchedRecord, RecordFetcher};

pub const SESAR_API: &str = "https://api.geosamples.org/v1";
pub const SESAR_AUTHORITY: &str = "SESAR";

/// Uppercased IGSN without any `IGSN:` prefix
pub fn normalize_igsn(value: &str) -> String {
    let value = value.trim();
    let bare = match value.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("igsn:") => &value[5..],
        _ => value,
    };
    bare.trim().to_ascii_uppercase()
}

/// Store identifier for an IGSN, e.g. `IGSN:IEXYZ0001`
pub fn full_igsn(value: &str) -> String {
    format!("IGSN:{}", normalize_igsn(value))
}

#[derive(Debug, Clone)]
pub struct SesarFetcher {
    client: Client,
    api_base: String,
}

impl SesarFetcher {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn record_url(&self, igsn: &str) -> String {
        format!("{}/sample/igsn-ev-json-ld/igsn/{}", self.api_base, igsn)
    }
}

#[async_trait]
impl RecordFetcher for SesarFetcher {
    fn authority(&self) -> &str {
        SESAR_AUTHORITY
    }

    fn external_id(&self, entry: &CursorEntry) -> String {
        full_igsn(&entry.identifier)
    }

    async fn fetch(&self, entry: &CursorEntry) -> Result<FetchedRecord, FetchError> {
        let igsn = normalize_igsn(&entry.identifier);
        let url = self.record_url(&igsn);
        let accept = format!("{}, application/json", MEDIA_TYPE_JSON_LD);
        let (response, payload) = fetch_json(&self.client, &url, &accept).await?;

        let created_at = timestamp_at(payload.as_ref(), "/description/collectionStartDate")
            .or(entry.timestamp);

        let mut aliases = vec![igsn.clone()];
        aliases.extend(
            strings_at(
                payload.as_ref(),
                "/description/supplementMetadata/childIGSN",
                None,
            )
            .iter()
            .map(|child| normalize_igsn(child)),
        );

        let record = record_from_response(full_igsn(&igsn), SESAR_AUTHORITY, &response, payload)
            .with_created_at(created_at);
        Ok(FetchedRecord::new(record).with_aliases(aliases))
    }
}
