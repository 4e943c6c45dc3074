//! GEOME samples, identified by ARK

use async_trait::async_trait;
use reqwest::Client;

use super::{fetch_json, record_from_response, strings_at, timestamp_at, MEDIA_TYPE_JSON};
use crate::cursor::CursorEntry;
use crate::fetch::{FetchError, FetchedRecord, RecordFetcher};

pub use crate::cursor::geome::GEOME_API;

pub const GEOME_AUTHORITY: &str = "GEOME";

#[derive(Debug, Clone)]
pub struct GeomeFetcher {
    client: Client,
    api_base: String,
}

impl GeomeFetcher {
    /// `api_base` must end with a slash, like [`GEOME_API`]
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    fn record_url(&self, ark: &str) -> String {
        format!(
            "{}records/{}?includeChildren=true&includeParent=true",
            self.api_base, ark
        )
    }
}

#[async_trait]
impl RecordFetcher for GeomeFetcher {
    fn authority(&self) -> &str {
        GEOME_AUTHORITY
    }

    fn external_id(&self, entry: &CursorEntry) -> String {
        entry.identifier.trim().to_string()
    }

    async fn fetch(&self, entry: &CursorEntry) -> Result<FetchedRecord, FetchError> {
        let ark = self.external_id(entry);
        let url = self.record_url(&ark);
        let (response, payload) = fetch_json(&self.client, &url, MEDIA_TYPE_JSON).await?;

        let aliases = strings_at(payload.as_ref(), "/children", Some("bcid"));
        let created_at = timestamp_at(payload.as_ref(), "/record/collectionDate")
            .or(entry.timestamp);

        let record = record_from_response(ark, GEOME_AUTHORITY, &response, payload)
            .with_created_at(created_at);
        Ok(FetchedRecord::new(record).with_aliases(aliases))
    }
}
