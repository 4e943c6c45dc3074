//! Open Context subjects, identified by URI

use async_trait::async_trait;
use reqwest::Client;

use super::{fetch_json, record_from_response, timestamp_at, MEDIA_TYPE_JSON};
use crate::cursor::CursorEntry;
use crate::fetch::{FetchError, FetchedRecord, RecordFetcher};

pub const OPENCONTEXT_AUTHORITY: &str = "OPENCONTEXT";

/// A URI without its `http://` or `https://` scheme
pub fn schemeless(uri: &str) -> &str {
    uri.strip_prefix("https://")
        .or_else(|| uri.strip_prefix("http://"))
        .unwrap_or(uri)
}

#[derive(Debug, Clone)]
pub struct OpenContextFetcher {
    client: Client,
}

impl OpenContextFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecordFetcher for OpenContextFetcher {
    fn authority(&self) -> &str {
        OPENCONTEXT_AUTHORITY
    }

    fn external_id(&self, entry: &CursorEntry) -> String {
        entry.identifier.trim().trim_end_matches('/').to_string()
    }

    async fn fetch(&self, entry: &CursorEntry) -> Result<FetchedRecord, FetchError> {
        let uri = self.external_id(entry);
        let url = format!("{}.json", uri);
        let (response, payload) = fetch_json(&self.client, &url, MEDIA_TYPE_JSON).await?;

        let created_at = timestamp_at(payload.as_ref(), "/created")
            .or_else(|| timestamp_at(payload.as_ref(), "/updated"))
            .or(entry.timestamp);
        let aliases = vec![schemeless(&uri).to_string()];

        let record = record_from_response(uri, OPENCONTEXT_AUTHORITY, &response, payload)
            .with_created_at(created_at);
        Ok(FetchedRecord::new(record).with_aliases(aliases))
    }
}
