//! Records published by another iSamples instance as `/thing/{id}` URLs
//!
//! Sitemap entries point at the peer's thing endpoint. The fetcher asks for
//! the full, original-format record and takes the authority and aliases from
//! the returned envelope.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use super::{fetch_json, record_from_response, strings_at, timestamp_at, MEDIA_TYPE_JSON};
use crate::cursor::CursorEntry;
use crate::fetch::{FetchError, FetchedRecord, RecordFetcher};

pub struct ThingFetcher {
    client: Client,
    default_authority: String,
    identifier_pattern: Regex,
}

impl ThingFetcher {
    /// `default_authority` is used when the payload carries no `authority_id`
    pub fn new(client: Client, default_authority: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            default_authority: default_authority.into(),
            identifier_pattern: Regex::new(r"/thing/(.+)$")?,
        })
    }

    /// Identifier from the URL path, e.g. `.../thing/ark:/28722/k2bg30w29` -> `ark:/28722/k2bg30w29`
    pub fn thing_identifier(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        self.identifier_pattern
            .captures(parsed.path())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// The thing URL with `full=true&format=original`, other query pairs kept
    pub fn full_record_url(&self, url: &str) -> Result<String, url::ParseError> {
        let mut parsed = Url::parse(url)?;
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| k != "full" && k != "format")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("full", "true")
            .append_pair("format", "original");
        Ok(parsed.to_string())
    }
}

#[async_trait]
impl RecordFetcher for ThingFetcher {
    fn authority(&self) -> &str {
        &self.default_authority
    }

    fn external_id(&self, entry: &CursorEntry) -> String {
        self.thing_identifier(&entry.identifier)
            .unwrap_or_else(|| entry.identifier.clone())
    }

    async fn fetch(&self, entry: &CursorEntry) -> Result<FetchedRecord, FetchError> {
        let identifier = self
            .thing_identifier(&entry.identifier)
            .ok_or_else(|| FetchError::Invalid {
                identifier: entry.identifier.clone(),
                message: "no /thing/{id} segment in URL".to_string(),
            })?;
        let url = self
            .full_record_url(&entry.identifier)
            .map_err(|e| FetchError::Invalid {
                identifier: entry.identifier.clone(),
                message: e.to_string(),
            })?;

        let (response, payload) = fetch_json(&self.client, &url, MEDIA_TYPE_JSON).await?;

        let authority = payload
            .as_ref()
            .and_then(|p| p.get("authority_id"))
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .unwrap_or(self.default_authority.as_str())
            .to_string();
        let created_at = timestamp_at(payload.as_ref(), "/tcreated").or(entry.timestamp);
        let aliases = strings_at(payload.as_ref(), "/identifiers", None);

        let record = record_from_response(identifier, authority, &response, payload)
            .with_created_at(created_at);
        Ok(FetchedRecord::new(record).with_aliases(aliases))
    }
}
