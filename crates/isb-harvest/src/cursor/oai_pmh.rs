//! OAI-PMH `ListIdentifiers` paging (SESAR / IGSN registry)
//!
//! The first request carries `metadataPrefix`, `set` and the date window;
//! later requests carry only the resumption token. The token's
//! `completeListSize` attribute gives the total up front.

use async_trait::async_trait;
use isb_common::time::{parse_timestamp, to_datestamp};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{CursorEntry, CursorError, Page, PageLoader, PageRequest};
use crate::http;

pub const SESAR_OAI_URL: &str = "https://doidata.geosamples.org/oai";
pub const DEFAULT_METADATA_PREFIX: &str = "igsn";

const NO_RECORDS_MATCH: &str = "noRecordsMatch";

#[derive(Debug, Deserialize)]
struct OaiResponse {
    #[serde(default)]
    error: Option<OaiError>,
    #[serde(rename = "ListIdentifiers", default)]
    list: Option<ListIdentifiers>,
}

#[derive(Debug, Deserialize)]
struct OaiError {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "$text", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListIdentifiers {
    #[serde(rename = "header", default)]
    headers: Vec<OaiHeader>,
    #[serde(rename = "resumptionToken", default)]
    resumption_token: Option<ResumptionToken>,
}

#[derive(Debug, Deserialize)]
struct OaiHeader {
    #[serde(rename = "@status", default)]
    status: Option<String>,
    identifier: String,
    #[serde(default)]
    datestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResumptionToken {
    #[serde(rename = "@completeListSize", default)]
    complete_list_size: Option<usize>,
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

/// The local part of an OAI identifier, e.g. `oai:igsn.org:IEXYZ0001` -> `IEXYZ0001`
pub fn local_identifier(oai_identifier: &str) -> &str {
    oai_identifier
        .rsplit(':')
        .next()
        .unwrap_or(oai_identifier)
        .trim()
}

#[derive(Debug)]
pub struct OaiPmhLoader {
    client: Client,
    base_url: String,
    metadata_prefix: String,
    set_spec: Option<String>,
    token: Option<String>,
    done: bool,
}

impl OaiPmhLoader {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            set_spec: None,
            token: None,
            done: false,
        }
    }

    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = prefix.into();
        self
    }

    pub fn with_set(mut self, set_spec: impl Into<String>) -> Self {
        self.set_spec = Some(set_spec.into());
        self
    }

    fn request_url(&self, request: &PageRequest) -> Result<String, CursorError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| CursorError::Provider {
            url: self.base_url.clone(),
            message: format!("invalid base URL: {}", e),
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("verb", "ListIdentifiers");
            match &self.token {
                Some(token) => {
                    query.append_pair("resumptionToken", token);
                },
                None => {
                    query.append_pair("metadataPrefix", &self.metadata_prefix);
                    if let Some(set) = &self.set_spec {
                        query.append_pair("set", set);
                    }
                    if let Some(start) = request.date_start {
                        query.append_pair("from", &to_datestamp(start));
                    }
                    if let Some(end) = request.date_end {
                        query.append_pair("until", &to_datestamp(end));
                    }
                },
            }
        }

        Ok(url.to_string())
    }
}

fn parse_response(url: &str, body: &[u8]) -> Result<OaiResponse, CursorError> {
    let text = std::str::from_utf8(body).map_err(|e| CursorError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    quick_xml::de::from_str(text).map_err(|e| CursorError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl PageLoader for OaiPmhLoader {
    async fn load_page(&mut self, request: &PageRequest) -> Result<Page, CursorError> {
        let mut total = None;

        // A page of only deleted headers is not the end of the list
        while !self.done {
            let url = self.request_url(request)?;
            debug!(url = %url, "Requesting OAI-PMH page");

            let response = http::get(&self.client, &url, Some("text/xml")).await?;
            let parsed = parse_response(&url, &response.body)?;

            if let Some(error) = parsed.error {
                if error.code == NO_RECORDS_MATCH {
                    self.done = true;
                    break;
                }
                return Err(CursorError::Provider {
                    url,
                    message: format!("{}: {}", error.code, error.message.trim()),
                });
            }

            let list = parsed.list.ok_or_else(|| CursorError::Parse {
                url: url.clone(),
                message: "response has neither ListIdentifiers nor error".to_string(),
            })?;

            match list.resumption_token {
                Some(token) => {
                    total = token.complete_list_size.or(total);
                    self.token = token.value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
                },
                None => self.token = None,
            }
            if self.token.is_none() {
                self.done = true;
            }

            let entries: Vec<CursorEntry> = list
                .headers
                .into_iter()
                .filter(|h| h.status.as_deref() != Some("deleted"))
                .map(|h| {
                    let timestamp = h.datestamp.as_deref().and_then(|d| match parse_timestamp(d) {
                        Ok(ts) => Some(ts),
                        Err(e) => {
                            warn!(identifier = %h.identifier, error = %e, "Unparseable datestamp");
                            None
                        },
                    });
                    CursorEntry::new(local_identifier(&h.identifier), timestamp)
                })
                .collect();

            if !entries.is_empty() {
                return Ok(Page::new(entries).with_total(total));
            }
        }

        Ok(Page::exhausted().with_total(total))
    }
}
