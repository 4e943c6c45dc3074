//! OpenContext paginated search
//!
//! Results come back newest-updated first, each page linking the next one
//! through `next-json`. Paging stops at the first record updated before the
//! window start since everything after it is older still.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use isb_common::time::parse_timestamp;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::{CursorEntry, CursorError, Page, PageLoader, PageRequest};
use crate::http;

pub const OPENCONTEXT_SEARCH_URL: &str =
    "https://opencontext.org/subjects-search/.json?response=metadata%2Curi-meta&sort=updated--desc";

#[derive(Debug)]
pub struct OpenContextLoader {
    client: Client,
    start_url: String,
    next_url: Option<String>,
    started: bool,
    past_window: bool,
}

impl OpenContextLoader {
    pub fn new(client: Client, search_url: impl Into<String>) -> Self {
        Self {
            client,
            start_url: search_url.into(),
            next_url: None,
            started: false,
            past_window: false,
        }
    }

    fn first_url(&self, page_size: usize) -> Result<String, CursorError> {
        let mut url = Url::parse(&self.start_url).map_err(|e| CursorError::Provider {
            url: self.start_url.clone(),
            message: format!("invalid search URL: {}", e),
        })?;
        url.query_pairs_mut()
            .append_pair("rows", &page_size.to_string());
        Ok(url.to_string())
    }
}

fn record_updated(record: &Value) -> Option<DateTime<Utc>> {
    let updated = record.get("updated").and_then(Value::as_str)?;
    match parse_timestamp(updated) {
        Ok(ts) => Some(ts),
        Err(e) => {
            warn!(updated, error = %e, "Unparseable OpenContext update time");
            None
        },
    }
}

#[async_trait]
impl PageLoader for OpenContextLoader {
    async fn load_page(&mut self, request: &PageRequest) -> Result<Page, CursorError> {
        let mut total = None;

        // A page whose results all lack a uri is not the end of the listing
        while !self.past_window {
            let url = if self.started {
                match self.next_url.take() {
                    Some(url) => url,
                    None => break,
                }
            } else {
                self.first_url(request.page_size)?
            };

            debug!(url = %url, "Requesting OpenContext page");
            let response = http::get(&self.client, &url, Some("application/json")).await?;
            let data = response.json().map_err(|e| CursorError::Parse {
                url: url.clone(),
                message: e.to_string(),
            })?;
            self.started = true;

            self.next_url = data
                .get("next-json")
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(str::to_string);
            total = data
                .get("totalResults")
                .and_then(Value::as_u64)
                .map(|t| t as usize)
                .or(total);

            let mut entries = Vec::new();
            for record in data
                .get("oc-api:has-results")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                let Some(uri) = record.get("uri").and_then(Value::as_str) else {
                    warn!("OpenContext result without uri, skipping");
                    continue;
                };
                let updated = record_updated(record);

                if let (Some(start), Some(updated)) = (request.date_start, updated) {
                    if updated < start {
                        info!(
                            updated = %updated,
                            watermark = %start,
                            "Reached records older than the watermark, paging complete"
                        );
                        self.past_window = true;
                        break;
                    }
                }
                entries.push(CursorEntry::new(uri, updated));
            }

            if !entries.is_empty() {
                return Ok(Page::new(entries).with_total(total));
            }
        }

        Ok(Page::exhausted().with_total(total))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cursor::{CursorOptions, IdentifierCursor};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_first_url_adds_rows() {
        let loader = OpenContextLoader::new(Client::new(), OPENCONTEXT_SEARCH_URL);
        let url = loader.first_url(25).unwrap();
        assert!(url.starts_with("https://opencontext.org/subjects-search/.json?"));
        assert!(url.ends_with("&rows=25"));
    }

    #[test]
    fn test_record_updated() {
        let record = json!({"uri": "https://opencontext.org/subjects/x", "updated": "2021-03-04T05:06:07Z"});
        assert_eq!(
            record_updated(&record),
            Some(parse_timestamp("2021-03-04T05:06:07Z").unwrap())
        );
        assert_eq!(record_updated(&json!({"updated": "soon"})), None);
    }

    fn result(uri: &str, updated: &str) -> Value {
        json!({"uri": uri, "updated": updated})
    }

    #[tokio::test]
    async fn test_pages_until_watermark() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/search/.json"))
            .and(query_param("rows", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalResults": 4,
                "next-json": format!("{}/search/p2", base),
                "oc-api:has-results": [
                    result("u1", "2021-01-01T00:00:00Z"),
                    result("u2", "2020-01-01T00:00:00Z")
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        // nothing usable on this page, paging must continue
        Mock::given(method("GET"))
            .and(path("/search/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next-json": format!("{}/search/p3", base),
                "oc-api:has-results": [{"updated": "2019-06-01T00:00:00Z"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/p3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next-json": format!("{}/search/p4", base),
                "oc-api:has-results": [
                    result("u3", "2019-01-01T00:00:00Z"),
                    result("u4", "2014-01-01T00:00:00Z"),
                    result("u5", "2013-01-01T00:00:00Z")
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/p4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let loader = OpenContextLoader::new(
            Client::new(),
            format!("{}/search/.json?sort=updated--desc", base),
        );
        let start = parse_timestamp("2015-01-01").unwrap();
        let options = CursorOptions::default().page_size(2).window(Some(start), None);
        let mut cursor = IdentifierCursor::new(loader, options);

        let mut ids = Vec::new();
        while let Some(entry) = cursor.next().await.unwrap() {
            ids.push(entry.identifier);
        }
        assert_eq!(ids, vec!["u1", "u2", "u3"]);
        assert_eq!(cursor.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_next_link_ends_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "oc-api:has-results": [result("only", "2020-01-01T00:00:00Z")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let loader =
            OpenContextLoader::new(Client::new(), format!("{}/search/.json", server.uri()));
        let mut cursor = IdentifierCursor::new(loader, CursorOptions::default());
        assert_eq!(cursor.next().await.unwrap().unwrap().identifier, "only");
        assert!(cursor.next().await.unwrap().is_none());
    }
}
