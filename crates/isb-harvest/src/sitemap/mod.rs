//! Sitemap walking and publishing
//!
//! A sitemap index lists child sitemap files, each listing record URLs. The
//! walker applies the same last-modified watermark at both levels so that a
//! crawl only touches what changed since the previous one.

mod parser;
pub mod publisher;

pub use parser::{parse_sitemap, SitemapDocument, SitemapEntry, SitemapKind};
pub use publisher::SitemapPublisher;

use chrono::{DateTime, Utc};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::decompression::maybe_gunzip;
use crate::http::{self, HttpError};

#[derive(Error, Debug)]
pub enum SitemapError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Malformed sitemap {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("Failed to write sitemap {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

impl SitemapError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, SitemapError::Malformed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SitemapWalker {
    client: Client,
}

impl SitemapWalker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch, gunzip when needed, and parse one sitemap document
    pub async fn fetch_document(&self, url: &str) -> Result<SitemapDocument, SitemapError> {
        let malformed = |message: String| SitemapError::Malformed {
            url: url.to_string(),
            message,
        };

        let response = http::get(&self.client, url, Some("application/xml")).await?;
        let body = maybe_gunzip(response.body).map_err(|e| malformed(e.to_string()))?;
        let text = String::from_utf8_lossy(&body);
        parse_sitemap(&text).map_err(malformed)
    }

    /// Child sitemap files modified at or after `watermark`.
    ///
    /// A plain urlset at `index_url` is treated as an index with one child.
    pub async fn child_sitemaps(
        &self,
        index_url: &str,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<SitemapEntry>, SitemapError> {
        let document = self.fetch_document(index_url).await?;

        let children = match document.kind {
            SitemapKind::Index => document.modified_since(watermark),
            SitemapKind::UrlSet => vec![SitemapEntry {
                loc: index_url.to_string(),
                lastmod: None,
            }],
        };

        info!(
            index = %index_url,
            listed = document.entries.len(),
            kept = children.len(),
            "Resolved sitemap index"
        );
        Ok(children)
    }

    /// Record URLs in one sitemap file modified at or after `watermark`
    pub async fn record_urls(
        &self,
        sitemap_url: &str,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<SitemapEntry>, SitemapError> {
        let document = self.fetch_document(sitemap_url).await?;
        if document.kind != SitemapKind::UrlSet {
            return Err(SitemapError::Malformed {
                url: sitemap_url.to_string(),
                message: "expected a urlset, found a sitemap index".to_string(),
            });
        }

        let urls = document.modified_since(watermark);
        debug!(
            sitemap = %sitemap_url,
            listed = document.entries.len(),
            kept = urls.len(),
            "Resolved sitemap file"
        );
        Ok(urls)
    }

    /// Every record URL reachable from `index_url` that passes the watermark.
    ///
    /// Malformed documents are logged and skipped. Transport failures of the
    /// index abort the walk; those of a child file skip that file.
    pub async fn walk(
        &self,
        index_url: &str,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<SitemapEntry>, SitemapError> {
        let children = match self.child_sitemaps(index_url, watermark).await {
            Ok(children) => children,
            Err(e) if e.is_malformed() => {
                error!(index = %index_url, error = %e, "Skipping malformed sitemap index");
                return Ok(Vec::new());
            },
            Err(e) => return Err(e),
        };

        let mut urls = Vec::new();
        for child in children {
            match self.record_urls(&child.loc, watermark).await {
                Ok(mut found) => urls.append(&mut found),
                Err(e) => warn!(sitemap = %child.loc, error = %e, "Skipping sitemap file"),
            }
        }
        Ok(urls)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use isb_common::time::parse_timestamp;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn urlset(locs: &[&str], lastmod: &str) -> String {
        let mut xml = String::from(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
        for loc in locs {
            xml.push_str(&format!("<url><loc>{}</loc><lastmod>{}</lastmod></url>", loc, lastmod));
        }
        xml.push_str("</urlset>");
        xml
    }

    #[tokio::test]
    async fn test_walk_skips_malformed_child() {
        let server = MockServer::start().await;
        let index = format!(
            r#"<sitemapindex>
                <sitemap><loc>{0}/good.xml</loc><lastmod>2020-01-01</lastmod></sitemap>
                <sitemap><loc>{0}/bad.xml</loc><lastmod>2020-01-01</lastmod></sitemap>
               </sitemapindex>"#,
            server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/index.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/good.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(urlset(&["https://example.org/thing/1"], "2020-01-01")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let walker = SitemapWalker::new(Client::new());
        let urls = walker
            .walk(&format!("{}/index.xml", server.uri()), parse_timestamp("2019-01-01").ok())
            .await
            .unwrap();

        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].loc, "https://example.org/thing/1");
    }

    #[tokio::test]
    async fn test_plain_urlset_is_its_own_child() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(urlset(&["https://example.org/thing/9"], "2021-01-01")),
            )
            .mount(&server)
            .await;

        let walker = SitemapWalker::new(Client::new());
        let url = format!("{}/sitemap.xml", server.uri());
        let children = walker.child_sitemaps(&url, None).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].loc, url);
    }

    #[tokio::test]
    async fn test_index_http_failure_aborts_walk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let walker = SitemapWalker::new(Client::new());
        let result = walker.walk(&format!("{}/index.xml", server.uri()), None).await;
        assert!(matches!(result, Err(SitemapError::Http(_))));
    }
}
