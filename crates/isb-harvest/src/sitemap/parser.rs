//! Sitemap XML parsing
//!
//! Handles both `<sitemapindex>` and `<urlset>` documents. Elements outside
//! the sitemap schema (image or news extensions) are ignored.

use chrono::{DateTime, Utc};
use isb_common::time::parse_timestamp;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    Index,
    UrlSet,
}

/// A `<sitemap>` or `<url>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

impl SitemapEntry {
    /// Entries without `<lastmod>` always pass
    pub fn modified_since(&self, watermark: Option<DateTime<Utc>>) -> bool {
        match (self.lastmod, watermark) {
            (Some(lastmod), Some(watermark)) => lastmod >= watermark,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapDocument {
    pub kind: SitemapKind,
    pub entries: Vec<SitemapEntry>,
}

impl SitemapDocument {
    pub fn modified_since(&self, watermark: Option<DateTime<Utc>>) -> Vec<SitemapEntry> {
        self.entries
            .iter()
            .filter(|e| e.modified_since(watermark))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawSitemap {
    #[serde(rename = "sitemap", default)]
    sitemaps: Vec<RawEntry>,
    #[serde(rename = "url", default)]
    urls: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    loc: String,
    #[serde(default)]
    lastmod: Option<String>,
}

fn root_kind(xml: &str) -> Result<SitemapKind, String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"sitemapindex" => Ok(SitemapKind::Index),
                    b"urlset" => Ok(SitemapKind::UrlSet),
                    other => Err(format!(
                        "unexpected root element <{}>",
                        String::from_utf8_lossy(other)
                    )),
                };
            },
            Ok(Event::Eof) => return Err("document has no root element".to_string()),
            Ok(_) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// Parse a sitemap index or urlset
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument, String> {
    let kind = root_kind(xml)?;
    let raw: RawSitemap = quick_xml::de::from_str(xml).map_err(|e| e.to_string())?;

    let raw_entries = match kind {
        SitemapKind::Index => raw.sitemaps,
        SitemapKind::UrlSet => raw.urls,
    };

    let entries = raw_entries
        .into_iter()
        .filter_map(|raw| {
            let loc = raw.loc.trim().to_string();
            if loc.is_empty() {
                return None;
            }
            let lastmod = raw
                .lastmod
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .and_then(|value| match parse_timestamp(value) {
                    Ok(ts) => Some(ts),
                    Err(e) => {
                        warn!(loc = %loc, error = %e, "Ignoring unparseable lastmod");
                        None
                    },
                });
            Some(SitemapEntry { loc, lastmod })
        })
        .collect();

    Ok(SitemapDocument { kind, entries })
}
