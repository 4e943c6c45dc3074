//! Publishing the store as a sitemap
//!
//! Writes one urlset file per page of successfully fetched records plus an
//! index listing them, so that another harvester can crawl this store the
//! same way this one crawls its providers.

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use std::path::{Path, PathBuf};
use tracing::info;

use super::SitemapError;
use crate::store::{Record, RecordStore, ScanFilter};

pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
pub const DEFAULT_URLS_PER_FILE: usize = 50_000;
pub const INDEX_FILE_NAME: &str = "sitemap-index.xml";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    pub files: Vec<PathBuf>,
    pub urls: usize,
}

#[derive(Debug, Clone)]
pub struct SitemapPublisher {
    store: RecordStore,
    /// Record URLs are `{thing_base_url}/{external_id}`
    thing_base_url: String,
    /// Child files are linked from the index as `{sitemap_base_url}/{file}`
    sitemap_base_url: String,
    urls_per_file: usize,
}

fn lastmod(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn file_name(index: usize) -> String {
    format!("sitemap-{}.xml", index)
}

impl SitemapPublisher {
    pub fn new(
        store: RecordStore,
        thing_base_url: impl Into<String>,
        sitemap_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            thing_base_url: thing_base_url.into().trim_end_matches('/').to_string(),
            sitemap_base_url: sitemap_base_url.into().trim_end_matches('/').to_string(),
            urls_per_file: DEFAULT_URLS_PER_FILE,
        }
    }

    pub fn with_urls_per_file(mut self, urls_per_file: usize) -> Self {
        self.urls_per_file = urls_per_file.max(1);
        self
    }

    fn urlset(&self, records: &[Record]) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"{}\">\n",
            SITEMAP_NS
        );
        for record in records {
            let loc = format!("{}/{}", self.thing_base_url, record.external_id);
            xml.push_str(&format!(
                "  <url><loc>{}</loc><lastmod>{}</lastmod></url>\n",
                escape(loc.as_str()),
                lastmod(record.updated_at)
            ));
        }
        xml.push_str("</urlset>\n");
        xml
    }

    fn index(&self, children: &[(String, DateTime<Utc>)]) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<sitemapindex xmlns=\"{}\">\n",
            SITEMAP_NS
        );
        for (name, modified) in children {
            let loc = format!("{}/{}", self.sitemap_base_url, name);
            xml.push_str(&format!(
                "  <sitemap><loc>{}</loc><lastmod>{}</lastmod></sitemap>\n",
                escape(loc.as_str()),
                lastmod(*modified)
            ));
        }
        xml.push_str("</sitemapindex>\n");
        xml
    }

    async fn write(path: &Path, contents: String) -> Result<(), SitemapError> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|source| SitemapError::Write {
                path: path.display().to_string(),
                source,
            })
    }

    /// Write the urlset files and the index into `dest_dir`
    pub async fn publish(
        &self,
        authority: Option<&str>,
        dest_dir: &Path,
    ) -> Result<PublishReport, SitemapError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|source| SitemapError::Write {
                path: dest_dir.display().to_string(),
                source,
            })?;

        let mut filter = ScanFilter::success();
        if let Some(authority) = authority {
            filter = filter.authority(authority);
        }

        let mut scan = self.store.scan(filter, self.urls_per_file).await?;
        let mut report = PublishReport::default();
        let mut children = Vec::new();

        loop {
            let page = scan.next_page().await?;
            let Some(newest) = page.iter().map(|r| r.updated_at).max() else {
                break;
            };

            let name = file_name(children.len());
            let path = dest_dir.join(&name);
            Self::write(&path, self.urlset(&page)).await?;

            report.urls += page.len();
            report.files.push(path);
            children.push((name, newest));
        }

        let index_path = dest_dir.join(INDEX_FILE_NAME);
        Self::write(&index_path, self.index(&children)).await?;
        report.files.push(index_path);

        info!(
            files = children.len(),
            urls = report.urls,
            dir = %dest_dir.display(),
            "Published sitemap"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::sitemap::{parse_sitemap, SitemapKind};
    use crate::store::NewRecord;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_publish_writes_index_and_files() {
        let store = RecordStore::in_memory().await.unwrap();
        for i in 0..5 {
            store
                .upsert(&NewRecord::new(format!("ark:/1/{}", i), "GEOME"))
                .await
                .unwrap();
        }
        store.upsert(&NewRecord::new("IGSN:X", "SESAR")).await.unwrap();
        store.mark_not_found("ark:/1/missing", "GEOME", None).await.unwrap();

        let dir = TempDir::new().unwrap();
        let publisher = SitemapPublisher::new(
            store,
            "https://example.org/thing/",
            "https://example.org/sitemaps",
        )
        .with_urls_per_file(2);

        let report = publisher.publish(Some("GEOME"), dir.path()).await.unwrap();
        assert_eq!(report.urls, 5);
        assert_eq!(report.files.len(), 4);

        let index = std::fs::read_to_string(dir.path().join(INDEX_FILE_NAME)).unwrap();
        let index = parse_sitemap(&index).unwrap();
        assert_eq!(index.kind, SitemapKind::Index);
        assert_eq!(index.entries.len(), 3);
        assert_eq!(index.entries[2].loc, "https://example.org/sitemaps/sitemap-2.xml");

        let first = std::fs::read_to_string(dir.path().join("sitemap-0.xml")).unwrap();
        let first = parse_sitemap(&first).unwrap();
        assert_eq!(first.entries[0].loc, "https://example.org/thing/ark:/1/0");
        assert!(first.entries[0].lastmod.is_some());
    }
}
