use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    FailurePolicy, FetchOrchestrator, HarvestError, HarvestReport, OrchestratorOptions,
    RecordFetcher,
};
use crate::cursor::{CursorEntry, ListSource};
use crate::sitemap::SitemapWalker;
use crate::store::RecordStore;

#[derive(Debug, Clone, Default)]
pub struct SitemapHarvestOptions {
    /// Only sitemap files and URLs modified at or after this instant
    pub watermark: Option<DateTime<Utc>>,
    /// Only the child sitemap whose URL ends with this file name
    pub file: Option<String>,
    /// Skip this many child sitemaps from the start of the index
    pub start_index: usize,
}

/// Harvests the record URLs listed by a sitemap index, one file at a time.
///
/// Failed fetches are stored as not-found stubs rather than retried, so a
/// later crawl of the same file does not keep hammering dead URLs.
pub struct SitemapHarvester<F> {
    walker: SitemapWalker,
    orchestrator: FetchOrchestrator<F>,
}

impl<F: RecordFetcher> SitemapHarvester<F> {
    pub fn new(
        walker: SitemapWalker,
        fetcher: Arc<F>,
        store: RecordStore,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            walker,
            orchestrator: FetchOrchestrator::with_shared_fetcher(fetcher, store, options),
        }
    }

    pub async fn run(
        &self,
        index_url: &str,
        options: &SitemapHarvestOptions,
    ) -> Result<HarvestReport, HarvestError> {
        let mut report = HarvestReport::default();

        let children = match self.walker.child_sitemaps(index_url, options.watermark).await {
            Ok(children) => children,
            Err(e) if e.is_malformed() => {
                error!(index = %index_url, error = %e, "Skipping malformed sitemap index");
                return Ok(report);
            },
            Err(e) => return Err(e.into()),
        };

        let max_records = self.orchestrator.options().max_records;

        for (index, child) in children.iter().enumerate().skip(options.start_index) {
            if let Some(file) = &options.file {
                if !child.loc.ends_with(file.as_str()) {
                    continue;
                }
            }

            // max_records caps the whole harvest, not each file
            let remaining = max_records.map(|max| max.saturating_sub(report.requested));
            if remaining == Some(0) {
                info!(
                    requested = report.requested,
                    "Record limit reached, stopping sitemap harvest"
                );
                break;
            }

            let urls = match self.walker.record_urls(&child.loc, options.watermark).await {
                Ok(urls) => urls,
                Err(e) => {
                    warn!(sitemap = %child.loc, error = %e, "Skipping sitemap file");
                    continue;
                },
            };

            info!(sitemap = %child.loc, index, urls = urls.len(), "Harvesting sitemap file");
            let mut source =
                ListSource::new(urls.into_iter().map(|u| CursorEntry::new(u.loc, u.lastmod)));
            let file_report = self
                .orchestrator
                .run_limited(&mut source, FailurePolicy::MarkNotFound, remaining)
                .await?;
            report.merge(file_report);
        }

        Ok(report)
    }
}
