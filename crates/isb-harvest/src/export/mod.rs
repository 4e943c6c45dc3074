//! Store-to-search-index export
//!
//! [`ExportPipeline`] scans success rows in key order, transforms each record
//! into documents and pushes them to a [`SearchIndex`] in committed batches.

mod solr;
mod transform;

pub use solr::{IndexError, SearchIndex, SolrIndex};
pub use transform::{Classification, Classifier, EnvelopeTransform, Transform, TransformError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::store::{Record, RecordStore, ScanFilter, StoreError};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Record store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Search index failed: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Only records of this authority; `None` exports every authority
    pub authority: Option<String>,
    /// Only records created at or after this instant
    pub min_created: Option<DateTime<Utc>>,
    /// Documents per push and commit
    pub batch_size: usize,
    /// Records per store page
    pub page_size: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            authority: None,
            min_created: None,
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportReport {
    /// Records read from the store
    pub records: usize,
    /// Records whose transform failed
    pub skipped: usize,
    pub documents: usize,
    pub batches: usize,
    pub pushed_ids: BTreeSet<String>,
}

pub struct ExportPipeline<T, I> {
    store: RecordStore,
    transform: T,
    index: I,
    options: ExportOptions,
}

/// Transform one record, rejecting it whole if any document lacks a string `id`
fn documents_for<T: Transform>(
    transform: &T,
    record: &Record,
) -> Result<Vec<(String, Value)>, TransformError> {
    transform
        .transform(record)?
        .into_iter()
        .map(|doc| match doc.get("id").and_then(Value::as_str) {
            Some(id) => Ok((id.to_string(), doc)),
            None => Err(TransformError::MissingId {
                external_id: record.external_id.clone(),
            }),
        })
        .collect()
}

impl<T: Transform, I: SearchIndex> ExportPipeline<T, I> {
    pub fn new(store: RecordStore, transform: T, index: I, options: ExportOptions) -> Self {
        let options = ExportOptions {
            batch_size: options.batch_size.max(1),
            page_size: options.page_size.max(1),
            ..options
        };
        Self {
            store,
            transform,
            index,
            options,
        }
    }

    pub async fn run(&self) -> Result<ExportReport, ExportError> {
        let mut filter = ScanFilter::success().created_since(self.options.min_created);
        if let Some(authority) = &self.options.authority {
            filter = filter.authority(authority.as_str());
        }

        info!(
            authority = ?self.options.authority,
            min_created = ?self.options.min_created,
            batch_size = self.options.batch_size,
            "Starting export"
        );

        let mut scan = self.store.scan(filter, self.options.page_size).await?;
        let mut report = ExportReport::default();
        let mut batch: Vec<(String, Value)> = Vec::new();

        loop {
            let page = scan.next_page().await?;
            if page.is_empty() {
                break;
            }

            for record in &page {
                report.records += 1;
                match documents_for(&self.transform, record) {
                    Ok(mut docs) => batch.append(&mut docs),
                    Err(e) => {
                        warn!(external_id = %record.external_id, error = %e, "Skipping record");
                        report.skipped += 1;
                        continue;
                    },
                }

                if batch.len() >= self.options.batch_size {
                    self.flush(&mut batch, &mut report).await?;
                }
            }
        }

        if !batch.is_empty() {
            self.flush(&mut batch, &mut report).await?;
        }

        info!(
            records = report.records,
            skipped = report.skipped,
            documents = report.documents,
            batches = report.batches,
            "Export finished"
        );
        Ok(report)
    }

    async fn flush(
        &self,
        batch: &mut Vec<(String, Value)>,
        report: &mut ExportReport,
    ) -> Result<(), ExportError> {
        let (ids, documents): (Vec<String>, Vec<Value>) = std::mem::take(batch).into_iter().unzip();

        let pushed = match self.index.add_documents(&documents).await {
            Ok(()) => self.index.commit().await,
            Err(e) => Err(e),
        };
        if let Err(e) = pushed {
            error!(documents = documents.len(), error = %e, "Index push failed, halting export");
            return Err(e.into());
        }

        report.documents += documents.len();
        report.batches += 1;
        report.pushed_ids.extend(ids);
        info!(
            documents = documents.len(),
            total = report.documents,
            "Pushed batch"
        );
        Ok(())
    }
}
