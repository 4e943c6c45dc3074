//! Fetching records and persisting them
//!
//! [`FetchOrchestrator`] drives a bounded pool of fetch tasks over any
//! [`IdentifierSource`](crate::cursor::IdentifierSource);
//! [`SitemapHarvester`] runs it once per sitemap file.

mod orchestrator;
mod sitemap;

pub use orchestrator::{
    FailurePolicy, FetchOrchestrator, OrchestratorOptions, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POOL_SIZE,
};
pub use sitemap::{SitemapHarvestOptions, SitemapHarvester};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::cursor::{CursorEntry, CursorError};
use crate::http::HttpError;
use crate::sitemap::SitemapError;
use crate::store::{NewRecord, StoreError};

/// Failure to retrieve one record. Always retryable.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Cannot fetch '{identifier}': {message}")]
    Invalid { identifier: String, message: String },
}

/// Failures that end a harvest run
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Identifier source failed: {0}")]
    Cursor(#[from] CursorError),

    #[error("Record store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Sitemap walk failed: {0}")]
    Sitemap(#[from] SitemapError),

    #[error("Fetch task panicked or was cancelled: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// A retrieved record ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRecord {
    pub record: NewRecord,
    /// Secondary identifiers derived from the payload
    pub aliases: Vec<String>,
}

impl FetchedRecord {
    pub fn new(record: NewRecord) -> Self {
        Self {
            record,
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }
}

/// Provider-specific retrieval of one record
#[async_trait]
pub trait RecordFetcher: Send + Sync + 'static {
    /// Authority tag written on records from this fetcher
    fn authority(&self) -> &str;

    /// Store identifier for a cursor entry
    fn external_id(&self, entry: &CursorEntry) -> String {
        entry.identifier.clone()
    }

    /// Retrieve one record. A body that cannot be parsed is not an error:
    /// return it with a `None` payload so the attempt is still recorded.
    async fn fetch(&self, entry: &CursorEntry) -> Result<FetchedRecord, FetchError>;
}

/// Counts from one harvest run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    /// Identifiers submitted for fetching
    pub requested: usize,
    /// Successful fetches
    pub fetched: usize,
    pub persisted: usize,
    /// Identifiers passed over because they are already stored
    pub skipped: usize,
    /// Identifiers dropped after exhausting their attempts
    pub failed: usize,
    /// Identifiers stored as not-found
    pub not_found: usize,
    /// Failed attempts per identifier, for identifiers that failed at least once
    pub retries: BTreeMap<String, u32>,
}

impl HarvestReport {
    pub fn merge(&mut self, other: HarvestReport) {
        self.requested += other.requested;
        self.fetched += other.fetched;
        self.persisted += other.persisted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.not_found += other.not_found;
        for (identifier, count) in other.retries {
            *self.retries.entry(identifier).or_default() += count;
        }
    }
}
