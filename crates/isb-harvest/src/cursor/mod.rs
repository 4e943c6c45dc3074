//! Identifier cursors
//!
//! A cursor enumerates `(identifier, timestamp)` pairs from a remote provider
//! one page at a time. Providers only implement [`PageLoader::load_page`];
//! [`IdentifierCursor`] owns buffering, the offset, the entry limit, the date
//! window and the running total.
//!
//! Progress is reported as `Result<Option<CursorEntry>, CursorError>`:
//! `Ok(Some(_))` is an entry, `Ok(None)` means the source is exhausted (a
//! loader signals this with an empty page), and `Err(_)` is a failure loading
//! a page. A failed page is not consumed; calling `next` again retries it.

pub mod geome;
pub mod oai_pmh;
pub mod opencontext;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::debug;

use crate::http::HttpError;

pub use geome::GeomeProjectLoader;
pub use oai_pmh::OaiPmhLoader;
pub use opencontext::OpenContextLoader;

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum CursorError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Unparseable page from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Provider error from {url}: {message}")]
    Provider { url: String, message: String },
}

/// One identifier yielded by a cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorEntry {
    pub identifier: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CursorEntry {
    pub fn new(identifier: impl Into<String>, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            identifier: identifier.into(),
            timestamp,
        }
    }
}

/// What the cursor asks a loader for
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// Entries already loaded by earlier pages
    pub position: usize,
    pub page_size: usize,
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
}

/// One page of entries. An empty page ends the cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub entries: Vec<CursorEntry>,
    /// Total reported by the provider, if it reports one
    pub total: Option<usize>,
}

impl Page {
    pub fn new(entries: Vec<CursorEntry>) -> Self {
        Self {
            entries,
            total: None,
        }
    }

    pub fn exhausted() -> Self {
        Self::default()
    }

    pub fn with_total(mut self, total: Option<usize>) -> Self {
        self.total = total;
        self
    }
}

/// Provider-specific page loading
#[async_trait]
pub trait PageLoader: Send {
    async fn load_page(&mut self, request: &PageRequest) -> Result<Page, CursorError>;
}

/// Stream of identifiers consumed by the fetch orchestrator
#[async_trait]
pub trait IdentifierSource: Send {
    async fn next_entry(&mut self) -> Result<Option<CursorEntry>, CursorError>;

    /// Best-known number of entries this source will yield
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct CursorOptions {
    /// Entries to discard before yielding
    pub offset: usize,
    /// `None` for unbounded
    pub max_entries: Option<usize>,
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
    pub page_size: usize,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            max_entries: None,
            date_start: None,
            date_end: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl CursorOptions {
    /// Entry limit where any negative value means unbounded
    pub fn max_entries(mut self, max_entries: i64) -> Self {
        self.max_entries = usize::try_from(max_entries).ok();
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn window(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.date_start = start;
        self.date_end = end;
        self
    }

    fn in_window(&self, entry: &CursorEntry) -> bool {
        match entry.timestamp {
            Some(ts) => {
                self.date_start.map_or(true, |start| ts >= start)
                    && self.date_end.map_or(true, |end| ts <= end)
            },
            None => true,
        }
    }
}

/// Generic buffered cursor over a [`PageLoader`]
pub struct IdentifierCursor<L> {
    loader: L,
    options: CursorOptions,
    buffer: VecDeque<CursorEntry>,
    loaded: usize,
    skipped: usize,
    yielded: usize,
    total: usize,
    exhausted: bool,
}

impl<L: PageLoader> IdentifierCursor<L> {
    pub fn new(loader: L, options: CursorOptions) -> Self {
        Self {
            loader,
            options,
            buffer: VecDeque::new(),
            loaded: 0,
            skipped: 0,
            yielded: 0,
            total: 0,
            exhausted: false,
        }
    }

    pub fn options(&self) -> &CursorOptions {
        &self.options
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }

    fn limit_reached(&self) -> bool {
        self.options
            .max_entries
            .is_some_and(|max| self.yielded >= max)
    }

    /// Next entry, `Ok(None)` once exhausted or at the entry limit
    pub async fn next(&mut self) -> Result<Option<CursorEntry>, CursorError> {
        loop {
            if self.limit_reached() {
                return Ok(None);
            }

            if let Some(entry) = self.buffer.pop_front() {
                if self.skipped < self.options.offset {
                    self.skipped += 1;
                    continue;
                }
                if !self.options.in_window(&entry) {
                    continue;
                }
                self.yielded += 1;
                return Ok(Some(entry));
            }

            if self.exhausted {
                return Ok(None);
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<(), CursorError> {
        let request = PageRequest {
            position: self.loaded,
            page_size: self.options.page_size,
            date_start: self.options.date_start,
            date_end: self.options.date_end,
        };

        let page = self.loader.load_page(&request).await?;
        if let Some(total) = page.total {
            self.total = self.total.max(total);
        }

        if page.entries.is_empty() {
            debug!(loaded = self.loaded, "Cursor exhausted");
            self.exhausted = true;
            return Ok(());
        }

        self.loaded += page.entries.len();
        self.total = self.total.max(self.loaded);
        debug!(
            page_entries = page.entries.len(),
            loaded = self.loaded,
            total = self.total,
            "Loaded cursor page"
        );
        self.buffer.extend(page.entries);
        Ok(())
    }

    /// Best-known total after the offset and entry limit are applied
    pub fn len(&self) -> usize {
        let available = self.total.saturating_sub(self.options.offset);
        match self.options.max_entries {
            Some(max) => available.min(max),
            None => available,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<L: PageLoader> IdentifierSource for IdentifierCursor<L> {
    async fn next_entry(&mut self) -> Result<Option<CursorEntry>, CursorError> {
        self.next().await
    }

    fn len(&self) -> usize {
        IdentifierCursor::len(self)
    }
}

/// Fixed list of identifiers, used for sitemap URL lists
#[derive(Debug, Clone, Default)]
pub struct ListSource {
    entries: VecDeque<CursorEntry>,
    total: usize,
}

impl ListSource {
    pub fn new(entries: impl IntoIterator<Item = CursorEntry>) -> Self {
        let entries: VecDeque<_> = entries.into_iter().collect();
        let total = entries.len();
        Self { entries, total }
    }
}

#[async_trait]
impl IdentifierSource for ListSource {
    async fn next_entry(&mut self) -> Result<Option<CursorEntry>, CursorError> {
        Ok(self.entries.pop_front())
    }

    fn len(&self) -> usize {
        self.total
    }
}
