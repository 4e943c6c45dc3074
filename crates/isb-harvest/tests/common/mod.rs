//! Shared helpers for integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use isb_harvest::cursor::{CursorEntry, CursorError, Page, PageLoader, PageRequest};
use isb_harvest::fetch::{FetchError, FetchedRecord, RecordFetcher};
use isb_harvest::store::{NewRecord, RecordStore, StoreConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// File-backed store in a temporary directory; keep the `TempDir` alive
pub async fn temp_store() -> (TempDir, RecordStore) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        url: format!("sqlite://{}", dir.path().join("records.db").display()),
        ..StoreConfig::default()
    };
    let store = RecordStore::connect(&config).await.unwrap();
    (dir, store)
}

pub fn entries(ids: &[&str]) -> Vec<CursorEntry> {
    ids.iter().map(|id| CursorEntry::new(*id, None)).collect()
}

/// Serves a fixed list of identifiers in pages of the requested size
pub struct VecLoader {
    entries: Vec<CursorEntry>,
}

impl VecLoader {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            entries: entries(ids),
        }
    }
}

#[async_trait]
impl PageLoader for VecLoader {
    async fn load_page(&mut self, request: &PageRequest) -> Result<Page, CursorError> {
        let page: Vec<_> = self
            .entries
            .iter()
            .skip(request.position)
            .take(request.page_size)
            .cloned()
            .collect();
        Ok(Page::new(page).with_total(Some(self.entries.len())))
    }
}

/// Fetcher whose identifiers fail a scripted number of times before
/// succeeding, tracking attempts and peak concurrency
pub struct ScriptedFetcher {
    failures: HashMap<String, u32>,
    delay: Duration,
    attempts: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
            delay: Duration::from_millis(0),
            attempts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Fail `identifier` this many times before succeeding
    pub fn failing(mut self, identifier: &str, times: u32) -> Self {
        self.failures.insert(identifier.to_string(), times);
        self
    }

    pub fn always_failing(self, identifier: &str) -> Self {
        self.failing(identifier, u32::MAX)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self, identifier: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(identifier)
            .copied()
            .unwrap_or(0)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordFetcher for ScriptedFetcher {
    fn authority(&self) -> &str {
        "TEST"
    }

    async fn fetch(&self, entry: &CursorEntry) -> Result<FetchedRecord, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(entry.identifier.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let allowed_failures = self.failures.get(&entry.identifier).copied().unwrap_or(0);
        if attempt <= allowed_failures {
            return Err(FetchError::Invalid {
                identifier: entry.identifier.clone(),
                message: format!("scripted failure {}", attempt),
            });
        }

        let record = NewRecord::new(&entry.identifier, "TEST")
            .with_payload(serde_json::json!({ "id": entry.identifier, "attempt": attempt }));
        Ok(FetchedRecord::new(record))
    }
}
