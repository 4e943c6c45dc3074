use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{FetchError, FetchedRecord, HarvestError, HarvestReport, RecordFetcher};
use crate::cursor::{CursorEntry, IdentifierSource};
use crate::store::{is_success, RecordStore, StoreError};

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What happens to an identifier whose fetch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Resubmit until `max_attempts`, then drop without persisting
    Retry,
    /// Store a not-found stub after the first failure
    MarkNotFound,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Maximum fetches in flight
    pub pool_size: usize,
    /// Attempts per identifier under [`FailurePolicy::Retry`]
    pub max_attempts: u32,
    /// Stop requesting after this many identifiers. A sitemap harvest counts
    /// this across all of its files.
    pub max_records: Option<usize>,
    /// Pass over identifiers already stored with a success status
    pub skip_existing: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_records: None,
            skip_existing: false,
        }
    }
}

type FetchOutcome = (CursorEntry, Result<FetchedRecord, FetchError>);

/// Bounded-concurrency fetch loop.
///
/// Fills the pool up to `pool_size`, drains completions in the order they
/// finish, and tops the pool up again whenever it falls below half full.
/// Retry counts live in a map private to each run.
pub struct FetchOrchestrator<F> {
    fetcher: Arc<F>,
    store: RecordStore,
    options: OrchestratorOptions,
}

impl<F: RecordFetcher> FetchOrchestrator<F> {
    pub fn new(fetcher: F, store: RecordStore, options: OrchestratorOptions) -> Self {
        Self::with_shared_fetcher(Arc::new(fetcher), store, options)
    }

    pub fn with_shared_fetcher(
        fetcher: Arc<F>,
        store: RecordStore,
        options: OrchestratorOptions,
    ) -> Self {
        let options = OrchestratorOptions {
            pool_size: options.pool_size.max(1),
            max_attempts: options.max_attempts.max(1),
            ..options
        };
        Self {
            fetcher,
            store,
            options,
        }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Harvest with retries
    pub async fn run<S>(&self, source: &mut S) -> Result<HarvestReport, HarvestError>
    where
        S: IdentifierSource + ?Sized,
    {
        self.run_with_policy(source, FailurePolicy::Retry).await
    }

    /// Harvest every identifier from `source`.
    ///
    /// Errors from the source or the store stop new submissions; fetches
    /// already in flight are still collected before the error is returned.
    pub async fn run_with_policy<S>(
        &self,
        source: &mut S,
        policy: FailurePolicy,
    ) -> Result<HarvestReport, HarvestError>
    where
        S: IdentifierSource + ?Sized,
    {
        self.run_limited(source, policy, self.options.max_records).await
    }

    /// Like [`run_with_policy`](Self::run_with_policy) with an explicit
    /// request budget in place of `max_records`
    pub(super) async fn run_limited<S>(
        &self,
        source: &mut S,
        policy: FailurePolicy,
        max_records: Option<usize>,
    ) -> Result<HarvestReport, HarvestError>
    where
        S: IdentifierSource + ?Sized,
    {
        let capacity = self.options.pool_size;
        let authority = self.fetcher.authority().to_string();
        let mut in_flight: JoinSet<FetchOutcome> = JoinSet::new();
        let mut failures: HashMap<String, u32> = HashMap::new();
        let mut report = HarvestReport::default();
        let mut source_done = false;
        let mut fatal: Option<HarvestError> = None;

        info!(
            authority = %authority,
            expected = source.len(),
            pool_size = capacity,
            ?policy,
            "Starting harvest"
        );

        loop {
            while !source_done && in_flight.len() < capacity {
                if max_records.is_some_and(|max| report.requested >= max) {
                    source_done = true;
                    break;
                }

                let entry = match source.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => {
                        source_done = true;
                        break;
                    },
                    Err(e) => {
                        error!(error = %e, "Identifier source failed, finishing in-flight fetches");
                        fatal = Some(e.into());
                        source_done = true;
                        break;
                    },
                };

                if self.options.skip_existing {
                    match self.already_stored(&entry).await {
                        Ok(true) => {
                            report.skipped += 1;
                            continue;
                        },
                        Ok(false) => {},
                        Err(e) => {
                            record_fatal(&mut fatal, e.into());
                            source_done = true;
                            break;
                        },
                    }
                }

                report.requested += 1;
                self.submit(&mut in_flight, entry);
            }

            if in_flight.is_empty() {
                break;
            }

            while let Some(joined) = in_flight.join_next().await {
                let (entry, result) = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        record_fatal(&mut fatal, e.into());
                        source_done = true;
                        continue;
                    },
                };

                let handled = match result {
                    Ok(fetched) => self.persist(fetched, &mut report).await,
                    Err(e) => {
                        self.handle_failure(
                            entry,
                            e,
                            policy,
                            &authority,
                            &mut failures,
                            &mut in_flight,
                            &mut report,
                        )
                        .await
                    },
                };
                if let Err(e) = handled {
                    record_fatal(&mut fatal, e.into());
                    source_done = true;
                }

                if !source_done && in_flight.len() * 2 < capacity {
                    break;
                }
            }
        }

        report.retries = failures.into_iter().collect();
        info!(
            authority = %authority,
            requested = report.requested,
            fetched = report.fetched,
            persisted = report.persisted,
            skipped = report.skipped,
            failed = report.failed,
            not_found = report.not_found,
            "Harvest finished"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn submit(&self, in_flight: &mut JoinSet<FetchOutcome>, entry: CursorEntry) {
        let fetcher = Arc::clone(&self.fetcher);
        in_flight.spawn(async move {
            let result = fetcher.fetch(&entry).await;
            (entry, result)
        });
    }

    async fn already_stored(&self, entry: &CursorEntry) -> Result<bool, StoreError> {
        let external_id = self.fetcher.external_id(entry);
        Ok(self
            .store
            .fetch_status(&external_id)
            .await?
            .is_some_and(is_success))
    }

    async fn persist(
        &self,
        fetched: FetchedRecord,
        report: &mut HarvestReport,
    ) -> Result<(), StoreError> {
        report.fetched += 1;

        match self.store.upsert(&fetched.record).await {
            Ok(record) => {
                self.store.insert_aliases(&record, &fetched.aliases).await?;
                report.persisted += 1;
                Ok(())
            },
            Err(StoreError::Conflict { external_id }) => {
                error!(external_id = %external_id, "Giving up on record after unresolved write conflict");
                report.failed += 1;
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_failure(
        &self,
        entry: CursorEntry,
        error: FetchError,
        policy: FailurePolicy,
        authority: &str,
        failures: &mut HashMap<String, u32>,
        in_flight: &mut JoinSet<FetchOutcome>,
        report: &mut HarvestReport,
    ) -> Result<(), StoreError> {
        let count = failures.entry(entry.identifier.clone()).or_insert(0);
        *count += 1;
        let attempt = *count;

        match policy {
            FailurePolicy::Retry if attempt < self.options.max_attempts => {
                warn!(
                    identifier = %entry.identifier,
                    attempt,
                    error = %error,
                    "Fetch failed, resubmitting"
                );
                self.submit(in_flight, entry);
            },
            FailurePolicy::Retry => {
                error!(
                    identifier = %entry.identifier,
                    attempts = attempt,
                    error = %error,
                    "Fetch failed too many times, dropping"
                );
                report.failed += 1;
            },
            FailurePolicy::MarkNotFound => {
                let external_id = self.fetcher.external_id(&entry);
                warn!(
                    identifier = %entry.identifier,
                    external_id = %external_id,
                    error = %error,
                    "Fetch failed, marking not found"
                );
                self.store
                    .mark_not_found(&external_id, authority, Some(&entry.identifier))
                    .await?;
                report.not_found += 1;
            },
        }

        Ok(())
    }
}

fn record_fatal(slot: &mut Option<HarvestError>, error: HarvestError) {
    match slot {
        Some(_) => error!(error = %error, "Additional failure after run was halted"),
        None => {
            error!(error = %error, "Harvest halted");
            *slot = Some(error);
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cursor::ListSource;
    use crate::store::NewRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails every identifier listed in `failing`
    struct Flaky {
        failing: Vec<String>,
        calls: Mutex<HashMap<String, u32>>,
    }

    #[async_trait]
    impl RecordFetcher for Flaky {
        fn authority(&self) -> &str {
            "TEST"
        }

        async fn fetch(&self, entry: &CursorEntry) -> Result<FetchedRecord, FetchError> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(entry.identifier.clone())
                .or_default() += 1;
            if self.failing.contains(&entry.identifier) {
                return Err(FetchError::Invalid {
                    identifier: entry.identifier.clone(),
                    message: "always fails".to_string(),
                });
            }
            Ok(FetchedRecord::new(NewRecord::new(&entry.identifier, "TEST")))
        }
    }

    fn source(ids: &[&str]) -> ListSource {
        ListSource::new(ids.iter().map(|id| CursorEntry::new(*id, None)))
    }

    #[tokio::test]
    async fn test_max_records_bounds_requests() {
        let store = RecordStore::in_memory().await.unwrap();
        let fetcher = Flaky {
            failing: vec![],
            calls: Mutex::new(HashMap::new()),
        };
        let options = OrchestratorOptions {
            max_records: Some(2),
            ..OrchestratorOptions::default()
        };
        let orchestrator = FetchOrchestrator::new(fetcher, store.clone(), options);

        let report = orchestrator.run(&mut source(&["a", "b", "c"])).await.unwrap();
        assert_eq!(report.requested, 2);
        assert_eq!(report.persisted, 2);
        assert!(store.get("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skip_existing() {
        let store = RecordStore::in_memory().await.unwrap();
        store.upsert(&NewRecord::new("a", "TEST")).await.unwrap();
        store.mark_not_found("b", "TEST", None).await.unwrap();

        let fetcher = Arc::new(Flaky {
            failing: vec![],
            calls: Mutex::new(HashMap::new()),
        });
        let options = OrchestratorOptions {
            skip_existing: true,
            ..OrchestratorOptions::default()
        };
        let orchestrator =
            FetchOrchestrator::with_shared_fetcher(Arc::clone(&fetcher), store.clone(), options);

        let report = orchestrator.run(&mut source(&["a", "b"])).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.persisted, 1);
        // the 404 stub is refetched
        assert_eq!(fetcher.calls.lock().unwrap().get("b"), Some(&1));
        assert!(fetcher.calls.lock().unwrap().get("a").is_none());
    }

    #[tokio::test]
    async fn test_mark_not_found_policy_fails_once() {
        let store = RecordStore::in_memory().await.unwrap();
        let fetcher = Arc::new(Flaky {
            failing: vec!["bad".to_string()],
            calls: Mutex::new(HashMap::new()),
        });
        let orchestrator = FetchOrchestrator::with_shared_fetcher(
            Arc::clone(&fetcher),
            store.clone(),
            OrchestratorOptions::default(),
        );

        let report = orchestrator
            .run_with_policy(&mut source(&["ok", "bad"]), FailurePolicy::MarkNotFound)
            .await
            .unwrap();

        assert_eq!(report.not_found, 1);
        assert_eq!(fetcher.calls.lock().unwrap().get("bad"), Some(&1));
        let stub = store.get("bad").await.unwrap().unwrap();
        assert_eq!(stub.fetch_status, crate::store::STATUS_NOT_FOUND);
        assert_eq!(stub.source_url.as_deref(), Some("bad"));
    }
}
