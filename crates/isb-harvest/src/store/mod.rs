//! Record store
//!
//! SQLite-backed storage for harvested records. Rows are keyed by an
//! autoincrement `primary_key` that doubles as the paging cursor, with a
//! unique index on `external_id` and a separate alias table.
//!
//! Writes go through [`RecordStore::upsert`], which is safe to call from many
//! tasks at once: a uniqueness violation from a racing writer is resolved by
//! re-reading the winning row and rewriting it in place. The rewrite keys on
//! that row's `primary_key` and keeps its `external_id`, so it cannot collide
//! again.

mod models;
mod scan;

pub use models::{
    is_success, NewRecord, Record, ScanFilter, StatusFilter, STATUS_NOT_FOUND, STATUS_OK,
};
pub use scan::RecordScan;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use isb_common::time;
use models::{RecordRow, RECORD_COLUMNS};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The row that caused a uniqueness violation vanished before the re-read
    #[error("Write conflict on '{external_id}': conflicting row not found on re-read")]
    Conflict { external_id: String },

    #[error("Row {primary_key} could not be decoded: {message}")]
    CorruptRow { primary_key: i64, message: String },

    #[error("Payload for '{external_id}' could not be serialized: {source}")]
    Payload {
        external_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::Sqlx(sqlx::Error::Database(e)) if e.is_unique_violation())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Connection settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://isb.db".to_string(),
            max_connections: 8,
            busy_timeout_secs: 30,
        }
    }
}

/// SQLite record store. Cheap to clone; clones share the pool.
#[derive(Clone, Debug)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    /// Open (creating if needed) the database file and apply migrations
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database. The pool holds a single connection that
    /// is never recycled, since the data lives only as long as it does.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or overwrite the record with `record.external_id`.
    ///
    /// An existing row keeps its `primary_key` and aliases; everything else
    /// is replaced and `updated_at` moves strictly forward.
    pub async fn upsert(&self, record: &NewRecord) -> StoreResult<Record> {
        match self.write(record).await {
            Err(e) if e.is_unique_violation() => {
                warn!(
                    external_id = %record.external_id,
                    "Concurrent insert detected, rewriting existing row"
                );
                let existing = self
                    .find_row(&record.external_id)
                    .await?
                    .ok_or_else(|| StoreError::Conflict {
                        external_id: record.external_id.clone(),
                    })?;

                self.update_in_place(&existing, record).await
            },
            other => other,
        }
    }

    async fn write(&self, record: &NewRecord) -> StoreResult<Record> {
        match self.find_row(&record.external_id).await? {
            Some(existing) => self.update_in_place(&existing, record).await,
            None => self.insert(record).await,
        }
    }

    async fn insert(&self, record: &NewRecord) -> StoreResult<Record> {
        let updated_at = next_updated_at(None);
        let payload = encode_payload(record)?;

        let result = sqlx::query(
            r#"
            INSERT INTO records (
                external_id, authority, created_at, fetched_at, updated_at,
                fetch_status, source_url, media_type, payload
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&record.external_id)
        .bind(&record.authority)
        .bind(record.created_at.map(time::to_storage))
        .bind(record.fetched_at.map(time::to_storage))
        .bind(time::to_storage(updated_at))
        .bind(record.fetch_status)
        .bind(&record.source_url)
        .bind(&record.media_type)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        let primary_key = result.last_insert_rowid();
        debug!(external_id = %record.external_id, primary_key, "Inserted record");

        Ok(Record {
            primary_key,
            external_id: record.external_id.clone(),
            authority: record.authority.clone(),
            aliases: BTreeSet::new(),
            created_at: record.created_at.map(time::to_storage_precision),
            fetched_at: record.fetched_at.map(time::to_storage_precision),
            updated_at,
            fetch_status: record.fetch_status,
            source_url: record.source_url.clone(),
            media_type: record.media_type.clone(),
            payload: record.payload.clone(),
        })
    }

    async fn update_in_place(&self, existing: &Record, record: &NewRecord) -> StoreResult<Record> {
        let updated_at = next_updated_at(Some(existing.updated_at));
        let payload = encode_payload(record)?;

        sqlx::query(
            r#"
            UPDATE records SET
                external_id = ?1, authority = ?2, created_at = ?3, fetched_at = ?4,
                updated_at = ?5, fetch_status = ?6, source_url = ?7, media_type = ?8,
                payload = ?9
            WHERE primary_key = ?10
            "#,
        )
        .bind(&record.external_id)
        .bind(&record.authority)
        .bind(record.created_at.map(time::to_storage))
        .bind(record.fetched_at.map(time::to_storage))
        .bind(time::to_storage(updated_at))
        .bind(record.fetch_status)
        .bind(&record.source_url)
        .bind(&record.media_type)
        .bind(payload)
        .bind(existing.primary_key)
        .execute(&self.pool)
        .await?;

        debug!(
            external_id = %record.external_id,
            primary_key = existing.primary_key,
            "Updated record in place"
        );

        Ok(Record {
            primary_key: existing.primary_key,
            external_id: record.external_id.clone(),
            authority: record.authority.clone(),
            aliases: self.aliases_of(existing.primary_key).await?,
            created_at: record.created_at.map(time::to_storage_precision),
            fetched_at: record.fetched_at.map(time::to_storage_precision),
            updated_at,
            fetch_status: record.fetch_status,
            source_url: record.source_url.clone(),
            media_type: record.media_type.clone(),
            payload: record.payload.clone(),
        })
    }

    /// Point aliases at `record`. Aliases that already exist, for this or any
    /// other record, are left untouched. Returns the number inserted.
    pub async fn insert_aliases<I, S>(&self, record: &Record, aliases: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for alias in aliases {
            let alias = alias.as_ref().trim();
            if alias.is_empty() || alias == record.external_id {
                continue;
            }

            let result = sqlx::query(
                "INSERT INTO record_aliases (alias, primary_key) VALUES (?1, ?2) \
                 ON CONFLICT(alias) DO NOTHING",
            )
            .bind(alias)
            .bind(record.primary_key)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Resolve an identifier by `external_id`, then by alias
    pub async fn get(&self, identifier: &str) -> StoreResult<Option<Record>> {
        let row = match self.find_row(identifier).await? {
            Some(record) => Some(record),
            None => {
                let sql = format!(
                    "SELECT {} FROM records WHERE primary_key = \
                     (SELECT primary_key FROM record_aliases WHERE alias = ?1)",
                    RECORD_COLUMNS
                );
                sqlx::query_as::<_, RecordRow>(&sql)
                    .bind(identifier)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(Record::try_from)
                    .transpose()?
            },
        };

        match row {
            Some(mut record) => {
                record.aliases = self.aliases_of(record.primary_key).await?;
                Ok(Some(record))
            },
            None => Ok(None),
        }
    }

    /// Row for an exact `external_id`, without aliases
    async fn find_row(&self, external_id: &str) -> StoreResult<Option<Record>> {
        let sql = format!("SELECT {} FROM records WHERE external_id = ?1", RECORD_COLUMNS);
        sqlx::query_as::<_, RecordRow>(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Record::try_from)
            .transpose()
    }

    /// Fetch status stored for an exact `external_id`
    pub async fn fetch_status(&self, external_id: &str) -> StoreResult<Option<i32>> {
        let row = sqlx::query("SELECT fetch_status FROM records WHERE external_id = ?1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<i64, _>("fetch_status") as i32))
    }

    /// Next page of records with `primary_key > min_primary_key`, ascending.
    ///
    /// Page by passing the last key of the previous page; rows appended by
    /// other writers always sort after the keys already seen.
    pub async fn paged_scan(
        &self,
        filter: &ScanFilter,
        min_primary_key: i64,
        page_size: usize,
    ) -> StoreResult<Vec<Record>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        query.push(RECORD_COLUMNS);
        match filter.status {
            StatusFilter::Success => {
                query.push(" FROM records WHERE fetch_status BETWEEN 200 AND 299");
            },
            StatusFilter::Exact(status) => {
                query.push(" FROM records WHERE fetch_status = ");
                query.push_bind(status);
            },
        }
        query.push(" AND primary_key > ");
        query.push_bind(min_primary_key);

        if let Some(ref authority) = filter.authority {
            query.push(" AND authority = ");
            query.push_bind(authority.clone());
        }
        if let Some(min_created) = filter.min_created {
            query.push(" AND created_at >= ");
            query.push_bind(time::to_storage(min_created));
        }
        if let Some(max_primary_key) = filter.max_primary_key {
            query.push(" AND primary_key <= ");
            query.push_bind(max_primary_key);
        }

        query.push(" ORDER BY primary_key ASC LIMIT ");
        query.push_bind(page_size as i64);

        let rows = query
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut records = rows
            .into_iter()
            .map(Record::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        let keys: Vec<i64> = records.iter().map(|r| r.primary_key).collect();
        let mut aliases = self.aliases_for(&keys).await?;
        for record in &mut records {
            if let Some(set) = aliases.remove(&record.primary_key) {
                record.aliases = set;
            }
        }

        Ok(records)
    }

    /// Start a scan bounded by the rows present right now
    pub async fn scan(&self, filter: ScanFilter, page_size: usize) -> StoreResult<RecordScan<'_>> {
        let upper = self.max_primary_key().await?.unwrap_or(0);
        Ok(RecordScan::new(self, filter, page_size, upper))
    }

    /// Record a permanent fetch failure.
    ///
    /// Inserts a 404 stub for an unknown identifier; for a known one only the
    /// status (and source URL, when given) change.
    pub async fn mark_not_found(
        &self,
        identifier: &str,
        authority: &str,
        source_url: Option<&str>,
    ) -> StoreResult<Record> {
        match self.find_row(identifier).await? {
            Some(existing) => {
                let updated_at = next_updated_at(Some(existing.updated_at));
                sqlx::query(
                    "UPDATE records SET fetch_status = ?1, updated_at = ?2, \
                     source_url = COALESCE(?3, source_url) WHERE primary_key = ?4",
                )
                .bind(STATUS_NOT_FOUND)
                .bind(time::to_storage(updated_at))
                .bind(source_url)
                .bind(existing.primary_key)
                .execute(&self.pool)
                .await?;

                Ok(Record {
                    fetch_status: STATUS_NOT_FOUND,
                    updated_at,
                    source_url: source_url.map(str::to_string).or(existing.source_url.clone()),
                    aliases: self.aliases_of(existing.primary_key).await?,
                    ..existing
                })
            },
            None => {
                let stub = NewRecord::not_found(identifier, authority, source_url.map(str::to_string));
                self.upsert(&stub).await
            },
        }
    }

    /// Newest provider creation time stored for an authority
    pub async fn last_created_at(&self, authority: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(created_at) AS last_created FROM records \
             WHERE authority = ?1 AND created_at IS NOT NULL",
        )
        .bind(authority)
        .fetch_one(&self.pool)
        .await?;

        let value: Option<String> = row.try_get("last_created")?;
        value
            .map(|v| {
                time::from_storage(&v).map_err(|e| StoreError::CorruptRow {
                    primary_key: 0,
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    pub async fn max_primary_key(&self) -> StoreResult<Option<i64>> {
        let row = sqlx::query("SELECT MAX(primary_key) AS max_key FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("max_key")?)
    }

    /// Row counts keyed by fetch status
    pub async fn status_counts(&self) -> StoreResult<BTreeMap<i32, i64>> {
        let rows = sqlx::query(
            "SELECT fetch_status, COUNT(*) AS n FROM records GROUP BY fetch_status",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<i64, _>("fetch_status") as i32, row.get::<i64, _>("n")))
            .collect())
    }

    /// Row counts keyed by authority
    pub async fn authority_counts(&self) -> StoreResult<BTreeMap<String, i64>> {
        let rows = sqlx::query("SELECT authority, COUNT(*) AS n FROM records GROUP BY authority")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("authority"), row.get::<i64, _>("n")))
            .collect())
    }

    async fn aliases_of(&self, primary_key: i64) -> StoreResult<BTreeSet<String>> {
        let mut map = self.aliases_for(&[primary_key]).await?;
        Ok(map.remove(&primary_key).unwrap_or_default())
    }

    async fn aliases_for(&self, keys: &[i64]) -> StoreResult<HashMap<i64, BTreeSet<String>>> {
        let mut aliases: HashMap<i64, BTreeSet<String>> = HashMap::new();

        for chunk in keys.chunks(500) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT alias, primary_key FROM record_aliases WHERE primary_key IN (");
            let mut separated = query.separated(", ");
            for key in chunk {
                separated.push_bind(*key);
            }
            separated.push_unseparated(")");

            for row in query.build().fetch_all(&self.pool).await? {
                let alias: String = row.try_get("alias")?;
                let key: i64 = row.try_get("primary_key")?;
                aliases.entry(key).or_default().insert(alias);
            }
        }

        Ok(aliases)
    }
}

fn encode_payload(record: &NewRecord) -> StoreResult<Option<String>> {
    record
        .payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|source| StoreError::Payload {
            external_id: record.external_id.clone(),
            source,
        })
}

/// Write timestamp that is never earlier than, nor equal to, the previous one
fn next_updated_at(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = time::to_storage_precision(Utc::now());
    match previous {
        Some(prev) if now <= prev => prev + ChronoDuration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn file_store() -> (RecordStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            url: format!("sqlite://{}", dir.path().join("records.db").display()),
            ..StoreConfig::default()
        };
        (RecordStore::connect(&config).await.unwrap(), dir)
    }

    #[test]
    fn test_next_updated_at_is_strictly_increasing() {
        let future = Utc::now() + ChronoDuration::hours(1);
        let next = next_updated_at(Some(future));
        assert!(next > future);
        assert_eq!(next - future, ChronoDuration::microseconds(1));
    }

    #[tokio::test]
    async fn test_idempotent_upsert() {
        let store = RecordStore::in_memory().await.unwrap();

        let first = store
            .upsert(&NewRecord::new("IGSN:ABC", "SESAR").with_payload(json!({"v": 1})))
            .await
            .unwrap();
        let second = store
            .upsert(&NewRecord::new("IGSN:ABC", "SESAR").with_payload(json!({"v": 2})))
            .await
            .unwrap();

        assert_eq!(first.primary_key, second.primary_key);
        assert!(second.updated_at > first.updated_at);

        let stored = store.get("IGSN:ABC").await.unwrap().unwrap();
        assert_eq!(stored.payload, Some(json!({"v": 2})));
        assert_eq!(stored.primary_key, first.primary_key);
        assert_eq!(store.status_counts().await.unwrap().get(&STATUS_OK), Some(&1));
    }

    #[tokio::test]
    async fn test_upsert_keeps_aliases() {
        let store = RecordStore::in_memory().await.unwrap();
        let record = store.upsert(&NewRecord::new("A", "TEST")).await.unwrap();
        store.insert_aliases(&record, ["B"]).await.unwrap();

        let rewritten = store
            .upsert(&NewRecord::new("A", "TEST").with_payload(json!({"again": true})))
            .await
            .unwrap();

        assert!(rewritten.aliases.contains("B"));
    }

    #[tokio::test]
    async fn test_alias_resolution() {
        let store = RecordStore::in_memory().await.unwrap();
        let record = store
            .upsert(&NewRecord::new("A", "TEST").with_payload(json!({"name": "a"})))
            .await
            .unwrap();

        let inserted = store.insert_aliases(&record, ["B", "B", "A", " "]).await.unwrap();
        assert_eq!(inserted, 1);

        let by_id = store.get("A").await.unwrap().unwrap();
        let by_alias = store.get("B").await.unwrap().unwrap();
        assert_eq!(by_id, by_alias);
        assert!(store.get("C").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_alias_owned_by_first_record() {
        let store = RecordStore::in_memory().await.unwrap();
        let a = store.upsert(&NewRecord::new("A", "TEST")).await.unwrap();
        let b = store.upsert(&NewRecord::new("B", "TEST")).await.unwrap();

        store.insert_aliases(&a, ["shared"]).await.unwrap();
        assert_eq!(store.insert_aliases(&b, ["shared"]).await.unwrap(), 0);

        let owner = store.get("shared").await.unwrap().unwrap();
        assert_eq!(owner.external_id, "A");
    }

    #[tokio::test]
    async fn test_mark_not_found_inserts_then_updates() {
        let store = RecordStore::in_memory().await.unwrap();

        let stub = store
            .mark_not_found("ark:/1/x", "GEOME", Some("https://example.org/x"))
            .await
            .unwrap();
        assert_eq!(stub.fetch_status, STATUS_NOT_FOUND);
        assert!(stub.payload.is_none());

        let ok = store
            .upsert(
                &NewRecord::new("ark:/1/x", "GEOME")
                    .with_payload(json!({}))
                    .with_source("https://example.org/x", "application/json"),
            )
            .await
            .unwrap();
        assert_eq!(ok.primary_key, stub.primary_key);

        let again = store.mark_not_found("ark:/1/x", "GEOME", None).await.unwrap();
        assert_eq!(again.primary_key, stub.primary_key);
        assert_eq!(again.fetch_status, STATUS_NOT_FOUND);
        assert_eq!(again.source_url.as_deref(), Some("https://example.org/x"));
        assert_eq!(store.fetch_status("ark:/1/x").await.unwrap(), Some(STATUS_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_paged_scan_filters() {
        let store = RecordStore::in_memory().await.unwrap();
        let early = time::parse_timestamp("2015-01-01").unwrap();
        let late = time::parse_timestamp("2021-01-01").unwrap();

        store
            .upsert(&NewRecord::new("s1", "SESAR").with_created_at(Some(early)))
            .await
            .unwrap();
        store
            .upsert(&NewRecord::new("g1", "GEOME").with_created_at(Some(late)))
            .await
            .unwrap();
        store
            .upsert(&NewRecord::new("s2", "SESAR").with_created_at(Some(late)))
            .await
            .unwrap();
        store.mark_not_found("s3", "SESAR", None).await.unwrap();

        let sesar = store
            .paged_scan(&ScanFilter::success().authority("SESAR"), 0, 10)
            .await
            .unwrap();
        let ids: Vec<_> = sesar.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);

        let recent = store
            .paged_scan(
                &ScanFilter::success().authority("SESAR").created_since(Some(late)),
                0,
                10,
            )
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].external_id, "s2");

        let missing = store
            .paged_scan(&ScanFilter::success().status(STATUS_NOT_FOUND), 0, 10)
            .await
            .unwrap();
        assert_eq!(missing.len(), 1);

        assert_eq!(store.last_created_at("SESAR").await.unwrap(), Some(late));
        assert_eq!(store.last_created_at("OPENCONTEXT").await.unwrap(), None);
        assert_eq!(store.authority_counts().await.unwrap().get("SESAR"), Some(&3));
    }

    #[tokio::test]
    async fn test_success_scan_includes_all_2xx() {
        let store = RecordStore::in_memory().await.unwrap();
        store.upsert(&NewRecord::new("ok", "TEST")).await.unwrap();
        store
            .upsert(&NewRecord::new("partial", "TEST").with_status(203))
            .await
            .unwrap();
        store
            .upsert(&NewRecord::new("gone", "TEST").with_status(410))
            .await
            .unwrap();
        store.mark_not_found("missing", "TEST", None).await.unwrap();

        let success = store.paged_scan(&ScanFilter::success(), 0, 10).await.unwrap();
        let ids: Vec<_> = success.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "partial"]);
        assert!(success.iter().all(Record::is_success));

        let exact = store
            .paged_scan(&ScanFilter::default().status(203), 0, 10)
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].external_id, "partial");
    }

    #[tokio::test]
    async fn test_concurrent_upserts_leave_one_row() {
        let (store, _dir) = file_store().await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(&NewRecord::new("IGSN:RACE", "SESAR").with_payload(json!({"writer": i})))
                    .await
            }));
        }

        let mut keys = BTreeSet::new();
        for handle in handles {
            keys.insert(handle.await.unwrap().unwrap().primary_key);
        }

        assert_eq!(keys.len(), 1);
        assert_eq!(store.authority_counts().await.unwrap().get("SESAR"), Some(&1));
    }
}
