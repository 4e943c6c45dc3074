use super::{Record, RecordStore, ScanFilter, StoreResult};

/// Key-ordered pager over the store.
///
/// The upper bound is captured when the scan starts, so rows appended while
/// it runs are left for the next scan and every row is visited once.
#[derive(Debug)]
pub struct RecordScan<'a> {
    store: &'a RecordStore,
    filter: ScanFilter,
    page_size: usize,
    last_key: i64,
    done: bool,
}

impl<'a> RecordScan<'a> {
    pub(super) fn new(
        store: &'a RecordStore,
        mut filter: ScanFilter,
        page_size: usize,
        upper_bound: i64,
    ) -> Self {
        filter.max_primary_key = Some(match filter.max_primary_key {
            Some(bound) => bound.min(upper_bound),
            None => upper_bound,
        });

        Self {
            store,
            filter,
            page_size: page_size.max(1),
            last_key: 0,
            done: false,
        }
    }

    /// Next page, or an empty page once the scan is finished
    pub async fn next_page(&mut self) -> StoreResult<Vec<Record>> {
        if self.done {
            return Ok(Vec::new());
        }

        let page = self
            .store
            .paged_scan(&self.filter, self.last_key, self.page_size)
            .await?;

        match page.last() {
            Some(last) => self.last_key = last.primary_key,
            None => self.done = true,
        }
        if page.len() < self.page_size {
            self.done = true;
        }

        Ok(page)
    }

    /// Largest key visited so far
    pub fn last_key(&self) -> i64 {
        self.last_key
    }
}
