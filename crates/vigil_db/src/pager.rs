//! Page-at-a-time traversal of the service index.
//!
//! Rows are read in ascending `(due time, path)` order using a keyset cursor,
//! so rows that callers re-index while iterating neither shift later pages
//! nor get skipped. Rows written after the pager was created are excluded.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use vigil_model::time;

use crate::driver::{IndexDriver, IndexEntry, PageCursor, PageQuery};
use crate::error::Result;
use crate::filter::PathFilter;

/// Lazy, finite sequence of indexed paths.
pub struct PathPager {
    driver: Arc<dyn IndexDriver>,
    query: PageQuery,
    page_size: usize,
    buffer: VecDeque<IndexEntry>,
    cursor: Option<PageCursor>,
    exhausted: bool,
    /// Paths handed out during the snapshot millisecond. A caller can
    /// re-index such a path without moving its `updated` past the snapshot.
    within_snapshot: HashSet<String>,
    pages_fetched: usize,
}

impl PathPager {
    /// Paths whose next service is due at or before `as_of`.
    pub fn stale_services(
        driver: Arc<dyn IndexDriver>,
        filter: PathFilter,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self::new(driver, filter, Some(as_of))
    }

    /// Every indexed path, regardless of due time.
    pub fn registered(driver: Arc<dyn IndexDriver>, filter: PathFilter) -> Self {
        Self::new(driver, filter, None)
    }

    fn new(driver: Arc<dyn IndexDriver>, filter: PathFilter, due_by: Option<DateTime<Utc>>) -> Self {
        let page_size = driver.page_size().max(1);
        Self {
            driver,
            query: PageQuery {
                filter,
                due_by,
                snapshot: time::now(),
            },
            page_size,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
            within_snapshot: HashSet::new(),
            pages_fetched: 0,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Next matching entry, fetching another page when the buffer runs dry.
    pub async fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                if self.within_snapshot.contains(&entry.file_path) {
                    continue;
                }
                if time::now() <= self.query.snapshot {
                    self.within_snapshot.insert(entry.file_path.clone());
                }
                return Ok(Some(entry));
            }

            if self.exhausted {
                return Ok(None);
            }
            self.fill().await?;
        }
    }

    pub async fn next_path(&mut self) -> Result<Option<String>> {
        Ok(self.next_entry().await?.map(|entry| entry.file_path))
    }

    /// Drain the pager into a vector of paths.
    pub async fn collect_paths(mut self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        while let Some(path) = self.next_path().await? {
            paths.push(path);
        }
        Ok(paths)
    }

    async fn fill(&mut self) -> Result<()> {
        let page = self
            .driver
            .fetch_page(&self.query, self.cursor.as_ref(), self.page_size)
            .await?;
        self.pages_fetched += 1;

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(last.cursor());
        }

        debug!(
            rows = page.len(),
            page = self.pages_fetched,
            exhausted = self.exhausted,
            "Fetched index page"
        );
        self.buffer.extend(page);
        Ok(())
    }
}
