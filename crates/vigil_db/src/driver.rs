//! The index driver capability.
//!
//! An index maps every managed file path to the earliest time any of its
//! services is due, so that callers can find due files without walking
//! storage. Implementations are interchangeable; each backend provides one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vigil_model::{time, MetadataRecord, ServiceDefinition};

use crate::config::Adapter;
use crate::error::Result;
use crate::filter::PathFilter;

/// Sort key used for entries with no due time, so they order last.
pub const NULL_SORT_KEY: i64 = i64::MAX;

/// One row of the service index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub file_path: String,
    /// Earliest due time; `None` when nothing will ever be due
    pub service_time: Option<DateTime<Utc>>,
    /// When the row was last written
    pub updated: DateTime<Utc>,
}

impl IndexEntry {
    pub fn sort_key(&self) -> i64 {
        self.service_time
            .as_ref()
            .map(time::to_millis)
            .unwrap_or(NULL_SORT_KEY)
    }

    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            sort_key: self.sort_key(),
            file_path: self.file_path.clone(),
        }
    }
}

/// The singleton index state row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexState {
    pub config_md5: String,
    pub last_reindexed: Option<DateTime<Utc>>,
    pub software_version: String,
}

/// Position after the last row of a page, in `(sort key, path)` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub sort_key: i64,
    pub file_path: String,
}

/// What a paged index query selects.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub filter: PathFilter,
    /// Only rows due at or before this time; `None` selects every row
    pub due_by: Option<DateTime<Utc>>,
    /// Rows written after this instant are excluded
    pub snapshot: DateTime<Utc>,
}

#[async_trait]
pub trait IndexDriver: Send + Sync {
    fn adapter(&self) -> Adapter;

    /// Rows fetched per page by [`crate::PathPager`].
    fn page_size(&self) -> usize;

    /// Fingerprint of the configuration this driver was built for.
    fn config_md5(&self) -> &str;

    /// True when the stored fingerprint differs from the current one, or
    /// the index has never been fully rebuilt.
    async fn is_stale(&self) -> Result<bool>;

    /// Recompute the file's next run time and upsert its entry.
    async fn index(
        &self,
        path: &str,
        record: &MetadataRecord,
        services: &[&ServiceDefinition],
    ) -> Result<()>;

    /// Recreate the index schema and write an initial state row.
    async fn setup_index(&self) -> Result<()>;

    /// Mark the index as freshly rebuilt for the current configuration.
    async fn update_index_state(&self) -> Result<()>;

    async fn index_state(&self) -> Result<Option<IndexState>>;

    /// Delete entries last written before `before`; returns rows removed.
    async fn clear_index(&self, before: DateTime<Utc>) -> Result<u64>;

    async fn entry(&self, path: &str) -> Result<Option<IndexEntry>>;

    /// One page of matching rows strictly after `after`, ascending by due time.
    async fn fetch_page(
        &self,
        query: &PageQuery,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<IndexEntry>>;
}

pub(crate) fn software_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub(crate) fn is_state_stale(state: Option<&IndexState>, current_md5: &str) -> bool {
    match state {
        None => true,
        Some(state) => state.config_md5 != current_md5 || state.last_reindexed.is_none(),
    }
}
