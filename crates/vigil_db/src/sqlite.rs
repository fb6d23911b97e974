//! SQLite index driver (embedded, file-based).

use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use vigil_model::{schedule, time, MetadataRecord, ServiceDefinition};

use crate::config::{Adapter, Connection, IndexConfig};
use crate::driver::{
    is_state_stale, software_version, IndexDriver, IndexEntry, IndexState, PageCursor, PageQuery,
};
use crate::error::{DbError, Result};
use crate::schema::{self, PrefixSyntax};

const UPSERT_ENTRY: &str = r#"
    INSERT INTO service_index (file_path, service_time, updated)
    VALUES (?, ?, ?)
    ON CONFLICT(file_path) DO UPDATE SET
        service_time = excluded.service_time,
        updated = excluded.updated
"#;

/// SQLite-backed index.
///
/// The pool is opened lazily on first use and shared for the driver's lifetime.
pub struct SqliteIndexDriver {
    options: SqliteConnectOptions,
    db_path: Option<PathBuf>,
    in_memory: bool,
    pool: OnceCell<SqlitePool>,
    config_md5: String,
    page_size: usize,
}

impl SqliteIndexDriver {
    pub fn new(config: &IndexConfig, config_md5: impl Into<String>) -> Result<Self> {
        config.validate()?;

        let (options, db_path, in_memory) = match &config.connection {
            Connection::Url(url) if url.starts_with("sqlite:") => {
                let in_memory = url.contains(":memory:") || url.contains("mode=memory");
                let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
                let db_path = (!in_memory).then(|| options.get_filename().to_path_buf());
                (options, db_path, in_memory)
            }
            Connection::Url(path) => Self::file_options(PathBuf::from(path)),
            Connection::Params(params) => {
                let path = params
                    .path
                    .as_ref()
                    .or(params.database.as_ref())
                    .ok_or_else(|| DbError::invalid_config("sqlite connection requires 'path'"))?;
                Self::file_options(PathBuf::from(path))
            }
        };

        Ok(Self {
            options,
            db_path,
            in_memory,
            pool: OnceCell::new(),
            config_md5: config_md5.into(),
            page_size: config.effective_page_size(),
        })
    }

    fn file_options(path: PathBuf) -> (SqliteConnectOptions, Option<PathBuf>, bool) {
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        (options, Some(path), false)
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                if let Some(parent) = self.db_path.as_ref().and_then(|p| p.parent()) {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }

                let mut pool_options = SqlitePoolOptions::new();
                pool_options = if self.in_memory {
                    // A memory database lives only as long as its single connection.
                    pool_options
                        .max_connections(1)
                        .min_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    pool_options.max_connections(5)
                };

                let pool = pool_options.connect_with(self.options.clone()).await?;
                apply_sqlite_optimizations(&pool).await?;

                info!(
                    path = ?self.db_path,
                    in_memory = self.in_memory,
                    "Connected to sqlite index"
                );
                Ok::<_, DbError>(pool)
            })
            .await
    }
}

/// Apply SQLite-specific optimizations.
async fn apply_sqlite_optimizations(pool: &SqlitePool) -> Result<()> {
    // WAL mode for better concurrent access
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL").execute(pool).await?;
    Ok(())
}

fn row_to_entry(row: &SqliteRow) -> Result<IndexEntry> {
    let service_time: Option<i64> = row.try_get("service_time")?;
    Ok(IndexEntry {
        file_path: row.try_get("file_path")?,
        service_time: service_time.map(time::from_millis).transpose()?,
        updated: time::from_millis(row.try_get("updated")?)?,
    })
}

#[async_trait]
impl IndexDriver for SqliteIndexDriver {
    fn adapter(&self) -> Adapter {
        Adapter::Sqlite
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn config_md5(&self) -> &str {
        &self.config_md5
    }

    async fn is_stale(&self) -> Result<bool> {
        let state = self.index_state().await?;
        Ok(is_state_stale(state.as_ref(), &self.config_md5))
    }

    async fn index(
        &self,
        path: &str,
        record: &MetadataRecord,
        services: &[&ServiceDefinition],
    ) -> Result<()> {
        let pool = self.pool().await?;
        let now = time::now();
        let service_time = schedule::scheduled_time(record, services.iter().copied(), now);

        sqlx::query(UPSERT_ENTRY)
            .bind(path)
            .bind(service_time.as_ref().map(time::to_millis))
            .bind(time::to_millis(&now))
            .execute(pool)
            .await?;

        debug!(path, service_time = ?service_time, "Indexed file");
        Ok(())
    }

    async fn setup_index(&self) -> Result<()> {
        let pool = self.pool().await?;
        for statement in schema::SQLITE_SETUP {
            sqlx::query(statement).execute(pool).await?;
        }

        sqlx::query(
            "INSERT INTO index_state (config_md5, last_reindexed, software_version) VALUES (?, NULL, ?)",
        )
        .bind(&self.config_md5)
        .bind(software_version())
        .execute(pool)
        .await?;

        info!(tables = ?[schema::INDEX_TABLE, schema::STATE_TABLE], "Index schema created");
        Ok(())
    }

    async fn update_index_state(&self) -> Result<()> {
        let pool = self.pool().await?;
        let now = time::now();

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM index_state").execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO index_state (config_md5, last_reindexed, software_version) VALUES (?, ?, ?)",
        )
        .bind(&self.config_md5)
        .bind(time::to_millis(&now))
        .bind(software_version())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(config_md5 = %self.config_md5, "Index state updated");
        Ok(())
    }

    async fn index_state(&self) -> Result<Option<IndexState>> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            "SELECT config_md5, last_reindexed, software_version FROM index_state LIMIT 1",
        )
        .fetch_optional(pool)
        .await?;

        match row {
            Some(row) => {
                let last_reindexed: Option<i64> = row.try_get("last_reindexed")?;
                Ok(Some(IndexState {
                    config_md5: row.try_get("config_md5")?,
                    last_reindexed: last_reindexed.map(time::from_millis).transpose()?,
                    software_version: row.try_get("software_version")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn clear_index(&self, before: DateTime<Utc>) -> Result<u64> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM service_index WHERE updated < ?")
            .bind(time::to_millis(&before))
            .execute(pool)
            .await?;

        let removed = result.rows_affected();
        info!(removed, before = %before, "Cleared stale index entries");
        Ok(removed)
    }

    async fn entry(&self, path: &str) -> Result<Option<IndexEntry>> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            "SELECT file_path, service_time, updated FROM service_index WHERE file_path = ?",
        )
        .bind(path)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn fetch_page(
        &self,
        query: &PageQuery,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<IndexEntry>> {
        let pool = self.pool().await?;
        let mut qb = schema::page_query::<sqlx::Sqlite>(query, after, limit, PrefixSyntax::Glob);
        let rows = qb.build().fetch_all(pool).await?;
        rows.iter().map(row_to_entry).collect()
    }
}
