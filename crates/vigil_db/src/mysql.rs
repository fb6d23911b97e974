//! MySQL / MariaDB index driver (client-server).
//!
//! MySQL folds case by default, so selection matches here are
//! case-insensitive. The path column itself is binary: two files differing
//! only in case are still two index entries.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
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
    ON DUPLICATE KEY UPDATE
        service_time = VALUES(service_time),
        updated = VALUES(updated)
"#;

/// MySQL-backed index.
pub struct MysqlIndexDriver {
    options: MySqlConnectOptions,
    pool: OnceCell<MySqlPool>,
    config_md5: String,
    page_size: usize,
}

impl MysqlIndexDriver {
    pub fn new(config: &IndexConfig, config_md5: impl Into<String>) -> Result<Self> {
        config.validate()?;

        let options = match &config.connection {
            Connection::Url(url) => MySqlConnectOptions::from_str(url)?,
            Connection::Params(params) => {
                let mut options = MySqlConnectOptions::new()
                    .host(params.host.as_deref().unwrap_or("localhost"))
                    .port(params.port.unwrap_or(3306));
                if let Some(user) = params.user.as_deref() {
                    options = options.username(user);
                }
                if let Some(password) = params.password.as_deref() {
                    options = options.password(password);
                }
                let database = params
                    .database
                    .as_deref()
                    .ok_or_else(|| DbError::invalid_config("mysql connection requires 'database'"))?;
                options.database(database)
            }
        };

        Ok(Self {
            options: options.charset("utf8mb4"),
            pool: OnceCell::new(),
            config_md5: config_md5.into(),
            page_size: config.effective_page_size(),
        })
    }

    async fn pool(&self) -> Result<&MySqlPool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = MySqlPoolOptions::new()
                    .max_connections(10)
                    .connect_with(self.options.clone())
                    .await?;
                info!("Connected to mysql index");
                Ok::<_, DbError>(pool)
            })
            .await
    }
}

fn row_to_entry(row: &MySqlRow) -> Result<IndexEntry> {
    let service_time: Option<i64> = row.try_get("service_time")?;
    Ok(IndexEntry {
        file_path: row.try_get("file_path")?,
        service_time: service_time.map(time::from_millis).transpose()?,
        updated: time::from_millis(row.try_get("updated")?)?,
    })
}

#[async_trait]
impl IndexDriver for MysqlIndexDriver {
    fn adapter(&self) -> Adapter {
        Adapter::Mysql
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
        for statement in schema::MYSQL_SETUP {
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
        let mut qb = schema::page_query::<sqlx::MySql>(query, after, limit, PrefixSyntax::LikeFolded);
        let rows = qb.build().fetch_all(pool).await?;
        rows.iter().map(row_to_entry).collect()
    }
}
