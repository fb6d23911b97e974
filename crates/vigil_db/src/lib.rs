//! Service index for vigil.
//!
//! The index records, for every managed file, the earliest time one of its
//! preservation services is due. Backends are selected by feature flag and
//! by the `adapter` tag in configuration:
//!
//! - `sqlite` (default): embedded file-based index
//! - `postgres`: client-server index
//! - `mysql`: client-server index on MySQL or MariaDB
//!
//! # Usage
//!
//! ```rust,ignore
//! use vigil_db::{open_index_driver, IndexConfig, PathFilter, PathPager};
//!
//! let driver = open_index_driver(&IndexConfig::sqlite("index.sqlite3"), &md5)?;
//! driver.setup_index().await?;
//!
//! let mut due = PathPager::stale_services(driver.clone(), PathFilter::all(), vigil_model::time::now());
//! while let Some(path) = due.next_path().await? {
//!     // ...
//! }
//! ```

mod config;
mod driver;
mod error;
mod filter;
mod pager;
mod schema;

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::sync::Arc;

pub use config::{Adapter, Connection, ConnectionParams, IndexConfig, DEFAULT_PAGE_SIZE};
pub use driver::{IndexDriver, IndexEntry, IndexState, PageCursor, PageQuery, NULL_SORT_KEY};
pub use error::{DbError, Result};
pub use filter::{glob_prefix_pattern, like_prefix_pattern, PathFilter, PathPattern};
pub use pager::PathPager;

#[cfg(feature = "mysql")]
pub use mysql::MysqlIndexDriver;
#[cfg(feature = "postgres")]
pub use postgres::PostgresIndexDriver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteIndexDriver;

/// Build the driver selected by `config.adapter`.
///
/// No connection is made until the driver is first used.
pub fn open_index_driver(config: &IndexConfig, config_md5: &str) -> Result<Arc<dyn IndexDriver>> {
    match config.adapter {
        #[cfg(feature = "sqlite")]
        Adapter::Sqlite => Ok(Arc::new(SqliteIndexDriver::new(config, config_md5)?)),
        #[cfg(feature = "postgres")]
        Adapter::Postgres => Ok(Arc::new(PostgresIndexDriver::new(config, config_md5)?)),
        #[cfg(feature = "mysql")]
        Adapter::Mysql => Ok(Arc::new(MysqlIndexDriver::new(config, config_md5)?)),
        #[allow(unreachable_patterns)]
        other => Err(DbError::NotCompiled(
            other.name().to_string(),
            other.feature().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn test_adapter_without_feature_is_reported() {
        let config = IndexConfig::from_url("mysql://db/vigil").unwrap();
        match open_index_driver(&config, "md5") {
            Err(DbError::NotCompiled(adapter, feature)) => {
                assert_eq!(adapter, "mysql");
                assert_eq!(feature, "mysql");
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("mysql driver should not be available"),
        }
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_adapter_opens_lazily() {
        let driver = open_index_driver(&IndexConfig::sqlite_memory(), "md5").unwrap();
        assert_eq!(driver.adapter(), Adapter::Sqlite);
    }
}
