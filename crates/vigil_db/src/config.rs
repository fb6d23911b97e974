//! Index configuration.
//!
//! The adapter tag selects the backend at startup; connection parameters are
//! either a URL string or a structured map:
//!
//! ```yaml
//! index:
//!   adapter: sqlite
//!   connection: /var/lib/vigil/index.sqlite3
//!   page_size: 500
//! ```
//!
//! ```yaml
//! index:
//!   adapter: postgres
//!   connection: { host: db, port: 5432, user: vigil, password: secret, database: vigil }
//! ```
//!
//! ```yaml
//! index:
//!   adapter: mysql
//!   connection: mysql://vigil:secret@db/vigil
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{DbError, Result};

/// Page size used when none (or a non-positive one) is configured.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Supported index backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Adapter {
    /// Embedded file-based engine
    Sqlite,
    /// Client-server engine
    Postgres,
    /// Client-server engine; string comparison case-folds by default
    Mysql,
}

impl Adapter {
    pub fn name(&self) -> &'static str {
        match self {
            Adapter::Sqlite => "sqlite",
            Adapter::Postgres => "postgres",
            Adapter::Mysql => "mysql",
        }
    }

    /// Cargo feature that compiles this adapter in.
    pub fn feature(&self) -> &'static str {
        self.name()
    }

    /// Detect adapter from a connection URL.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("sqlite:") {
            Some(Adapter::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Adapter::Postgres)
        } else if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Some(Adapter::Mysql)
        } else {
            None
        }
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Adapter {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Adapter::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Adapter::Postgres),
            "mysql" | "mariadb" => Ok(Adapter::Mysql),
            other => Err(DbError::invalid_config(format!("unknown adapter '{}'", other))),
        }
    }
}

impl TryFrom<String> for Adapter {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Connection parameters, as a URL or a structured map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Connection {
    Url(String),
    Params(ConnectionParams),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionParams {
    /// Database file (sqlite)
    pub path: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

/// Index driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexConfig {
    pub adapter: Adapter,
    pub connection: Connection,
    #[serde(default)]
    pub page_size: Option<i64>,
}

impl IndexConfig {
    /// SQLite index stored at `path`.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            adapter: Adapter::Sqlite,
            connection: Connection::Params(ConnectionParams {
                path: Some(path.into()),
                ..Default::default()
            }),
            page_size: None,
        }
    }

    /// In-memory SQLite index (for testing).
    pub fn sqlite_memory() -> Self {
        Self {
            adapter: Adapter::Sqlite,
            connection: Connection::Url("sqlite::memory:".to_string()),
            page_size: None,
        }
    }

    /// Create configuration from a URL, auto-detecting the adapter.
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let adapter = Adapter::from_url(&url)
            .ok_or_else(|| DbError::invalid_config(format!("unrecognised URL '{}'", url)))?;
        Ok(Self {
            adapter,
            connection: Connection::Url(url),
            page_size: None,
        })
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Configured page size, falling back to [`DEFAULT_PAGE_SIZE`] when absent or non-positive.
    pub fn effective_page_size(&self) -> usize {
        match self.page_size {
            Some(size) if size > 0 => usize::try_from(size).unwrap_or(DEFAULT_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    /// Check that the connection parameters make sense for the adapter.
    pub fn validate(&self) -> Result<()> {
        match (&self.adapter, &self.connection) {
            (Adapter::Sqlite, Connection::Url(url)) if url.trim().is_empty() => {
                Err(DbError::invalid_config("sqlite connection is empty"))
            }
            (Adapter::Sqlite, Connection::Params(params)) if params.path.is_none() && params.database.is_none() => {
                Err(DbError::invalid_config("sqlite connection requires 'path'"))
            }
            (Adapter::Postgres, Connection::Url(url)) if Adapter::from_url(url) != Some(Adapter::Postgres) => {
                Err(DbError::invalid_config(format!("'{}' is not a postgres URL", url)))
            }
            (Adapter::Postgres | Adapter::Mysql, Connection::Params(params)) if params.database.is_none() => {
                Err(DbError::invalid_config(format!("{} connection requires 'database'", self.adapter)))
            }
            (Adapter::Mysql, Connection::Url(url)) if Adapter::from_url(url) != Some(Adapter::Mysql) => {
                Err(DbError::invalid_config(format!("'{}' is not a mysql URL", url)))
            }
            _ => Ok(()),
        }
    }
}
