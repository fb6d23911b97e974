//! Error types for the index layer.

use thiserror::Error;

/// Index operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Index errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, schema)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Index configuration is unusable
    #[error("Invalid index configuration: {0}")]
    InvalidConfig(String),

    #[error("Index adapter {0} not compiled in. Rebuild with the '{1}' feature.")]
    NotCompiled(String, String),

    /// A stored value could not be decoded
    #[error("Corrupt index value: {0}")]
    Model(#[from] vigil_model::ModelError),
}

impl DbError {
    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
