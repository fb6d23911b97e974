//! Error types for vigil operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VigilError>;

#[derive(Error, Debug)]
pub enum VigilError {
    /// Bad or missing configuration; raised before any I/O
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage location '{name}' is unavailable: {reason}")]
    StorageLocationUnavailable { name: String, reason: String },

    #[error("Path {} is not within any configured storage location", .0.display())]
    InvalidStoragePath(PathBuf),

    #[error("Cannot register {}: {reason}", .path.display())]
    Registration { path: PathBuf, reason: String },

    #[error("Cannot deregister {}: {reason}", .path.display())]
    Deregistration { path: PathBuf, reason: String },

    #[error("Metadata error for {}: {reason}", .path.display())]
    Metadata { path: PathBuf, reason: String },

    /// One or more services reported an expected failure
    #[error("Preservation failed for {}: {}", .path.display(), .services.join(", "))]
    PreservationService { path: PathBuf, services: Vec<String> },

    /// A service failed unexpectedly; remaining services were not attempted
    #[error("Service '{service}' aborted processing of {}: {cause:#}", .path.display())]
    ServiceAborted {
        path: PathBuf,
        service: String,
        cause: anyhow::Error,
    },

    #[error("Index error: {0}")]
    Index(#[from] vigil_db::DbError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl VigilError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn registration(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Registration {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn deregistration(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Deregistration {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Errors that abort a whole operation rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VigilError::Configuration(_)
                | VigilError::StorageLocationUnavailable { .. }
                | VigilError::Index(_)
        )
    }

    /// The file an error is about, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            VigilError::InvalidStoragePath(path)
            | VigilError::Registration { path, .. }
            | VigilError::Deregistration { path, .. }
            | VigilError::Metadata { path, .. }
            | VigilError::PreservationService { path, .. }
            | VigilError::ServiceAborted { path, .. } => Some(path),
            VigilError::Walk(err) => err.path(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(VigilError::configuration("bad").is_fatal());
        assert!(VigilError::StorageLocationUnavailable {
            name: "loc1".into(),
            reason: "gone".into()
        }
        .is_fatal());
        assert!(!VigilError::registration("/data/a", "already registered").is_fatal());
        assert!(!VigilError::InvalidStoragePath(PathBuf::from("/elsewhere")).is_fatal());
    }

    #[test]
    fn test_aborted_service_keeps_cause_chain() {
        let cause = anyhow::anyhow!("disk exploded").context("reading content");
        let err = VigilError::ServiceAborted {
            path: PathBuf::from("/data/a.txt"),
            service: "fixity".into(),
            cause,
        };
        let message = err.to_string();
        assert!(message.contains("reading content"));
        assert!(message.contains("disk exploded"));
        assert_eq!(err.path(), Some(Path::new("/data/a.txt")));
    }
}
