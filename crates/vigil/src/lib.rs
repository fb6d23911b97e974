//! Vigil - digital preservation control plane.
//!
//! Registers files under configured storage locations, records their
//! fixity and service history in per-file metadata documents, and runs
//! preservation services on a schedule. An optional service index (see
//! `vigil_db`) answers "what is due" without walking every location.

pub mod commands;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod locator;
pub mod metadata_io;
pub mod record;
pub mod selector;
pub mod services;
pub mod status;
pub mod storage;

pub use commands::EventOptions;
pub use config::VigilConfig;
pub use context::AppContext;
pub use engine::EventEngine;
pub use error::{Result, VigilError};
pub use locator::{CandidateLocator, Strategy};
pub use record::FileRecord;
pub use selector::{FileSelector, Scope, Target};
pub use services::{PreservationService, ServiceError, ServiceManager, ServiceRegistry};
pub use status::{CapturingSink, CommandStatus, Outcome, OutcomeKind, OutcomeSink, StatusTracker, TracingSink};
pub use storage::{FilesystemLocation, LocationManager, StorageLocation};
