//! Vigil data model.
//!
//! Pure data types shared by the index driver and the event engine:
//!
//! - [`MetadataRecord`] / [`ServiceRecord`]: one managed file's registration and
//!   service-execution state, the unit persisted next to each file.
//! - [`ServiceDefinition`] / [`Frequency`]: configured services and how often they recur.
//! - [`schedule`]: the next-run-time computation used both for indexing and for
//!   the per-service "needed?" gate.
//!
//! Nothing in this crate touches the filesystem or a database.

mod error;
mod event;
mod frequency;
mod metadata;
pub mod schedule;
mod service;
pub mod time;

pub use error::{ModelError, Result};
pub use event::EventKind;
pub use frequency::Frequency;
pub use metadata::{MetadataRecord, ServiceRecord, RESERVED_RECORD_KEYS, RESERVED_SERVICE_KEYS};
pub use schedule::{is_service_needed, next_run_time, scheduled_time, service_next_run, NextRun};
pub use service::ServiceDefinition;
