//! Per-file metadata records.
//!
//! A [`MetadataRecord`] is the in-memory form of the metadata document stored
//! alongside every managed file. It is loaded at the start of each event,
//! mutated in place and written back; the durable copy is the source of truth.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::time;

/// Top-level keys of the durable format; custom properties may not use them.
pub const RESERVED_RECORD_KEYS: &[&str] = &[
    "registered",
    "deregistered",
    "checksums",
    "file_size",
    "last_modified",
    "file_count",
    "physical_path",
    "services",
];

/// Service-level keys of the durable format.
pub const RESERVED_SERVICE_KEYS: &[&str] =
    &["timestamp", "run_needed", "failure_timestamp", "stale_replicas"];

/// Registration and service state for one managed file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// When the file was registered (None until registered)
    #[serde(rename = "registered", default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
    /// When the file was deregistered
    #[serde(rename = "deregistered", default, skip_serializing_if = "Option::is_none")]
    pub deregistered_at: Option<DateTime<Utc>>,
    /// Algorithm name -> digest
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checksums: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Number of constituent files for composite objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
    /// Physical location of composite objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_path: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceRecord>,
    /// User-defined properties
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

/// Execution state of one service for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Last successful execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Forces the next evaluation to treat the service as due
    #[serde(default)]
    pub run_needed: bool,
    /// Last failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stale_replicas: bool,
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self) -> bool {
        self.registered_at.is_some()
    }

    pub fn is_deregistered(&self) -> bool {
        self.deregistered_at.is_some()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceRecord> {
        self.services.get(name)
    }

    pub fn service_mut(&mut self, name: &str) -> Option<&mut ServiceRecord> {
        self.services.get_mut(name)
    }

    /// Insert an empty service record unless one already exists.
    pub fn add_service(&mut self, name: &str) -> &mut ServiceRecord {
        self.services.entry(name.to_string()).or_default()
    }

    /// Record a successful run of `name` now.
    pub fn update_service_as_performed(&mut self, name: &str) {
        self.update_service_as_performed_at(name, time::now());
    }

    /// Record a successful run at `at`: sets the timestamp and clears the
    /// run-needed flag and any failure timestamp.
    pub fn update_service_as_performed_at(&mut self, name: &str, at: DateTime<Utc>) {
        let service = self.add_service(name);
        service.timestamp = Some(at);
        service.run_needed = false;
        service.failure_timestamp = None;
    }

    /// Record a failed run at `at`; the last success is left untouched.
    pub fn update_service_as_failed_at(&mut self, name: &str, at: DateTime<Utc>) {
        self.add_service(name).failure_timestamp = Some(at);
    }

    /// Set a custom property, rejecting names used by the durable format.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if RESERVED_RECORD_KEYS.contains(&key.as_str()) {
            return Err(ModelError::ReservedProperty(key));
        }
        self.properties.insert(key, value.into());
        Ok(())
    }
}

impl ServiceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if RESERVED_SERVICE_KEYS.contains(&key.as_str()) {
            return Err(ModelError::ReservedProperty(key));
        }
        self.properties.insert(key, value.into());
        Ok(())
    }
}
