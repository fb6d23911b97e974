//! Per-file event processing.
//!
//! Each method handles one file for one event and reports its outcome to the
//! [`StatusTracker`]. Errors returned concern that file only unless
//! [`VigilError::is_fatal`] says otherwise.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use vigil_model::{is_service_needed, time, EventKind, MetadataRecord, ServiceDefinition};
use walkdir::WalkDir;

use crate::context::AppContext;
use crate::error::{Result, VigilError};
use crate::record::{index_key, FileRecord};
use crate::services::ServiceError;
use crate::status::{OutcomeKind, StatusTracker};

pub struct EventEngine<'a> {
    ctx: &'a AppContext,
}

impl<'a> EventEngine<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        Self { ctx }
    }

    /// Create (or with `force`, recreate) the file's metadata record.
    pub async fn register(
        &self,
        file: &mut FileRecord,
        force: bool,
        checksums: &BTreeMap<String, String>,
        tracker: &mut StatusTracker,
    ) -> Result<()> {
        let serializer = self.ctx.serializer();
        let path = file.path().to_path_buf();

        let previous = if file.metadata_exists(serializer)? {
            Some(file.load_metadata(serializer)?.clone())
        } else {
            None
        };
        if let Some(previous) = &previous {
            if previous.is_registered() && !force {
                return Err(VigilError::registration(
                    &path,
                    "already registered (use --force to re-register)",
                ));
            }
        }

        if self.ctx.index().is_some() {
            file.index_key()?;
        }

        let physical = file.physical_path()?;
        let attrs = fs::metadata(&physical).map_err(|e| {
            VigilError::registration(&path, format!("cannot read {}: {}", physical.display(), e))
        })?;

        let mut record = MetadataRecord::new();
        record.registered_at = Some(time::now());
        if attrs.is_dir() {
            let summary = summarize_directory(&physical)?;
            record.file_size = Some(summary.total_size);
            record.file_count = Some(summary.file_count);
            record.last_modified = summary.last_modified;
            record.physical_path = Some(physical.to_string_lossy().into_owned());
        } else {
            record.file_size = Some(attrs.len());
            record.last_modified = attrs.modified().ok().map(system_time_to_utc);
        }

        for definition in self.ctx.services().definitions_for_location(file.location().name()) {
            record.add_service(&definition.name);
        }

        if let Some(previous) = previous {
            record.properties = previous.properties;
            for (name, service) in previous.services {
                if service.stale_replicas {
                    if let Some(current) = record.service_mut(&name) {
                        current.stale_replicas = true;
                    }
                }
            }
        }

        for (algorithm, digest) in checksums {
            record
                .checksums
                .insert(algorithm.to_ascii_lowercase(), digest.trim().to_ascii_lowercase());
        }

        file.set_metadata(record);
        self.save(file).await?;

        tracker.success(Some(&path), if force { "re-registered" } else { "registered" });
        Ok(())
    }

    /// Mark the file as no longer managed. Its metadata is kept.
    pub async fn deregister(&self, file: &mut FileRecord, force: bool, tracker: &mut StatusTracker) -> Result<()> {
        let serializer = self.ctx.serializer();
        let path = file.path().to_path_buf();

        if !file.metadata_exists(serializer)? {
            return Err(VigilError::deregistration(&path, "file is not registered"));
        }
        let record = file.load_metadata(serializer)?;
        if !record.is_registered() {
            return Err(VigilError::deregistration(&path, "file is not registered"));
        }
        if record.is_deregistered() && !force {
            return Err(VigilError::deregistration(&path, "file is already deregistered"));
        }
        record.deregistered_at = Some(time::now());

        self.save(file).await?;

        tracker.success(Some(&path), "deregistered");
        Ok(())
    }

    /// Run every applicable, due service (or every applicable service with
    /// `force`) for a preserve or verify event.
    pub async fn run_services(
        &self,
        file: &mut FileRecord,
        event: EventKind,
        force: bool,
        tracker: &mut StatusTracker,
    ) -> Result<()> {
        let serializer = self.ctx.serializer();
        let path = file.path().to_path_buf();

        let record = file.load_metadata(serializer)?;
        if record.is_deregistered() {
            tracker.skipped(Some(&path), "file is deregistered");
            return Ok(());
        }
        if !record.is_registered() {
            return Err(VigilError::metadata(&path, "record has no registration time"));
        }

        let definitions: Vec<ServiceDefinition> = self
            .ctx
            .services()
            .applicable_definitions(file.location().name(), event)
            .into_iter()
            .cloned()
            .collect();

        let now = time::now();
        let mut performed = 0usize;
        let mut failed: Vec<String> = Vec::new();
        let mut aborted: Option<(String, anyhow::Error)> = None;

        for definition in &definitions {
            if !force && !is_service_needed(loaded(file)?, definition, now) {
                debug!(path = %path.display(), service = %definition.name, "Service not due");
                continue;
            }
            let Some(service) = self.ctx.services().implementation(&definition.name) else {
                continue;
            };

            debug!(path = %path.display(), service = %definition.name, event = %event, "Performing service");
            let result = service.perform(file, event).await;
            let record = loaded_mut(file)?;
            match result {
                Ok(()) => {
                    record.update_service_as_performed(&definition.name);
                    performed += 1;
                    tracker.service_outcome(OutcomeKind::Success, &path, &definition.name, "performed");
                }
                Err(ServiceError::Preservation(reason)) => {
                    record.update_service_as_failed_at(&definition.name, time::now());
                    failed.push(definition.name.clone());
                    tracker.service_outcome(OutcomeKind::Failure, &path, &definition.name, reason);
                }
                Err(ServiceError::Unrecoverable(cause)) => {
                    record.update_service_as_failed_at(&definition.name, time::now());
                    tracker.service_outcome(
                        OutcomeKind::Failure,
                        &path,
                        &definition.name,
                        format!("{:#}", cause),
                    );
                    aborted = Some((definition.name.clone(), cause));
                    break;
                }
            }
        }

        let attempted = performed + failed.len() + usize::from(aborted.is_some());
        let saved = if attempted > 0 { self.save(file).await } else { Ok(()) };

        if let Some((service, cause)) = aborted {
            let cause = match saved {
                Ok(()) => cause,
                Err(err) if err.is_fatal() => {
                    let aborted = VigilError::ServiceAborted { path: path.clone(), service, cause };
                    tracker.failure(Some(&path), aborted.to_string());
                    return Err(err);
                }
                Err(err) => cause.context(format!("metadata not saved ({})", err)),
            };
            return Err(VigilError::ServiceAborted { path, service, cause });
        }
        saved?;
        if !failed.is_empty() {
            return Err(VigilError::PreservationService { path, services: failed });
        }
        if performed == 0 {
            tracker.skipped(Some(&path), "no services due");
        } else {
            tracker.success(Some(&path), format!("{} service(s) performed", performed));
        }
        Ok(())
    }

    async fn save(&self, file: &FileRecord) -> Result<()> {
        file.persist_metadata(self.ctx.serializer())?;
        self.ctx.index_file(file).await
    }

    /// Rebuild the index from every metadata document on disk.
    ///
    /// Entries not rewritten by this pass are removed afterwards. Returns the
    /// number of files indexed.
    pub async fn reindex(&self) -> Result<usize> {
        let driver = self.ctx.require_index()?;
        let started = time::now();
        let mut indexed = 0usize;

        for location in self.ctx.locations().all() {
            let definitions = self.ctx.services().definitions_for_location(location.name());
            for entry in WalkDir::new(location.metadata_path()).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(path) = location.path_for_metadata(entry.path()) else {
                    continue;
                };
                let record = self.ctx.serializer().load(entry.path())?;
                driver.index(index_key(&path)?, &record, &definitions).await?;
                indexed += 1;
            }
            debug!(location = %location.name(), "Location indexed");
        }

        let removed = driver.clear_index(started).await?;
        driver.update_index_state().await?;
        info!(indexed, removed, "Reindex complete");
        Ok(indexed)
    }

    pub async fn setup_index(&self) -> Result<()> {
        let driver = self.ctx.require_index()?;
        driver.setup_index().await?;
        info!(adapter = %driver.adapter(), "Index initialized");
        Ok(())
    }
}

fn loaded(file: &FileRecord) -> Result<&MetadataRecord> {
    let path = file.path();
    file.metadata()
        .ok_or_else(|| VigilError::metadata(path, "metadata not loaded"))
}

fn loaded_mut(file: &mut FileRecord) -> Result<&mut MetadataRecord> {
    let path = file.path().to_path_buf();
    file.metadata_mut()
        .ok_or_else(|| VigilError::metadata(path, "metadata not loaded"))
}

fn system_time_to_utc(ts: std::time::SystemTime) -> DateTime<Utc> {
    time::truncate_millis(DateTime::<Utc>::from(ts))
}

/// Aggregate attributes of a composite object.
struct DirectorySummary {
    total_size: u64,
    file_count: u64,
    last_modified: Option<DateTime<Utc>>,
}

fn summarize_directory(dir: &Path) -> Result<DirectorySummary> {
    let mut summary = DirectorySummary {
        total_size: 0,
        file_count: 0,
        last_modified: None,
    };
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let attrs = entry.metadata()?;
        summary.total_size += attrs.len();
        summary.file_count += 1;
        if let Ok(modified) = attrs.modified() {
            let modified = system_time_to_utc(modified);
            if summary.last_modified.map_or(true, |latest| modified > latest) {
                summary.last_modified = Some(modified);
            }
        }
    }
    Ok(summary)
}
