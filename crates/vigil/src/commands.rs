//! Top-level operations.
//!
//! Event commands share one loop: validate the selection, check the touched
//! locations, then hand each candidate to the [`EventEngine`]. Per-file
//! failures are reported and counted; fatal errors end the command.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, error, info};
use vigil_model::EventKind;

use crate::config::VigilConfig;
use crate::context::AppContext;
use crate::engine::EventEngine;
use crate::error::{Result, VigilError};
use crate::locator::CandidateLocator;
use crate::selector::FileSelector;
use crate::status::{CommandStatus, StatusTracker};

/// Options shared by the event commands.
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    pub force: bool,
    /// Digests supplied at registration, by algorithm name
    pub checksums: BTreeMap<String, String>,
}

impl EventOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// Parse `alg:digest[,alg:digest...]`.
pub fn parse_checksums<S: AsRef<str>>(values: &[S]) -> Result<BTreeMap<String, String>> {
    let mut checksums = BTreeMap::new();
    for value in values {
        let value = value.as_ref().trim();
        if value.is_empty() {
            continue;
        }
        let (algorithm, digest) = value.split_once(':').ok_or_else(|| {
            VigilError::configuration(format!("checksum '{}' must be written as algorithm:digest", value))
        })?;
        if algorithm.trim().is_empty() || digest.trim().is_empty() {
            return Err(VigilError::configuration(format!(
                "checksum '{}' must be written as algorithm:digest",
                value
            )));
        }
        checksums.insert(algorithm.trim().to_ascii_lowercase(), digest.trim().to_string());
    }
    Ok(checksums)
}

pub async fn setup_index(ctx: &AppContext) -> Result<CommandStatus> {
    EventEngine::new(ctx).setup_index().await?;
    Ok(CommandStatus::Success)
}

pub async fn reindex(ctx: &AppContext) -> Result<CommandStatus> {
    ctx.require_index()?;
    ctx.check_available(ctx.locations().all())?;
    let indexed = EventEngine::new(ctx).reindex().await?;
    info!(indexed, "Index rebuilt");
    Ok(CommandStatus::Success)
}

pub async fn register(ctx: &AppContext, selector: &FileSelector, options: &EventOptions) -> Result<CommandStatus> {
    run_event(ctx, selector, EventKind::Register, options).await
}

pub async fn deregister(ctx: &AppContext, selector: &FileSelector, options: &EventOptions) -> Result<CommandStatus> {
    run_event(ctx, selector, EventKind::Deregister, options).await
}

pub async fn preserve(ctx: &AppContext, selector: &FileSelector, options: &EventOptions) -> Result<CommandStatus> {
    run_event(ctx, selector, EventKind::Preserve, options).await
}

pub async fn verify(ctx: &AppContext, selector: &FileSelector, options: &EventOptions) -> Result<CommandStatus> {
    run_event(ctx, selector, EventKind::Verify, options).await
}

/// Load and validate a configuration file without touching any location.
pub fn validate_config(path: &Path) -> Result<CommandStatus> {
    let config = VigilConfig::load(path)?;
    info!(
        path = %path.display(),
        locations = config.locations.len(),
        services = config.services.len(),
        "Configuration is valid"
    );
    Ok(CommandStatus::Success)
}

async fn run_event(
    ctx: &AppContext,
    selector: &FileSelector,
    event: EventKind,
    options: &EventOptions,
) -> Result<CommandStatus> {
    let locations = selector.locations(ctx.locations())?;
    ctx.check_available(&locations)?;

    let engine = EventEngine::new(ctx);
    let mut tracker = StatusTracker::new(event, ctx.sink());
    let mut candidates = CandidateLocator::new(ctx, selector, event, options.force).await?;
    debug!(event = %event, strategy = ?candidates.strategy(), "Processing candidates");

    loop {
        let mut file = match candidates.next_candidate().await {
            Ok(Some(file)) => file,
            Ok(None) => break,
            Err(err) if err.is_fatal() => return Err(abort(event, err)),
            Err(err) => {
                tracker.failure(err.path(), err.to_string());
                continue;
            }
        };

        let result = match event {
            EventKind::Register => {
                engine
                    .register(&mut file, options.force, &options.checksums, &mut tracker)
                    .await
            }
            EventKind::Deregister => engine.deregister(&mut file, options.force, &mut tracker).await,
            EventKind::Preserve | EventKind::Verify => {
                engine.run_services(&mut file, event, options.force, &mut tracker).await
            }
            EventKind::Reindex => Err(VigilError::configuration("reindex does not select files")),
        };

        match result {
            Ok(()) => {}
            Err(err) if err.is_fatal() => return Err(abort(event, err)),
            Err(err) => tracker.failure(Some(file.path()), err.to_string()),
        }
    }

    Ok(tracker.finish())
}

fn abort(event: EventKind, err: VigilError) -> VigilError {
    error!(event = %event, error = %err, "Operation aborted");
    err
}
