//! Service scheduling.
//!
//! Computes when a file next needs attention. For every applicable service:
//!
//! - no service record, `run_needed`, or never run: due now
//! - run before and the definition has a frequency: due at `timestamp + frequency`
//! - run before, no frequency, not flagged: never due again
//!
//! The file's next run time is the earliest of those; deregistered files are
//! never due.

use chrono::{DateTime, Utc};

use crate::metadata::MetadataRecord;
use crate::service::ServiceDefinition;

/// When a service (or file) becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    /// Due immediately
    Now,
    /// Due at the given time
    At(DateTime<Utc>),
}

impl NextRun {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            NextRun::Now => true,
            NextRun::At(ts) => *ts <= now,
        }
    }

    /// The earlier of two due times; `Now` precedes everything.
    pub fn earliest(self, other: NextRun) -> NextRun {
        match (self, other) {
            (NextRun::Now, _) | (_, NextRun::Now) => NextRun::Now,
            (NextRun::At(a), NextRun::At(b)) => NextRun::At(a.min(b)),
        }
    }
}

/// Due time contributed by one service, or `None` if it will not run again.
pub fn service_next_run(record: &MetadataRecord, definition: &ServiceDefinition) -> Option<NextRun> {
    let Some(service) = record.service(&definition.name) else {
        return Some(NextRun::Now);
    };

    let Some(last_run) = service.timestamp.filter(|_| !service.run_needed) else {
        return Some(NextRun::Now);
    };

    let frequency = definition.frequency.as_ref()?;
    // An unrepresentable next run is treated as never.
    frequency.after(last_run).map(NextRun::At)
}

/// Earliest due time across `definitions`, or `None` if nothing will ever be due.
pub fn next_run_time<'a>(
    record: &MetadataRecord,
    definitions: impl IntoIterator<Item = &'a ServiceDefinition>,
) -> Option<NextRun> {
    if record.is_deregistered() {
        return None;
    }

    definitions
        .into_iter()
        .filter_map(|definition| service_next_run(record, definition))
        .reduce(NextRun::earliest)
}

/// Whether a single service should run at `now`.
pub fn is_service_needed(
    record: &MetadataRecord,
    definition: &ServiceDefinition,
    now: DateTime<Utc>,
) -> bool {
    if record.is_deregistered() {
        return false;
    }
    service_next_run(record, definition).is_some_and(|next| next.is_due(now))
}

/// Concrete timestamp for storing a file's next run time.
///
/// Immediate work is anchored at the registration time (or `now` for
/// unregistered records) so that recomputing an unchanged record always
/// yields the same value and most-overdue ordering stays meaningful.
pub fn scheduled_time<'a>(
    record: &MetadataRecord,
    definitions: impl IntoIterator<Item = &'a ServiceDefinition>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match next_run_time(record, definitions)? {
        NextRun::Now => Some(record.registered_at.unwrap_or(now)),
        NextRun::At(ts) => Some(ts),
    }
}
