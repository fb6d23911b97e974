//! Outcome reporting and aggregate status.
//!
//! Every file and service outcome is handed to an [`OutcomeSink`]; a
//! [`StatusTracker`] counts per-file outcomes and resolves the run's
//! [`CommandStatus`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use vigil_model::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Failure,
    /// Nothing to do for the file; not counted
    Skipped,
}

impl OutcomeKind {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "SUCCESS",
            OutcomeKind::Failure => "FAILURE",
            OutcomeKind::Skipped => "SKIPPED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub event: EventKind,
    pub path: Option<PathBuf>,
    /// Set for per-service outcomes
    pub service: Option<String>,
    pub message: String,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.event)?;
        if let Some(service) = &self.service {
            write!(f, " [{}]", service)?;
        }
        if let Some(path) = &self.path {
            write!(f, " {}", path.display())?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Receives every outcome as it happens.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: &Outcome);
}

/// Logs outcomes through `tracing`, optionally echoing them to stdout.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    echo: bool,
}

impl TracingSink {
    /// Sink that also prints one line per outcome to stdout.
    pub fn stdout() -> Self {
        Self { echo: true }
    }
}

impl OutcomeSink for TracingSink {
    fn record(&self, outcome: &Outcome) {
        let path = outcome
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match outcome.kind {
            OutcomeKind::Failure => warn!(
                event = %outcome.event,
                path = %path,
                service = ?outcome.service,
                "{}",
                outcome.message
            ),
            _ => info!(
                event = %outcome.event,
                path = %path,
                service = ?outcome.service,
                outcome = outcome.kind.label(),
                "{}",
                outcome.message
            ),
        }
        if self.echo {
            println!("{}", outcome);
        }
    }
}

/// Keeps outcomes in memory.
#[derive(Debug, Default)]
pub struct CapturingSink {
    outcomes: Mutex<Vec<Outcome>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes
            .lock()
            .map(|outcomes| outcomes.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes().iter().filter(|o| o.kind == kind).count()
    }
}

impl OutcomeSink for CapturingSink {
    fn record(&self, outcome: &Outcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome.clone());
        }
    }
}

/// Result of a whole command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure,
    PartialFailure,
}

impl CommandStatus {
    /// All successes (or nothing attempted) is success; all failures is
    /// failure; anything else is partial.
    pub fn from_counts(successes: usize, failures: usize) -> Self {
        match (successes, failures) {
            (_, 0) => CommandStatus::Success,
            (0, _) => CommandStatus::Failure,
            _ => CommandStatus::PartialFailure,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            CommandStatus::Success => 0,
            CommandStatus::Failure => 1,
            CommandStatus::PartialFailure => 2,
        }
    }
}

/// Per-run accumulator.
pub struct StatusTracker {
    event: EventKind,
    sink: Arc<dyn OutcomeSink>,
    successes: usize,
    failures: usize,
    skipped: usize,
}

impl StatusTracker {
    pub fn new(event: EventKind, sink: Arc<dyn OutcomeSink>) -> Self {
        Self {
            event,
            sink,
            successes: 0,
            failures: 0,
            skipped: 0,
        }
    }

    pub fn success(&mut self, path: Option<&Path>, message: impl Into<String>) {
        self.successes += 1;
        self.emit(OutcomeKind::Success, path, None, message.into());
    }

    pub fn failure(&mut self, path: Option<&Path>, message: impl Into<String>) {
        self.failures += 1;
        self.emit(OutcomeKind::Failure, path, None, message.into());
    }

    pub fn skipped(&mut self, path: Option<&Path>, message: impl Into<String>) {
        self.skipped += 1;
        self.emit(OutcomeKind::Skipped, path, None, message.into());
    }

    /// Report a single service's outcome; counted through the file's outcome.
    pub fn service_outcome(&self, kind: OutcomeKind, path: &Path, service: &str, message: impl Into<String>) {
        self.emit(kind, Some(path), Some(service.to_string()), message.into());
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    pub fn status(&self) -> CommandStatus {
        CommandStatus::from_counts(self.successes, self.failures)
    }

    /// Log the aggregate counts and return the status.
    pub fn finish(&self) -> CommandStatus {
        let status = self.status();
        info!(
            event = %self.event,
            successes = self.successes,
            failures = self.failures,
            skipped = self.skipped,
            status = ?status,
            "Operation complete"
        );
        status
    }

    fn emit(&self, kind: OutcomeKind, path: Option<&Path>, service: Option<String>, message: String) {
        self.sink.record(&Outcome {
            kind,
            event: self.event,
            path: path.map(Path::to_path_buf),
            service,
            message,
        });
    }
}
