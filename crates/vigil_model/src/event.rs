use std::fmt;

use serde::{Deserialize, Serialize};

/// The operations the event engine can apply to a managed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Register,
    Deregister,
    Preserve,
    Verify,
    Reindex,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Register => "register",
            EventKind::Deregister => "deregister",
            EventKind::Preserve => "preserve",
            EventKind::Verify => "verify",
            EventKind::Reindex => "reindex",
        }
    }

    /// Events that execute preservation services.
    pub fn runs_services(&self) -> bool {
        matches!(self, EventKind::Preserve | EventKind::Verify)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
