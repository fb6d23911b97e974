//! Timestamp utilities.
//!
//! All timestamps are UTC with millisecond precision so that values written
//! to metadata documents and to the index compare exactly.

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::{ModelError, Result};

/// Current time truncated to milliseconds.
pub fn now() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Milliseconds since the Unix epoch.
pub fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert milliseconds to DateTime. Values outside chrono's range are rejected.
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or(ModelError::TimestampOutOfRange(millis))
}

/// Drop sub-millisecond precision.
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}
