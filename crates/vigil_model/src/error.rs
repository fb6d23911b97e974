//! Error types for the data model.

use thiserror::Error;

/// Model result type.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building or mutating model values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Frequency string could not be parsed
    #[error("Invalid frequency '{value}': {reason}")]
    InvalidFrequency { value: String, reason: String },

    /// Custom property collides with a field of the durable format
    #[error("Property name '{0}' is reserved")]
    ReservedProperty(String),

    /// Stored epoch milliseconds outside the representable range
    #[error("Timestamp {0} ms is out of range")]
    TimestampOutOfRange(i64),
}

impl ModelError {
    pub(crate) fn invalid_frequency(value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFrequency {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
