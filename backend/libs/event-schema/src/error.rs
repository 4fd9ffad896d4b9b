//! Error types for the analytics event schema

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Reasons a payload is not a well-formed analytics event
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Payload is not JSON, names an unknown `event_type`, or its properties do not
    /// match the shape selected by `event_type`
    #[error("Malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload decoded but a field violates its constraint
    #[error("Invalid {field}: {reason}")]
    Constraint { field: &'static str, reason: String },
}

impl SchemaError {
    pub(crate) fn constraint(field: &'static str, reason: impl Into<String>) -> Self {
        SchemaError::Constraint {
            field,
            reason: reason.into(),
        }
    }
}
