//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for decoding operations.
pub type ProtocolResult<T> = Result<T, DecodeError>;

/// Errors that can occur while decoding wire records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A required field was absent or null.
    #[error("{record} record is missing required field `{field}`")]
    MissingField {
        /// Kind of record being decoded.
        record: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A field was present but had an unusable value.
    #[error("{record} record has invalid `{field}`: {message}")]
    InvalidField {
        /// Kind of record being decoded.
        record: &'static str,
        /// Name of the offending field.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// The record itself had the wrong shape.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl DecodeError {
    /// Create a missing field error.
    pub fn missing_field(record: &'static str, field: &'static str) -> Self {
        Self::MissingField { record, field }
    }

    /// Create an invalid field error.
    pub fn invalid_field(
        record: &'static str,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            record,
            field,
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
