//! Error types for cvrsync core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in store and record operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Schema codec error.
    #[error("schema error: {0}")]
    Schema(#[from] cvrsync_schema::SchemaError),

    /// CBOR encoding or decoding of a persisted record failed.
    #[error("record codec error: {message}")]
    RecordCodec {
        /// Description of the failure.
        message: String,
    },

    /// Another transaction committed a write this transaction depended on.
    #[error("serialization conflict on {key}")]
    SerializationConflict {
        /// The read-set entry that was invalidated.
        key: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a record codec error.
    pub fn record_codec(message: impl Into<String>) -> Self {
        Self::RecordCodec {
            message: message.into(),
        }
    }

    /// Creates a serialization conflict error.
    pub fn serialization_conflict(key: impl Into<String>) -> Self {
        Self::SerializationConflict { key: key.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if retrying the whole transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SerializationConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(CoreError::serialization_conflict("client:c1").is_retryable());
        assert!(!CoreError::invalid_operation("x").is_retryable());
        assert!(!CoreError::record_codec("x").is_retryable());
    }

    #[test]
    fn display_names_the_key() {
        let err = CoreError::serialization_conflict("client-group:g1");
        assert_eq!(err.to_string(), "serialization conflict on client-group:g1");
    }
}
