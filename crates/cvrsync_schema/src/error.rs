//! Error types for the schema crate.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while building schemas or translating values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The schema declaration itself is inconsistent.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the declaration problem.
        message: String,
    },

    /// A field encoder rejected a logical value.
    #[error("encoding failed at `{path}`: {message}")]
    EncodingFailed {
        /// Dotted logical path of the field.
        path: String,
        /// Description of the encoding error.
        message: String,
    },

    /// A field decoder rejected a wire value.
    #[error("decoding failed at `{path}`: {message}")]
    DecodingFailed {
        /// Dotted wire path of the field.
        path: String,
        /// Description of the decoding error.
        message: String,
    },

    /// A required field is absent.
    #[error("missing required field `{path}`")]
    MissingField {
        /// Path of the missing field.
        path: String,
    },

    /// A wire object carries a name that no field declares.
    #[error("unrecognized field `{path}`")]
    UnknownField {
        /// Path of the unrecognized field.
        path: String,
    },

    /// An enum variant or code has no entry in its table.
    #[error("unknown value `{value}` for enum `{table}`")]
    UnknownEnumValue {
        /// Name of the enum table.
        table: String,
        /// The offending variant or code.
        value: String,
    },

    /// A key string does not have the shape of its template.
    #[error("key `{key}` does not match template `{template}`")]
    KeyMismatch {
        /// The key that failed to parse.
        key: String,
        /// The template it was parsed against.
        template: String,
    },
}

impl SchemaError {
    /// Create an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a missing field error.
    pub fn missing_field(path: impl Into<String>) -> Self {
        Self::MissingField { path: path.into() }
    }

    /// Create an unknown field error.
    pub fn unknown_field(path: impl Into<String>) -> Self {
        Self::UnknownField { path: path.into() }
    }
}
