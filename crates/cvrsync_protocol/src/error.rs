//! Error types for the wire protocol.

use crate::version::VersionType;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or gating protocol messages.
///
/// All of them are detected before any transaction starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The body is not valid JSON for the expected message.
    #[error("malformed request: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },

    /// A protocol or schema version does not match the server's.
    #[error("{version_type} version not supported: {received}")]
    VersionNotSupported {
        /// Which version failed the gate.
        version_type: VersionType,
        /// The version the client sent.
        received: String,
    },

    /// A message could not be encoded.
    #[error("encoding failed: {message}")]
    Encoding {
        /// Description of the problem.
        message: String,
    },
}

impl ProtocolError {
    /// Creates a malformed-request error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a version error.
    pub fn version_not_supported(version_type: VersionType, received: impl ToString) -> Self {
        Self::VersionNotSupported {
            version_type,
            received: received.to_string(),
        }
    }

    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }
}
