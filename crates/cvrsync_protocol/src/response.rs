//! Structured error bodies.

use crate::error::{ProtocolError, ProtocolResult};
use crate::json;
use crate::version::VersionType;
use cvrsync_core::ClientId;
use serde::{Deserialize, Serialize};

/// Error body returned by push and pull, tagged by `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error")]
pub enum ErrorResponse {
    /// The cookie's CVR is unknown; the client must pull from `null`.
    ClientStateNotFound,
    /// A protocol or schema version was rejected.
    VersionNotSupported {
        /// Which version.
        #[serde(rename = "versionType")]
        version_type: VersionType,
    },
    /// The caller does not own the client group or client.
    Unauthorized {
        /// Description.
        message: String,
    },
    /// A mutation arrived before its predecessor.
    MutationOutOfOrder {
        /// Sending client.
        #[serde(rename = "clientId")]
        client_id: ClientId,
        /// The id the server expected.
        expected: u64,
        /// The id it received.
        received: u64,
    },
    /// The request body was unusable.
    InvalidRequest {
        /// Description.
        message: String,
    },
    /// The server could not complete the request.
    Internal {
        /// Description.
        message: String,
    },
}

impl ErrorResponse {
    /// Encodes to a JSON body.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        json::encode(self)
    }

    /// Decodes from a JSON body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        json::decode(bytes)
    }
}

impl From<&ProtocolError> for ErrorResponse {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::VersionNotSupported { version_type, .. } => {
                ErrorResponse::VersionNotSupported {
                    version_type: *version_type,
                }
            }
            ProtocolError::Malformed { message } => ErrorResponse::InvalidRequest {
                message: message.clone(),
            },
            ProtocolError::Encoding { message } => ErrorResponse::Internal {
                message: message.clone(),
            },
        }
    }
}
