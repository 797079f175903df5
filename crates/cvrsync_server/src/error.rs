//! Error types for the sync server.

use cvrsync_core::{ClientId, CoreError};
use cvrsync_protocol::{ErrorResponse, ProtocolError};
use cvrsync_schema::SchemaError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed body, oversized batch or version mismatch.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The caller does not own the client group or the client.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// A mutation arrived before its predecessor.
    #[error("mutation {received} of client {client_id} is out of order, expected {expected}")]
    MutationOutOfOrder {
        /// Sending client.
        client_id: ClientId,
        /// The id the server expected next.
        expected: u64,
        /// The id it received.
        received: u64,
    },

    /// The cookie's CVR is gone or belongs to another group.
    #[error("client state not found")]
    ClientStateNotFound,

    /// A mutator rejected its mutation.
    #[error("mutator `{name}` failed: {message}")]
    MutatorFailed {
        /// Mutator name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// Schema codec error outside of a mutator.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Serialization conflicts persisted through every attempt.
    #[error("transaction failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The last conflict.
        last: String,
    },

    /// The router got a path it does not serve.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates a mutator failure.
    pub fn mutator_failed(name: impl Into<String>, message: impl ToString) -> Self {
        Self::MutatorFailed {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if re-running the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServerError::Store(e) if e.is_retryable())
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Protocol(_)
                | ServerError::Unauthorized(_)
                | ServerError::MutationOutOfOrder { .. }
                | ServerError::ClientStateNotFound
                | ServerError::UnknownEndpoint(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns the structured body sent to the client.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            ServerError::Protocol(e) => ErrorResponse::from(e),
            ServerError::Unauthorized(message) => ErrorResponse::Unauthorized {
                message: message.clone(),
            },
            ServerError::MutationOutOfOrder {
                client_id,
                expected,
                received,
            } => ErrorResponse::MutationOutOfOrder {
                client_id: client_id.clone(),
                expected: *expected,
                received: *received,
            },
            ServerError::ClientStateNotFound => ErrorResponse::ClientStateNotFound,
            ServerError::UnknownEndpoint(path) => ErrorResponse::InvalidRequest {
                message: format!("unknown endpoint {path}"),
            },
            other => ErrorResponse::Internal {
                message: other.to_string(),
            },
        }
    }
}
