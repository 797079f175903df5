//! Error types for the client.

use cvrsync_protocol::{ErrorResponse, ProtocolError};
use cvrsync_schema::SchemaError;
use thiserror::Error;

/// Result type for client operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the replica or during sync.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A body could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server refused the request.
    #[error("request rejected: {0:?}")]
    Rejected(ErrorResponse),

    /// The server failed while handling the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// A value did not fit its schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// No local mutator is registered under this name.
    #[error("unknown mutator `{0}`")]
    UnknownMutator(String),

    /// A local mutator rejected its arguments or the current state.
    #[error("mutator `{name}` failed: {message}")]
    MutatorFailed {
        /// Mutator name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// A pull answered with an older cookie than the one held.
    #[error("stale cookie: holding order {held}, received {received}")]
    StaleCookie {
        /// Order of the held cookie.
        held: u64,
        /// Order of the received cookie.
        received: u64,
    },

    /// The server lost the client's state again right after a resync.
    #[error("client state lost during resync")]
    ResyncFailed,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a mutator failure.
    pub fn mutator_failed(name: impl Into<String>, message: impl ToString) -> Self {
        Self::MutatorFailed {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Classifies a structured error body from the server.
    pub fn from_response(response: ErrorResponse) -> Self {
        match response {
            ErrorResponse::Internal { message } => Self::ServerError(message),
            other => Self::Rejected(other),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::ServerError(_) | SyncError::ResyncFailed => true,
            _ => false,
        }
    }
}
