//! CLI errors.

use cvrsync_protocol::ProtocolError;
use cvrsync_schema::SchemaError;
use cvrsync_server::ServerError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors a command can end with.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A script or a response was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A request could not be encoded or a response decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The fixture domain could not be set up.
    #[error("setup failed: {0}")]
    Setup(String),

    /// A step of a script is unusable.
    #[error("step {step}: {message}")]
    Script {
        /// Zero-based step index.
        step: usize,
        /// What is wrong.
        message: String,
    },
}

impl From<ServerError> for CliError {
    fn from(err: ServerError) -> Self {
        Self::Setup(err.to_string())
    }
}

impl From<SchemaError> for CliError {
    fn from(err: SchemaError) -> Self {
        Self::Setup(err.to_string())
    }
}

/// Result type for commands.
pub type CliResult<T> = Result<T, CliError>;
