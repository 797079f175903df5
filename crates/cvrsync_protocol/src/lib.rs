//! # cvrsync Protocol
//!
//! Wire types for the push / pull protocol.
//!
//! This crate provides:
//! - `PushRequest` and `MutationRecord`
//! - `PullRequest`, `Cookie`, `PatchOperation` and `PullResponse`
//! - `ErrorResponse`, the structured failure body
//! - Protocol and schema version gates
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod json;
mod pull;
mod push;
mod response;
mod version;

pub use error::{ProtocolError, ProtocolResult};
pub use pull::{Cookie, PatchOperation, PullOk, PullRequest, PullResponse};
pub use push::{MutationRecord, PushRequest};
pub use response::ErrorResponse;
pub use version::{check_schema_version, VersionType, PULL_VERSION, PUSH_VERSION};
