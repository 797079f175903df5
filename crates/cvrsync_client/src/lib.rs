//! # cvrsync client
//!
//! Consumer side of the cvrsync protocol.
//!
//! This crate provides:
//! - [`Replica`]: confirmed state, pending mutation queue and the optimistic
//!   view that reads see
//! - Secondary index scans over the optimistic view
//! - Transports: [`LoopbackTransport`] (in-process server) and
//!   [`HttpTransport`] (JSON POST through a pluggable [`HttpClient`])
//! - [`SyncEngine`]: push, then pull, with retry and full resync when the
//!   server no longer knows the cookie
//!
//! ## Sync cycle
//!
//! ```text
//! Idle ─▶ Pushing ─▶ Pulling ─▶ Synced
//!            │          │
//!            └──────────┴─▶ Error ─▶ (RetryWait ─▶ Pushing)
//! ```
//!
//! Pending mutations are pushed on every cycle until a pull acknowledges
//! them; the server drops replays, so resending is harmless.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod index;
mod replica;
mod transport;

pub use config::{ReplicaConfig, RetryConfig, SyncConfig};
pub use engine::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport, LoopbackClient};
pub use index::{scan_index, IndexEntry};
pub use replica::{
    FnLocalMutator, KvState, LocalMutator, LocalMutators, PullOutcome, Replica, ReplicaTx,
};
pub use transport::{LoopbackTransport, SyncTransport};
