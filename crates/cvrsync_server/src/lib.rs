//! # cvrsync server
//!
//! Server side of the cvrsync protocol.
//!
//! This crate provides:
//! - The push handler: idempotent, strictly ordered mutation application
//!   with error-mode replay of failing mutators
//! - The CVR engine and pull handler: per-client-group view records diffed
//!   into `clear` / `put` / `del` patches
//! - [`SyncServer`], a facade with a JSON POST router for an HTTP layer
//!
//! # Architecture
//!
//! Handlers are stateless. Every push mutation and every pull runs in one
//! serializable transaction of a [`cvrsync_core::MemoryStore`], retried on
//! serialization conflicts up to [`ServerConfig::max_transaction_attempts`].
//!
//! Mutators are registered once at startup in a [`MutatorRegistry`] and only
//! ever see a [`cvrsync_core::DomainTx`]:
//!
//! ```rust,ignore
//! let mutators = MutatorRegistry::new().register(FnMutator::new(
//!     "rename",
//!     args_codec,
//!     |tx, args| { /* domain reads and writes */ Ok(()) },
//! ))?;
//! let server = SyncServer::new(ServerConfig::new("3"), schemas, mutators);
//! ```
//!
//! # Protocol
//!
//! 1. Client pushes pending mutations; each advances its last mutation id
//! 2. Client pulls with its cookie and gets the patch since that cookie
//! 3. An unknown cookie yields `ClientStateNotFound`; the client re-pulls
//!    from scratch

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod cvr;
mod error;
mod handler;
mod mutator;
mod pull;
mod push;
mod server;
mod txn;

pub use config::ServerConfig;
pub use cvr::{
    compute_view, diff_entities, last_mutation_id_changes, prune, CvrDiff, EntityDiff, ViewState,
};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use mutator::{FnMutator, Mutator, MutatorError, MutatorRegistry, MutatorResult};
pub use push::{MutationOutcome, PushSummary};
pub use server::{PostResponse, ServerStats, SyncServer, PULL_PATH, PUSH_PATH};
pub use txn::run_in_transaction;
