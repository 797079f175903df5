//! # cvrsync Core
//!
//! Durable state behind the sync protocol.
//!
//! This crate provides:
//! - Identifier and version-token types
//! - Client, client-group and client view records (CVRs persisted as CBOR)
//! - An in-memory relational store with serializable transactions
//! - [`DomainTx`], the domain-only view handed to mutators
//!
//! ## Usage
//!
//! ```
//! use cvrsync_core::{ClientGroupRecord, MemoryStore, UserId};
//!
//! let store = MemoryStore::new();
//! let mut tx = store.begin();
//! tx.put_client_group(ClientGroupRecord::new("g1".into(), UserId::new("u1")));
//! tx.commit().unwrap();
//!
//! let mut tx = store.begin();
//! assert_eq!(tx.client_group(&"g1".into()).unwrap().cvr_version, 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod records;
mod stats;
mod store;
mod types;

pub use error::{CoreError, CoreResult};
pub use records::{ClientGroupRecord, ClientRecord, CvrRecord, EntityVersions};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{DomainTx, MemoryStore, Row, Transaction};
pub use types::{ClientGroupId, ClientId, CvrId, SequenceNumber, UserId, VersionToken};
