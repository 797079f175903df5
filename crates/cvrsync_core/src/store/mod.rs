//! Transactional in-memory store.
//!
//! The store holds the registry tables (clients, client groups), the CVR
//! table and one table per domain entity type. Every access happens inside
//! a [`Transaction`] with serializable isolation:
//! - Reads record the write sequence of everything they observe
//! - Writes are buffered in the transaction
//! - Commit validates the read set and applies the writes atomically
//!
//! A failed validation is a retryable
//! [`CoreError::SerializationConflict`](crate::CoreError::SerializationConflict).
//! Dropping a transaction discards it.

mod domain;
mod memory;
mod transaction;

pub use domain::DomainTx;
pub use memory::MemoryStore;
pub use transaction::{Row, Transaction};
