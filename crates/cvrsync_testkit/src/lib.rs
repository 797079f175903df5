//! # cvrsync testkit
//!
//! Test utilities for cvrsync.
//!
//! This crate provides:
//! - A learning-progress fixture domain (`skillState`, `skillRating`) with
//!   server mutators and matching local mutators
//! - The [`SrsScheduler`] seam and a deterministic [`FixtureScheduler`]
//! - Property-based generators for skills, ratings and multi-client sessions
//! - [`SyncHarness`]: one in-process server, any number of clients,
//!   convergence assertions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cvrsync_testkit::prelude::*;
//!
//! #[test]
//! fn two_devices_agree() {
//!     let harness = SyncHarness::new();
//!     let phone = harness.client("alice", "phone");
//!     let laptop = harness.client("alice", "laptop");
//!     phone.add_skill("kanji", at).unwrap();
//!     harness.settle(&[&phone, &laptop]).unwrap();
//!     harness.assert_converged("alice", &[&phone, &laptop]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod generators;
pub mod harness;
pub mod scheduler;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::domain::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::scheduler::*;
}

pub use domain::{LearningDomain, SkillRating, SkillState};
pub use harness::{SyncHarness, TestClient, SCHEMA_VERSION};
pub use scheduler::{FixtureScheduler, Rating, SrsScheduler, SrsState};
