//! Mutators: the business logic behind mutation names.

use crate::error::{ServerError, ServerResult};
use cvrsync_core::{CoreError, DomainTx};
use cvrsync_schema::{ObjectCodec, Record, SchemaError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for mutators.
pub type MutatorResult = Result<(), MutatorError>;

/// Failure of a mutator. Always handled by replaying in error mode.
#[derive(Debug, Error)]
pub enum MutatorError {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] CoreError),

    /// A record did not fit its schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Business rule violation.
    #[error("{0}")]
    Rejected(String),
}

impl MutatorError {
    /// Creates a business rule violation.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Business logic for one mutation name.
///
/// A mutator sees only a [`DomainTx`]; client bookkeeping is done by the
/// push handler around it.
pub trait Mutator: Send + Sync {
    /// The mutation name this mutator handles.
    fn name(&self) -> &str;

    /// Codec the raw `args` object is decoded with.
    fn args(&self) -> &ObjectCodec;

    /// Applies the mutation.
    fn apply(&self, tx: &mut DomainTx<'_, '_>, args: &Record) -> MutatorResult;
}

/// A [`Mutator`] backed by a closure.
pub struct FnMutator<F> {
    name: String,
    args: ObjectCodec,
    apply: F,
}

impl<F> FnMutator<F>
where
    F: Fn(&mut DomainTx<'_, '_>, &Record) -> MutatorResult + Send + Sync,
{
    /// Creates a mutator.
    pub fn new(name: impl Into<String>, args: ObjectCodec, apply: F) -> Self {
        Self {
            name: name.into(),
            args,
            apply,
        }
    }
}

impl<F> Mutator for FnMutator<F>
where
    F: Fn(&mut DomainTx<'_, '_>, &Record) -> MutatorResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn args(&self) -> &ObjectCodec {
        &self.args
    }

    fn apply(&self, tx: &mut DomainTx<'_, '_>, args: &Record) -> MutatorResult {
        (self.apply)(tx, args)
    }
}

impl<F> fmt::Debug for FnMutator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMutator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Immutable table of mutators, built once at startup.
#[derive(Clone, Default)]
pub struct MutatorRegistry {
    mutators: BTreeMap<String, Arc<dyn Mutator>>,
}

impl MutatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mutator. Fails if the name is taken.
    pub fn register(mut self, mutator: impl Mutator + 'static) -> ServerResult<Self> {
        let name = mutator.name().to_string();
        if self.mutators.contains_key(&name) {
            return Err(ServerError::Internal(format!(
                "mutator `{name}` registered twice"
            )));
        }
        self.mutators.insert(name, Arc::new(mutator));
        Ok(self)
    }

    /// Looks up a mutator by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Mutator>> {
        self.mutators.get(name)
    }

    /// Returns the registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mutators.keys().map(String::as_str)
    }

    /// Returns the number of mutators.
    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    /// Returns true if no mutator is registered.
    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }
}

impl fmt::Debug for MutatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
