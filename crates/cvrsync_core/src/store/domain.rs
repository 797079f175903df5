//! The view of a transaction handed to mutators.

use crate::error::{CoreError, CoreResult};
use crate::store::transaction::{Row, Transaction};
use crate::types::UserId;
use cvrsync_schema::{Entity, EntitySchema, Record};

/// Domain-only access to a transaction, scoped to one user.
///
/// Mutators receive this instead of a [`Transaction`]: it reaches the
/// domain tables and nothing else, so business logic cannot touch client
/// records, client groups or CVRs. Every read and write is confined to the
/// user's own rows; another user holding the same key is a different row.
#[derive(Debug)]
pub struct DomainTx<'t, 's> {
    tx: &'t mut Transaction<'s>,
    user: UserId,
}

impl<'t, 's> DomainTx<'t, 's> {
    /// Wraps a transaction for `user`.
    pub fn new(tx: &'t mut Transaction<'s>, user: UserId) -> Self {
        Self { tx, user }
    }

    /// Returns the user the mutation runs for.
    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Loads an entity by its key.
    pub fn get_by_key(&mut self, schema: &EntitySchema, key: &str) -> Option<Record> {
        self.tx
            .get_row(schema.name(), &self.user, key)
            .map(|row| row.record)
    }

    /// Loads an entity by its key fields.
    pub fn get(&mut self, schema: &EntitySchema, key_fields: &Record) -> CoreResult<Option<Record>> {
        let key = schema.interpolate_key(key_fields)?;
        Ok(self.get_by_key(schema, &key))
    }

    /// Inserts or replaces an entity and returns its key.
    ///
    /// The record must marshal cleanly, so every stored row can later be
    /// sent in a patch.
    pub fn put(&mut self, schema: &EntitySchema, record: Record) -> CoreResult<String> {
        let key = schema.interpolate_key(&record)?;
        schema.marshal_value(&record)?;
        self.tx.put_row(
            schema.name(),
            &key,
            Row {
                owner: self.user.clone(),
                record,
            },
        );
        Ok(key)
    }

    /// Deletes an entity. Returns false if it did not exist.
    pub fn delete(&mut self, schema: &EntitySchema, key_fields: &Record) -> CoreResult<bool> {
        let key = schema.interpolate_key(key_fields)?;
        if self.get_by_key(schema, &key).is_none() {
            return Ok(false);
        }
        self.tx.delete_row(schema.name(), &self.user, &key);
        Ok(true)
    }

    /// Returns every entity of this type owned by the user, ordered by key.
    pub fn scan(&mut self, schema: &EntitySchema) -> Vec<(String, Record)> {
        self.tx
            .scan_rows(schema.name(), &self.user)
            .into_iter()
            .map(|(key, row)| (key, row.record))
            .collect()
    }

    /// Loads a typed entity.
    pub fn get_entity<E: Entity>(
        &mut self,
        schema: &EntitySchema,
        key_fields: &Record,
    ) -> CoreResult<Option<E>> {
        Self::check_schema::<E>(schema)?;
        self.get(schema, key_fields)?
            .map(|record| E::from_record(&record).map_err(CoreError::from))
            .transpose()
    }

    /// Stores a typed entity and returns its key.
    pub fn put_entity<E: Entity>(&mut self, schema: &EntitySchema, entity: &E) -> CoreResult<String> {
        Self::check_schema::<E>(schema)?;
        self.put(schema, entity.to_record())
    }

    fn check_schema<E: Entity>(schema: &EntitySchema) -> CoreResult<()> {
        if schema.name() == E::NAME {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "entity `{}` used with schema `{}`",
                E::NAME,
                schema.name()
            )))
        }
    }
}
