//! Registry of entity schemas.

use crate::entity::EntitySchema;
use crate::error::{SchemaError, SchemaResult};
use std::sync::Arc;

/// The immutable set of entity schemas known to a process.
///
/// Built once at startup and handed to the server and the replica.
/// Key prefixes must not overlap, so every replica key resolves to at most
/// one schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Vec<Arc<EntitySchema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a schema.
    ///
    /// Fails on a duplicate name, or when one key prefix is a prefix of
    /// another.
    pub fn register(mut self, schema: EntitySchema) -> SchemaResult<Self> {
        for existing in &self.schemas {
            if existing.name() == schema.name() {
                return Err(SchemaError::invalid_schema(format!(
                    "entity `{}` registered twice",
                    schema.name()
                )));
            }
            let a = existing.key_path().prefix();
            let b = schema.key_path().prefix();
            if a.starts_with(b) || b.starts_with(a) {
                return Err(SchemaError::invalid_schema(format!(
                    "key prefixes of `{}` and `{}` overlap",
                    existing.name(),
                    schema.name()
                )));
            }
        }
        self.schemas.push(Arc::new(schema));
        Ok(self)
    }

    /// Returns all schemas in registration order.
    pub fn schemas(&self) -> &[Arc<EntitySchema>] {
        &self.schemas
    }

    /// Looks up a schema by entity name.
    pub fn get(&self, name: &str) -> Option<&Arc<EntitySchema>> {
        self.schemas.iter().find(|s| s.name() == name)
    }

    /// Finds the schema whose key path matches `key`.
    pub fn for_key(&self, key: &str) -> Option<&Arc<EntitySchema>> {
        self.schemas.iter().find(|s| s.owns_key(key))
    }

    /// Returns the number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if no schema is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, FieldType};

    fn schema(name: &str, key_path: &str) -> EntitySchema {
        EntitySchema::builder(name, key_path)
            .field(Field::new("id", FieldType::Text))
            .build()
            .unwrap()
    }

    #[test]
    fn resolves_keys_by_prefix() {
        let registry = SchemaRegistry::new()
            .register(schema("skillState", "s/[id]"))
            .unwrap()
            .register(schema("skillRating", "sr/[id]"))
            .unwrap();

        assert_eq!(registry.for_key("s/abc").unwrap().name(), "skillState");
        assert_eq!(registry.for_key("sr/abc").unwrap().name(), "skillRating");
        assert!(registry.for_key("x/abc").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn rejects_duplicates_and_overlaps() {
        let registry = SchemaRegistry::new()
            .register(schema("skillState", "s/[id]"))
            .unwrap();

        assert!(registry
            .clone()
            .register(schema("skillState", "t/[id]"))
            .is_err());
        assert!(registry.register(schema("other", "s/x/[id]")).is_err());
    }
}
