//! Entity schemas.

use crate::error::{SchemaError, SchemaResult};
use crate::field::Field;
use crate::key_path::KeyPath;
use crate::object::ObjectCodec;
use crate::value::Record;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};

/// A secondary index derived from field declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Only keys starting with this prefix belong to the index.
    pub key_prefix: String,
    /// Wire names from the value root to the indexed field.
    pub structural_path: Vec<String>,
    /// Whether entries without the field still belong to the index.
    pub allow_empty: bool,
}

impl IndexDefinition {
    /// Returns the structural path as a JSON pointer (`/s/d`).
    pub fn json_pointer(&self) -> String {
        self.structural_path
            .iter()
            .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
            .collect()
    }
}

/// Declarative description of one domain collection.
///
/// Built once at startup through [`EntitySchema::builder`]; the key-path
/// regex, the value codec and the index list are all derived up front.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: String,
    key_path: KeyPath,
    key_fields: Vec<Field>,
    value: ObjectCodec,
    indexes: Vec<IndexDefinition>,
}

/// Builder for [`EntitySchema`].
#[derive(Debug)]
pub struct EntitySchemaBuilder {
    name: String,
    key_path: String,
    fields: Vec<Field>,
}

impl EntitySchemaBuilder {
    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Validates the declarations and builds the schema.
    pub fn build(self) -> SchemaResult<EntitySchema> {
        let key_path = KeyPath::compile(&self.key_path)?;
        let variables: HashSet<&str> = key_path.variables().collect();

        let mut key_fields = Vec::new();
        let mut value_fields = Vec::new();
        for field in self.fields {
            if variables.contains(field.name()) {
                if !field.ty().is_key_scalar() {
                    return Err(SchemaError::invalid_schema(format!(
                        "`{}`: key field `{}` must be text, integer, enum or timestamp",
                        self.name,
                        field.name()
                    )));
                }
                if field.index().is_some() {
                    return Err(SchemaError::invalid_schema(format!(
                        "`{}`: key field `{}` cannot be indexed",
                        self.name,
                        field.name()
                    )));
                }
                if key_fields.iter().any(|f: &Field| f.name() == field.name()) {
                    return Err(SchemaError::invalid_schema(format!(
                        "`{}`: duplicate field `{}`",
                        self.name,
                        field.name()
                    )));
                }
                key_fields.push(field);
            } else {
                value_fields.push(field);
            }
        }

        for variable in key_path.variables() {
            if !key_fields.iter().any(|f| f.name() == variable) {
                return Err(SchemaError::invalid_schema(format!(
                    "`{}`: key variable `{variable}` has no field",
                    self.name
                )));
            }
        }

        let value = ObjectCodec::new(value_fields)?;

        let mut indexes = Vec::new();
        collect_indexes(&value, key_path.prefix(), &mut Vec::new(), &mut indexes);
        let mut index_names = HashSet::new();
        for index in &indexes {
            if !index_names.insert(index.name.as_str()) {
                return Err(SchemaError::invalid_schema(format!(
                    "`{}`: duplicate index `{}`",
                    self.name, index.name
                )));
            }
        }

        Ok(EntitySchema {
            name: self.name,
            key_path,
            key_fields,
            value,
            indexes,
        })
    }
}

fn collect_indexes(
    codec: &ObjectCodec,
    key_prefix: &str,
    path: &mut Vec<String>,
    out: &mut Vec<IndexDefinition>,
) {
    for field in codec.fields() {
        path.push(field.wire_name().to_string());
        if let Some(spec) = field.index() {
            out.push(IndexDefinition {
                name: spec.name.clone(),
                key_prefix: key_prefix.to_string(),
                structural_path: path.clone(),
                allow_empty: spec.allow_empty,
            });
        }
        if let Some(nested) = field.ty().object_codec() {
            collect_indexes(nested, key_prefix, path, out);
        }
        path.pop();
    }
}

impl EntitySchema {
    /// Starts a schema declaration.
    pub fn builder(name: impl Into<String>, key_path: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            name: name.into(),
            key_path: key_path.into(),
            fields: Vec::new(),
        }
    }

    /// Returns the entity type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the compiled key path.
    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    /// Returns the codec for the value portion.
    pub fn value_codec(&self) -> &ObjectCodec {
        &self.value
    }

    /// Returns the derived secondary indexes.
    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    /// Returns true if `key` belongs to this entity type.
    pub fn owns_key(&self, key: &str) -> bool {
        self.key_path.matches(key)
    }

    fn key_field(&self, name: &str) -> Option<&Field> {
        self.key_fields.iter().find(|f| f.name() == name)
    }

    /// Builds the key of an entity from its key fields.
    ///
    /// Non-key fields in `record` are ignored.
    pub fn interpolate_key(&self, record: &Record) -> SchemaResult<String> {
        let mut parts = BTreeMap::new();
        for field in &self.key_fields {
            let value = record
                .get(field.name())
                .ok_or_else(|| SchemaError::missing_field(field.name()))?;
            parts.insert(
                field.name().to_string(),
                field.ty().encode_key_part(value, field.name())?,
            );
        }
        self.key_path.interpolate(&parts)
    }

    /// Parses a key back into its key fields.
    pub fn parse_key(&self, key: &str) -> SchemaResult<Record> {
        let parts = self.key_path.parse(key)?;
        let mut record = Record::new();
        for (name, text) in parts {
            let field = self
                .key_field(&name)
                .ok_or_else(|| SchemaError::unknown_field(name.clone()))?;
            let value = field.ty().decode_key_part(&text, &name)?;
            record.insert(name, value);
        }
        Ok(record)
    }

    /// Marshals the value portion of an entity.
    ///
    /// Key fields may be present in `record`; they are not part of the
    /// value and are skipped.
    pub fn marshal_value(&self, record: &Record) -> SchemaResult<JsonValue> {
        let key_names: Vec<&str> = self.key_fields.iter().map(Field::name).collect();
        self.value.marshal_at(record, "", &key_names)
    }

    /// Unmarshals the value portion of an entity.
    pub fn unmarshal_value(&self, wire: &JsonValue) -> SchemaResult<Record> {
        self.value.unmarshal(wire)
    }

    /// Marshals a whole entity into its `(key, value)` pair.
    pub fn marshal_entity(&self, record: &Record) -> SchemaResult<(String, JsonValue)> {
        Ok((self.interpolate_key(record)?, self.marshal_value(record)?))
    }

    /// Reassembles a whole entity from its `(key, value)` pair.
    pub fn unmarshal_entity(&self, key: &str, wire: &JsonValue) -> SchemaResult<Record> {
        let mut record = self.parse_key(key)?;
        record.extend(self.unmarshal_value(wire)?);
        Ok(record)
    }
}

/// A typed domain value with a schema-backed record form.
///
/// ```rust,ignore
/// impl Entity for SkillState {
///     const NAME: &'static str = "skillState";
///
///     fn to_record(&self) -> Record { ... }
///     fn from_record(record: &Record) -> SchemaResult<Self> { ... }
/// }
/// ```
pub trait Entity: Sized {
    /// Name of the entity schema this type belongs to.
    const NAME: &'static str;

    /// Converts to a logical record (key and value fields).
    fn to_record(&self) -> Record;

    /// Converts from a logical record, failing on missing or mistyped fields.
    fn from_record(record: &Record) -> SchemaResult<Self>;
}
