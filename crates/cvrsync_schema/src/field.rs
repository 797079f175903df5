//! Field declarations and per-field encoders.

use crate::error::{SchemaError, SchemaResult};
use crate::object::ObjectCodec;
use crate::value::FieldValue;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value as JsonValue};
use std::sync::Arc;

/// How a timestamp field is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampEncoding {
    /// Milliseconds since the Unix epoch, as a JSON number.
    ///
    /// Sub-millisecond precision is dropped.
    Millis,
    /// RFC 3339 text in UTC with millisecond precision (`...00.000Z`).
    /// Fixed width, so it sorts lexicographically: use it for fields that
    /// back a secondary index or a key path. Sub-millisecond precision is
    /// dropped.
    Iso8601,
}

/// Explicit bidirectional mapping between enum variants and wire codes.
///
/// Wire codes never depend on declaration order, so reordering variants
/// in code cannot silently change stored data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumTable {
    name: String,
    entries: Vec<(String, String)>,
}

impl EnumTable {
    /// Builds a table from `(variant, code)` pairs.
    ///
    /// Fails if a variant or a code appears twice, or if a code is empty.
    pub fn new(name: impl Into<String>, pairs: &[(&str, &str)]) -> SchemaResult<Self> {
        let name = name.into();
        let mut entries: Vec<(String, String)> = Vec::with_capacity(pairs.len());

        for (variant, code) in pairs {
            if code.is_empty() {
                return Err(SchemaError::invalid_schema(format!(
                    "enum `{name}`: variant `{variant}` has an empty code"
                )));
            }
            if entries.iter().any(|(v, _)| v == variant) {
                return Err(SchemaError::invalid_schema(format!(
                    "enum `{name}`: duplicate variant `{variant}`"
                )));
            }
            if entries.iter().any(|(_, c)| c == code) {
                return Err(SchemaError::invalid_schema(format!(
                    "enum `{name}`: duplicate code `{code}`"
                )));
            }
            entries.push(((*variant).to_string(), (*code).to_string()));
        }

        Ok(Self { name, entries })
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the variant names in declaration order.
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(v, _)| v.as_str())
    }

    /// Looks up the wire code for a variant.
    pub fn code_for(&self, variant: &str) -> SchemaResult<&str> {
        self.entries
            .iter()
            .find(|(v, _)| v == variant)
            .map(|(_, c)| c.as_str())
            .ok_or_else(|| SchemaError::UnknownEnumValue {
                table: self.name.clone(),
                value: variant.to_string(),
            })
    }

    /// Looks up the variant for a wire code.
    pub fn variant_for(&self, code: &str) -> SchemaResult<&str> {
        self.entries
            .iter()
            .find(|(_, c)| c == code)
            .map(|(v, _)| v.as_str())
            .ok_or_else(|| SchemaError::UnknownEnumValue {
                table: self.name.clone(),
                value: code.to_string(),
            })
    }
}

/// The type of a declared field.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// UTF-8 text.
    Text,
    /// Signed 64-bit integer.
    Integer,
    /// Finite 64-bit float.
    Float,
    /// Boolean.
    Bool,
    /// Timestamp with the given wire encoding.
    Timestamp(TimestampEncoding),
    /// Enum with an explicit code table.
    Enum(Arc<EnumTable>),
    /// Nullable wrapper; empty values are omitted on the wire.
    Optional(Box<FieldType>),
    /// List of values of one type.
    Array(Box<FieldType>),
    /// Nested object with its own fields.
    Object(ObjectCodec),
}

impl FieldType {
    /// Shorthand for [`FieldType::Enum`].
    pub fn enumeration(table: EnumTable) -> Self {
        FieldType::Enum(Arc::new(table))
    }

    /// Shorthand for [`FieldType::Optional`].
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    /// Shorthand for [`FieldType::Array`].
    pub fn array(inner: FieldType) -> Self {
        FieldType::Array(Box::new(inner))
    }

    /// Returns true if the field may be absent.
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// Returns true if values of this type can appear in a key path.
    pub fn is_key_scalar(&self) -> bool {
        matches!(
            self,
            FieldType::Text | FieldType::Integer | FieldType::Timestamp(_) | FieldType::Enum(_)
        )
    }

    /// Returns the nested object codec, looking through `Optional`.
    pub fn object_codec(&self) -> Option<&ObjectCodec> {
        match self {
            FieldType::Object(codec) => Some(codec),
            FieldType::Optional(inner) => inner.object_codec(),
            _ => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Timestamp(_) => "timestamp",
            FieldType::Enum(_) => "enum",
            FieldType::Optional(_) => "optional",
            FieldType::Array(_) => "array",
            FieldType::Object(_) => "object",
        }
    }

    /// Encodes a logical value into its wire form.
    pub(crate) fn encode(&self, value: &FieldValue, path: &str) -> SchemaResult<JsonValue> {
        let mismatch = || {
            SchemaError::encoding_failed(
                path,
                format!("expected {}, got {}", self.describe(), value.kind()),
            )
        };

        match (self, value) {
            (FieldType::Optional(_), FieldValue::Null) => Ok(JsonValue::Null),
            (FieldType::Optional(inner), _) => inner.encode(value, path),
            (FieldType::Text, FieldValue::Text(s)) => Ok(JsonValue::String(s.clone())),
            (FieldType::Integer, FieldValue::Integer(n)) => Ok(JsonValue::from(*n)),
            (FieldType::Float, FieldValue::Float(n)) => Number::from_f64(*n)
                .map(JsonValue::Number)
                .ok_or_else(|| SchemaError::encoding_failed(path, "float is not finite")),
            (FieldType::Bool, FieldValue::Bool(b)) => Ok(JsonValue::Bool(*b)),
            (FieldType::Timestamp(encoding), FieldValue::Timestamp(t)) => {
                Ok(encode_timestamp(*encoding, t))
            }
            (FieldType::Enum(table), FieldValue::Enum(variant)) => {
                Ok(JsonValue::String(table.code_for(variant)?.to_string()))
            }
            (FieldType::Array(inner), FieldValue::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| inner.encode(item, &format!("{path}[{i}]")))
                .collect::<SchemaResult<Vec<_>>>()
                .map(JsonValue::Array),
            (FieldType::Object(codec), FieldValue::Object(record)) => {
                codec.marshal_at(record, path, &[])
            }
            _ => Err(mismatch()),
        }
    }

    /// Decodes a wire value into its logical form.
    pub(crate) fn decode(&self, wire: &JsonValue, path: &str) -> SchemaResult<FieldValue> {
        let mismatch = || {
            SchemaError::decoding_failed(
                path,
                format!("expected {} on the wire, got {}", self.describe(), json_kind(wire)),
            )
        };

        match self {
            FieldType::Optional(inner) => {
                if wire.is_null() {
                    Ok(FieldValue::Null)
                } else {
                    inner.decode(wire, path)
                }
            }
            FieldType::Text => wire
                .as_str()
                .map(|s| FieldValue::Text(s.to_string()))
                .ok_or_else(mismatch),
            FieldType::Integer => wire.as_i64().map(FieldValue::Integer).ok_or_else(mismatch),
            FieldType::Float => wire.as_f64().map(FieldValue::Float).ok_or_else(mismatch),
            FieldType::Bool => wire.as_bool().map(FieldValue::Bool).ok_or_else(mismatch),
            FieldType::Timestamp(TimestampEncoding::Millis) => {
                let millis = wire.as_i64().ok_or_else(mismatch)?;
                decode_millis(millis, path)
            }
            FieldType::Timestamp(TimestampEncoding::Iso8601) => {
                let text = wire.as_str().ok_or_else(mismatch)?;
                decode_iso(text, path)
            }
            FieldType::Enum(table) => {
                let code = wire.as_str().ok_or_else(mismatch)?;
                Ok(FieldValue::Enum(table.variant_for(code)?.to_string()))
            }
            FieldType::Array(inner) => wire
                .as_array()
                .ok_or_else(mismatch)?
                .iter()
                .enumerate()
                .map(|(i, item)| inner.decode(item, &format!("{path}[{i}]")))
                .collect::<SchemaResult<Vec<_>>>()
                .map(FieldValue::Array),
            FieldType::Object(codec) => codec.unmarshal_at(wire, path).map(FieldValue::Object),
        }
    }

    /// Renders a key-path variable value as text.
    pub(crate) fn encode_key_part(&self, value: &FieldValue, path: &str) -> SchemaResult<String> {
        match (self, value) {
            (FieldType::Text, FieldValue::Text(s)) => Ok(s.clone()),
            (FieldType::Integer, FieldValue::Integer(n)) => Ok(n.to_string()),
            (FieldType::Timestamp(TimestampEncoding::Millis), FieldValue::Timestamp(t)) => {
                Ok(t.timestamp_millis().to_string())
            }
            (FieldType::Timestamp(TimestampEncoding::Iso8601), FieldValue::Timestamp(t)) => {
                Ok(t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            (FieldType::Enum(table), FieldValue::Enum(variant)) => {
                Ok(table.code_for(variant)?.to_string())
            }
            _ => Err(SchemaError::encoding_failed(
                path,
                format!(
                    "key variable expects {}, got {}",
                    self.describe(),
                    value.kind()
                ),
            )),
        }
    }

    /// Parses a key-path variable value from text.
    pub(crate) fn decode_key_part(&self, text: &str, path: &str) -> SchemaResult<FieldValue> {
        match self {
            FieldType::Text => Ok(FieldValue::Text(text.to_string())),
            FieldType::Integer => text
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|e| SchemaError::decoding_failed(path, e.to_string())),
            FieldType::Timestamp(TimestampEncoding::Millis) => {
                let millis = text
                    .parse::<i64>()
                    .map_err(|e| SchemaError::decoding_failed(path, e.to_string()))?;
                decode_millis(millis, path)
            }
            FieldType::Timestamp(TimestampEncoding::Iso8601) => decode_iso(text, path),
            FieldType::Enum(table) => Ok(FieldValue::Enum(table.variant_for(text)?.to_string())),
            other => Err(SchemaError::decoding_failed(
                path,
                format!("{} cannot appear in a key", other.describe()),
            )),
        }
    }
}

fn encode_timestamp(encoding: TimestampEncoding, t: &DateTime<Utc>) -> JsonValue {
    match encoding {
        TimestampEncoding::Millis => JsonValue::from(t.timestamp_millis()),
        TimestampEncoding::Iso8601 => {
            JsonValue::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
    }
}

fn decode_millis(millis: i64, path: &str) -> SchemaResult<FieldValue> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(FieldValue::Timestamp)
        .ok_or_else(|| SchemaError::decoding_failed(path, "timestamp out of range"))
}

fn decode_iso(text: &str, path: &str) -> SchemaResult<FieldValue> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| FieldValue::Timestamp(t.with_timezone(&Utc)))
        .map_err(|e| SchemaError::decoding_failed(path, e.to_string()))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Marks a field as backing a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, unique within a schema.
    pub name: String,
    /// Whether entries without the field still belong to the index.
    pub allow_empty: bool,
}

/// A declared field of an object or entity.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    alias: Option<String>,
    ty: FieldType,
    index: Option<IndexSpec>,
}

impl Field {
    /// Declares a field with its logical name and type.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            alias: None,
            ty,
            index: None,
        }
    }

    /// Sets the short wire name.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Declares a secondary index over this field.
    #[must_use]
    pub fn indexed(mut self, index_name: impl Into<String>) -> Self {
        self.index = Some(IndexSpec {
            name: index_name.into(),
            allow_empty: false,
        });
        self
    }

    /// Declares a secondary index that also admits entries lacking the field.
    #[must_use]
    pub fn indexed_allow_empty(mut self, index_name: impl Into<String>) -> Self {
        self.index = Some(IndexSpec {
            name: index_name.into(),
            allow_empty: true,
        });
        self
    }

    /// Returns the logical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name used on the wire (alias, or the logical name).
    pub fn wire_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Returns the field type.
    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    /// Returns the index declaration, if any.
    pub fn index(&self) -> Option<&IndexSpec> {
        self.index.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rating_table() -> EnumTable {
        EnumTable::new(
            "rating",
            &[("Again", "1"), ("Hard", "2"), ("Good", "3"), ("Easy", "4")],
        )
        .unwrap()
    }

    #[test]
    fn enum_table_is_bidirectional() {
        let table = rating_table();
        assert_eq!(table.code_for("Good").unwrap(), "3");
        assert_eq!(table.variant_for("4").unwrap(), "Easy");
        assert!(table.code_for("Perfect").is_err());
        assert!(table.variant_for("0").is_err());
    }

    #[test]
    fn enum_table_rejects_duplicates() {
        assert!(EnumTable::new("x", &[("A", "a"), ("B", "a")]).is_err());
        assert!(EnumTable::new("x", &[("A", "a"), ("A", "b")]).is_err());
        assert!(EnumTable::new("x", &[("A", "")]).is_err());
    }

    #[test]
    fn enum_wire_form_ignores_declaration_order() {
        let forward = FieldType::enumeration(EnumTable::new("k", &[("A", "a"), ("B", "b")]).unwrap());
        let reversed =
            FieldType::enumeration(EnumTable::new("k", &[("B", "b"), ("A", "a")]).unwrap());
        let value = FieldValue::variant("B");

        assert_eq!(
            forward.encode(&value, "k").unwrap(),
            reversed.encode(&value, "k").unwrap()
        );
    }

    #[test]
    fn timestamp_encodings() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let value = FieldValue::Timestamp(t);

        let millis = FieldType::Timestamp(TimestampEncoding::Millis)
            .encode(&value, "t")
            .unwrap();
        assert_eq!(millis, JsonValue::from(t.timestamp_millis()));

        let iso = FieldType::Timestamp(TimestampEncoding::Iso8601)
            .encode(&value, "t")
            .unwrap();
        assert_eq!(iso, JsonValue::String("2024-03-01T12:00:00.000Z".into()));
    }

    #[test]
    fn float_must_be_finite() {
        let err = FieldType::Float
            .encode(&FieldValue::Float(f64::NAN), "f")
            .unwrap_err();
        assert!(matches!(err, SchemaError::EncodingFailed { .. }));
    }

    #[test]
    fn optional_passes_null_through() {
        let ty = FieldType::optional(FieldType::Integer);
        assert_eq!(ty.encode(&FieldValue::Null, "o").unwrap(), JsonValue::Null);
        assert_eq!(ty.decode(&JsonValue::Null, "o").unwrap(), FieldValue::Null);
        assert_eq!(
            ty.decode(&JsonValue::from(5), "o").unwrap(),
            FieldValue::Integer(5)
        );
    }

    #[test]
    fn key_parts_reject_non_scalars() {
        assert!(!FieldType::Float.is_key_scalar());
        assert!(FieldType::Float
            .decode_key_part("1.5", "f")
            .is_err());
        assert_eq!(
            FieldType::Integer.decode_key_part("42", "n").unwrap(),
            FieldValue::Integer(42)
        );
    }

    #[test]
    fn field_wire_name_prefers_alias() {
        let field = Field::new("createdAt", FieldType::Integer).alias("c");
        assert_eq!(field.wire_name(), "c");
        assert_eq!(Field::new("due", FieldType::Integer).wire_name(), "due");
    }
}
