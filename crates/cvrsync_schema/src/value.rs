//! Logical field values.

use crate::error::{SchemaError, SchemaResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A structured entity value keyed by logical field name.
pub type Record = BTreeMap<String, FieldValue>;

/// A logical (pre-marshal) field value.
///
/// This is the shape domain code works with. Wire names, timestamp
/// encodings and enum codes only exist after marshaling.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Empty optional.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Finite floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Enum variant, by its logical variant name.
    Enum(String),
    /// Homogeneous list.
    Array(Vec<FieldValue>),
    /// Nested object.
    Object(Record),
}

impl FieldValue {
    /// Creates an enum value from a variant name.
    pub fn variant(name: impl Into<String>) -> Self {
        FieldValue::Enum(name.into())
    }

    /// Returns a short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Enum(_) => "enum",
            FieldValue::Array(_) => "array",
            FieldValue::Object(_) => "object",
        }
    }

    /// Returns true for [`FieldValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the float if this is a float value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean if this is a bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the timestamp if this is a timestamp value.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the variant name if this is an enum value.
    pub fn as_variant(&self) -> Option<&str> {
        match self {
            FieldValue::Enum(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the elements if this is an array value.
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the nested record if this is an object value.
    pub fn as_object(&self) -> Option<&Record> {
        match self {
            FieldValue::Object(record) => Some(record),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Record> for FieldValue {
    fn from(value: Record) -> Self {
        FieldValue::Object(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Typed accessors over a [`Record`] for hand-written `Entity` impls.
///
/// Every accessor fails with a decode error instead of defaulting.
pub struct FieldReader<'a> {
    record: &'a Record,
}

impl<'a> FieldReader<'a> {
    /// Wraps a record.
    pub fn new(record: &'a Record) -> Self {
        Self { record }
    }

    fn get(&self, name: &str) -> SchemaResult<&'a FieldValue> {
        self.record
            .get(name)
            .ok_or_else(|| SchemaError::missing_field(name))
    }

    fn mismatch(name: &str, expected: &str, actual: &FieldValue) -> SchemaError {
        SchemaError::decoding_failed(name, format!("expected {expected}, got {}", actual.kind()))
    }

    /// Reads a required text field.
    pub fn text(&self, name: &str) -> SchemaResult<String> {
        let value = self.get(name)?;
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| Self::mismatch(name, "text", value))
    }

    /// Reads a required integer field.
    pub fn integer(&self, name: &str) -> SchemaResult<i64> {
        let value = self.get(name)?;
        value
            .as_integer()
            .ok_or_else(|| Self::mismatch(name, "integer", value))
    }

    /// Reads a required float field.
    pub fn float(&self, name: &str) -> SchemaResult<f64> {
        let value = self.get(name)?;
        value
            .as_float()
            .ok_or_else(|| Self::mismatch(name, "float", value))
    }

    /// Reads a required bool field.
    pub fn bool(&self, name: &str) -> SchemaResult<bool> {
        let value = self.get(name)?;
        value
            .as_bool()
            .ok_or_else(|| Self::mismatch(name, "bool", value))
    }

    /// Reads a required timestamp field.
    pub fn timestamp(&self, name: &str) -> SchemaResult<DateTime<Utc>> {
        let value = self.get(name)?;
        value
            .as_timestamp()
            .ok_or_else(|| Self::mismatch(name, "timestamp", value))
    }

    /// Reads an optional timestamp field (absent or null is `None`).
    pub fn optional_timestamp(&self, name: &str) -> SchemaResult<Option<DateTime<Utc>>> {
        match self.record.get(name) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Timestamp(t)) => Ok(Some(*t)),
            Some(other) => Err(Self::mismatch(name, "timestamp", other)),
        }
    }

    /// Reads an optional float field (absent or null is `None`).
    pub fn optional_float(&self, name: &str) -> SchemaResult<Option<f64>> {
        match self.record.get(name) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Float(n)) => Ok(Some(*n)),
            Some(other) => Err(Self::mismatch(name, "float", other)),
        }
    }

    /// Reads a required enum field and returns its variant name.
    pub fn variant(&self, name: &str) -> SchemaResult<String> {
        let value = self.get(name)?;
        value
            .as_variant()
            .map(str::to_string)
            .ok_or_else(|| Self::mismatch(name, "enum", value))
    }

    /// Reads a required nested object field.
    pub fn object(&self, name: &str) -> SchemaResult<&'a Record> {
        let value = self.get(name)?;
        value
            .as_object()
            .ok_or_else(|| Self::mismatch(name, "object", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_into_null() {
        let none: Option<i64> = None;
        assert_eq!(FieldValue::from(none), FieldValue::Null);
        assert_eq!(FieldValue::from(Some(3i64)), FieldValue::Integer(3));
    }

    #[test]
    fn reader_rejects_wrong_kind() {
        let mut record = Record::new();
        record.insert("n".into(), FieldValue::Text("7".into()));

        let reader = FieldReader::new(&record);
        assert!(matches!(
            reader.integer("n"),
            Err(SchemaError::DecodingFailed { .. })
        ));
        assert!(matches!(
            reader.integer("missing"),
            Err(SchemaError::MissingField { .. })
        ));
        assert_eq!(reader.text("n").unwrap(), "7");
    }

    #[test]
    fn reader_optional_accepts_absent_and_null() {
        let mut record = Record::new();
        record.insert("a".into(), FieldValue::Null);

        let reader = FieldReader::new(&record);
        assert_eq!(reader.optional_timestamp("a").unwrap(), None);
        assert_eq!(reader.optional_timestamp("b").unwrap(), None);
    }
}
