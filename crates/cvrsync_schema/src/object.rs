//! Object codec: marshal and unmarshal records with aliased fields.

use crate::error::{SchemaError, SchemaResult};
use crate::field::Field;
use crate::value::{FieldValue, Record};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

/// Translates between [`Record`]s and their marshaled JSON objects.
///
/// Marshaling renames every field to its wire name and applies its
/// encoder. Unmarshaling is strict: unknown wire names, missing required
/// fields and malformed values are all errors.
///
/// [`FieldValue::Null`] is the canonical form of an empty optional. An
/// absent optional and an explicit `Null` marshal to the same wire object
/// (the field is omitted), and unmarshaling always yields the explicit
/// `Null`. Records compared after a round trip should therefore carry
/// every optional field.
#[derive(Debug, Clone)]
pub struct ObjectCodec {
    fields: Vec<Field>,
}

impl ObjectCodec {
    /// Creates a codec over the given fields.
    ///
    /// Fails if two fields share a logical name or a wire name.
    pub fn new(fields: Vec<Field>) -> SchemaResult<Self> {
        let mut names = HashSet::new();
        let mut wire_names = HashSet::new();
        for field in &fields {
            if !names.insert(field.name()) {
                return Err(SchemaError::invalid_schema(format!(
                    "duplicate field `{}`",
                    field.name()
                )));
            }
            if !wire_names.insert(field.wire_name()) {
                return Err(SchemaError::invalid_schema(format!(
                    "duplicate wire name `{}`",
                    field.wire_name()
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Returns the declared fields.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by logical name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Marshals a record into a JSON object.
    pub fn marshal(&self, record: &Record) -> SchemaResult<JsonValue> {
        self.marshal_at(record, "", &[])
    }

    /// Unmarshals a JSON object into a record.
    ///
    /// Every declared field is present in the result; empty optionals come
    /// back as [`FieldValue::Null`] even if the marshaled record omitted
    /// them.
    pub fn unmarshal(&self, wire: &JsonValue) -> SchemaResult<Record> {
        self.unmarshal_at(wire, "")
    }

    /// Marshals `record`, skipping the logical names in `ignore`.
    pub(crate) fn marshal_at(
        &self,
        record: &Record,
        path: &str,
        ignore: &[&str],
    ) -> SchemaResult<JsonValue> {
        if let Some(extra) = record
            .keys()
            .find(|k| self.field(k).is_none() && !ignore.contains(&k.as_str()))
        {
            return Err(SchemaError::encoding_failed(
                join(path, extra),
                "field is not declared",
            ));
        }

        let mut out = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            let field_path = join(path, field.name());
            match record.get(field.name()) {
                None | Some(FieldValue::Null) if field.ty().is_optional() => {}
                None => return Err(SchemaError::missing_field(field_path)),
                Some(value) => {
                    let wire = field.ty().encode(value, &field_path)?;
                    out.insert(field.wire_name().to_string(), wire);
                }
            }
        }
        Ok(JsonValue::Object(out))
    }

    pub(crate) fn unmarshal_at(&self, wire: &JsonValue, path: &str) -> SchemaResult<Record> {
        let object = wire
            .as_object()
            .ok_or_else(|| SchemaError::decoding_failed(display(path), "expected an object"))?;

        if let Some(unknown) = object
            .keys()
            .find(|k| !self.fields.iter().any(|f| f.wire_name() == k.as_str()))
        {
            return Err(SchemaError::unknown_field(join(path, unknown)));
        }

        let mut record = Record::new();
        for field in &self.fields {
            let wire_path = join(path, field.wire_name());
            let value = match object.get(field.wire_name()) {
                Some(value) => field.ty().decode(value, &wire_path)?,
                None if field.ty().is_optional() => FieldValue::Null,
                None => return Err(SchemaError::missing_field(wire_path)),
            };
            record.insert(field.name().to_string(), value);
        }
        Ok(record)
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn display(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{EnumTable, FieldType, TimestampEncoding};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn progress_codec() -> ObjectCodec {
        let scheduling = ObjectCodec::new(vec![
            Field::new("stability", FieldType::Float).alias("s"),
            Field::new("difficulty", FieldType::Float).alias("d"),
        ])
        .unwrap();

        ObjectCodec::new(vec![
            Field::new("due", FieldType::Timestamp(TimestampEncoding::Iso8601)).alias("d"),
            Field::new(
                "rating",
                FieldType::enumeration(
                    EnumTable::new("rating", &[("Again", "1"), ("Good", "3")]).unwrap(),
                ),
            )
            .alias("r"),
            Field::new("srs", FieldType::Object(scheduling)).alias("s"),
            Field::new("note", FieldType::optional(FieldType::Text)).alias("n"),
        ])
        .unwrap()
    }

    fn progress_record() -> Record {
        let mut srs = Record::new();
        srs.insert("stability".into(), FieldValue::Float(2.5));
        srs.insert("difficulty".into(), FieldValue::Float(4.75));

        let mut record = Record::new();
        record.insert(
            "due".into(),
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()),
        );
        record.insert("rating".into(), FieldValue::variant("Good"));
        record.insert("srs".into(), FieldValue::Object(srs));
        record.insert("note".into(), FieldValue::Null);
        record
    }

    #[test]
    fn marshal_uses_aliases() {
        let wire = progress_codec().marshal(&progress_record()).unwrap();
        assert_eq!(
            wire,
            json!({
                "d": "2024-05-01T08:30:00.000Z",
                "r": "3",
                "s": { "s": 2.5, "d": 4.75 }
            })
        );
    }

    #[test]
    fn unmarshal_roundtrip() {
        let codec = progress_codec();
        let record = progress_record();
        let wire = codec.marshal(&record).unwrap();
        assert_eq!(codec.unmarshal(&wire).unwrap(), record);
    }

    #[test]
    fn absent_optional_comes_back_as_null() {
        let codec = progress_codec();
        let mut sparse = progress_record();
        sparse.remove("note");

        let wire = codec.marshal(&sparse).unwrap();
        assert_eq!(wire, codec.marshal(&progress_record()).unwrap());
        let decoded = codec.unmarshal(&wire).unwrap();
        assert_eq!(decoded.get("note"), Some(&FieldValue::Null));
        assert_eq!(decoded, progress_record());
    }

    #[test]
    fn unmarshal_rejects_unknown_alias() {
        let wire = json!({
            "d": "2024-05-01T08:30:00Z",
            "r": "3",
            "s": { "s": 2.5, "d": 4.75, "x": 1 }
        });
        assert_eq!(
            progress_codec().unmarshal(&wire).unwrap_err(),
            SchemaError::unknown_field("s.x")
        );
    }

    #[test]
    fn unmarshal_rejects_missing_required() {
        let wire = json!({ "d": "2024-05-01T08:30:00Z", "s": { "s": 1.0, "d": 1.0 } });
        assert_eq!(
            progress_codec().unmarshal(&wire).unwrap_err(),
            SchemaError::missing_field("r")
        );
    }

    #[test]
    fn unmarshal_rejects_unknown_enum_code() {
        let wire = json!({
            "d": "2024-05-01T08:30:00Z",
            "r": "9",
            "s": { "s": 1.0, "d": 1.0 }
        });
        assert!(matches!(
            progress_codec().unmarshal(&wire),
            Err(SchemaError::UnknownEnumValue { .. })
        ));
    }

    #[test]
    fn marshal_rejects_undeclared_and_missing() {
        let codec = progress_codec();

        let mut record = progress_record();
        record.insert("extra".into(), FieldValue::Bool(true));
        assert!(matches!(
            codec.marshal(&record),
            Err(SchemaError::EncodingFailed { .. })
        ));

        let mut record = progress_record();
        record.remove("due");
        assert_eq!(
            codec.marshal(&record).unwrap_err(),
            SchemaError::missing_field("due")
        );
    }

    #[test]
    fn duplicate_wire_names_rejected() {
        let result = ObjectCodec::new(vec![
            Field::new("a", FieldType::Integer).alias("x"),
            Field::new("b", FieldType::Integer).alias("x"),
        ]);
        assert!(matches!(result, Err(SchemaError::InvalidSchema { .. })));
    }
}
