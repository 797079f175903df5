//! Property tests for the codec and key-path round trips.

use chrono::{DateTime, Utc};
use cvrsync_schema::{
    EntitySchema, EnumTable, Field, FieldType, FieldValue, ObjectCodec, Record, TimestampEncoding,
};
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use std::collections::BTreeMap;

fn schema() -> EntitySchema {
    let rating = EnumTable::new(
        "rating",
        &[("Again", "1"), ("Hard", "2"), ("Good", "3"), ("Easy", "4")],
    )
    .unwrap();
    let srs = ObjectCodec::new(vec![
        Field::new("stability", FieldType::Float).alias("s"),
        Field::new("due", FieldType::Timestamp(TimestampEncoding::Iso8601))
            .alias("d")
            .indexed("byDue"),
    ])
    .unwrap();

    EntitySchema::builder("review", "p/[skill]/[n]/[at]")
        .field(Field::new("skill", FieldType::Text))
        .field(Field::new("n", FieldType::Integer))
        .field(Field::new("at", FieldType::Timestamp(TimestampEncoding::Millis)))
        .field(Field::new("rating", FieldType::enumeration(rating)).alias("r"))
        .field(Field::new("note", FieldType::optional(FieldType::Text)).alias("o"))
        .field(Field::new("streak", FieldType::array(FieldType::Integer)).alias("k"))
        .field(Field::new("srs", FieldType::optional(FieldType::Object(srs))).alias("s"))
        .field(Field::new("done", FieldType::Bool).alias("x"))
        .build()
        .unwrap()
}

/// Two text variables split by a multi-character separator.
fn pair_schema() -> EntitySchema {
    EntitySchema::builder("pair", "w/[left]::[right]")
        .field(Field::new("left", FieldType::Text))
        .field(Field::new("right", FieldType::Text))
        .build()
        .unwrap()
}

/// Arbitrary text, plus short strings dense in separator characters and
/// newlines so boundary cases show up often.
fn key_text() -> impl Strategy<Value = String> {
    prop_oneof![any::<String>(), "[:/a\n好]{1,8}"]
}

fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (-2_000_000_000_000i64..4_102_444_800_000i64)
        .prop_map(|ms| DateTime::<Utc>::from_timestamp_millis(ms).unwrap())
}

fn srs() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        (-1e9f64..1e9f64, timestamp()).prop_map(|(stability, due)| {
            let mut record = Record::new();
            record.insert("stability".into(), FieldValue::Float(stability));
            record.insert("due".into(), FieldValue::Timestamp(due));
            FieldValue::Object(record)
        }),
    ]
}

fn record() -> impl Strategy<Value = Record> {
    (
        key_text(),
        any::<i64>(),
        timestamp(),
        prop::sample::select(vec!["Again", "Hard", "Good", "Easy"]),
        prop::option::of("[ -~]{0,20}"),
        prop::collection::vec(any::<i64>(), 0..5),
        srs(),
        any::<bool>(),
    )
        .prop_map(|(skill, n, at, rating, note, streak, srs, done)| {
            let mut record = Record::new();
            record.insert("skill".into(), FieldValue::Text(skill));
            record.insert("n".into(), FieldValue::Integer(n));
            record.insert("at".into(), FieldValue::Timestamp(at));
            record.insert("rating".into(), FieldValue::variant(rating));
            record.insert("note".into(), FieldValue::from(note));
            record.insert(
                "streak".into(),
                FieldValue::Array(streak.into_iter().map(FieldValue::Integer).collect()),
            );
            record.insert("srs".into(), srs);
            record.insert("done".into(), FieldValue::Bool(done));
            record
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn unmarshal_inverts_marshal(record in record()) {
        let schema = schema();
        prop_assume!(schema.interpolate_key(&record).is_ok());
        let wire = schema.marshal_value(&record).unwrap();
        let mut decoded = schema.unmarshal_value(&wire).unwrap();
        decoded.extend(schema.parse_key(&schema.interpolate_key(&record).unwrap()).unwrap());
        prop_assert_eq!(decoded, record);
    }

    #[test]
    fn parse_key_inverts_interpolate_key(record in record()) {
        let schema = schema();
        let key = schema.interpolate_key(&record);
        prop_assume!(key.is_ok());
        let key = key.unwrap();
        let parsed = schema.parse_key(&key).unwrap();

        for name in ["skill", "n", "at"] {
            prop_assert_eq!(parsed.get(name), record.get(name));
        }
        prop_assert_eq!(parsed.len(), 3);
        prop_assert!(schema.owns_key(&key));
    }

    #[test]
    fn multi_character_separator_keys_parse_back(left in key_text(), right in key_text()) {
        let schema = pair_schema();
        let record: Record = BTreeMap::from([
            ("left".to_string(), FieldValue::Text(left)),
            ("right".to_string(), FieldValue::Text(right)),
        ]);
        let key = schema.interpolate_key(&record);
        prop_assume!(key.is_ok());
        prop_assert_eq!(schema.parse_key(&key.unwrap()).unwrap(), record);
    }

    #[test]
    fn entity_roundtrip(record in record()) {
        let schema = schema();
        prop_assume!(schema.interpolate_key(&record).is_ok());
        let (key, value) = schema.marshal_entity(&record).unwrap();
        prop_assert_eq!(schema.unmarshal_entity(&key, &value).unwrap(), record);
    }
}

#[test]
fn marshaled_form_carries_only_aliases() {
    let schema = schema();
    let mut runner = proptest::test_runner::TestRunner::default();
    let record = record()
        .prop_filter("key must interpolate", |r| schema.interpolate_key(r).is_ok())
        .new_tree(&mut runner)
        .unwrap()
        .current();
    let wire = schema.marshal_value(&record).unwrap();

    for key in wire.as_object().unwrap().keys() {
        assert!(["r", "o", "k", "s", "x"].contains(&key.as_str()), "unexpected {key}");
    }
}
