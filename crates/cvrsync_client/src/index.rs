//! Secondary index scans over the replica.

use cvrsync_schema::IndexDefinition;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One hit of an index scan.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Indexed value, `Null` for entries admitted without the field.
    pub indexed: JsonValue,
    /// Replica key.
    pub key: String,
    /// Marshaled value.
    pub value: JsonValue,
}

/// Scans `state` through `index`: keys under the index prefix whose value
/// carries the field at the structural path.
///
/// Entries are ordered by indexed value, then key. Missing or `null` fields
/// are skipped unless the index admits empty entries, in which case they
/// sort first.
pub fn scan_index(state: &BTreeMap<String, JsonValue>, index: &IndexDefinition) -> Vec<IndexEntry> {
    let pointer = index.json_pointer();
    let mut entries: Vec<IndexEntry> = state
        .range(index.key_prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(&index.key_prefix))
        .filter_map(|(key, value)| {
            let indexed = value.pointer(&pointer).cloned().unwrap_or(JsonValue::Null);
            if indexed.is_null() && !index.allow_empty {
                return None;
            }
            Some(IndexEntry {
                indexed,
                key: key.clone(),
                value: value.clone(),
            })
        })
        .collect();

    entries.sort_by(|a, b| compare(&a.indexed, &b.indexed).then_with(|| a.key.cmp(&b.key)));
    entries
}

fn rank(value: &JsonValue) -> u8 {
    match value {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    }
}

/// Total order over index values: null, bools, numbers, strings, then
/// anything else by its serialized form.
fn compare(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        _ => rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
