//! Schema command implementation.
//!
//! Prints the key paths and derived secondary indexes of the fixture
//! domain's entity schemas.

use crate::error::CliResult;
use cvrsync_testkit::LearningDomain;
use serde::Serialize;

/// Derived layout of one entity schema.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    /// Schema name.
    pub name: String,
    /// Key-path template.
    pub key_path: String,
    /// Literal key prefix.
    pub key_prefix: String,
    /// Value fields as `logical (wire)` pairs.
    pub fields: Vec<String>,
    /// Derived indexes.
    pub indexes: Vec<IndexReport>,
}

/// One derived index.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    /// Index name.
    pub name: String,
    /// Keys the index covers.
    pub key_prefix: String,
    /// JSON pointer into the marshaled value.
    pub pointer: String,
    /// Whether entries without the field are indexed.
    pub allow_empty: bool,
}

/// Describes every schema of the fixture domain.
pub fn run() -> CliResult<Vec<SchemaReport>> {
    let registry = LearningDomain::fixture().schemas()?;
    Ok(registry
        .schemas()
        .iter()
        .map(|schema| SchemaReport {
            name: schema.name().to_string(),
            key_path: schema.key_path().template().to_string(),
            key_prefix: schema.key_path().prefix().to_string(),
            fields: schema
                .value_codec()
                .fields()
                .iter()
                .map(|f| format!("{} ({})", f.name(), f.wire_name()))
                .collect(),
            indexes: schema
                .indexes()
                .iter()
                .map(|index| IndexReport {
                    name: index.name.clone(),
                    key_prefix: index.key_prefix.clone(),
                    pointer: index.json_pointer(),
                    allow_empty: index.allow_empty,
                })
                .collect(),
        })
        .collect())
}

/// Renders reports as indented text.
pub fn render_text(reports: &[SchemaReport]) -> String {
    let mut out = String::new();
    for schema in reports {
        out.push_str(&format!("{}  {}\n", schema.name, schema.key_path));
        out.push_str(&format!("  fields: {}\n", schema.fields.join(", ")));
        for index in &schema.indexes {
            out.push_str(&format!(
                "  index {}  prefix={}  path={}  allowEmpty={}\n",
                index.name, index.key_prefix, index.pointer, index.allow_empty
            ));
        }
    }
    out
}
