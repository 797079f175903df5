//! # cvrsync Schema
//!
//! Declarative entity schemas and the codecs derived from them.
//!
//! This crate provides:
//! - `EntitySchema` built once from a key-path template and typed fields
//! - Marshal / unmarshal between logical `Record`s and compact JSON objects
//!   (short aliases, fixed timestamp encodings, explicit enum code tables)
//! - Key-path interpolation and parsing
//! - Secondary index definitions over the marshaled shape
//!
//! ## Usage
//!
//! ```
//! use cvrsync_schema::{EntitySchema, Field, FieldType, FieldValue, Record, TimestampEncoding};
//!
//! let schema = EntitySchema::builder("skillState", "s/[skill]")
//!     .field(Field::new("skill", FieldType::Text))
//!     .field(Field::new("due", FieldType::Timestamp(TimestampEncoding::Iso8601)).alias("d"))
//!     .build()
//!     .unwrap();
//!
//! let mut record = Record::new();
//! record.insert("skill".into(), FieldValue::from("he:好"));
//! record.insert("due".into(), FieldValue::Timestamp(chrono::DateTime::from_timestamp_millis(0).unwrap()));
//!
//! let (key, value) = schema.marshal_entity(&record).unwrap();
//! assert_eq!(key, "s/he:好");
//! assert_eq!(schema.unmarshal_entity(&key, &value).unwrap(), record);
//! ```
//!
//! This is a pure crate with no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod field;
mod key_path;
mod object;
mod registry;
mod value;

pub use entity::{Entity, EntitySchema, EntitySchemaBuilder, IndexDefinition};
pub use error::{SchemaError, SchemaResult};
pub use field::{EnumTable, Field, FieldType, IndexSpec, TimestampEncoding};
pub use key_path::KeyPath;
pub use object::ObjectCodec;
pub use registry::SchemaRegistry;
pub use value::{FieldReader, FieldValue, Record};
