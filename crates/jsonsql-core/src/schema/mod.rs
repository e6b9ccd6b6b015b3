//! Schema model: field definitions, table schemas, sync policy and typed
//! records.
//!
//! A [`TableSchema`] maps positions in the positional rows returned by the
//! remote API to named, typed fields. Only configured positions are ever
//! materialized; trailing values beyond them are dropped.

mod error;
mod field;
mod record;
mod registry;
mod sync_config;
mod table;

pub use error::{ConfigError, RecordError, SchemaError};
pub use field::{FieldConstraints, FieldDefinition, FieldType};
pub use record::{parse_timestamp, FieldValue, Record};
pub use registry::SchemaRegistry;
pub use sync_config::{CacheStrategy, SyncConfig};
pub use table::{TableMetadata, TableSchema, RESERVED_COLUMNS};
