//! Error types for the schema model.

use std::path::PathBuf;

use super::FieldType;

/// Invalid `SyncConfig` values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("chunk_size must be positive")]
    ChunkSize,

    #[error("limit should be >= chunk_size")]
    LimitBelowChunkSize,

    #[error("incremental_field required when incremental_mode=True")]
    MissingIncrementalField,

    #[error("ttl must be non-negative")]
    NegativeTtl,

    #[error("cache_strategy must be one of full, incremental, on-demand; got '{0}'")]
    UnknownCacheStrategy(String),
}

/// Errors raised while building or loading table schemas.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Two fields claim the same position.
    #[error("Table '{table}' defines position {position} more than once")]
    DuplicatePosition {
        /// Table name.
        table: String,
        /// The repeated position.
        position: usize,
    },

    /// Two fields share a name.
    #[error("Table '{table}' defines field '{name}' more than once")]
    DuplicateName {
        /// Table name.
        table: String,
        /// The repeated name.
        name: String,
    },

    /// A schema without fields.
    #[error("Table '{0}' has no fields")]
    NoFields(String),

    /// A field name the local store cannot use as a column.
    #[error("Table '{table}': field name '{name}' is reserved")]
    ReservedName {
        /// Table name.
        table: String,
        /// The offending name.
        name: String,
    },

    /// The table's sync configuration is invalid.
    #[error("Table '{table}': {source}")]
    InvalidConfig {
        /// Table name.
        table: String,
        /// The validation failure.
        #[source]
        source: ConfigError,
    },

    /// IO error reading a schema file.
    #[error("Failed to read schema file '{path}': {source}")]
    Io {
        /// Path to the schema file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed schema JSON.
    #[error("Invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while mapping a positional row to a [`Record`](super::Record).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    /// The row does not reach a configured position.
    #[error("Row has {got} values, position {position} ('{field}') is missing")]
    ShortRow {
        /// Field whose position is missing.
        field: String,
        /// The missing position.
        position: usize,
        /// Values present in the row.
        got: usize,
    },

    /// A value cannot be read as the declared type.
    #[error("Field '{field}': cannot read {value} as {expected:?}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Declared type.
        expected: FieldType,
        /// The offending value, JSON-encoded.
        value: String,
    },

    /// NULL in a non-nullable field.
    #[error("Field '{0}' is not nullable")]
    NullViolation(String),

    /// A length or range bound was violated.
    #[error("Field '{field}': {message}")]
    Constraint {
        /// Field name.
        field: String,
        /// Description of the violated bound.
        message: String,
    },
}
