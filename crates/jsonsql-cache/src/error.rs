//! Error types for the local cache and the sync engine.

use jsonsql_core::schema::{RecordError, SchemaError};
use jsonsql_core::TranspileError;

use crate::remote::RemoteError;

/// Errors raised by the local store, the sync engine and the query client.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Local store failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The requested strategy cannot be applied to the table.
    #[error("Sync strategy error: {0}")]
    SyncStrategy(String),

    /// The persisted checkpoint was written for a different field layout.
    #[error("Schema version mismatch for table '{table}': stored {stored}, current {current}")]
    SchemaVersion {
        /// Table name.
        table: String,
        /// Schema hash recorded with the checkpoint.
        stored: String,
        /// Hash of the schema now registered.
        current: String,
    },

    /// No schema or local table exists under this name.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A sync for this table is already pending, running or paused.
    #[error("Sync already in progress for table '{0}'")]
    SyncInProgress(String),

    /// Invalid settings, sync configuration or table schema.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote execute capability failed.
    #[error("Connection error: {0}")]
    Connection(#[from] RemoteError),

    /// SQL that could not be turned into a JSONSQL request.
    #[error(transparent)]
    Transpile(#[from] TranspileError),

    /// A remote row did not fit the table schema.
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation was stopped or its future dropped.
    #[error("Sync of table '{0}' was cancelled")]
    Cancelled(String),

    /// A write statement was sent through the read-only query path.
    #[error("Only read queries are allowed on the cache: {0}")]
    ReadOnly(String),
}

impl From<SchemaError> for SyncError {
    fn from(err: SchemaError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result type for cache and sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
