//! Local SQLite mirror of remote JSONSQL tables.
//!
//! `jsonsql-cache` copies tables exposed by a remote JSONSQL API into a local
//! SQLite database and keeps them there:
//!
//! - **Store** - one physical table per registered schema, plus sync
//!   bookkeeping in `_sync_metadata` and `_cache_stats`
//! - **Sync engine** - chunked transfers by offset, id range, incremental
//!   field or full refresh, resumable from the last committed chunk, with
//!   pause/resume/stop and bounded multi-table concurrency
//! - **Query client** - runs SQL against the remote API through the
//!   transpiler and maps rows back to records
//!
//! The remote API itself is reached through [`remote::RemoteExecutor`], which
//! callers implement on top of their transport.
//!
//! # Example
//!
//! ```rust,ignore
//! use jsonsql_cache::prelude::*;
//!
//! let settings = CacheSettings::load("cache.toml")?;
//! let store = Arc::new(LocalStore::connect(&settings).await?);
//! store.initialize().await?;
//!
//! let registry = Arc::new(SchemaRegistry::load_json("schemas.json")?);
//! let engine = SyncEngine::new(remote, store, registry, settings);
//!
//! let progress = engine.dump(DumpConfig::new("movies"), None).await?;
//! println!("{} rows in {} chunks", progress.dumped_rows, progress.chunks);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod remote;
pub mod store;
pub mod sync;

/// Prelude for convenient imports.
pub mod prelude {
    pub use std::sync::Arc;

    pub use jsonsql_core::schema::{
        CacheStrategy, FieldDefinition, FieldType, FieldValue, Record, SchemaRegistry, SyncConfig,
        TableSchema,
    };

    pub use crate::client::{QueryClient, QueryOutput};
    pub use crate::config::CacheSettings;
    pub use crate::error::{Result, SyncError};
    pub use crate::remote::{rows_from_value, RemoteError, RemoteExecutor};
    pub use crate::store::{CacheStats, LocalStore, SyncMetadata, WriteMode};
    pub use crate::sync::{
        Checkpoint, DumpConfig, ProgressCallback, SyncEngine, SyncProgress, SyncState,
        SyncStrategy,
    };
}
