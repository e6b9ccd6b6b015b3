//! Sync bookkeeping tables.
//!
//! `_sync_metadata` keeps one row per mirrored table: its policy, the
//! checkpoint of the last committed chunk, row counts and the hash of the
//! field layout the checkpoint was written with. `_cache_stats` keeps one
//! global row (`id = 1`) of aggregate counters.

use chrono::{DateTime, Utc};
use jsonsql_core::schema::parse_timestamp;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::Result;
use crate::sync::{Checkpoint, SyncState};

/// Version of the bookkeeping layout written to `schema_version`.
pub const SCHEMA_FORMAT_VERSION: i64 = 1;

/// SQL to create the per-table sync metadata table.
pub const CREATE_SYNC_METADATA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS _sync_metadata (
    table_name TEXT PRIMARY KEY,
    strategy TEXT,
    cache_strategy TEXT NOT NULL DEFAULT 'full',
    ttl INTEGER NOT NULL DEFAULT 0,
    chunk_size INTEGER NOT NULL DEFAULT 1000,
    sync_config TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    checkpoint TEXT,
    synced_rows INTEGER NOT NULL DEFAULT 0,
    total_rows INTEGER,
    min_id INTEGER,
    max_id INTEGER,
    schema_hash TEXT NOT NULL,
    schema_version INTEGER NOT NULL DEFAULT 1,
    error_count INTEGER NOT NULL DEFAULT 0,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    started_at TEXT,
    last_sync_at TEXT
)
";

/// SQL to create the global statistics table.
pub const CREATE_CACHE_STATS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS _cache_stats (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    total_syncs INTEGER NOT NULL DEFAULT 0,
    successful_syncs INTEGER NOT NULL DEFAULT 0,
    failed_syncs INTEGER NOT NULL DEFAULT 0,
    total_rows_synced INTEGER NOT NULL DEFAULT 0,
    last_sync_at TEXT
)
";

/// SQL to seed the single statistics row.
pub const SEED_CACHE_STATS_SQL: &str = "INSERT OR IGNORE INTO _cache_stats (id) VALUES (1)";

pub(crate) const SELECT_SYNC_METADATA_SQL: &str = "SELECT table_name, strategy, cache_strategy, \
     ttl, chunk_size, status, checkpoint, synced_rows, total_rows, min_id, max_id, schema_hash, \
     schema_version, error_count, retry_count, last_error, started_at, last_sync_at, updated_at \
     FROM _sync_metadata";

/// A `_sync_metadata` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncMetadata {
    pub table_name: String,
    /// Strategy of the last started sync.
    pub strategy: Option<String>,
    pub cache_strategy: String,
    pub ttl: i64,
    pub chunk_size: i64,
    pub status: SyncState,
    /// Cursor of the last committed chunk.
    pub checkpoint: Option<Checkpoint>,
    /// Rows in the local table after the last committed chunk.
    pub synced_rows: i64,
    pub total_rows: Option<i64>,
    pub min_id: Option<i64>,
    pub max_id: Option<i64>,
    /// Hash of the field layout the checkpoint belongs to.
    pub schema_hash: String,
    pub schema_version: i64,
    pub error_count: i64,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SyncMetadata {
    /// Decodes a row selected with [`SELECT_SYNC_METADATA_SQL`].
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let checkpoint: Option<String> = row.try_get("checkpoint")?;
        let checkpoint = checkpoint
            .as_deref()
            .map(serde_json::from_str::<Checkpoint>)
            .transpose()?;
        Ok(Self {
            table_name: row.try_get("table_name")?,
            strategy: row.try_get("strategy")?,
            cache_strategy: row.try_get("cache_strategy")?,
            ttl: row.try_get("ttl")?,
            chunk_size: row.try_get("chunk_size")?,
            status: status.parse().unwrap_or(SyncState::Failed),
            checkpoint,
            synced_rows: row.try_get("synced_rows")?,
            total_rows: row.try_get("total_rows")?,
            min_id: row.try_get("min_id")?,
            max_id: row.try_get("max_id")?,
            schema_hash: row.try_get("schema_hash")?,
            schema_version: row.try_get("schema_version")?,
            error_count: row.try_get("error_count")?,
            retry_count: row.try_get("retry_count")?,
            last_error: row.try_get("last_error")?,
            started_at: timestamp(row, "started_at")?,
            last_sync_at: timestamp(row, "last_sync_at")?,
            updated_at: timestamp(row, "updated_at")?,
        })
    }

    /// Returns true if an earlier run stopped before completing, leaving a
    /// checkpoint to continue from.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.checkpoint.is_some() && !matches!(self.status, SyncState::Completed)
    }
}

fn timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.try_get(column)?;
    Ok(text.as_deref().and_then(parse_timestamp))
}

/// Current time as stored in bookkeeping columns.
pub(crate) fn now_text() -> String {
    Utc::now().to_rfc3339()
}

/// Aggregate counters over the whole cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Tables with a `_sync_metadata` row.
    pub table_count: i64,
    /// Rows across those tables.
    pub row_count: i64,
    /// Database size in bytes.
    pub db_size_bytes: i64,
    pub total_syncs: i64,
    pub successful_syncs: i64,
    pub failed_syncs: i64,
    pub total_rows_synced: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
}
