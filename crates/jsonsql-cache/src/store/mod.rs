//! Local SQLite store for mirrored tables.
//!
//! The store owns one physical table per registered schema plus the
//! `_sync_metadata` and `_cache_stats` bookkeeping tables. Every chunk is
//! committed together with its checkpoint in a single transaction, so the
//! persisted checkpoint never runs ahead of the persisted rows.

pub mod ddl;
mod metadata;
mod values;

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use jsonsql_core::lexer::Keyword;
use jsonsql_core::schema::{
    parse_timestamp, FieldType, FieldValue, Record, RecordError, SchemaRegistry, TableSchema,
};
use jsonsql_core::{Lexer, TokenKind};
use serde_json::Value;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::config::CacheSettings;
use crate::error::{Result, SyncError};
use crate::sync::{Checkpoint, SyncState};

pub use metadata::{
    CacheStats, SyncMetadata, CREATE_CACHE_STATS_SQL, CREATE_SYNC_METADATA_SQL,
    SCHEMA_FORMAT_VERSION, SEED_CACHE_STATS_SQL,
};
pub use values::{bind_json, bind_value, decode_row};

use metadata::{now_text, SELECT_SYNC_METADATA_SQL};

/// How a chunk's rows are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Plain inserts; rows whose identity already exists are skipped.
    Insert,
    /// Update rows matched by identity, insert the rest.
    Upsert,
    /// Delete the table's rows, then insert.
    Replace,
}

/// Outcome of one committed chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkWrite {
    pub inserted: u64,
    pub updated: u64,
    /// Rows rejected by projection or by a local constraint.
    pub skipped: u64,
    /// Rows in the table after the commit.
    pub table_rows: u64,
}

impl ChunkWrite {
    /// Rows written by this chunk.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

enum RowWrite {
    Inserted,
    Updated,
}

/// The local cache database.
#[derive(Debug)]
pub struct LocalStore {
    pool: SqlitePool,
    layouts: SchemaRegistry,
}

impl LocalStore {
    /// Opens the database named by `settings.database_url`.
    ///
    /// The pool holds a single long-lived connection, which keeps in-memory
    /// databases alive and serializes writers.
    pub async fn connect(settings: &CacheSettings) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(&settings.database_url)?
            .create_if_missing(true)
            .busy_timeout(settings.busy_timeout());
        if settings.wal && !settings.is_in_memory() {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        debug!(url = %settings.database_url, "Opened cache database");
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            layouts: SchemaRegistry::new(),
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the bookkeeping tables.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(CREATE_SYNC_METADATA_SQL)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_CACHE_STATS_SQL)
            .execute(&self.pool)
            .await?;
        sqlx::query(SEED_CACHE_STATS_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Creates the physical table for `schema` and records its policy.
    ///
    /// An existing table is kept if its columns match the schema. Otherwise it
    /// is dropped and recreated, unless an unfinished sync left a checkpoint
    /// for the old layout. Returns true if the table was created.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::SchemaVersion` if the layout changed while a sync
    /// of the table is interrupted. [`LocalStore::register_table_fresh`]
    /// discards such a checkpoint instead.
    pub async fn register_table(&self, schema: &TableSchema) -> Result<bool> {
        self.register(schema, false).await
    }

    /// Like [`LocalStore::register_table`], but a changed layout always
    /// recreates the table, discarding any unfinished checkpoint.
    pub async fn register_table_fresh(&self, schema: &TableSchema) -> Result<bool> {
        self.register(schema, true).await
    }

    /// Makes an existing table queryable through [`LocalStore::execute_query`]
    /// without creating, altering or recording anything.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::TableNotFound` if the table does not exist and
    /// `SyncError::SchemaVersion` if its columns differ from `schema`.
    pub async fn attach_table(&self, schema: &TableSchema) -> Result<()> {
        let table = schema.table_name.as_str();
        let existing = self.physical_columns(table).await?;
        if existing.is_empty() {
            return Err(SyncError::TableNotFound(table.to_string()));
        }
        if !layout_matches(&existing, &ddl::expected_columns(schema)) {
            let stored = self
                .sync_metadata(table)
                .await?
                .map(|metadata| metadata.schema_hash)
                .unwrap_or_default();
            return Err(SyncError::SchemaVersion {
                table: table.to_string(),
                stored,
                current: schema.schema_hash(),
            });
        }
        self.layouts.register(schema.clone());
        Ok(())
    }

    async fn register(&self, schema: &TableSchema, discard_checkpoint: bool) -> Result<bool> {
        let table = schema.table_name.as_str();
        let existing = self.physical_columns(table).await?;
        let matches = layout_matches(&existing, &ddl::expected_columns(schema));
        if !matches && !existing.is_empty() && !discard_checkpoint {
            if let Some(metadata) = self.sync_metadata(table).await? {
                if metadata.is_interrupted() {
                    return Err(SyncError::SchemaVersion {
                        table: table.to_string(),
                        stored: metadata.schema_hash,
                        current: schema.schema_hash(),
                    });
                }
            }
        }

        let now = now_text();
        let sync_config = serde_json::to_string(&schema.sync_config)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO _sync_metadata (table_name, cache_strategy, ttl, chunk_size, sync_config, \
             schema_hash, schema_version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(table_name) DO UPDATE SET cache_strategy = excluded.cache_strategy, \
             ttl = excluded.ttl, chunk_size = excluded.chunk_size, \
             sync_config = excluded.sync_config, updated_at = excluded.updated_at",
        )
        .bind(table)
        .bind(schema.sync_config.cache_strategy.as_str())
        .bind(schema.sync_config.ttl)
        .bind(schema.sync_config.chunk_size)
        .bind(sync_config)
        .bind(schema.schema_hash())
        .bind(SCHEMA_FORMAT_VERSION)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let created = !matches;
        if created {
            if !existing.is_empty() {
                info!(table = %table, "Table layout changed, recreating");
                sqlx::query(&ddl::drop_table_sql(table))
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    "UPDATE _sync_metadata SET checkpoint = NULL, status = 'pending', \
                     synced_rows = 0, min_id = NULL, max_id = NULL, schema_hash = ?, \
                     schema_version = schema_version + 1, updated_at = ? WHERE table_name = ?",
                )
                .bind(schema.schema_hash())
                .bind(&now)
                .bind(table)
                .execute(&mut *tx)
                .await?;
            }
            let create = ddl::create_table_sql(table, schema);
            debug!(sql = %create, "Executing SQL");
            sqlx::query(&create).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        self.layouts.register(schema.clone());
        Ok(created)
    }

    async fn physical_columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        let sql = format!("PRAGMA table_info({})", ddl::quote_identifier(table));
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<(String, String)> {
                Ok((row.try_get("name")?, row.try_get("type")?))
            })
            .collect()
    }

    fn layout(&self, table: &str) -> Result<Arc<TableSchema>> {
        self.layouts
            .get(table)
            .ok_or_else(|| SyncError::TableNotFound(table.to_string()))
    }

    /// Returns true if `table` was registered with this store.
    #[must_use]
    pub fn has_table(&self, table: &str) -> bool {
        self.layouts.has(table)
    }

    /// Inserts positional rows projected through `schema`. Rows that fail
    /// projection or whose identity already exists are skipped. Returns the
    /// number of rows inserted.
    pub async fn bulk_insert(
        &self,
        table: &str,
        rows: &[Vec<Value>],
        schema: &TableSchema,
    ) -> Result<u64> {
        let write = self
            .write_rows(table, rows, schema, WriteMode::Insert, None)
            .await?;
        Ok(write.inserted)
    }

    /// Updates rows matched by identity and inserts the rest. Returns
    /// `(inserted, updated)`.
    pub async fn upsert_rows(
        &self,
        table: &str,
        rows: &[Vec<Value>],
        schema: &TableSchema,
    ) -> Result<(u64, u64)> {
        let write = self
            .write_rows(table, rows, schema, WriteMode::Upsert, None)
            .await?;
        Ok((write.inserted, write.updated))
    }

    /// Replaces the table's contents with `rows`.
    pub async fn replace_rows(
        &self,
        table: &str,
        rows: &[Vec<Value>],
        schema: &TableSchema,
    ) -> Result<u64> {
        let write = self
            .write_rows(table, rows, schema, WriteMode::Replace, None)
            .await?;
        Ok(write.inserted)
    }

    /// Deletes every row of `table`. Returns the number of rows removed.
    pub async fn clear_table(&self, table: &str) -> Result<u64> {
        self.layout(table)?;
        let mut conn = self.pool.acquire().await?;
        clear(&mut *conn, table).await
    }

    /// Writes one fetched chunk and its checkpoint atomically, projecting
    /// through the registered layout.
    pub async fn commit_chunk(
        &self,
        table: &str,
        rows: &[Vec<Value>],
        mode: WriteMode,
        checkpoint: &Checkpoint,
    ) -> Result<ChunkWrite> {
        let layout = self.layout(table)?;
        self.write_rows(table, rows, &layout, mode, Some(checkpoint))
            .await
    }

    /// Projects and writes `rows` in one transaction.
    ///
    /// Rows that fail projection or violate a local constraint are skipped
    /// with a warning; any other failure rolls the whole batch back. With a
    /// checkpoint, the metadata row is advanced in the same transaction.
    async fn write_rows(
        &self,
        table: &str,
        rows: &[Vec<Value>],
        schema: &TableSchema,
        mode: WriteMode,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<ChunkWrite> {
        let layout = self.layout(table)?;
        if ddl::expected_columns(schema) != ddl::expected_columns(&layout) {
            return Err(SyncError::Configuration(format!(
                "schema does not match the registered layout of table '{table}'"
            )));
        }

        let synced_at = now_text();
        let mut write = ChunkWrite::default();
        let mut tx = self.pool.begin().await?;
        if mode == WriteMode::Replace {
            clear(&mut *tx, table).await?;
        }

        for row in rows {
            let record = match schema.project(row) {
                Ok(record) => record,
                Err(err) => {
                    warn!(table = %table, error = %err, "Skipping row");
                    write.skipped += 1;
                    continue;
                }
            };
            tally(
                &mut write,
                write_record(&mut *tx, &layout, &record, mode, &synced_at).await,
                table,
            )?;
        }
        write.table_rows = count_rows(&mut *tx, table).await?;

        if let Some(checkpoint) = checkpoint {
            let (min_id, max_id) = match layout
                .identity_field()
                .filter(|field| field.field_type == FieldType::Integer)
            {
                Some(identity) => {
                    let column = ddl::quote_identifier(&identity.name);
                    let sql = format!(
                        "SELECT MIN({column}), MAX({column}) FROM {}",
                        ddl::quote_identifier(table)
                    );
                    sqlx::query_as::<_, (Option<i64>, Option<i64>)>(&sql)
                        .fetch_one(&mut *tx)
                        .await?
                }
                None => (None, None),
            };

            sqlx::query(
                "UPDATE _sync_metadata SET checkpoint = ?, synced_rows = ?, min_id = ?, \
                 max_id = ?, updated_at = ? WHERE table_name = ?",
            )
            .bind(serde_json::to_string(checkpoint)?)
            .bind(i64::try_from(write.table_rows).unwrap_or(i64::MAX))
            .bind(min_id)
            .bind(max_id)
            .bind(now_text())
            .bind(table)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            table = %table,
            inserted = write.inserted,
            updated = write.updated,
            skipped = write.skipped,
            "Wrote rows"
        );
        Ok(write)
    }

    /// Runs a read-only query against the cache and decodes the rows using
    /// the layout of `table`.
    ///
    /// Only a single `SELECT` (or `WITH ... SELECT`) statement is accepted. It
    /// runs inside a transaction that is always rolled back.
    pub async fn execute_query(
        &self,
        table: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Record>> {
        let layout = self.layout(table)?;
        ensure_read_only(sql)?;

        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_json(query, param);
        }
        debug!(sql = %sql, "Executing SQL");
        let rows = query.fetch_all(&mut *tx).await;
        tx.rollback().await?;

        rows?
            .iter()
            .map(|row| decode_row(row, Some(&*layout)).map_err(SyncError::from))
            .collect()
    }

    /// Number of rows in a registered table.
    pub async fn row_count(&self, table: &str) -> Result<u64> {
        self.layout(table)?;
        let mut conn = self.pool.acquire().await?;
        count_rows(&mut *conn, table).await
    }

    /// Tables known to the metadata table, sorted.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT table_name FROM _sync_metadata ORDER BY table_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Loads the metadata row of `table`.
    pub async fn sync_metadata(&self, table: &str) -> Result<Option<SyncMetadata>> {
        let sql = format!("{SELECT_SYNC_METADATA_SQL} WHERE table_name = ?");
        let row = sqlx::query(&sql)
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(SyncMetadata::from_row).transpose()
    }

    /// Loads every metadata row.
    pub async fn all_sync_metadata(&self) -> Result<Vec<SyncMetadata>> {
        let sql = format!("{SELECT_SYNC_METADATA_SQL} ORDER BY table_name");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(SyncMetadata::from_row).collect()
    }

    /// Returns true if `table` completed a sync less than `ttl` seconds ago.
    /// A `ttl` of zero never expires.
    pub async fn is_fresh(&self, table: &str, ttl: i64) -> Result<bool> {
        let Some(metadata) = self.sync_metadata(table).await? else {
            return Ok(false);
        };
        if metadata.status != SyncState::Completed {
            return Ok(false);
        }
        let Some(last_sync) = metadata.last_sync_at else {
            return Ok(false);
        };
        Ok(ttl == 0 || (Utc::now() - last_sync).num_seconds() < ttl)
    }

    /// Marks a sync as running.
    ///
    /// With `reset`, the checkpoint is dropped and the table emptied in the
    /// same transaction.
    pub async fn begin_sync(
        &self,
        table: &str,
        strategy: &str,
        schema_hash: &str,
        reset: bool,
    ) -> Result<()> {
        let now = now_text();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE _sync_metadata SET status = 'running', strategy = ?, schema_hash = ?, \
             started_at = ?, updated_at = ?, last_error = NULL WHERE table_name = ?",
        )
        .bind(strategy)
        .bind(schema_hash)
        .bind(&now)
        .bind(&now)
        .bind(table)
        .execute(&mut *tx)
        .await?;
        if reset {
            sqlx::query(
                "UPDATE _sync_metadata SET checkpoint = NULL, synced_rows = 0, min_id = NULL, \
                 max_id = NULL, retry_count = 0 WHERE table_name = ?",
            )
            .bind(table)
            .execute(&mut *tx)
            .await?;
            clear(&mut *tx, table).await?;
        }
        sqlx::query("UPDATE _cache_stats SET total_syncs = total_syncs + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Records the remote row estimate for `table`.
    pub async fn set_total_rows(&self, table: &str, total_rows: Option<u64>) -> Result<()> {
        sqlx::query("UPDATE _sync_metadata SET total_rows = ?, updated_at = ? WHERE table_name = ?")
            .bind(total_rows.map(|n| i64::try_from(n).unwrap_or(i64::MAX)))
            .bind(now_text())
            .bind(table)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a sync's terminal state and folds it into the global counters.
    pub async fn finish_sync(
        &self,
        table: &str,
        state: SyncState,
        rows: u64,
        error: Option<&str>,
    ) -> Result<()> {
        let now = now_text();
        let succeeded = state == SyncState::Completed;
        let rows = i64::try_from(rows).unwrap_or(i64::MAX);
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE _sync_metadata SET status = ?, last_error = ?, \
             error_count = error_count + ?, \
             last_sync_at = CASE WHEN ? THEN ? ELSE last_sync_at END, \
             updated_at = ? WHERE table_name = ?",
        )
        .bind(state.as_str())
        .bind(error)
        .bind(i64::from(!succeeded))
        .bind(succeeded)
        .bind(&now)
        .bind(&now)
        .bind(table)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE _cache_stats SET successful_syncs = successful_syncs + ?, \
             failed_syncs = failed_syncs + ?, total_rows_synced = total_rows_synced + ?, \
             last_sync_at = ? WHERE id = 1",
        )
        .bind(i64::from(succeeded))
        .bind(i64::from(!succeeded))
        .bind(rows)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Updates the status of `table` without touching counters.
    pub async fn set_status(&self, table: &str, state: SyncState) -> Result<()> {
        sqlx::query("UPDATE _sync_metadata SET status = ?, updated_at = ? WHERE table_name = ?")
            .bind(state.as_str())
            .bind(now_text())
            .bind(table)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts a retried local write.
    pub async fn record_retry(&self, table: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE _sync_metadata SET retry_count = retry_count + 1, last_error = ?, \
             updated_at = ? WHERE table_name = ?",
        )
        .bind(error)
        .bind(now_text())
        .bind(table)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Aggregate statistics over the whole cache.
    pub async fn get_stats(&self) -> Result<CacheStats> {
        let (table_count, row_count): (i64, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), SUM(synced_rows) FROM _sync_metadata")
                .fetch_one(&self.pool)
                .await?;
        let (page_count,): (i64,) = sqlx::query_as("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let (page_size,): (i64,) = sqlx::query_as("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        let (total_syncs, successful_syncs, failed_syncs, total_rows_synced, last_sync_at): (
            i64,
            i64,
            i64,
            i64,
            Option<String>,
        ) = sqlx::query_as(
            "SELECT total_syncs, successful_syncs, failed_syncs, total_rows_synced, last_sync_at \
             FROM _cache_stats WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CacheStats {
            table_count,
            row_count: row_count.unwrap_or(0),
            db_size_bytes: page_count * page_size,
            total_syncs,
            successful_syncs,
            failed_syncs,
            total_rows_synced,
            last_sync_at: last_sync_at
                .as_deref()
                .and_then(parse_timestamp),
        })
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn layout_matches(existing: &[(String, String)], expected: &[(String, &'static str)]) -> bool {
    existing.len() == expected.len()
        && existing
            .iter()
            .zip(expected)
            .all(|((name, ty), (want_name, want_ty))| {
                name == want_name && ty.eq_ignore_ascii_case(want_ty)
            })
}

/// Rejects anything but a single `SELECT` or `WITH` statement.
fn ensure_read_only(sql: &str) -> Result<()> {
    let tokens = Lexer::new(sql).tokenize();
    let mut significant = tokens
        .iter()
        .filter(|token| !matches!(token.kind, TokenKind::Eof))
        .collect::<Vec<_>>();
    while significant
        .last()
        .is_some_and(|token| matches!(token.kind, TokenKind::Semicolon))
    {
        significant.pop();
    }

    let starts_with_read = matches!(
        significant.first().map(|token| &token.kind),
        Some(TokenKind::Keyword(Keyword::Select | Keyword::With))
    );
    if !starts_with_read {
        return Err(SyncError::ReadOnly(sql.trim().to_string()));
    }
    if significant
        .iter()
        .any(|token| matches!(token.kind, TokenKind::Semicolon))
    {
        return Err(SyncError::ReadOnly(String::from(
            "multiple statements are not allowed",
        )));
    }
    Ok(())
}

async fn clear(conn: &mut SqliteConnection, table: &str) -> Result<u64> {
    let sql = format!("DELETE FROM {}", ddl::quote_identifier(table));
    let result = sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

async fn count_rows(conn: &mut SqliteConnection, table: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", ddl::quote_identifier(table));
    let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&mut *conn).await?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Folds one row write into `write`, skipping constraint violations.
fn tally(write: &mut ChunkWrite, outcome: Result<RowWrite>, table: &str) -> Result<()> {
    match outcome {
        Ok(RowWrite::Inserted) => write.inserted += 1,
        Ok(RowWrite::Updated) => write.updated += 1,
        Err(err) if is_row_level(&err) => {
            warn!(table = %table, error = %err, "Skipping row");
            write.skipped += 1;
        }
        Err(err) => return Err(err),
    }
    Ok(())
}

fn is_row_level(err: &SyncError) -> bool {
    match err {
        SyncError::Database(sqlx::Error::Database(db)) => matches!(
            db.kind(),
            ErrorKind::UniqueViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation
        ),
        SyncError::Record(_) => true,
        _ => false,
    }
}

async fn write_record(
    conn: &mut SqliteConnection,
    layout: &TableSchema,
    record: &Record,
    mode: WriteMode,
    synced_at: &str,
) -> Result<RowWrite> {
    let table = layout.table_name.as_str();
    let identity = layout.identity_field().map(|field| field.name.as_str());

    if let (WriteMode::Upsert, Some(identity)) = (mode, identity) {
        let id_value = record
            .get(identity)
            .filter(|value| !value.is_null())
            .ok_or_else(|| RecordError::NullViolation(identity.to_string()))?;
        let sql = ddl::update_sql(table, layout, identity);
        let mut query = sqlx::query(&sql);
        for field in layout.fields().filter(|field| field.name != identity) {
            query = bind_value(query, record.get(&field.name).unwrap_or(&NULL));
        }
        query = query.bind(synced_at);
        query = bind_value(query, id_value);
        if query.execute(&mut *conn).await?.rows_affected() > 0 {
            return Ok(RowWrite::Updated);
        }
    }

    let sql = ddl::insert_sql(table, layout);
    let mut query = sqlx::query(&sql);
    for field in layout.fields() {
        query = bind_value(query, record.get(&field.name).unwrap_or(&NULL));
    }
    query
        .bind(synced_at)
        .bind(1_i64)
        .bind(0_i64)
        .execute(&mut *conn)
        .await?;
    Ok(RowWrite::Inserted)
}

static NULL: FieldValue = FieldValue::Null;
