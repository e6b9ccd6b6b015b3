//! The sync engine: drives chunked transfers from the remote API into the
//! local store.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use jsonsql_core::schema::{FieldType, SchemaRegistry, SyncConfig, TableMetadata, TableSchema};
use jsonsql_core::transpile;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::control::{Control, Operation, OperationGuard};
use super::strategy::{chunk_request, count_request, filter_expression};
use super::{Checkpoint, SyncProgress, SyncState, SyncStrategy};
use crate::config::CacheSettings;
use crate::error::{Result, SyncError};
use crate::remote::RemoteExecutor;
use crate::store::{ChunkWrite, LocalStore, WriteMode};

/// Called after every committed chunk.
pub type ProgressCallback = Arc<dyn Fn(&SyncProgress) + Send + Sync>;

/// What to sync.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpConfig {
    /// Registered table name.
    pub table: String,
    /// Overrides the strategy derived from the sync configuration.
    pub strategy: Option<SyncStrategy>,
    /// Overrides the schema's sync configuration for this run.
    pub sync: Option<SyncConfig>,
    /// Ignores any persisted checkpoint and starts over.
    pub fresh: bool,
}

impl DumpConfig {
    /// Syncs `table` with its registered configuration.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            strategy: None,
            sync: None,
            fresh: false,
        }
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn with_sync_config(mut self, sync: SyncConfig) -> Self {
        self.sync = Some(sync);
        self
    }

    #[must_use]
    pub const fn fresh(mut self) -> Self {
        self.fresh = true;
        self
    }
}

/// Mirrors registered tables into a [`LocalStore`].
pub struct SyncEngine {
    remote: Arc<dyn RemoteExecutor>,
    store: Arc<LocalStore>,
    registry: Arc<SchemaRegistry>,
    settings: CacheSettings,
    operations: Mutex<HashMap<String, Arc<Operation>>>,
}

impl SyncEngine {
    /// Creates an engine over an initialized store.
    pub fn new(
        remote: Arc<dyn RemoteExecutor>,
        store: Arc<LocalStore>,
        registry: Arc<SchemaRegistry>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            remote,
            store,
            registry,
            settings,
            operations: Mutex::new(HashMap::new()),
        }
    }

    /// The local store.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// The schema registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Syncs one table and returns its final progress.
    ///
    /// An interrupted earlier run of the same strategy is resumed from its
    /// checkpoint. Resuming fails with `SyncError::SchemaVersion` if the
    /// table's field layout changed since the checkpoint was written.
    ///
    /// Dropping the returned future fails the operation in memory only; the
    /// persisted status stays `running` and the next dump resumes from the
    /// last committed chunk. [`SyncEngine::dump_many`] records its timeouts.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::SyncInProgress` if the table is already being
    /// synced, and the first fatal error of the run otherwise. The error is
    /// also recorded on the operation, see [`SyncEngine::get_stats`].
    pub async fn dump(
        &self,
        config: DumpConfig,
        callback: Option<ProgressCallback>,
    ) -> Result<SyncProgress> {
        let schema = self.resolve(&config)?;
        let strategy = match config.strategy {
            Some(strategy) => strategy.check(&schema)?,
            None => SyncStrategy::for_schema(&schema)?,
        };
        let table = schema.table_name.clone();
        let (operation, control) = self.install(&table, strategy)?;
        let _guard = OperationGuard::new(Arc::clone(&operation));

        info!(table = %table, strategy = %strategy, "Starting sync");
        let result = self
            .run(
                &operation,
                control,
                &schema,
                strategy,
                config.fresh,
                callback.as_ref(),
            )
            .await;

        match result {
            Ok(progress) => {
                info!(
                    table = %table,
                    rows = progress.dumped_rows,
                    chunks = progress.chunks,
                    "Sync completed"
                );
                Ok(progress)
            }
            Err(err) => {
                let message = err.to_string();
                let progress = operation.update(|p| p.fail(message.clone()));
                warn!(table = %table, error = %message, "Sync failed");
                if let Err(finish_err) = self
                    .store
                    .finish_sync(&table, SyncState::Failed, progress.dumped_rows, Some(&message))
                    .await
                {
                    warn!(table = %table, error = %finish_err, "Could not record sync failure");
                }
                Err(err)
            }
        }
    }

    /// Syncs several tables, at most `max_concurrent` at a time (the
    /// configured default when `None`). Configurations start in submission
    /// order; results are returned in the same order. A failing table does
    /// not affect the others.
    pub async fn dump_many(
        &self,
        configs: Vec<DumpConfig>,
        max_concurrent: Option<usize>,
        callback: Option<ProgressCallback>,
    ) -> Vec<(String, Result<SyncProgress>)> {
        let limit = max_concurrent
            .unwrap_or(self.settings.max_concurrent)
            .max(1);
        let timeout = self.settings.sync_run_timeout();

        stream::iter(configs)
            .map(|config| {
                let callback = callback.clone();
                async move {
                    let table = config.table.clone();
                    let run = self.dump(config, callback);
                    let result = match timeout {
                        Some(limit) => match tokio::time::timeout(limit, run).await {
                            Ok(result) => result,
                            Err(_) => {
                                warn!(table = %table, "Sync timed out");
                                self.record_timeout(&table).await;
                                Err(SyncError::Cancelled(table.clone()))
                            }
                        },
                        None => run.await,
                    };
                    (table, result)
                }
            })
            .buffered(limit)
            .collect()
            .await
    }

    /// Asks the sync of `table` to pause after its current chunk. Returns
    /// false if no sync of `table` is active or a signal is already pending.
    pub fn pause(&self, table: &str) -> bool {
        self.operation(table).is_some_and(|op| op.pause())
    }

    /// Lets a paused sync continue from its last committed chunk. Returns
    /// false if the sync of `table` is not paused.
    pub fn resume(&self, table: &str) -> bool {
        self.operation(table).is_some_and(|op| op.resume())
    }

    /// Ends the sync of `table` at the next chunk boundary. Its checkpoint is
    /// kept, so the next [`SyncEngine::dump`] resumes.
    pub fn stop(&self, table: &str) -> bool {
        self.operation(table).is_some_and(|op| op.stop())
    }

    /// Progress of the current or last sync of `table` in this engine.
    #[must_use]
    pub fn get_stats(&self, table: &str) -> Option<SyncProgress> {
        self.operation(table).map(|op| op.snapshot())
    }

    /// Progress of every sync started by this engine, sorted by table.
    #[must_use]
    pub fn all_stats(&self) -> Vec<SyncProgress> {
        let mut stats: Vec<SyncProgress> = self
            .operations
            .lock()
            .values()
            .map(|op| op.snapshot())
            .collect();
        stats.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        stats
    }

    /// Returns true if a sync of `table` is pending, running or paused.
    #[must_use]
    pub fn is_active(&self, table: &str) -> bool {
        self.operation(table).is_some_and(|op| op.is_active())
    }

    /// Fetches row count and id bounds of `table` from the remote API and
    /// records them on the registered schema.
    pub async fn refresh_metadata(&self, table: &str) -> Result<TableMetadata> {
        let schema = self
            .registry
            .get(table)
            .ok_or_else(|| SyncError::TableNotFound(table.to_string()))?;
        let identity = schema
            .identity_field()
            .filter(|field| field.field_type == FieldType::Integer)
            .map(|field| field.name.clone());

        let sql = match &identity {
            Some(id) => format!("SELECT COUNT(*), MIN({id}), MAX({id}) FROM {table}"),
            None => format!("SELECT COUNT(*) FROM {table}"),
        };
        let request = transpile(&sql)?;
        debug!(table = %table, request = %request.to_value(), "Fetching table metadata");
        let rows = self.remote.execute(&request).await?;
        let first = rows.first();
        let column = |i: usize| first.and_then(|row| row.get(i)).and_then(Value::as_i64);

        let metadata = TableMetadata {
            row_count: column(0),
            min_id: identity.as_ref().and_then(|_| column(1)),
            max_id: identity.as_ref().and_then(|_| column(2)),
        };
        self.registry.update_metadata(table, metadata);
        Ok(metadata)
    }

    /// Syncs `config.table` unless its last completed sync is younger than
    /// its TTL. Returns `None` when the local copy was fresh.
    pub async fn ensure_fresh(&self, config: DumpConfig) -> Result<Option<SyncProgress>> {
        let schema = self.resolve(&config)?;
        if self
            .store
            .is_fresh(&schema.table_name, schema.sync_config.ttl)
            .await?
        {
            debug!(table = %schema.table_name, "Cache is fresh");
            return Ok(None);
        }
        self.dump(config, None).await.map(Some)
    }

    /// Persists the failure of a dump whose future was dropped on timeout.
    /// The checkpoint of the last committed chunk is kept.
    async fn record_timeout(&self, table: &str) {
        let Some(progress) = self.get_stats(table) else {
            return;
        };
        let message = SyncError::Cancelled(table.to_string()).to_string();
        if let Err(err) = self
            .store
            .finish_sync(table, SyncState::Failed, progress.dumped_rows, Some(&message))
            .await
        {
            warn!(table = %table, error = %err, "Could not record sync timeout");
        }
    }

    fn operation(&self, table: &str) -> Option<Arc<Operation>> {
        self.operations.lock().get(table).cloned()
    }

    fn resolve(&self, config: &DumpConfig) -> Result<TableSchema> {
        let base = self
            .registry
            .get(&config.table)
            .ok_or_else(|| SyncError::TableNotFound(config.table.clone()))?;
        let schema = match &config.sync {
            Some(sync) => TableSchema::clone(&base).with_sync_config(sync.clone())?,
            None => TableSchema::clone(&base),
        };
        if schema.sync_config.disabled {
            return Err(SyncError::Configuration(format!(
                "sync is disabled for table '{}'",
                config.table
            )));
        }
        Ok(schema.effective())
    }

    fn install(
        &self,
        table: &str,
        strategy: SyncStrategy,
    ) -> Result<(Arc<Operation>, watch::Receiver<Control>)> {
        let mut operations = self.operations.lock();
        if operations.get(table).is_some_and(|op| op.is_active()) {
            return Err(SyncError::SyncInProgress(table.to_string()));
        }
        let (operation, control) = Operation::new(SyncProgress::new(table, strategy));
        operations.insert(table.to_string(), Arc::clone(&operation));
        Ok((operation, control))
    }

    async fn run(
        &self,
        operation: &Operation,
        mut control: watch::Receiver<Control>,
        schema: &TableSchema,
        strategy: SyncStrategy,
        fresh: bool,
        callback: Option<&ProgressCallback>,
    ) -> Result<SyncProgress> {
        let table = schema.table_name.as_str();
        let schema_hash = schema.schema_hash();
        let metadata = self.store.sync_metadata(table).await?;

        let resume_from = metadata
            .as_ref()
            .filter(|_| !fresh && strategy.is_resumable())
            .and_then(|m| {
                let checkpoint = m.checkpoint.as_ref()?;
                let continues =
                    m.status != SyncState::Completed || strategy == SyncStrategy::Incremental;
                (checkpoint.strategy() == strategy && continues).then(|| checkpoint.clone())
            });
        if let (Some(_), Some(metadata)) = (&resume_from, &metadata) {
            if metadata.schema_hash != schema_hash {
                return Err(SyncError::SchemaVersion {
                    table: table.to_string(),
                    stored: metadata.schema_hash.clone(),
                    current: schema_hash,
                });
            }
        }
        let resumed = resume_from.is_some();

        if fresh {
            self.store.register_table_fresh(schema).await?;
        } else {
            self.store.register_table(schema).await?;
        }
        self.store
            .begin_sync(
                table,
                strategy.as_str(),
                &schema_hash,
                !resumed && strategy != SyncStrategy::Full,
            )
            .await?;

        let filter = filter_expression(schema)?;
        let row_limit = schema
            .sync_config
            .limit
            .and_then(|limit| u64::try_from(limit).ok());
        let total_rows = self
            .estimate_rows(schema, strategy, filter.as_ref())
            .await
            .map(|total| row_limit.map_or(total, |limit| total.min(limit)));
        self.store.set_total_rows(table, total_rows).await?;
        let stored_rows = if resumed {
            self.store.row_count(table).await?
        } else {
            0
        };

        operation.update(|p| {
            p.transition(SyncState::Running);
            p.resumed = resumed;
            p.checkpoint.clone_from(&resume_from);
            p.total_rows = total_rows;
            p.stored_rows = stored_rows;
        });
        if resumed {
            info!(table = %table, checkpoint = ?resume_from, "Resuming sync");
        }

        let mode = match strategy {
            SyncStrategy::Full => WriteMode::Replace,
            _ if resumed || strategy == SyncStrategy::Incremental => WriteMode::Upsert,
            _ => WriteMode::Insert,
        };
        let chunk_size = schema.sync_config.chunk_rows();
        let mut cursor = resume_from;
        let mut fetched: u64 = 0;

        loop {
            self.wait_at_boundary(operation, &mut control, table).await?;

            let limit = match strategy {
                SyncStrategy::Full => row_limit,
                _ => Some(row_limit.map_or(chunk_size, |limit| {
                    chunk_size.min(limit.saturating_sub(fetched))
                })),
            };
            let request = chunk_request(schema, strategy, cursor.as_ref(), filter.as_ref(), limit)?;
            debug!(table = %table, request = %request.to_value(), "Fetching chunk");
            let rows = self.remote.execute(&request).await?;
            let received = rows.len() as u64;

            let next = Checkpoint::advance(cursor.as_ref(), strategy, schema, &rows)?;
            let write = self.commit_with_retry(table, &rows, mode, &next).await?;
            fetched += received;

            let progress = operation.update(|p| {
                p.dumped_rows += write.written();
                p.skipped_rows += write.skipped;
                p.stored_rows = write.table_rows;
                p.chunks += 1;
                p.checkpoint = Some(next.clone());
            });
            cursor = Some(next);
            notify(callback, &progress);

            let exhausted = limit.map_or(true, |limit| received < limit);
            let limit_reached = row_limit.is_some_and(|limit| fetched >= limit);
            if exhausted || limit_reached || strategy == SyncStrategy::Full {
                break;
            }
        }

        let progress = loop {
            if let Some(progress) = operation.try_complete() {
                break progress;
            }
            self.wait_at_boundary(operation, &mut control, table).await?;
        };
        self.store
            .finish_sync(table, SyncState::Completed, progress.dumped_rows, None)
            .await?;
        Ok(progress)
    }

    /// Blocks while the operation is paused. Fails with `Cancelled` on stop.
    async fn wait_at_boundary(
        &self,
        operation: &Operation,
        control: &mut watch::Receiver<Control>,
        table: &str,
    ) -> Result<()> {
        loop {
            let signal = *control.borrow_and_update();
            match signal {
                Control::Run => {
                    let mut resumed = false;
                    operation.update(|p| {
                        if p.state == SyncState::Paused {
                            resumed = p.transition(SyncState::Running);
                        }
                    });
                    if resumed {
                        info!(table = %table, "Sync resumed");
                        self.store.set_status(table, SyncState::Running).await?;
                    }
                    return Ok(());
                }
                Control::Stop => {
                    info!(table = %table, "Sync stopped");
                    return Err(SyncError::Cancelled(table.to_string()));
                }
                Control::Pause => {
                    let mut paused = false;
                    operation.update(|p| {
                        if p.state == SyncState::Running {
                            paused = p.transition(SyncState::Paused);
                        }
                    });
                    if paused {
                        info!(table = %table, "Sync paused");
                        self.store.set_status(table, SyncState::Paused).await?;
                    }
                    if control.changed().await.is_err() {
                        return Err(SyncError::Cancelled(table.to_string()));
                    }
                }
            }
        }
    }

    async fn estimate_rows(
        &self,
        schema: &TableSchema,
        strategy: SyncStrategy,
        filter: Option<&Value>,
    ) -> Option<u64> {
        if strategy != SyncStrategy::Offset {
            return schema
                .metadata
                .and_then(|metadata| metadata.row_count)
                .and_then(|count| u64::try_from(count).ok());
        }
        let request = count_request(schema, filter);
        match self.remote.execute(&request).await {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.first())
                .and_then(Value::as_u64),
            Err(err) => {
                warn!(table = %schema.table_name, error = %err, "Could not count remote rows");
                None
            }
        }
    }

    /// Commits a chunk, retrying local database failures a bounded number of
    /// times.
    async fn commit_with_retry(
        &self,
        table: &str,
        rows: &[Vec<Value>],
        mode: WriteMode,
        checkpoint: &Checkpoint,
    ) -> Result<ChunkWrite> {
        let mut attempt: u32 = 0;
        loop {
            match self.store.commit_chunk(table, rows, mode, checkpoint).await {
                Ok(write) => return Ok(write),
                Err(SyncError::Database(err)) if attempt < self.settings.local_retry_limit => {
                    attempt += 1;
                    warn!(table = %table, attempt, error = %err, "Retrying chunk write");
                    if let Err(record_err) = self.store.record_retry(table, &err.to_string()).await
                    {
                        warn!(table = %table, error = %record_err, "Could not record retry");
                    }
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn notify(callback: Option<&ProgressCallback>, progress: &SyncProgress) {
    let Some(callback) = callback else {
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| callback(progress))).is_err() {
        warn!(table = %progress.table_name, "Progress callback panicked");
    }
}
