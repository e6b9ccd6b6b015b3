#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use jsonsql_cache::prelude::*;
use jsonsql_core::JsonSqlRequest;

/// One remote table: column names by position and positional rows.
#[derive(Debug, Clone, Default)]
pub struct RemoteTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// An in-memory remote API that interprets the requests the engine sends.
#[derive(Default)]
pub struct FakeRemote {
    tables: Mutex<HashMap<String, RemoteTable>>,
    requests: Mutex<Vec<JsonSqlRequest>>,
    chunk_requests: AtomicUsize,
    fail_after: Mutex<Option<usize>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_table(&self, name: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        self.tables.lock().insert(
            name.to_string(),
            RemoteTable {
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
                rows,
            },
        );
    }

    pub fn push_rows(&self, name: &str, rows: Vec<Vec<Value>>) {
        if let Some(table) = self.tables.lock().get_mut(name) {
            table.rows.extend(rows);
        }
    }

    /// Fails every chunk request once `n` chunk requests have succeeded.
    pub fn fail_after(&self, n: usize) {
        *self.fail_after.lock() = Some(self.chunk_requests.load(AtomicOrdering::SeqCst) + n);
    }

    pub fn heal(&self) {
        *self.fail_after.lock() = None;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn requests(&self) -> Vec<JsonSqlRequest> {
        self.requests.lock().clone()
    }

    /// Highest number of requests executing at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(AtomicOrdering::SeqCst)
    }

    pub fn chunk_requests(&self) -> usize {
        self.chunk_requests.load(AtomicOrdering::SeqCst)
    }

    fn run(&self, params: &Value) -> std::result::Result<Vec<Vec<Value>>, RemoteError> {
        let table_name = params["from"]
            .as_str()
            .ok_or_else(|| RemoteError::Api(String::from("missing from")))?;
        let table = self
            .tables
            .lock()
            .get(table_name)
            .cloned()
            .ok_or_else(|| RemoteError::Api(format!("no such table: {table_name}")))?;

        let mut rows: Vec<Vec<Value>> = table
            .rows
            .iter()
            .filter(|row| {
                params
                    .get("where")
                    .map_or(true, |cond| matches(cond, &table.columns, row))
            })
            .cloned()
            .collect();

        let data = params["data"].as_array().cloned().unwrap_or_default();
        if data.iter().any(Value::is_object) {
            return Ok(vec![aggregate(&data, &table.columns, &rows)]);
        }

        if let Some(order) = params["order_by"].as_array() {
            for key in order.iter().rev().filter_map(Value::as_str) {
                let (desc, name) = key.strip_prefix('-').map_or((false, key), |n| (true, n));
                let pos = position(&table.columns, name);
                rows.sort_by(|a, b| {
                    let ord = compare(&a[pos], &b[pos]);
                    if desc {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
            }
        }
        let offset = params["offset"].as_u64().unwrap_or(0) as usize;
        let limit = params["limit"].as_u64().map_or(usize::MAX, |l| l as usize);
        let picked: Vec<usize> = data
            .iter()
            .filter_map(Value::as_str)
            .filter(|name| *name != "*")
            .map(|name| position(&table.columns, name))
            .collect();
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                if picked.is_empty() {
                    row
                } else {
                    picked.iter().map(|&pos| row[pos].clone()).collect()
                }
            })
            .collect())
    }
}

#[async_trait]
impl RemoteExecutor for FakeRemote {
    async fn execute_raw(
        &self,
        request: &JsonSqlRequest,
    ) -> std::result::Result<Value, RemoteError> {
        self.requests.lock().push(request.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            let now = self.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, AtomicOrdering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
        }

        let is_chunk = request.params["data"] == json!(["*"]);
        if is_chunk {
            let fail_at = *self.fail_after.lock();
            if fail_at.is_some_and(|n| self.chunk_requests() >= n) {
                return Err(RemoteError::Transport(String::from("connection reset")));
            }
        }
        let rows = self.run(&request.params)?;
        if is_chunk {
            self.chunk_requests.fetch_add(1, AtomicOrdering::SeqCst);
        }
        Ok(json!({ "rows": rows }))
    }
}

fn position(columns: &[String], name: &str) -> usize {
    let name = name.rsplit('.').next().unwrap_or(name);
    columns
        .iter()
        .position(|c| c == name)
        .unwrap_or_else(|| panic!("unknown column {name}"))
}

fn operand(value: &Value, columns: &[String], row: &[Value]) -> Value {
    match value {
        Value::String(name) if columns.iter().any(|c| c == name) => {
            row[position(columns, name)].clone()
        }
        other => other.clone(),
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or_default()
            .partial_cmp(&y.as_f64().unwrap_or_default())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn matches(cond: &Value, columns: &[String], row: &[Value]) -> bool {
    let Some((op, args)) = cond.as_object().and_then(|o| o.iter().next()) else {
        return true;
    };
    let args = args.as_array().cloned().unwrap_or_default();
    match op.as_str() {
        "and" => args.iter().all(|c| matches(c, columns, row)),
        "or" => args.iter().any(|c| matches(c, columns, row)),
        "not" => !args.iter().all(|c| matches(c, columns, row)),
        _ => {
            let left = operand(&args[0], columns, row);
            let right = operand(&args[1], columns, row);
            let ord = compare(&left, &right);
            match op.as_str() {
                "eq" => ord == Ordering::Equal,
                "neq" => ord != Ordering::Equal,
                "gt" => ord == Ordering::Greater,
                "gte" => ord != Ordering::Less,
                "lt" => ord == Ordering::Less,
                "lte" => ord != Ordering::Greater,
                other => panic!("unsupported operator {other}"),
            }
        }
    }
}

fn aggregate(data: &[Value], columns: &[String], rows: &[Vec<Value>]) -> Vec<Value> {
    data.iter()
        .map(|item| {
            let (function, arg) = item
                .as_object()
                .and_then(|o| o.iter().next())
                .expect("aggregate");
            if function == "count" {
                return json!(rows.len());
            }
            let pos = position(columns, arg.as_str().expect("column"));
            let values = rows.iter().map(|row| row[pos].clone());
            let picked = match function.as_str() {
                "min" => values.min_by(compare),
                "max" => values.max_by(compare),
                other => panic!("unsupported aggregate {other}"),
            };
            picked.unwrap_or(Value::Null)
        })
        .collect()
}

/// Remote rows of `movies`: five positional values, two beyond the schema.
pub fn movie_rows(ids: std::ops::RangeInclusive<i64>) -> Vec<Vec<Value>> {
    ids.map(|id| {
        vec![
            json!(id),
            json!(format!("Movie {id}")),
            json!(format!("http://x/{id}")),
            json!("extra1"),
            json!("extra2"),
        ]
    })
    .collect()
}

pub const MOVIE_COLUMNS: &[&str] = &["id", "title", "url", "rating", "country"];

/// `movies(id, title, url)` paged in chunks of `chunk_size`.
pub fn movies_schema(chunk_size: i64) -> TableSchema {
    TableSchema::new(
        "movies",
        [
            FieldDefinition::new(0, "id", FieldType::Integer),
            FieldDefinition::new(1, "title", FieldType::String),
            FieldDefinition::new(2, "url", FieldType::String),
        ],
    )
    .expect("valid schema")
    .with_sync_config(SyncConfig {
        chunk_size,
        ..SyncConfig::default()
    })
    .expect("valid sync config")
}

pub async fn memory_store() -> Arc<LocalStore> {
    let store = LocalStore::connect(&CacheSettings::in_memory())
        .await
        .expect("open store");
    store.initialize().await.expect("initialize store");
    Arc::new(store)
}

pub fn engine_with(
    remote: Arc<FakeRemote>,
    store: Arc<LocalStore>,
    registry: Arc<SchemaRegistry>,
    settings: CacheSettings,
) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(remote, store, registry, settings))
}

/// A remote with 25 movies and an engine syncing them in chunks of 10.
pub async fn movies_setup() -> (Arc<FakeRemote>, Arc<SyncEngine>) {
    let remote = FakeRemote::new();
    remote.add_table("movies", MOVIE_COLUMNS, movie_rows(1..=25));
    let registry = Arc::new(SchemaRegistry::new());
    registry.register(movies_schema(10));
    let engine = engine_with(
        Arc::clone(&remote),
        memory_store().await,
        registry,
        CacheSettings::in_memory(),
    );
    (remote, engine)
}

pub async fn local_ids(store: &LocalStore, table: &str) -> Vec<i64> {
    let sql = format!("SELECT id FROM {table} ORDER BY id");
    store
        .execute_query(table, &sql, &[])
        .await
        .expect("query local rows")
        .iter()
        .map(|record| match record.get("id") {
            Some(FieldValue::Integer(id)) => *id,
            other => panic!("unexpected id {other:?}"),
        })
        .collect()
}

/// Polls until `check` holds or a second passes.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
