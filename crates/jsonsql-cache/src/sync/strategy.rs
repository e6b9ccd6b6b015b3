//! Transfer strategies, resume cursors and chunk requests.

use std::cmp::Ordering;
use std::fmt;

use jsonsql_core::operators;
use jsonsql_core::schema::{FieldType, TableSchema};
use jsonsql_core::{transpile, JsonSqlRequest, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// How a table is paged out of the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// `LIMIT/OFFSET` paging in `order_by` order.
    Offset,
    /// `id > last_id ORDER BY id LIMIT n` paging.
    IdRange,
    /// One request for the whole table, replacing local contents.
    Full,
    /// `field > last_value ORDER BY field LIMIT n` paging.
    Incremental,
}

impl SyncStrategy {
    /// Returns the persisted spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Offset => "offset",
            Self::IdRange => "id_range",
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }

    /// Picks a strategy from the table's sync configuration.
    ///
    /// Incremental configurations page by their incremental field. Tables
    /// ordered by an integer identity field page by id range. Everything else
    /// pages by offset.
    ///
    /// `cache_strategy = full` tables are mirrored by these chunked strategies
    /// rather than by [`SyncStrategy::Full`]. A run that does not resume empties
    /// the local table when it starts, so readers see a partial table until it
    /// completes. Request `Full` explicitly for an atomic replacement.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::SyncStrategy` if an incremental configuration names
    /// a field the schema does not have.
    pub fn for_schema(schema: &TableSchema) -> Result<Self> {
        let config = &schema.sync_config;
        let incremental = config.incremental_mode
            || (config.cache_strategy == jsonsql_core::schema::CacheStrategy::Incremental
                && config.incremental_field.is_some());
        let strategy = if incremental {
            Self::Incremental
        } else if integer_identity(schema).is_some_and(|id| id == config.order_by) {
            Self::IdRange
        } else {
            Self::Offset
        };
        strategy.check(schema)
    }

    /// Checks that this strategy can page `schema`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::SyncStrategy` when `IdRange` lacks an integer
    /// identity field or `Incremental` lacks a known incremental field.
    pub fn check(self, schema: &TableSchema) -> Result<Self> {
        match self {
            Self::IdRange if integer_identity(schema).is_none() => {
                Err(SyncError::SyncStrategy(format!(
                    "table '{}' has no integer identity field for id range paging",
                    schema.table_name
                )))
            }
            Self::Incremental => {
                let field = schema.sync_config.incremental_field.as_deref().ok_or_else(|| {
                    SyncError::SyncStrategy(format!(
                        "table '{}' has no incremental_field",
                        schema.table_name
                    ))
                })?;
                if schema.field(field).is_none() {
                    return Err(SyncError::SyncStrategy(format!(
                        "incremental field '{field}' is not part of table '{}'",
                        schema.table_name
                    )));
                }
                Ok(self)
            }
            _ => Ok(self),
        }
    }

    /// Returns true if chunks of this strategy can be re-fetched after a
    /// restart from the persisted cursor.
    #[must_use]
    pub const fn is_resumable(&self) -> bool {
        !matches!(self, Self::Full)
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn integer_identity(schema: &TableSchema) -> Option<&str> {
    schema
        .identity_field()
        .filter(|field| field.field_type == FieldType::Integer)
        .map(|field| field.name.as_str())
}

/// Cursor persisted with every committed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Checkpoint {
    Offset { offset: u64 },
    IdRange { last_id: i64 },
    Incremental { value: Value },
    Full,
}

impl Checkpoint {
    /// The strategy that wrote this cursor.
    #[must_use]
    pub const fn strategy(&self) -> SyncStrategy {
        match self {
            Self::Offset { .. } => SyncStrategy::Offset,
            Self::IdRange { .. } => SyncStrategy::IdRange,
            Self::Incremental { .. } => SyncStrategy::Incremental,
            Self::Full => SyncStrategy::Full,
        }
    }

    /// Computes the cursor after `rows` were fetched from `current`.
    ///
    /// The cursor never moves backwards. Positions are read from the raw
    /// rows, so rows later rejected by projection still advance it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::SyncStrategy` if a non-empty chunk carries no
    /// usable cursor value.
    pub fn advance(
        current: Option<&Self>,
        strategy: SyncStrategy,
        schema: &TableSchema,
        rows: &[Vec<Value>],
    ) -> Result<Self> {
        match strategy {
            SyncStrategy::Full => Ok(Self::Full),
            SyncStrategy::Offset => {
                let offset = match current {
                    Some(Self::Offset { offset }) => *offset,
                    _ => 0,
                };
                Ok(Self::Offset {
                    offset: offset + rows.len() as u64,
                })
            }
            SyncStrategy::IdRange => {
                let previous = match current {
                    Some(Self::IdRange { last_id }) => Some(*last_id),
                    _ => None,
                };
                let position = schema
                    .identity_field()
                    .map(|field| field.position)
                    .ok_or_else(|| no_cursor(schema, "identity field"))?;
                let observed = rows
                    .iter()
                    .filter_map(|row| row.get(position).and_then(as_integer))
                    .max();
                match (previous, observed) {
                    (Some(p), Some(o)) => Ok(Self::IdRange { last_id: p.max(o) }),
                    (Some(p), None) if rows.is_empty() => Ok(Self::IdRange { last_id: p }),
                    (None, Some(o)) => Ok(Self::IdRange { last_id: o }),
                    (None, None) if rows.is_empty() => Ok(Self::IdRange { last_id: i64::MIN }),
                    _ => Err(no_cursor(schema, "identity value")),
                }
            }
            SyncStrategy::Incremental => {
                let previous = match current {
                    Some(Self::Incremental { value }) => Some(value.clone()),
                    _ => None,
                };
                let field = schema
                    .sync_config
                    .incremental_field
                    .as_deref()
                    .and_then(|name| schema.field(name))
                    .ok_or_else(|| no_cursor(schema, "incremental field"))?;
                let observed = rows
                    .iter()
                    .filter_map(|row| row.get(field.position))
                    .filter(|value| !value.is_null())
                    .max_by(|a, b| compare_cursor_values(a, b))
                    .cloned();
                let value = match (previous, observed) {
                    (Some(p), Some(o)) => {
                        if compare_cursor_values(&o, &p) == Ordering::Greater {
                            o
                        } else {
                            p
                        }
                    }
                    (Some(p), None) => p,
                    (None, Some(o)) => o,
                    (None, None) if rows.is_empty() => Value::Null,
                    (None, None) => return Err(no_cursor(schema, "incremental value")),
                };
                Ok(Self::Incremental { value })
            }
        }
    }
}

fn no_cursor(schema: &TableSchema, what: &str) -> SyncError {
    SyncError::SyncStrategy(format!(
        "chunk of table '{}' carries no usable {what}",
        schema.table_name
    ))
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Orders cursor values: numbers numerically, strings lexically, numbers
/// before strings.
fn compare_cursor_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Lowers the table's configured `where` clause, if any.
///
/// # Errors
///
/// Returns `SyncError::Configuration` if the clause is not a valid filter.
pub fn filter_expression(schema: &TableSchema) -> Result<Option<Value>> {
    let Some(clause) = schema.sync_config.where_clause.as_deref() else {
        return Ok(None);
    };
    if clause.trim().is_empty() {
        return Ok(None);
    }
    let sql = format!("SELECT * FROM {} WHERE {clause}", schema.table_name);
    let mut request = transpile(&sql).map_err(|err| {
        SyncError::Configuration(format!(
            "invalid where clause for table '{}': {err}",
            schema.table_name
        ))
    })?;
    Ok(request
        .params
        .as_object_mut()
        .and_then(|params| params.remove("where")))
}

/// Builds the JSONSQL request for the next chunk.
///
/// Rows are requested with `data: ["*"]` so their positions match the
/// schema's field positions.
///
/// # Errors
///
/// Returns `SyncError::SyncStrategy` if the cursor cannot be expressed.
pub fn chunk_request(
    schema: &TableSchema,
    strategy: SyncStrategy,
    cursor: Option<&Checkpoint>,
    filter: Option<&Value>,
    limit: Option<u64>,
) -> Result<JsonSqlRequest> {
    let mut params = Map::new();
    params.insert(String::from("from"), Value::from(schema.table_name.as_str()));
    params.insert(String::from("data"), Value::Array(vec![Value::from("*")]));

    let mut conditions: Vec<Value> = filter.cloned().into_iter().collect();
    let order_by = match strategy {
        SyncStrategy::Offset | SyncStrategy::Full => schema.sync_config.order_by.clone(),
        SyncStrategy::IdRange => {
            let id = integer_identity(schema).ok_or_else(|| no_cursor(schema, "identity field"))?;
            if let Some(Checkpoint::IdRange { last_id }) = cursor {
                conditions.push(operators::build_comparison(">", id, *last_id).map_err(op_error)?);
            }
            id.to_string()
        }
        SyncStrategy::Incremental => {
            let field = schema
                .sync_config
                .incremental_field
                .clone()
                .ok_or_else(|| no_cursor(schema, "incremental field"))?;
            if let Some(Checkpoint::Incremental { value }) = cursor {
                if !value.is_null() {
                    conditions.push(
                        operators::build_comparison(">", field.as_str(), value.clone())
                            .map_err(op_error)?,
                    );
                }
            }
            field
        }
    };

    match conditions.len() {
        0 => {}
        1 => {
            params.insert(String::from("where"), conditions.remove(0));
        }
        _ => {
            let all = operators::build_logical("AND", conditions).map_err(op_error)?;
            params.insert(String::from("where"), all);
        }
    }
    params.insert(String::from("order_by"), Value::Array(vec![Value::from(order_by)]));
    if let Some(limit) = limit {
        params.insert(String::from("limit"), Value::from(limit));
    }
    if let (SyncStrategy::Offset, Some(Checkpoint::Offset { offset })) = (strategy, cursor) {
        if *offset > 0 {
            params.insert(String::from("offset"), Value::from(*offset));
        }
    }
    Ok(JsonSqlRequest::new(Method::Select, Value::Object(params)))
}

/// Builds `SELECT COUNT(*)` over the table, honoring its filter.
#[must_use]
pub fn count_request(schema: &TableSchema, filter: Option<&Value>) -> JsonSqlRequest {
    let mut params = Map::new();
    params.insert(String::from("from"), Value::from(schema.table_name.as_str()));
    let mut count = Map::new();
    count.insert(String::from("count"), Value::from("*"));
    params.insert(String::from("data"), Value::Array(vec![Value::Object(count)]));
    if let Some(filter) = filter {
        params.insert(String::from("where"), filter.clone());
    }
    JsonSqlRequest::new(Method::Select, Value::Object(params))
}

fn op_error(err: operators::OperatorError) -> SyncError {
    SyncError::SyncStrategy(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonsql_core::schema::{FieldDefinition, SyncConfig};
    use serde_json::json;

    fn schema(config: SyncConfig) -> TableSchema {
        TableSchema::new(
            "movies",
            [
                FieldDefinition::new(0, "id", FieldType::Integer),
                FieldDefinition::new(1, "title", FieldType::String),
                FieldDefinition::new(2, "updated_at", FieldType::Datetime),
            ],
        )
        .unwrap()
        .with_sync_config(config)
        .unwrap()
    }

    #[test]
    fn test_strategy_derivation() {
        assert_eq!(
            SyncStrategy::for_schema(&schema(SyncConfig::default())).unwrap(),
            SyncStrategy::IdRange
        );
        let by_title = SyncConfig {
            order_by: String::from("title"),
            ..SyncConfig::default()
        };
        assert_eq!(
            SyncStrategy::for_schema(&schema(by_title)).unwrap(),
            SyncStrategy::Offset
        );
        let incremental = SyncConfig {
            incremental_mode: true,
            incremental_field: Some(String::from("updated_at")),
            ..SyncConfig::default()
        };
        assert_eq!(
            SyncStrategy::for_schema(&schema(incremental)).unwrap(),
            SyncStrategy::Incremental
        );
        let unknown = SyncConfig {
            incremental_mode: true,
            incremental_field: Some(String::from("nope")),
            ..SyncConfig::default()
        };
        assert!(matches!(
            SyncStrategy::for_schema(&schema(unknown)),
            Err(SyncError::SyncStrategy(_))
        ));
    }

    #[test]
    fn test_id_range_needs_integer_identity() {
        let text_keyed = TableSchema::new(
            "tags",
            [FieldDefinition::new(0, "name", FieldType::String)],
        )
        .unwrap();
        assert!(SyncStrategy::IdRange.check(&text_keyed).is_err());
        assert_eq!(
            SyncStrategy::for_schema(&text_keyed).unwrap(),
            SyncStrategy::Offset
        );
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let schema = schema(SyncConfig::default());
        let rows = vec![vec![json!(5), json!("a")], vec![json!(3), json!("b")]];
        let first = Checkpoint::advance(None, SyncStrategy::IdRange, &schema, &rows).unwrap();
        assert_eq!(first, Checkpoint::IdRange { last_id: 5 });

        let older = vec![vec![json!(2), json!("c")]];
        let second =
            Checkpoint::advance(Some(&first), SyncStrategy::IdRange, &schema, &older).unwrap();
        assert_eq!(second, Checkpoint::IdRange { last_id: 5 });

        let offset = Checkpoint::advance(
            Some(&Checkpoint::Offset { offset: 10 }),
            SyncStrategy::Offset,
            &schema,
            &rows,
        )
        .unwrap();
        assert_eq!(offset, Checkpoint::Offset { offset: 12 });
    }

    #[test]
    fn test_incremental_cursor_takes_max_value() {
        let schema = schema(SyncConfig {
            incremental_mode: true,
            incremental_field: Some(String::from("updated_at")),
            ..SyncConfig::default()
        });
        let rows = vec![
            vec![json!(1), json!("a"), json!("2024-01-03T00:00:00Z")],
            vec![json!(2), json!("b"), json!("2024-01-05T00:00:00Z")],
        ];
        let cursor = Checkpoint::advance(None, SyncStrategy::Incremental, &schema, &rows).unwrap();
        assert_eq!(
            cursor,
            Checkpoint::Incremental {
                value: json!("2024-01-05T00:00:00Z")
            }
        );
    }

    #[test]
    fn test_chunk_requests() {
        let schema = schema(SyncConfig {
            where_clause: Some(String::from("title != 'x'")),
            ..SyncConfig::default()
        });
        let filter = filter_expression(&schema).unwrap();
        assert_eq!(filter, Some(json!({"neq": ["title", "x"]})));

        let request = chunk_request(
            &schema,
            SyncStrategy::IdRange,
            Some(&Checkpoint::IdRange { last_id: 40 }),
            filter.as_ref(),
            Some(20),
        )
        .unwrap();
        assert_eq!(request.method, Method::Select);
        assert_eq!(
            request.params,
            json!({
                "from": "movies",
                "data": ["*"],
                "where": {"and": [{"neq": ["title", "x"]}, {"gt": ["id", 40]}]},
                "order_by": ["id"],
                "limit": 20
            })
        );

        let request = chunk_request(
            &schema,
            SyncStrategy::Offset,
            Some(&Checkpoint::Offset { offset: 60 }),
            None,
            Some(20),
        )
        .unwrap();
        assert_eq!(request.params["offset"], json!(60));
        assert!(request.params.get("where").is_none());

        let count = count_request(&schema, filter.as_ref());
        assert_eq!(count.params["data"], json!([{"count": "*"}]));
    }
}
