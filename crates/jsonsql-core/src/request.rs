//! The JSONSQL request envelope and helpers shared by calling layers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::schema::Record;

/// Operation kind of a JSONSQL request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Select,
    Insert,
    Update,
    Delete,
}

impl Method {
    /// Returns the wire spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as consumed by the remote execute capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSqlRequest {
    pub method: Method,
    pub params: Value,
}

impl JsonSqlRequest {
    /// Creates a request.
    #[must_use]
    pub const fn new(method: Method, params: Value) -> Self {
        Self { method, params }
    }

    /// Creates a request whose method is inferred from the shape of `params`.
    #[must_use]
    pub fn inferred(params: Value) -> Option<Self> {
        infer_method(&params).map(|method| Self { method, params })
    }

    /// Returns `{"method": .., "params": ..}`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({ "method": self.method.as_str(), "params": self.params })
    }

    /// Returns the target table, see [`extract_table_name`].
    #[must_use]
    pub fn table_name(&self) -> Option<&str> {
        extract_table_name(&self.params)
    }
}

/// Infers the method of a JSONSQL parameter object from its keys.
///
/// Checked in this order:
/// 1. `into` present: insert.
/// 2. `table` and `set` present: update.
/// 3. `from` with any of `data`, `where`, `order_by`, `limit`: select.
/// 4. `from` alone: delete.
///
/// A DELETE carrying a `where` filter is therefore inferred as a select; callers
/// that know the method should state it.
#[must_use]
pub fn infer_method(params: &Value) -> Option<Method> {
    let object = params.as_object()?;
    if object.contains_key("into") {
        return Some(Method::Insert);
    }
    if object.contains_key("table") && object.contains_key("set") {
        return Some(Method::Update);
    }
    if object.contains_key("from") {
        let selects = ["data", "where", "order_by", "limit"]
            .iter()
            .any(|key| object.contains_key(*key));
        return Some(if selects {
            Method::Select
        } else {
            Method::Delete
        });
    }
    None
}

/// Returns the table a JSONSQL parameter object targets.
///
/// For joins (`from` is a sequence) this is the first table of the sequence.
#[must_use]
pub fn extract_table_name(params: &Value) -> Option<&str> {
    fn table_of(value: &Value) -> Option<&str> {
        match value {
            Value::String(name) => Some(name),
            Value::Object(map) => map.get("table").and_then(Value::as_str),
            Value::Array(items) => items.first().and_then(table_of),
            _ => None,
        }
    }

    let object = params.as_object()?;
    if let Some(from) = object.get("from") {
        return table_of(from);
    }
    object
        .get("into")
        .or_else(|| object.get("table"))
        .and_then(Value::as_str)
}

/// Builds the `insert_data` form of an insert from named records.
#[must_use]
pub fn build_insert_data(table: &str, records: &[Record]) -> JsonSqlRequest {
    let rows: Vec<Value> = records
        .iter()
        .map(|record| Value::Object(record.to_json_object()))
        .collect();
    let mut params = Map::new();
    params.insert(String::from("into"), Value::from(table));
    params.insert(String::from("insert_data"), Value::Array(rows));
    JsonSqlRequest::new(Method::Insert, Value::Object(params))
}
