//! Direct queries against the remote API.
//!
//! SQL is transpiled, sent through the execute capability and, where the
//! select list allows it, mapped back to named records.

use std::sync::Arc;

use jsonsql_core::schema::{FieldValue, Record, SchemaRegistry, TableSchema};
use jsonsql_core::{JsonSqlRequest, Method, Transpiler};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CacheSettings;
use crate::error::Result;
use crate::remote::RemoteExecutor;

/// Result of [`QueryClient::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    /// The request sent to the remote API.
    pub request: JsonSqlRequest,
    /// Positional rows as returned.
    pub rows: Vec<Vec<Value>>,
    /// Named records, when the select list could be mapped to names.
    pub records: Option<Vec<Record>>,
}

/// Transpiles and runs SQL against the remote API.
pub struct QueryClient {
    remote: Arc<dyn RemoteExecutor>,
    transpiler: Transpiler,
    registry: Arc<SchemaRegistry>,
}

impl QueryClient {
    /// Creates a client. Unordered selects on registered tables get the
    /// table's `order_by` when `settings.auto_order_by` is set.
    pub fn new(
        remote: Arc<dyn RemoteExecutor>,
        registry: Arc<SchemaRegistry>,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            remote,
            transpiler: Transpiler::with_registry(Arc::clone(&registry), settings.auto_order_by),
            registry,
        }
    }

    /// Transpiles `sql` without executing it.
    pub fn transpile(&self, sql: &str) -> Result<JsonSqlRequest> {
        Ok(self.transpiler.transpile(sql)?)
    }

    /// Transpiles and executes `sql`, returning raw positional rows.
    pub async fn execute_sql(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let request = self.transpile(sql)?;
        debug!(request = %request.to_value(), "Executing request");
        Ok(self.remote.execute(&request).await?)
    }

    /// Transpiles and executes `sql`, mapping rows to records when possible.
    ///
    /// `SELECT *` on a registered table is projected through its schema.
    /// A select list of plain columns is mapped by column name, typed by the
    /// schema when the table is registered.
    pub async fn query(&self, sql: &str) -> Result<QueryOutput> {
        let request = self.transpile(sql)?;
        debug!(request = %request.to_value(), "Executing request");
        let rows = self.remote.execute(&request).await?;
        let records = self.map_records(&request, &rows);
        Ok(QueryOutput {
            request,
            rows,
            records,
        })
    }

    fn map_records(&self, request: &JsonSqlRequest, rows: &[Vec<Value>]) -> Option<Vec<Record>> {
        if request.method != Method::Select {
            return None;
        }
        let params = request.params.as_object()?;
        let single_table = params.get("from")?.as_str()?;
        let schema = self.registry.get(single_table);
        let data = params.get("data")?.as_array()?;

        if data.len() == 1 && data[0] == "*" {
            let schema = schema?;
            return rows
                .iter()
                .map(|row| schema.project(row))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|err| warn!(table = %single_table, error = %err, "Rows do not match schema"))
                .ok();
        }

        let names: Vec<&str> = data
            .iter()
            .map(|item| item.as_str().map(column_name))
            .collect::<Option<_>>()?;
        rows.iter()
            .map(|row| named_record(&names, row, schema.as_deref()))
            .collect()
    }
}

fn column_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

fn named_record(names: &[&str], row: &[Value], schema: Option<&TableSchema>) -> Option<Record> {
    if row.len() != names.len() {
        return None;
    }
    let record = names
        .iter()
        .zip(row)
        .map(|(name, value)| {
            let typed = schema
                .and_then(|schema| schema.field(name))
                .and_then(|field| FieldValue::coerce(name, field.field_type, value).ok())
                .unwrap_or_else(|| FieldValue::from_json(value));
            ((*name).to_string(), typed)
        })
        .collect();
    Some(record)
}
