#![allow(dead_code)]

use jsonsql_core::ast::{SelectStatement, Statement};
use jsonsql_core::schema::{FieldDefinition, FieldType, TableSchema};
use jsonsql_core::{parse_sql, transpile, JsonSqlRequest, ParseError, TranspileError};
use jsonsql_core::UnsupportedFeatureError;
use serde_json::Value;

pub fn parse(sql: &str) -> Statement {
    parse_sql(sql).unwrap_or_else(|e| panic!("Failed to parse: {sql}\nError: {e:?}"))
}

pub fn parse_select(sql: &str) -> SelectStatement {
    match parse(sql) {
        Statement::Select(s) => s,
        other => panic!("Expected SELECT, got {other:?}"),
    }
}

pub fn request(sql: &str) -> JsonSqlRequest {
    transpile(sql).unwrap_or_else(|e| panic!("Failed to transpile: {sql}\nError: {e}"))
}

/// Transpiles `sql` and returns only the params object.
pub fn params(sql: &str) -> Value {
    request(sql).params
}

pub fn parse_err(sql: &str) -> ParseError {
    match transpile(sql) {
        Err(TranspileError::Parse(e)) => e,
        other => panic!("Expected parse error for: {sql}\nGot: {other:?}"),
    }
}

pub fn unsupported(sql: &str) -> UnsupportedFeatureError {
    match transpile(sql) {
        Err(TranspileError::Unsupported(e)) => e,
        other => panic!("Expected unsupported feature for: {sql}\nGot: {other:?}"),
    }
}

/// `movies(id INTEGER, title STRING, url STRING)`.
pub fn movies_schema() -> TableSchema {
    TableSchema::new(
        "movies",
        [
            FieldDefinition::new(0, "id", FieldType::Integer),
            FieldDefinition::new(1, "title", FieldType::String),
            FieldDefinition::new(2, "url", FieldType::String),
        ],
    )
    .expect("valid schema")
}
