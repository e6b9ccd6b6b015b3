//! Conversions between schema values and SQLite values.

use chrono::SecondsFormat;
use jsonsql_core::schema::{FieldType, FieldValue, Record, TableSchema};
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Binds one value. Timestamps are stored as RFC 3339 text.
pub fn bind_value<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> SqliteQuery<'q> {
    match value {
        FieldValue::Integer(v) => query.bind(*v),
        FieldValue::Float(v) => query.bind(*v),
        FieldValue::String(v) => query.bind(v.clone()),
        FieldValue::Boolean(v) => query.bind(*v),
        FieldValue::Timestamp(v) => query.bind(v.to_rfc3339_opts(SecondsFormat::Micros, true)),
        FieldValue::Null => query.bind(Option::<i64>::None),
    }
}

/// Binds a JSON query parameter.
pub fn bind_json<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
        other => bind_value(query, &FieldValue::from_json(other)),
    }
}

/// Decodes a result row. Columns named like a schema field are converted to
/// the field's type; other columns keep their storage class.
pub fn decode_row(row: &SqliteRow, schema: Option<&TableSchema>) -> Result<Record, sqlx::Error> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = decode_raw(row, i)?;
        let declared = schema
            .and_then(|schema| schema.field(name))
            .map(|field| field.field_type);
        let value = match declared {
            Some(field_type) => typed(name, field_type, raw),
            None => raw,
        };
        record.insert(name, value);
    }
    Ok(record)
}

fn decode_raw(row: &SqliteRow, index: usize) -> Result<FieldValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }
    let type_name = raw.type_info().name().to_string();
    Ok(match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => FieldValue::Integer(row.try_get::<i64, _>(index)?),
        "REAL" => FieldValue::Float(row.try_get::<f64, _>(index)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            FieldValue::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => FieldValue::String(row.try_get::<String, _>(index)?),
    })
}

fn typed(name: &str, field_type: FieldType, raw: FieldValue) -> FieldValue {
    if raw.is_null() {
        return raw;
    }
    FieldValue::coerce(name, field_type, &raw.to_json()).unwrap_or(raw)
}
