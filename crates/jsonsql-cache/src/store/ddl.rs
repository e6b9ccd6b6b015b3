//! SQLite DDL and DML text for mirrored tables.
//!
//! A mirrored table holds exactly the schema's configured fields, in position
//! order, followed by the bookkeeping columns. Positions the schema does not
//! configure never get a column.

use jsonsql_core::schema::{FieldType, TableSchema};

/// When the row was last written by a sync.
pub const SYNCED_AT: &str = "_synced_at";
/// Incremented on every update of the row.
pub const SYNC_VERSION: &str = "_sync_version";
/// Set for rows holding only part of their remote columns.
pub const IS_PARTIAL: &str = "_is_partial";

/// Quotes an identifier for SQLite.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Storage type of a field.
#[must_use]
pub const fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer | FieldType::Boolean => "INTEGER",
        FieldType::Float => "REAL",
        FieldType::String | FieldType::Datetime => "TEXT",
    }
}

/// Expected `(name, type)` pairs of the physical table, in column order.
#[must_use]
pub fn expected_columns(schema: &TableSchema) -> Vec<(String, &'static str)> {
    schema
        .fields()
        .map(|field| (field.name.clone(), column_type(field.field_type)))
        .chain([
            (SYNCED_AT.to_string(), "TEXT"),
            (SYNC_VERSION.to_string(), "INTEGER"),
            (IS_PARTIAL.to_string(), "INTEGER"),
        ])
        .collect()
}

/// Generates `CREATE TABLE IF NOT EXISTS` for a mirrored table.
///
/// The identity field is the primary key.
#[must_use]
pub fn create_table_sql(table: &str, schema: &TableSchema) -> String {
    let identity = schema.identity_field().map(|field| field.name.as_str());
    let mut columns: Vec<String> = schema
        .fields()
        .map(|field| {
            let mut def = format!(
                "{} {}",
                quote_identifier(&field.name),
                column_type(field.field_type)
            );
            if Some(field.name.as_str()) == identity {
                def.push_str(" PRIMARY KEY");
            } else if !field.constraints.nullable {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();
    columns.push(format!("{} TEXT NOT NULL", quote_identifier(SYNCED_AT)));
    columns.push(format!(
        "{} INTEGER NOT NULL DEFAULT 1",
        quote_identifier(SYNC_VERSION)
    ));
    columns.push(format!(
        "{} INTEGER NOT NULL DEFAULT 0",
        quote_identifier(IS_PARTIAL)
    ));

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote_identifier(table),
        columns.join(",\n  ")
    )
}

/// Generates `DROP TABLE IF EXISTS`.
#[must_use]
pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_identifier(table))
}

/// Generates the insert of one full row: fields in position order, then
/// `_synced_at`, `_sync_version` and `_is_partial`.
#[must_use]
pub fn insert_sql(table: &str, schema: &TableSchema) -> String {
    let columns: Vec<String> = expected_columns(schema)
        .iter()
        .map(|(name, _)| quote_identifier(name))
        .collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote_identifier(table),
        columns.join(", ")
    )
}

/// Generates the in-place update of one row matched by the identity field.
///
/// Binds the non-identity fields in position order, then `_synced_at`, then
/// the identity value.
#[must_use]
pub fn update_sql(table: &str, schema: &TableSchema, identity: &str) -> String {
    let mut assignments: Vec<String> = schema
        .fields()
        .filter(|field| field.name != identity)
        .map(|field| format!("{} = ?", quote_identifier(&field.name)))
        .collect();
    assignments.push(format!("{} = ?", quote_identifier(SYNCED_AT)));
    assignments.push(format!(
        "{0} = {0} + 1",
        quote_identifier(SYNC_VERSION)
    ));
    assignments.push(format!("{} = 0", quote_identifier(IS_PARTIAL)));
    format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote_identifier(table),
        assignments.join(", "),
        quote_identifier(identity)
    )
}
