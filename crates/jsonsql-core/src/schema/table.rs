//! Table schemas.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{
    parse_timestamp, FieldDefinition, FieldType, FieldValue, Record, RecordError, SchemaError,
    SyncConfig,
};

/// Column names the local store reserves for bookkeeping.
pub const RESERVED_COLUMNS: &[&str] = &["_synced_at", "_sync_version", "_is_partial"];

/// Advisory row statistics, refreshed by introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableMetadata {
    pub row_count: Option<i64>,
    pub min_id: Option<i64>,
    pub max_id: Option<i64>,
}

/// The configured shape of one remote table.
///
/// Fields are keyed by their position in remote rows. Positions need not be
/// contiguous; positions without a field are ignored when mapping rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableSchemaDef", into = "TableSchemaDef")]
pub struct TableSchema {
    pub table_name: String,
    fields: BTreeMap<usize, FieldDefinition>,
    /// Field count declared by the remote side; informational.
    pub total_fields: usize,
    pub sync_config: SyncConfig,
    pub metadata: Option<TableMetadata>,
}

/// Wire form of [`TableSchema`]: fields as a list.
#[derive(Serialize, Deserialize)]
struct TableSchemaDef {
    table_name: String,
    fields: Vec<FieldDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_fields: Option<usize>,
    #[serde(default)]
    sync_config: SyncConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<TableMetadata>,
}

impl TryFrom<TableSchemaDef> for TableSchema {
    type Error = SchemaError;

    fn try_from(def: TableSchemaDef) -> Result<Self, Self::Error> {
        let mut schema = Self::new(def.table_name, def.fields)?;
        if let Some(total) = def.total_fields {
            schema.total_fields = total;
        }
        schema.metadata = def.metadata;
        schema.with_sync_config(def.sync_config)
    }
}

impl From<TableSchema> for TableSchemaDef {
    fn from(schema: TableSchema) -> Self {
        Self {
            table_name: schema.table_name,
            fields: schema.fields.into_values().collect(),
            total_fields: Some(schema.total_fields),
            sync_config: schema.sync_config,
            metadata: schema.metadata,
        }
    }
}

impl TableSchema {
    /// Creates a schema with the default sync configuration.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` for an empty field list, a repeated position or
    /// name, or a field named like a bookkeeping column.
    pub fn new(
        table_name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldDefinition>,
    ) -> Result<Self, SchemaError> {
        let table_name = table_name.into();
        let mut by_position = BTreeMap::new();
        let mut names = HashSet::new();

        for field in fields {
            if RESERVED_COLUMNS.contains(&field.name.as_str()) {
                return Err(SchemaError::ReservedName {
                    table: table_name,
                    name: field.name,
                });
            }
            if !names.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateName {
                    table: table_name,
                    name: field.name,
                });
            }
            let position = field.position;
            if by_position.insert(position, field).is_some() {
                return Err(SchemaError::DuplicatePosition {
                    table: table_name,
                    position,
                });
            }
        }

        if by_position.is_empty() {
            return Err(SchemaError::NoFields(table_name));
        }

        let total_fields = by_position.keys().next_back().map_or(0, |p| p + 1);
        Ok(Self {
            table_name,
            fields: by_position,
            total_fields,
            sync_config: SyncConfig::default(),
            metadata: None,
        })
    }

    /// Replaces the sync configuration after validating it.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::InvalidConfig` if the configuration is invalid.
    pub fn with_sync_config(mut self, sync_config: SyncConfig) -> Result<Self, SchemaError> {
        sync_config
            .validate()
            .map_err(|source| SchemaError::InvalidConfig {
                table: self.table_name.clone(),
                source,
            })?;
        self.sync_config = sync_config;
        Ok(self)
    }

    /// Fields in position order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    /// Returns the field at `position`.
    #[must_use]
    pub fn field_at(&self, position: usize) -> Option<&FieldDefinition> {
        self.fields.get(&position)
    }

    /// Returns the field called `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.values().find(|f| f.name == name)
    }

    /// Field names in position order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.values().map(|f| f.name.as_str()).collect()
    }

    /// Number of configured fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Shortest row that covers every configured position.
    #[must_use]
    pub fn required_width(&self) -> usize {
        self.fields.keys().next_back().map_or(0, |p| p + 1)
    }

    /// The field rows are matched on: `id` if present, else the lowest position.
    #[must_use]
    pub fn identity_field(&self) -> Option<&FieldDefinition> {
        self.field("id").or_else(|| self.fields.values().next())
    }

    /// SHA-256 over the ordered `(position, name, type)` triples, hex-encoded.
    #[must_use]
    pub fn schema_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.table_name.as_bytes());
        hasher.update(b"\n");
        for field in self.fields.values() {
            hasher.update(
                format!(
                    "{}:{}:{}\n",
                    field.position,
                    field.name,
                    field.field_type.as_str()
                )
                .as_bytes(),
            );
        }
        hex::encode(hasher.finalize())
    }

    /// Applies `include_fields` and `exclude_fields`. The identity field is
    /// always kept.
    #[must_use]
    pub fn effective(&self) -> Self {
        let config = &self.sync_config;
        if config.include_fields.is_empty() && config.exclude_fields.is_empty() {
            return self.clone();
        }

        let identity = self.identity_field().map(|f| f.name.clone());
        let fields = self
            .fields
            .iter()
            .filter(|(_, f)| {
                if identity.as_deref() == Some(f.name.as_str()) {
                    return true;
                }
                let included =
                    config.include_fields.is_empty() || config.include_fields.contains(&f.name);
                included && !config.exclude_fields.contains(&f.name)
            })
            .map(|(p, f)| (*p, f.clone()))
            .collect();

        Self {
            fields,
            ..self.clone()
        }
    }

    /// Maps a positional row to a [`Record`] holding exactly the configured
    /// fields, in position order. Values at unconfigured positions are dropped.
    ///
    /// # Errors
    ///
    /// Returns a `RecordError` if the row is too short, or a value does not
    /// match its field's type or constraints.
    pub fn project(&self, row: &[Value]) -> Result<Record, RecordError> {
        let mut record = Record::new();
        for field in self.fields.values() {
            let raw = row.get(field.position).ok_or_else(|| RecordError::ShortRow {
                field: field.name.clone(),
                position: field.position,
                got: row.len(),
            })?;
            let value = FieldValue::coerce(&field.name, field.field_type, raw)?;
            field.check(&value)?;
            record.insert(field.name.clone(), value);
        }
        Ok(record)
    }

    /// Builds a schema from one sample row.
    ///
    /// Types follow each value's JSON kind; strings that parse as timestamps
    /// become `DATETIME`. Names come from `names` by index, else `field_{i}`.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` if the row is empty or `names` repeats a name.
    pub fn infer_from_sample(
        table_name: impl Into<String>,
        row: &[Value],
        names: &[String],
    ) -> Result<Self, SchemaError> {
        let fields = row.iter().enumerate().map(|(position, value)| {
            let field_type = match value {
                Value::Bool(_) => FieldType::Boolean,
                Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
                Value::Number(_) => FieldType::Float,
                Value::String(s) if parse_timestamp(s).is_some() => FieldType::Datetime,
                _ => FieldType::String,
            };
            let name = names
                .get(position)
                .cloned()
                .unwrap_or_else(|| format!("field_{position}"));
            FieldDefinition::new(position, name, field_type)
        });
        Self::new(table_name, fields)
    }
}
