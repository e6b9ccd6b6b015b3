//! Shared table-name to schema mapping.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{SchemaError, TableMetadata, TableSchema};

/// Registry of known table schemas.
///
/// Read-mostly and shared between the transpiler, the sync engine and the
/// local store. Registering a table that already exists replaces it.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: RwLock<HashMap<String, Arc<TableSchema>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON array of table schemas.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` for malformed JSON or an invalid schema.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let schemas: Vec<TableSchema> = serde_json::from_str(json)?;
        let registry = Self::new();
        for schema in schemas {
            registry.register(schema);
        }
        Ok(registry)
    }

    /// Reads a JSON array of table schemas from a file.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` if the file cannot be read or parsed.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Registers a schema, returning the one it replaced.
    pub fn register(&self, schema: TableSchema) -> Option<Arc<TableSchema>> {
        self.tables
            .write()
            .insert(schema.table_name.clone(), Arc::new(schema))
    }

    /// Returns the schema for `table_name`.
    #[must_use]
    pub fn get(&self, table_name: &str) -> Option<Arc<TableSchema>> {
        self.tables.read().get(table_name).cloned()
    }

    /// Returns true if `table_name` is registered.
    #[must_use]
    pub fn has(&self, table_name: &str) -> bool {
        self.tables.read().contains_key(table_name)
    }

    /// Registered table names, sorted.
    #[must_use]
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Removes a schema.
    pub fn remove(&self, table_name: &str) -> Option<Arc<TableSchema>> {
        self.tables.write().remove(table_name)
    }

    /// Re-registers `table_name` with fresh metadata. Returns false if the
    /// table is unknown.
    pub fn update_metadata(&self, table_name: &str, metadata: TableMetadata) -> bool {
        let mut tables = self.tables.write();
        let Some(current) = tables.get(table_name) else {
            return false;
        };
        let mut updated = TableSchema::clone(current);
        updated.metadata = Some(metadata);
        tables.insert(table_name.to_string(), Arc::new(updated));
        true
    }

    /// Number of registered tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    /// Returns true if no table is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, FieldType};
    use std::io::Write;

    fn schema(name: &str, fields: usize) -> TableSchema {
        TableSchema::new(
            name,
            (0..fields).map(|p| {
                let field_name = if p == 0 {
                    String::from("id")
                } else {
                    format!("c{p}")
                };
                FieldDefinition::new(p, field_name, FieldType::Integer)
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_register_get_has_list() {
        let registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        registry.register(schema("movies", 2));
        registry.register(schema("actors", 1));

        assert!(registry.has("movies"));
        assert!(!registry.has("ratings"));
        assert_eq!(registry.list_tables(), vec!["actors", "movies"]);
        assert_eq!(registry.get("movies").unwrap().field_count(), 2);
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = SchemaRegistry::new();
        assert!(registry.register(schema("movies", 2)).is_none());
        let previous = registry.register(schema("movies", 3)).unwrap();
        assert_eq!(previous.field_count(), 2);
        assert_eq!(registry.get("movies").unwrap().field_count(), 3);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_metadata() {
        let registry = SchemaRegistry::new();
        registry.register(schema("movies", 2));
        let metadata = TableMetadata {
            row_count: Some(10),
            min_id: Some(1),
            max_id: Some(10),
        };
        assert!(registry.update_metadata("movies", metadata));
        assert!(!registry.update_metadata("ratings", metadata));
        assert_eq!(registry.get("movies").unwrap().metadata, Some(metadata));
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"table_name": "movies", "fields": [
                {{"position": 0, "name": "id", "field_type": "INTEGER"}},
                {{"position": 1, "name": "title", "field_type": "STRING"}}
            ]}}]"#
        )
        .unwrap();

        let registry = SchemaRegistry::load_json(file.path()).unwrap();
        assert_eq!(registry.list_tables(), vec!["movies"]);

        assert!(matches!(
            SchemaRegistry::load_json("/nonexistent/schemas.json"),
            Err(SchemaError::Io { .. })
        ));
    }
}
