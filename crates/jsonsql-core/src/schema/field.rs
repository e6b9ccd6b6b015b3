//! Field definitions.

use serde::{Deserialize, Serialize};

use super::{FieldValue, RecordError};

/// Column types understood by the remote API and the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    #[serde(alias = "integer", alias = "int")]
    Integer,
    #[serde(alias = "float", alias = "real")]
    Float,
    #[serde(alias = "string", alias = "text")]
    String,
    #[serde(alias = "boolean", alias = "bool")]
    Boolean,
    #[serde(alias = "datetime", alias = "timestamp")]
    Datetime,
}

impl FieldType {
    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Datetime => "DATETIME",
        }
    }
}

/// Optional value bounds for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConstraints {
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

impl Default for FieldConstraints {
    fn default() -> Self {
        Self {
            nullable: true,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
        }
    }
}

/// One column of a remote table, located by its position in remote rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Zero-based index into the positional remote row.
    pub position: usize,
    /// Column name, unique within the table.
    pub name: String,
    /// Declared type.
    pub field_type: FieldType,
    /// Value bounds.
    #[serde(default)]
    pub constraints: FieldConstraints,
}

impl FieldDefinition {
    /// Creates a nullable field without bounds.
    #[must_use]
    pub fn new(position: usize, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            position,
            name: name.into(),
            field_type,
            constraints: FieldConstraints::default(),
        }
    }

    /// Marks the field as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.constraints.nullable = false;
        self
    }

    /// Replaces the field's constraints.
    #[must_use]
    pub fn with_constraints(mut self, constraints: FieldConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Checks a value against the field's constraints.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::NullViolation` or `RecordError::Constraint`.
    pub fn check(&self, value: &FieldValue) -> Result<(), RecordError> {
        let c = &self.constraints;
        match value {
            FieldValue::Null if !c.nullable => Err(RecordError::NullViolation(self.name.clone())),
            FieldValue::String(s) => {
                let len = s.chars().count();
                if let Some(min) = c.min_length.filter(|min| len < *min) {
                    return Err(self.violation(format!("length {len} is below {min}")));
                }
                if let Some(max) = c.max_length.filter(|max| len > *max) {
                    return Err(self.violation(format!("length {len} exceeds {max}")));
                }
                Ok(())
            }
            FieldValue::Integer(_) | FieldValue::Float(_) => {
                let n = value.as_f64().unwrap_or_default();
                if let Some(min) = c.min_value.filter(|min| n < *min) {
                    return Err(self.violation(format!("{n} is below {min}")));
                }
                if let Some(max) = c.max_value.filter(|max| n > *max) {
                    return Err(self.violation(format!("{n} exceeds {max}")));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn violation(&self, message: String) -> RecordError {
        RecordError::Constraint {
            field: self.name.clone(),
            message,
        }
    }
}
