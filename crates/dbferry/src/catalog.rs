//! Catalog metadata types produced by schema discovery.

use serde::{Deserialize, Serialize};

/// A discovered table (or view) in a source schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Column metadata.
///
/// Columns are kept in catalog ordinal order; that order flows unchanged
/// into generated DDL and row binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as reported by the source catalog.
    pub name: String,

    /// Source data type name (e.g., "int", "character varying").
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}
