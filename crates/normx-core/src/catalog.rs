//! # Catalog Interface
//!
//! The catalog resolves table names to column definitions and table-level
//! statistics. The factory only stores a reference to it: tables are resolved
//! into the query [`Metadata`](crate::metadata::Metadata) once, and from then on
//! the tree refers to them by `TableId` / `ColumnId`.
//!
//! ## Trait Design
//!
//! The `Catalog` trait is minimal and used behind `Arc<dyn Catalog>` so that
//! different backends can provide metadata. `InMemoryCatalog` is a HashMap-backed
//! implementation for tests and embedding, populated programmatically.

use crate::expr::DataType;
use crate::stats::ColumnStatistics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Fully-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column definition as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: DataType,
}

impl CatalogColumn {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A resolved table: its columns and whatever statistics were collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTable {
    pub name: TableName,
    pub columns: Vec<CatalogColumn>,
    /// Row count from the last ANALYZE, if any.
    pub row_count: Option<f64>,
    /// Column statistics keyed by column name.
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl CatalogTable {
    pub fn new(name: TableName, columns: Vec<CatalogColumn>) -> Self {
        Self {
            name,
            columns,
            row_count: None,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_row_count(mut self, rows: f64) -> Self {
        self.row_count = Some(rows);
        self
    }

    pub fn with_column_stats(mut self, column: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(column.into(), stats);
        self
    }
}

/// Catalog provides name resolution for tables.
pub trait Catalog: Send + Sync {
    fn resolve_table(&self, name: &TableName) -> Option<CatalogTable>;
}

/// In-memory catalog for testing and development.
///
/// Tables are keyed by their fully-qualified name (`schema.table`).
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tables: HashMap<String, CatalogTable>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: CatalogTable) {
        self.tables.insert(table.name.to_string(), table);
    }
}

impl Catalog for InMemoryCatalog {
    fn resolve_table(&self, name: &TableName) -> Option<CatalogTable> {
        self.tables.get(&name.to_string()).cloned()
    }
}
