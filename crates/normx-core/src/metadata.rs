//! # Query Metadata
//!
//! Metadata is the identifier namespace of one query: every table and column
//! referenced by the tree gets a dense id here. Ids start at 1 and are never
//! reused within a memo.
//!
//! When a memo is copied, its metadata is copied along with it and keeps the
//! same ids, so the copied tree still refers to the same logical tables and
//! columns. Table check constraints are stored as scalar expressions of the
//! owning memo; a copy routes them through the factory so they are rebuilt in
//! the destination memo.

use crate::catalog::{CatalogTable, TableName};
use crate::expr::{ColumnId, DataType, ScalarExpr, TableId};
use crate::stats::Statistics;

/// A table referenced by the query.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    pub id: TableId,
    pub name: TableName,
    /// Columns of the table, in catalog order.
    pub columns: Vec<ColumnId>,
    /// Catalog statistics, keyed by the ids assigned here.
    pub stats: Option<Statistics>,
    /// Check constraints over the table's columns.
    pub check_constraints: Vec<ScalarExpr>,
}

/// A column referenced by the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub id: ColumnId,
    pub name: String,
    pub data_type: DataType,
    /// Owning table, or `None` for synthesized columns.
    pub table: Option<TableId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    tables: Vec<TableMeta>,
    columns: Vec<ColumnMeta>,
    next_unique_id: u64,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty() && self.next_unique_id == 0
    }

    /// Register a catalog table and all of its columns.
    pub fn add_table(&mut self, table: &CatalogTable) -> TableId {
        let id = TableId(self.tables.len() as u32 + 1);
        let columns: Vec<ColumnId> = table
            .columns
            .iter()
            .map(|c| self.push_column(c.name.clone(), c.data_type.clone(), Some(id)))
            .collect();

        let stats = table.row_count.map(|rows| {
            table
                .columns
                .iter()
                .zip(&columns)
                .filter_map(|(c, id)| table.column_stats.get(&c.name).map(|s| (*id, s.clone())))
                .fold(Statistics::new(rows), |stats, (id, cs)| stats.with_column(id, cs))
        });

        self.tables.push(TableMeta {
            id,
            name: table.name.clone(),
            columns,
            stats,
            check_constraints: Vec::new(),
        });
        id
    }

    /// Register a column that does not belong to any table, e.g. a projection.
    pub fn add_column(&mut self, name: impl Into<String>, data_type: DataType) -> ColumnId {
        self.push_column(name.into(), data_type, None)
    }

    fn push_column(&mut self, name: String, data_type: DataType, table: Option<TableId>) -> ColumnId {
        let id = ColumnId(self.columns.len() as u32 + 1);
        self.columns.push(ColumnMeta {
            id,
            name,
            data_type,
            table,
        });
        id
    }

    pub fn add_check_constraint(&mut self, table: TableId, constraint: ScalarExpr) {
        if let Some(t) = self.table_mut(table) {
            t.check_constraints.push(constraint);
        }
    }

    pub fn table(&self, id: TableId) -> Option<&TableMeta> {
        id.0.checked_sub(1).and_then(|i| self.tables.get(i as usize))
    }

    fn table_mut(&mut self, id: TableId) -> Option<&mut TableMeta> {
        id.0.checked_sub(1).and_then(|i| self.tables.get_mut(i as usize))
    }

    pub fn column(&self, id: ColumnId) -> Option<&ColumnMeta> {
        id.0.checked_sub(1).and_then(|i| self.columns.get(i as usize))
    }

    pub fn tables(&self) -> &[TableMeta] {
        &self.tables
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Hand out an id that is unique within this query, e.g. for Values operators.
    pub fn next_unique_id(&mut self) -> u64 {
        self.next_unique_id += 1;
        self.next_unique_id
    }

    /// Clone this metadata with every embedded scalar expression removed.
    ///
    /// The removed expressions belong to this metadata's memo and are returned
    /// alongside their tables, so the caller can rebuild them in another memo
    /// and re-attach them with [`Metadata::add_check_constraint`].
    pub fn clone_without_scalars(&self) -> (Metadata, Vec<(TableId, ScalarExpr)>) {
        let mut copy = self.clone();
        let mut scalars = Vec::new();
        for table in &mut copy.tables {
            let id = table.id;
            scalars.extend(table.check_constraints.drain(..).map(|e| (id, e)));
        }
        (copy, scalars)
    }

    /// Drop per-column statistics of every table.
    pub fn clear_column_stats(&mut self) {
        for table in &mut self.tables {
            if let Some(stats) = &mut table.stats {
                stats.clear_column_stats();
            }
        }
    }
}
