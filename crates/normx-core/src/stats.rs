//! # Statistics
//!
//! Row-count and per-column statistics for tables, snapshotted from the
//! catalog when a table is added to the metadata. Per-column statistics can be
//! large. They are dropped when a memo is detached; see
//! [`Memo::detach`](crate::memo::Memo::detach).

use crate::expr::ColumnId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Statistics for a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub column_stats: HashMap<ColumnId, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64) -> Self {
        Self {
            row_count,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column(mut self, col: ColumnId, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(col, stats);
        self
    }

    /// Drop per-column statistics, keeping the row count.
    pub fn clear_column_stats(&mut self) {
        self.column_stats = HashMap::new();
    }
}

/// Per-column statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL [0.0, 1.0].
    pub null_fraction: f64,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_column_stats_keeps_row_count() {
        let mut stats = Statistics::new(1000.0).with_column(ColumnId(1), ColumnStatistics::new(200.0, 0.1));
        assert_eq!(stats.column_stats[&ColumnId(1)].distinct_count, 200.0);
        stats.clear_column_stats();
        assert!(stats.column_stats.is_empty());
        assert_eq!(stats.row_count, 1000.0);
    }
}
