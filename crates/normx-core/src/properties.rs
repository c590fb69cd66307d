//! # Logical and Physical Properties
//!
//! ## Logical Properties
//!
//! Logical properties are shared by every expression in a group because they
//! describe *what* the group computes: its output columns, how many rows it can
//! produce, and how volatile its operators are. They are derived once, when the
//! group is first interned, by a [`LogicalPropsProvider`](crate::logical::LogicalPropsProvider).
//!
//! ## Cardinality
//!
//! `Cardinality` is a closed range `[min, max]` of row counts. `u32::MAX` as the
//! upper bound means "unbounded". A range of exactly `[0, 0]` means the group can
//! never produce a row, which lets the factory replace it with an empty Values
//! operator when its operators are leakproof.
//!
//! ## Volatility
//!
//! Operators are classified from least to most volatile: leakproof (no side
//! effects, never errors), immutable (may error, e.g. division by zero), stable
//! (constant within a statement, e.g. `now()`), volatile (e.g. `random()`).
//! A `VolatilitySet` records every class contributing to an expression.
//!
//! ## Required Physical Properties
//!
//! `RequiredProps` is what the consumer of the memo root expects of its output:
//! the order in which columns are presented and the row ordering.

use crate::expr::{ColSet, ColumnId, DataType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounds on the number of rows a relational expression can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cardinality {
    pub min: u32,
    pub max: u32,
}

impl Cardinality {
    /// Upper bound meaning "no known limit".
    pub const UNBOUNDED: u32 = u32::MAX;
    /// Any number of rows.
    pub const ANY: Cardinality = Cardinality { min: 0, max: Self::UNBOUNDED };
    /// No rows at all.
    pub const ZERO: Cardinality = Cardinality { min: 0, max: 0 };

    pub fn exact(rows: u32) -> Self {
        Self { min: rows, max: rows }
    }

    pub fn is_zero(&self) -> bool {
        self.max == 0
    }

    pub fn is_unbounded(&self) -> bool {
        self.max == Self::UNBOUNDED
    }

    /// Cap both bounds at `rows`.
    pub fn limit(self, rows: u32) -> Self {
        Self {
            min: self.min.min(rows),
            max: self.max.min(rows),
        }
    }

    /// Allow the expression to produce fewer rows, down to none.
    pub fn as_low_as_zero(self) -> Self {
        Self { min: 0, max: self.max }
    }

    /// Cardinality of a cross product.
    pub fn product(self, other: Cardinality) -> Self {
        let mul = |a: u32, b: u32| {
            if a == 0 || b == 0 {
                0
            } else if a == Self::UNBOUNDED || b == Self::UNBOUNDED {
                Self::UNBOUNDED
            } else {
                a.saturating_mul(b)
            }
        };
        Self {
            min: mul(self.min, other.min),
            max: mul(self.max, other.max),
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "[{} - ]", self.min)
        } else {
            write!(f, "[{} - {}]", self.min, self.max)
        }
    }
}

/// Volatility classes, ordered from least to most volatile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Volatility {
    Leakproof,
    Immutable,
    Stable,
    Volatile,
}

/// The set of volatility classes contributing to an expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolatilitySet(u8);

impl VolatilitySet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn add(&mut self, v: Volatility) {
        self.0 |= 1 << v as u8;
    }

    pub fn union_with(&mut self, other: VolatilitySet) {
        self.0 |= other.0;
    }

    pub fn contains(&self, v: Volatility) -> bool {
        self.0 & (1 << v as u8) != 0
    }

    /// True if no contributing operator can have side effects or raise errors.
    /// The empty set is leakproof.
    pub fn is_leakproof(&self) -> bool {
        self.0 & !(1 << Volatility::Leakproof as u8) == 0
    }

    /// The most volatile class in the set, or leakproof if empty.
    pub fn max(&self) -> Volatility {
        [Volatility::Volatile, Volatility::Stable, Volatility::Immutable]
            .into_iter()
            .find(|v| self.contains(*v))
            .unwrap_or(Volatility::Leakproof)
    }
}

impl From<Volatility> for VolatilitySet {
    fn from(v: Volatility) -> Self {
        let mut set = Self::new();
        set.add(v);
        set
    }
}

/// Logical properties of a relational group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicalProperties {
    /// Columns produced by the group.
    pub output_cols: ColSet,
    pub cardinality: Cardinality,
    pub volatility: VolatilitySet,
    /// Whether a Placeholder appears anywhere below the group.
    pub has_placeholder: bool,
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::ANY
    }
}

/// Properties of a scalar group.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarProperties {
    pub data_type: DataType,
    pub volatility: VolatilitySet,
    /// Columns referenced anywhere in the expression.
    pub outer_cols: ColSet,
    pub has_placeholder: bool,
    /// Position of the expression in interning order. Assigned by the memo.
    pub rank: u32,
}

impl ScalarProperties {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            volatility: VolatilitySet::new(),
            outer_cols: ColSet::new(),
            has_placeholder: false,
            rank: 0,
        }
    }
}

/// One column of a required ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderingColumn {
    pub col: ColumnId,
    pub descending: bool,
}

/// Physical properties the consumer of the root expression requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredProps {
    /// Output columns, in presentation order. Empty means "any".
    pub presentation: Vec<ColumnId>,
    /// Required row ordering. Empty means "any".
    pub ordering: Vec<OrderingColumn>,
}

impl RequiredProps {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_presentation(cols: Vec<ColumnId>) -> Self {
        Self {
            presentation: cols,
            ordering: Vec::new(),
        }
    }

    pub fn with_ordering(mut self, ordering: Vec<OrderingColumn>) -> Self {
        self.ordering = ordering;
        self
    }
}
