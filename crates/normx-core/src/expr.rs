//! # Expression and Operator Types
//!
//! This module defines the type system for the factory's tree representation.
//! It is organized into three layers:
//!
//! ## Identifiers and Values
//! `ColumnId` and `TableId` are opaque handles into the query [`Metadata`](crate::metadata::Metadata).
//! They are dense, start at 1, and are preserved when a memo is copied, so a
//! copied subtree keeps referring to the same logical tables and columns.
//! `Datum` and `DataType` describe constant values and their static types.
//!
//! ## Relational Operators (`RelOp`)
//! Relational operators produce sets of rows: scans, values, selections,
//! projections, limits and the join family. Their children are memo groups;
//! the operator itself only carries the *private* data (table, column list,
//! join hint) that distinguishes two nodes with the same children.
//!
//! ## Scalar Operators (`ScalarOp`)
//! Scalar operators compute a value per row: constants, column references,
//! comparisons, boolean connectives, tuples, function calls. Filter and
//! projection lists are also scalar operators so that every position in the
//! tree is interned the same way.
//!
//! ## Unified `Operator` Enum
//! The `Operator` enum wraps both families so the memo can store and intern
//! them uniformly. The `OpKind` discriminant lets rules and dispatch helpers
//! match on operator type without inspecting private data.

use crate::memo::GroupId;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Identifier of a column in the query metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(pub u32);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Identifier of a table in the query metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// Ordered set of columns. Output columns of relational groups use this form.
pub type ColSet = BTreeSet<ColumnId>;

/// Mapping from old to new column ids, used by column remapping.
pub type ColMap = HashMap<ColumnId, ColumnId>;

/// Static SQL type of a scalar expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Type of an untyped NULL and of list-like operators.
    Unknown,
    Bool,
    Int,
    Float,
    String,
    /// Days since Unix epoch (1970-01-01).
    Date,
    Tuple(Vec<DataType>),
}

impl DataType {
    /// Whether a datum of type `other` may be stored where `self` is expected.
    /// `Unknown` (the type of NULL) is accepted everywhere.
    pub fn accepts(&self, other: &DataType) -> bool {
        match (self, other) {
            (_, DataType::Unknown) | (DataType::Unknown, _) => true,
            (DataType::Tuple(a), DataType::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.accepts(y))
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Unknown => write!(f, "unknown"),
            DataType::Bool => write!(f, "bool"),
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::String => write!(f, "string"),
            DataType::Date => write!(f, "date"),
            DataType::Tuple(elems) => {
                write!(f, "tuple{{")?;
                for (i, t) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A concrete SQL value.
///
/// Uses `OrderedFloat` for `f64` so that constants are `Eq + Hash`, which the
/// memo needs to intern constant operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(String),
    Date(i32),
    Tuple(Vec<Datum>),
}

impl Datum {
    /// The type this datum has on its own, without any context.
    pub fn resolved_type(&self) -> DataType {
        match self {
            Datum::Null => DataType::Unknown,
            Datum::Bool(_) => DataType::Bool,
            Datum::Int(_) => DataType::Int,
            Datum::Float(_) => DataType::Float,
            Datum::String(_) => DataType::String,
            Datum::Date(_) => DataType::Date,
            Datum::Tuple(elems) => DataType::Tuple(elems.iter().map(Datum::resolved_type).collect()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Bool(v) => write!(f, "{}", v),
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Float(v) => write!(f, "{}", v),
            Datum::String(v) => write!(f, "'{}'", v),
            Datum::Date(v) => write!(f, "date({})", v),
            Datum::Tuple(elems) => {
                write!(f, "(")?;
                for (i, d) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", d)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Private data of a table scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanPrivate {
    pub table: TableId,
    pub cols: Vec<ColumnId>,
}

/// Private data of a Values operator. `id` keeps two otherwise identical
/// Values operators from being interned together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValuesPrivate {
    pub cols: Vec<ColumnId>,
    pub id: u64,
}

/// Private data of a projection: input columns passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectPrivate {
    pub passthrough: Vec<ColumnId>,
}

/// Join algorithm hint supplied by the query author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinHint {
    #[default]
    None,
    Hash,
    Merge,
    Lookup,
}

/// Private data shared by every join operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinPrivate {
    pub hint: JoinHint,
}

/// Relational operators.
///
/// Children are memo groups, in the order documented on each variant. Join
/// operators always have `[left, right, on]` where `on` is a `Filters` group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelOp {
    /// Leaf. Reads the given columns of a base table.
    Scan(ScanPrivate),
    /// `[rows]`, where `rows` is a `ScalarList` of `Tuple`s.
    Values(ValuesPrivate),
    /// `[input, filters]`.
    Select,
    /// `[input, projections]`.
    Project(ProjectPrivate),
    InnerJoin(JoinPrivate),
    InnerJoinApply(JoinPrivate),
    LeftJoin(JoinPrivate),
    LeftJoinApply(JoinPrivate),
    RightJoin(JoinPrivate),
    FullJoin(JoinPrivate),
    SemiJoin(JoinPrivate),
    SemiJoinApply(JoinPrivate),
    AntiJoin(JoinPrivate),
    AntiJoinApply(JoinPrivate),
    /// `[input, limit]`. Not leakproof: a negative limit is a runtime error.
    Limit,
}

/// Scalar operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarOp {
    /// Leaf. A non-null, non-boolean constant.
    Const { value: Datum, typ: DataType },
    /// Leaf. NULL of a static type, so rewrites never change the type.
    Null(DataType),
    /// Leaf. Interned once per memo at a reserved group.
    True,
    /// Leaf. Interned once per memo at a reserved group.
    False,
    /// Leaf. Reference to a column.
    Variable(ColumnId),
    /// Leaf. A value supplied at execution time (`$1`, `$2`, ...).
    Placeholder { index: u16, typ: DataType },
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `[left, right]`, where `right` is a `Tuple`.
    In,
    And,
    Or,
    Not,
    /// Variadic.
    Tuple(DataType),
    /// Variadic. Generic list, used for the rows of a Values operator.
    ScalarList,
    /// Variadic list of `FiltersItem`. An empty list means "true".
    Filters,
    /// `[condition]`.
    FiltersItem,
    /// Variadic list of `ProjectionsItem`.
    Projections,
    /// `[element]`, producing the given column.
    ProjectionsItem(ColumnId),
    /// Variadic. Builtin function call.
    Function { name: String, typ: DataType },
}

/// Unified operator enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Relational(RelOp),
    Scalar(ScalarOp),
}

impl Operator {
    pub fn is_relational(&self) -> bool {
        matches!(self, Operator::Relational(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Operator::Scalar(_))
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operator::Relational(r) => OpKind::Relational(r.kind()),
            Operator::Scalar(s) => OpKind::Scalar(s.kind()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        match self {
            Operator::Relational(RelOp::Scan(p)) => {
                write!(f, " {} cols=", p.table)?;
                write_cols(f, &p.cols)
            }
            Operator::Relational(RelOp::Values(p)) => {
                write!(f, " cols=")?;
                write_cols(f, &p.cols)?;
                write!(f, " id={}", p.id)
            }
            Operator::Relational(RelOp::Project(p)) if !p.passthrough.is_empty() => {
                write!(f, " passthrough=")?;
                write_cols(f, &p.passthrough)
            }
            Operator::Relational(
                RelOp::InnerJoin(p)
                | RelOp::InnerJoinApply(p)
                | RelOp::LeftJoin(p)
                | RelOp::LeftJoinApply(p)
                | RelOp::RightJoin(p)
                | RelOp::FullJoin(p)
                | RelOp::SemiJoin(p)
                | RelOp::SemiJoinApply(p)
                | RelOp::AntiJoin(p)
                | RelOp::AntiJoinApply(p),
            ) if p.hint != JoinHint::None => write!(f, " hint={:?}", p.hint),
            Operator::Scalar(ScalarOp::Const { value, typ }) => write!(f, " {}:{}", value, typ),
            Operator::Scalar(ScalarOp::Null(typ)) => write!(f, " :{}", typ),
            Operator::Scalar(ScalarOp::Variable(col)) => write!(f, " {}", col),
            Operator::Scalar(ScalarOp::Placeholder { index, typ }) => write!(f, " ${}:{}", index, typ),
            Operator::Scalar(ScalarOp::Tuple(typ)) => write!(f, " :{}", typ),
            Operator::Scalar(ScalarOp::ProjectionsItem(col)) => write!(f, " as {}", col),
            Operator::Scalar(ScalarOp::Function { name, typ }) => write!(f, " {}:{}", name, typ),
            _ => Ok(()),
        }
    }
}

fn write_cols(f: &mut fmt::Formatter<'_>, cols: &[ColumnId]) -> fmt::Result {
    write!(f, "(")?;
    for (i, c) in cols.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", c)?;
    }
    write!(f, ")")
}

/// Kind discriminant for dispatch and pattern matching (without private data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Relational(RelOpKind),
    Scalar(ScalarOpKind),
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Relational(k) => write!(f, "{}", k),
            OpKind::Scalar(k) => write!(f, "{}", k),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelOpKind {
    Scan,
    Values,
    Select,
    Project,
    InnerJoin,
    InnerJoinApply,
    LeftJoin,
    LeftJoinApply,
    RightJoin,
    FullJoin,
    SemiJoin,
    SemiJoinApply,
    AntiJoin,
    AntiJoinApply,
    Limit,
}

impl RelOpKind {
    pub fn is_join(self) -> bool {
        !matches!(
            self,
            RelOpKind::Scan | RelOpKind::Values | RelOpKind::Select | RelOpKind::Project | RelOpKind::Limit
        )
    }

    /// Whether only the left input's columns reach the output.
    pub fn is_semi_or_anti(self) -> bool {
        matches!(
            self,
            RelOpKind::SemiJoin | RelOpKind::SemiJoinApply | RelOpKind::AntiJoin | RelOpKind::AntiJoinApply
        )
    }
}

impl fmt::Display for RelOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelOpKind::Scan => "scan",
            RelOpKind::Values => "values",
            RelOpKind::Select => "select",
            RelOpKind::Project => "project",
            RelOpKind::InnerJoin => "inner-join",
            RelOpKind::InnerJoinApply => "inner-join-apply",
            RelOpKind::LeftJoin => "left-join",
            RelOpKind::LeftJoinApply => "left-join-apply",
            RelOpKind::RightJoin => "right-join",
            RelOpKind::FullJoin => "full-join",
            RelOpKind::SemiJoin => "semi-join",
            RelOpKind::SemiJoinApply => "semi-join-apply",
            RelOpKind::AntiJoin => "anti-join",
            RelOpKind::AntiJoinApply => "anti-join-apply",
            RelOpKind::Limit => "limit",
        };
        f.write_str(name)
    }
}

impl RelOp {
    pub fn kind(&self) -> RelOpKind {
        match self {
            RelOp::Scan(_) => RelOpKind::Scan,
            RelOp::Values(_) => RelOpKind::Values,
            RelOp::Select => RelOpKind::Select,
            RelOp::Project(_) => RelOpKind::Project,
            RelOp::InnerJoin(_) => RelOpKind::InnerJoin,
            RelOp::InnerJoinApply(_) => RelOpKind::InnerJoinApply,
            RelOp::LeftJoin(_) => RelOpKind::LeftJoin,
            RelOp::LeftJoinApply(_) => RelOpKind::LeftJoinApply,
            RelOp::RightJoin(_) => RelOpKind::RightJoin,
            RelOp::FullJoin(_) => RelOpKind::FullJoin,
            RelOp::SemiJoin(_) => RelOpKind::SemiJoin,
            RelOp::SemiJoinApply(_) => RelOpKind::SemiJoinApply,
            RelOp::AntiJoin(_) => RelOpKind::AntiJoin,
            RelOp::AntiJoinApply(_) => RelOpKind::AntiJoinApply,
            RelOp::Limit => RelOpKind::Limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarOpKind {
    Const,
    Null,
    True,
    False,
    Variable,
    Placeholder,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
    Not,
    Tuple,
    ScalarList,
    Filters,
    FiltersItem,
    Projections,
    ProjectionsItem,
    Function,
}

impl ScalarOpKind {
    /// Constant-like leaves: their value is known at construction time.
    pub fn is_constant_value(self) -> bool {
        matches!(
            self,
            ScalarOpKind::Const | ScalarOpKind::Null | ScalarOpKind::True | ScalarOpKind::False
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            ScalarOpKind::Eq
                | ScalarOpKind::Ne
                | ScalarOpKind::Lt
                | ScalarOpKind::Le
                | ScalarOpKind::Gt
                | ScalarOpKind::Ge
        )
    }
}

impl fmt::Display for ScalarOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarOpKind::Const => "const",
            ScalarOpKind::Null => "null",
            ScalarOpKind::True => "true",
            ScalarOpKind::False => "false",
            ScalarOpKind::Variable => "variable",
            ScalarOpKind::Placeholder => "placeholder",
            ScalarOpKind::Eq => "eq",
            ScalarOpKind::Ne => "ne",
            ScalarOpKind::Lt => "lt",
            ScalarOpKind::Le => "le",
            ScalarOpKind::Gt => "gt",
            ScalarOpKind::Ge => "ge",
            ScalarOpKind::In => "in",
            ScalarOpKind::And => "and",
            ScalarOpKind::Or => "or",
            ScalarOpKind::Not => "not",
            ScalarOpKind::Tuple => "tuple",
            ScalarOpKind::ScalarList => "scalar-list",
            ScalarOpKind::Filters => "filters",
            ScalarOpKind::FiltersItem => "filters-item",
            ScalarOpKind::Projections => "projections",
            ScalarOpKind::ProjectionsItem => "projections-item",
            ScalarOpKind::Function => "function",
        };
        f.write_str(name)
    }
}

impl ScalarOp {
    pub fn kind(&self) -> ScalarOpKind {
        match self {
            ScalarOp::Const { .. } => ScalarOpKind::Const,
            ScalarOp::Null(_) => ScalarOpKind::Null,
            ScalarOp::True => ScalarOpKind::True,
            ScalarOp::False => ScalarOpKind::False,
            ScalarOp::Variable(_) => ScalarOpKind::Variable,
            ScalarOp::Placeholder { .. } => ScalarOpKind::Placeholder,
            ScalarOp::Eq => ScalarOpKind::Eq,
            ScalarOp::Ne => ScalarOpKind::Ne,
            ScalarOp::Lt => ScalarOpKind::Lt,
            ScalarOp::Le => ScalarOpKind::Le,
            ScalarOp::Gt => ScalarOpKind::Gt,
            ScalarOp::Ge => ScalarOpKind::Ge,
            ScalarOp::In => ScalarOpKind::In,
            ScalarOp::And => ScalarOpKind::And,
            ScalarOp::Or => ScalarOpKind::Or,
            ScalarOp::Not => ScalarOpKind::Not,
            ScalarOp::Tuple(_) => ScalarOpKind::Tuple,
            ScalarOp::ScalarList => ScalarOpKind::ScalarList,
            ScalarOp::Filters => ScalarOpKind::Filters,
            ScalarOp::FiltersItem => ScalarOpKind::FiltersItem,
            ScalarOp::Projections => ScalarOpKind::Projections,
            ScalarOp::ProjectionsItem(_) => ScalarOpKind::ProjectionsItem,
            ScalarOp::Function { .. } => ScalarOpKind::Function,
        }
    }
}

/// Handle to a relational group in a memo.
///
/// Handles are only handed out by the factory and the memo, so a `RelExpr`
/// always names a group whose expression is relational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelExpr(pub(crate) GroupId);

impl RelExpr {
    pub fn group(self) -> GroupId {
        self.0
    }
}

/// Handle to a scalar group in a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScalarExpr(pub(crate) GroupId);

impl ScalarExpr {
    /// The shared `True` expression, identical in every memo.
    pub const TRUE: ScalarExpr = ScalarExpr(GroupId::TRUE);
    /// The shared `False` expression, identical in every memo.
    pub const FALSE: ScalarExpr = ScalarExpr(GroupId::FALSE);

    pub fn group(self) -> GroupId {
        self.0
    }
}

impl fmt::Display for RelExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datum_resolved_type() {
        assert_eq!(Datum::Int(5).resolved_type(), DataType::Int);
        assert_eq!(Datum::Null.resolved_type(), DataType::Unknown);
        assert_eq!(
            Datum::Tuple(vec![Datum::Int(1), Datum::String("a".into())]).resolved_type(),
            DataType::Tuple(vec![DataType::Int, DataType::String])
        );
    }

    #[test]
    fn test_unknown_type_is_accepted_everywhere() {
        assert!(DataType::Int.accepts(&DataType::Unknown));
        assert!(!DataType::Int.accepts(&DataType::String));
        assert!(DataType::Tuple(vec![DataType::Int]).accepts(&DataType::Tuple(vec![DataType::Unknown])));
    }

    #[test]
    fn test_join_kinds() {
        assert!(RelOpKind::LeftJoinApply.is_join());
        assert!(!RelOpKind::Limit.is_join());
        assert!(RelOpKind::AntiJoin.is_semi_or_anti());
        assert!(!RelOpKind::FullJoin.is_semi_or_anti());
    }

    #[test]
    fn test_operator_display() {
        let op = Operator::Relational(RelOp::Scan(ScanPrivate {
            table: TableId(1),
            cols: vec![ColumnId(1), ColumnId(2)],
        }));
        assert_eq!(op.to_string(), "scan [1] cols=(@1,@2)");
        let c = Operator::Scalar(ScalarOp::Const { value: Datum::Int(5), typ: DataType::Int });
        assert_eq!(c.to_string(), "const 5:int");
    }
}
