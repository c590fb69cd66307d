//! # Logical Property Derivation
//!
//! Logical properties are computed once per group, when the factory interns a
//! new expression, from the candidate expression and the already-derived
//! properties of its children. Derivation is pluggable through
//! [`LogicalPropsProvider`]; the factory gets its provider from the
//! [`EvalContext`](crate::eval::EvalContext).
//!
//! ## Cardinality
//!
//! `DefaultPropsProvider` derives conservative row-count ranges:
//!
//! | Operator   | Cardinality                                                  |
//! |------------|--------------------------------------------------------------|
//! | Scan       | `[0 - ]`                                                     |
//! | Values     | exactly the number of rows                                   |
//! | Select     | `[0, input.max]`, or `[0, 0]` if a filter is false or null   |
//! | Project    | input                                                        |
//! | Limit      | input capped at a constant limit                             |
//! | Inner/Semi | `[0, 0]` if either side is empty or the ON clause is false   |
//! | Left/Anti  | `[0, 0]` if the left side is empty                           |
//! | Right      | `[0, 0]` if the right side is empty                          |
//! | Full       | `[0, 0]` if both sides are empty                             |
//!
//! ## Volatility
//!
//! Every relational and scalar operator is leakproof except function calls,
//! whose class comes from the injected [`BuiltinLookup`], and Limit, which is
//! immutable because its count is checked at execution time. Volatility is the
//! union over all children.

use crate::builtins::{BuiltinLookup, BuiltinRegistry};
use crate::expr::{ColSet, DataType, Datum, Operator, RelExpr, RelOp, ScalarExpr, ScalarOp};
use crate::memo::{GroupId, GroupProps, Memo, MemoExpr};
use crate::properties::{Cardinality, LogicalProperties, ScalarProperties, Volatility, VolatilitySet};
use std::sync::Arc;

/// Derives the properties of a group from its first expression.
pub trait LogicalPropsProvider: Send + Sync {
    fn relational(&self, memo: &Memo, expr: &MemoExpr) -> LogicalProperties;
    fn scalar(&self, memo: &Memo, expr: &MemoExpr) -> ScalarProperties;
}

pub struct DefaultPropsProvider {
    builtins: Arc<dyn BuiltinLookup>,
}

impl DefaultPropsProvider {
    pub fn new(builtins: Arc<dyn BuiltinLookup>) -> Self {
        Self { builtins }
    }
}

impl Default for DefaultPropsProvider {
    fn default() -> Self {
        Self::new(Arc::new(BuiltinRegistry::standard()))
    }
}

/// Whether a Filters list contains an item that can never be true.
pub fn filters_contradiction(memo: &Memo, filters: GroupId) -> bool {
    memo.expr(filters).children.iter().any(|item| {
        memo.expr(*item).children.first().is_some_and(|cond| {
            *cond == GroupId::FALSE || matches!(memo.expr(*cond).op, Operator::Scalar(ScalarOp::Null(_)))
        })
    })
}

fn rel(memo: &Memo, g: GroupId) -> &LogicalProperties {
    memo.relational_props(RelExpr(g))
}

fn scalar(memo: &Memo, g: GroupId) -> &ScalarProperties {
    memo.scalar_props(ScalarExpr(g))
}

/// Union of the volatility and placeholder flags of every child.
fn inherited(memo: &Memo, children: &[GroupId]) -> (VolatilitySet, bool) {
    let mut volatility = VolatilitySet::new();
    let mut placeholder = false;
    for child in children {
        match &memo.group(*child).props {
            GroupProps::Relational(p) => {
                volatility.union_with(p.volatility);
                placeholder |= p.has_placeholder;
            }
            GroupProps::Scalar(p) => {
                volatility.union_with(p.volatility);
                placeholder |= p.has_placeholder;
            }
        }
    }
    (volatility, placeholder)
}

impl DefaultPropsProvider {
    fn select(&self, memo: &Memo, input: GroupId, filters: GroupId) -> LogicalProperties {
        let input = rel(memo, input);
        let cardinality = if filters_contradiction(memo, filters) {
            Cardinality::ZERO
        } else if memo.expr(filters).children.is_empty() {
            input.cardinality
        } else {
            input.cardinality.as_low_as_zero()
        };
        LogicalProperties {
            output_cols: input.output_cols.clone(),
            cardinality,
            ..LogicalProperties::default()
        }
    }

    fn join(&self, memo: &Memo, op: &RelOp, children: &[GroupId]) -> LogicalProperties {
        let (l, r, on) = (rel(memo, children[0]), rel(memo, children[1]), children[2]);
        let kind = op.kind();
        let contradiction = filters_contradiction(memo, on);
        let cross = memo.expr(on).children.is_empty();

        let output_cols = if kind.is_semi_or_anti() {
            l.output_cols.clone()
        } else {
            l.output_cols.union(&r.output_cols).copied().collect()
        };

        let at_least_one = |c: Cardinality| Cardinality { min: 1, max: c.max.max(1) };
        let inner = if cross {
            l.cardinality.product(r.cardinality)
        } else {
            l.cardinality.product(r.cardinality).as_low_as_zero()
        };

        use RelOp::*;
        let cardinality = match op {
            InnerJoin(_) | InnerJoinApply(_) => {
                if l.cardinality.is_zero() || r.cardinality.is_zero() || contradiction {
                    Cardinality::ZERO
                } else {
                    inner
                }
            }
            LeftJoin(_) | LeftJoinApply(_) => {
                if l.cardinality.is_zero() {
                    Cardinality::ZERO
                } else {
                    l.cardinality.product(at_least_one(r.cardinality))
                }
            }
            RightJoin(_) => {
                if r.cardinality.is_zero() {
                    Cardinality::ZERO
                } else {
                    at_least_one(l.cardinality).product(r.cardinality)
                }
            }
            FullJoin(_) => {
                if l.cardinality.is_zero() && r.cardinality.is_zero() {
                    Cardinality::ZERO
                } else {
                    let both = at_least_one(l.cardinality).product(at_least_one(r.cardinality));
                    let sum = l.cardinality.max.saturating_add(r.cardinality.max);
                    Cardinality {
                        min: l.cardinality.min.max(r.cardinality.min),
                        max: both.max.max(sum),
                    }
                }
            }
            SemiJoin(_) | SemiJoinApply(_) => {
                if l.cardinality.is_zero() || r.cardinality.is_zero() || contradiction {
                    Cardinality::ZERO
                } else {
                    l.cardinality.as_low_as_zero()
                }
            }
            AntiJoin(_) | AntiJoinApply(_) => {
                if l.cardinality.is_zero() {
                    Cardinality::ZERO
                } else {
                    l.cardinality.as_low_as_zero()
                }
            }
            Scan(_) | Values(_) | Select | Project(_) | Limit => unreachable!("not a join: {}", kind),
        };

        LogicalProperties {
            output_cols,
            cardinality,
            ..LogicalProperties::default()
        }
    }
}

impl LogicalPropsProvider for DefaultPropsProvider {
    fn relational(&self, memo: &Memo, expr: &MemoExpr) -> LogicalProperties {
        let Operator::Relational(op) = &expr.op else {
            return LogicalProperties::default();
        };
        let children = &expr.children;
        let (volatility, has_placeholder) = inherited(memo, children);

        let mut props = match op {
            RelOp::Scan(p) => LogicalProperties {
                output_cols: p.cols.iter().copied().collect(),
                cardinality: Cardinality::ANY,
                ..LogicalProperties::default()
            },
            RelOp::Values(p) => {
                let rows = memo.expr(children[0]).children.len();
                LogicalProperties {
                    output_cols: p.cols.iter().copied().collect(),
                    cardinality: Cardinality::exact(rows.min(u32::MAX as usize) as u32),
                    ..LogicalProperties::default()
                }
            }
            RelOp::Select => self.select(memo, children[0], children[1]),
            RelOp::Project(p) => {
                let input = rel(memo, children[0]);
                let mut output_cols: ColSet = p.passthrough.iter().copied().collect();
                for item in &memo.expr(children[1]).children {
                    if let Operator::Scalar(ScalarOp::ProjectionsItem(col)) = &memo.expr(*item).op {
                        output_cols.insert(*col);
                    }
                }
                LogicalProperties {
                    output_cols,
                    cardinality: input.cardinality,
                    ..LogicalProperties::default()
                }
            }
            RelOp::Limit => {
                let input = rel(memo, children[0]);
                let limit = match memo.extract_const_datum(children[1]) {
                    Some(Datum::Int(n)) if n >= 0 => Some(n.min(u32::MAX as i64) as u32),
                    _ => None,
                };
                LogicalProperties {
                    output_cols: input.output_cols.clone(),
                    cardinality: limit.map_or(input.cardinality, |n| input.cardinality.limit(n)),
                    ..LogicalProperties::default()
                }
            }
            join => self.join(memo, join, children),
        };

        props.volatility = volatility;
        if matches!(op, RelOp::Limit) {
            props.volatility.add(Volatility::Immutable);
        }
        props.has_placeholder = has_placeholder;
        props
    }

    fn scalar(&self, memo: &Memo, expr: &MemoExpr) -> ScalarProperties {
        let Operator::Scalar(op) = &expr.op else {
            return ScalarProperties::new(DataType::Unknown);
        };
        let (mut volatility, mut has_placeholder) = inherited(memo, &expr.children);
        let mut outer_cols = ColSet::new();
        for child in &expr.children {
            if let GroupProps::Scalar(p) = &memo.group(*child).props {
                outer_cols.extend(p.outer_cols.iter().copied());
            }
        }

        let data_type = match op {
            ScalarOp::Const { typ, .. } | ScalarOp::Null(typ) | ScalarOp::Tuple(typ) => typ.clone(),
            ScalarOp::Placeholder { typ, .. } => {
                has_placeholder = true;
                typ.clone()
            }
            ScalarOp::Variable(col) => {
                outer_cols.insert(*col);
                memo.metadata()
                    .column(*col)
                    .map(|c| c.data_type.clone())
                    .unwrap_or(DataType::Unknown)
            }
            ScalarOp::Function { name, typ } => {
                let v = self
                    .builtins
                    .properties(name)
                    .map_or(Volatility::Volatile, |p| p.volatility);
                volatility.add(v);
                typ.clone()
            }
            ScalarOp::True
            | ScalarOp::False
            | ScalarOp::Eq
            | ScalarOp::Ne
            | ScalarOp::Lt
            | ScalarOp::Le
            | ScalarOp::Gt
            | ScalarOp::Ge
            | ScalarOp::In
            | ScalarOp::And
            | ScalarOp::Or
            | ScalarOp::Not => DataType::Bool,
            ScalarOp::FiltersItem | ScalarOp::ProjectionsItem(_) => expr
                .children
                .first()
                .map(|c| scalar(memo, *c).data_type.clone())
                .unwrap_or(DataType::Unknown),
            ScalarOp::ScalarList | ScalarOp::Filters | ScalarOp::Projections => DataType::Unknown,
        };

        ScalarProperties {
            data_type,
            volatility,
            outer_cols,
            has_placeholder,
            rank: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_scalar(memo: &mut Memo, provider: &DefaultPropsProvider, op: ScalarOp, children: Vec<GroupId>) -> GroupId {
        let e = MemoExpr::scalar(op, children);
        let props = provider.scalar(memo, &e);
        memo.add_group(e, GroupProps::Scalar(props))
    }

    #[test]
    fn test_function_volatility_from_builtins() {
        let provider = DefaultPropsProvider::default();
        let mut memo = Memo::new();
        let now = add_scalar(
            &mut memo,
            &provider,
            ScalarOp::Function { name: "now".into(), typ: DataType::Date },
            vec![],
        );
        assert_eq!(memo.scalar_props(ScalarExpr(now)).volatility.max(), Volatility::Stable);
        let unknown = add_scalar(
            &mut memo,
            &provider,
            ScalarOp::Function { name: "mystery".into(), typ: DataType::Int },
            vec![],
        );
        assert_eq!(memo.scalar_props(ScalarExpr(unknown)).volatility.max(), Volatility::Volatile);
    }

    #[test]
    fn test_placeholder_flag_propagates() {
        let provider = DefaultPropsProvider::default();
        let mut memo = Memo::new();
        let p = add_scalar(
            &mut memo,
            &provider,
            ScalarOp::Placeholder { index: 1, typ: DataType::Int },
            vec![],
        );
        let not = add_scalar(&mut memo, &provider, ScalarOp::Not, vec![p]);
        assert!(memo.scalar_props(ScalarExpr(not)).has_placeholder);
        assert_eq!(memo.scalar_props(ScalarExpr(not)).data_type, DataType::Bool);
    }

    #[test]
    fn test_false_filter_is_contradiction() {
        let provider = DefaultPropsProvider::default();
        let mut memo = Memo::new();
        let item = add_scalar(&mut memo, &provider, ScalarOp::FiltersItem, vec![GroupId::FALSE]);
        let filters = add_scalar(&mut memo, &provider, ScalarOp::Filters, vec![item]);
        assert!(filters_contradiction(&memo, filters));
        let empty = add_scalar(&mut memo, &provider, ScalarOp::Filters, vec![]);
        assert!(!filters_contradiction(&memo, empty));
    }
}
