//! # Comparison Rules
//!
//! Canonicalize and fold equality comparisons:
//!
//! ```text
//! const = x      =>  x = const
//! c1 = c2        =>  true | false      (same type)
//! NULL = x       =>  NULL              (x constant)
//! ```

use normx_core::expr::{DataType, Datum, OpKind, ScalarOp, ScalarOpKind};
use normx_core::factory::Factory;
use normx_core::memo::{GroupId, Memo, MemoExpr};
use normx_core::pattern::Pattern;
use normx_core::rule::{Captures, NormRule, Rewrite, RuleName};

use crate::enabled;

fn is_constant(memo: &Memo, g: GroupId) -> bool {
    matches!(memo.expr(g).kind(), OpKind::Scalar(k) if k.is_constant_value())
}

/// Move a constant on the left of `=` to the right.
pub struct CommuteConstEq;

impl NormRule for CommuteConstEq {
    fn name(&self) -> RuleName {
        RuleName::new("CommuteConstEq")
    }

    fn pattern(&self) -> Pattern {
        Pattern::comparison(ScalarOpKind::Eq)
    }

    fn check(&self, f: &Factory, expr: &MemoExpr) -> Option<Captures> {
        if !enabled(f, self.name()) {
            return None;
        }
        let memo = f.memo();
        let (left, right) = (expr.children[0], expr.children[1]);
        (is_constant(memo, left) && !is_constant(memo, right)).then(Captures::none)
    }

    fn replace(&self, _f: &mut Factory, expr: &MemoExpr, _captures: Captures) -> Rewrite {
        Rewrite::Node(MemoExpr::scalar(ScalarOp::Eq, vec![expr.children[1], expr.children[0]]))
    }
}

/// Evaluate `=` between two constants.
///
/// Constants of different types are left alone; comparing them is a type
/// error that belongs to execution, not normalization.
pub struct FoldEqConsts;

impl NormRule for FoldEqConsts {
    fn name(&self) -> RuleName {
        RuleName::new("FoldEqConsts")
    }

    fn pattern(&self) -> Pattern {
        Pattern::comparison(ScalarOpKind::Eq)
    }

    fn check(&self, f: &Factory, expr: &MemoExpr) -> Option<Captures> {
        if !enabled(f, self.name()) {
            return None;
        }
        let memo = f.memo();
        let left = memo.extract_const_datum(expr.children[0])?;
        let right = memo.extract_const_datum(expr.children[1])?;
        if left.is_null() || right.is_null() {
            return Some(Captures::datum(Datum::Null));
        }
        if left.resolved_type() != right.resolved_type() {
            return None;
        }
        Some(Captures::datum(Datum::Bool(left == right)))
    }

    fn replace(&self, f: &mut Factory, _expr: &MemoExpr, captures: Captures) -> Rewrite {
        let value = captures.datum.unwrap_or(Datum::Null);
        Rewrite::Expr(f.construct_const_val(value, DataType::Bool).group())
    }
}
