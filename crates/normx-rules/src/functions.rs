//! # Function Folding
//!
//! A builtin call whose arguments are all constants is evaluated during
//! normalization and replaced by its result. Whether a call may be folded
//! depends on its volatility and on the factory's [`FoldingControl`]:
//! immutable calls always fold, stable calls (such as `now()`) only when the
//! caller allows stable folds, volatile calls never.
//!
//! An evaluation error (an out-of-range argument, an unknown function) is not
//! a normalization error: the call is kept and fails at execution instead.
//!
//! [`FoldingControl`]: normx_core::folding::FoldingControl

use normx_core::expr::{Datum, Operator, ScalarOp};
use normx_core::factory::Factory;
use normx_core::memo::MemoExpr;
use normx_core::pattern::Pattern;
use normx_core::rule::{Captures, NormRule, Rewrite, RuleName};
use tracing::trace;

use crate::enabled;

pub struct FoldFunction;

impl NormRule for FoldFunction {
    fn name(&self) -> RuleName {
        RuleName::new("FoldFunction")
    }

    fn pattern(&self) -> Pattern {
        Pattern::function()
    }

    fn check(&self, f: &Factory, expr: &MemoExpr) -> Option<Captures> {
        if !enabled(f, self.name()) {
            return None;
        }
        let Operator::Scalar(ScalarOp::Function { name, .. }) = &expr.op else {
            return None;
        };
        let memo = f.memo();
        let args = expr
            .children
            .iter()
            .map(|arg| memo.extract_const_datum(*arg))
            .collect::<Option<Vec<_>>>()?;

        let volatility = f.eval_context().props().scalar(memo, expr).volatility.max();
        if !f.folding().allows(volatility) {
            return None;
        }

        match f.eval_context().evaluator().eval_function(name, &args) {
            Ok(value) => Some(Captures::datum(value)),
            Err(err) => {
                trace!(function = %name, error = %err, "not folding function call");
                None
            }
        }
    }

    fn replace(&self, f: &mut Factory, expr: &MemoExpr, captures: Captures) -> Rewrite {
        let props = f.eval_context().props().scalar(f.memo(), expr);
        f.folding_mut().can_fold_operator(props.volatility.max());

        let value = captures.datum.unwrap_or(Datum::Null);
        Rewrite::Expr(f.construct_const_val(value, props.data_type).group())
    }
}
