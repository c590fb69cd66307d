//! # IN-List Rules
//!
//! ```text
//! x IN (v)    =>  x = v
//! x IN ()     =>  false
//! ```

use normx_core::factory::Factory;
use normx_core::expr::ScalarOp;
use normx_core::memo::{GroupId, MemoExpr};
use normx_core::pattern::Pattern;
use normx_core::rule::{Captures, NormRule, Rewrite, RuleName};

use crate::enabled;

/// Rewrite a single-element IN list as an equality.
pub struct SimplifySingletonIn;

impl NormRule for SimplifySingletonIn {
    fn name(&self) -> RuleName {
        RuleName::new("SimplifySingletonIn")
    }

    fn pattern(&self) -> Pattern {
        Pattern::in_tuple()
    }

    fn check(&self, f: &Factory, expr: &MemoExpr) -> Option<Captures> {
        if !enabled(f, self.name()) {
            return None;
        }
        match f.memo().expr(expr.children[1]).children.as_slice() {
            [elem] => Some(Captures::groups(vec![*elem])),
            _ => None,
        }
    }

    fn replace(&self, _f: &mut Factory, expr: &MemoExpr, captures: Captures) -> Rewrite {
        Rewrite::Node(MemoExpr::scalar(ScalarOp::Eq, vec![expr.children[0], captures.groups[0]]))
    }
}

/// An empty IN list matches nothing.
pub struct SimplifyEmptyIn;

impl NormRule for SimplifyEmptyIn {
    fn name(&self) -> RuleName {
        RuleName::new("SimplifyEmptyIn")
    }

    fn pattern(&self) -> Pattern {
        Pattern::in_tuple()
    }

    fn check(&self, f: &Factory, expr: &MemoExpr) -> Option<Captures> {
        if !enabled(f, self.name()) {
            return None;
        }
        f.memo()
            .expr(expr.children[1])
            .children
            .is_empty()
            .then(Captures::none)
    }

    fn replace(&self, _f: &mut Factory, _expr: &MemoExpr, _captures: Captures) -> Rewrite {
        Rewrite::Expr(GroupId::FALSE)
    }
}
