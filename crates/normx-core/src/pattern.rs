//! # Declarative Pattern Matching for Normalization Rules
//!
//! This module provides a small pattern language for matching candidate
//! expressions before they are interned. Each normalization rule declares a
//! `Pattern` that describes the shape of expressions it can rewrite. The
//! factory checks the pattern first and only calls the rule's `check` on
//! expressions that fit, so most rules never see most expressions.
//!
//! ## Pattern Language
//!
//! - `Pattern::Operator(matcher, children)`: matches an expression whose operator
//!   satisfies `matcher` and which has exactly as many children as child
//!   patterns, each child matching its pattern.
//!
//! - `Pattern::List(matcher)`: matches a variadic operator (Filters, Tuple,
//!   Function, ...) with any number of children.
//!
//! - `Pattern::Any`: matches any expression or group. Used as a wildcard for
//!   children that the rule doesn't inspect. This is the most common child pattern.
//!
//! - `Pattern::Leaf`: matches only leaf expressions (Scan, Const, Variable, ...).
//!
//! ## Group-Level Matching
//!
//! A normalized memo holds exactly one expression per group, so a child
//! pattern is checked against that single expression. Children are always
//! already normalized when their parent is matched.

use crate::expr::{OpKind, RelOpKind, ScalarOpKind};
use crate::memo::{GroupId, Memo, MemoExpr};

/// Pattern for matching expressions in the memo.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Match an operator with child patterns.
    Operator(OpMatcher, Vec<Pattern>),
    /// Match a variadic operator regardless of its children.
    List(OpMatcher),
    /// Match any subtree (group).
    Any,
    /// Match a leaf node (no children).
    Leaf,
}

/// Matcher for operator types (without private data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMatcher {
    Kind(OpKind),
    AnyRelational,
    AnyScalar,
}

impl OpMatcher {
    pub fn rel(kind: RelOpKind) -> Self {
        OpMatcher::Kind(OpKind::Relational(kind))
    }

    pub fn scalar(kind: ScalarOpKind) -> Self {
        OpMatcher::Kind(OpKind::Scalar(kind))
    }

    fn matches(&self, kind: OpKind) -> bool {
        match self {
            OpMatcher::Kind(k) => *k == kind,
            OpMatcher::AnyRelational => matches!(kind, OpKind::Relational(_)),
            OpMatcher::AnyScalar => matches!(kind, OpKind::Scalar(_)),
        }
    }

    /// The single operator kind this matcher accepts, if any.
    pub fn kind(&self) -> Option<OpKind> {
        match self {
            OpMatcher::Kind(k) => Some(*k),
            _ => None,
        }
    }
}

impl Pattern {
    /// The operator kind at the top of the pattern, used to index rules.
    pub fn root_kind(&self) -> Option<OpKind> {
        match self {
            Pattern::Operator(m, _) | Pattern::List(m) => m.kind(),
            Pattern::Any | Pattern::Leaf => None,
        }
    }

    /// Match a Select over any input with any filters.
    pub fn select() -> Self {
        Pattern::Operator(OpMatcher::rel(RelOpKind::Select), vec![Pattern::Any, Pattern::Any])
    }

    /// Match a Select whose filter list is matched by `filters`.
    pub fn select_with(filters: Pattern) -> Self {
        Pattern::Operator(OpMatcher::rel(RelOpKind::Select), vec![Pattern::Any, filters])
    }

    /// Match a Filters list of any length.
    pub fn filters() -> Self {
        Pattern::List(OpMatcher::scalar(ScalarOpKind::Filters))
    }

    /// Match a binary comparison of the given kind.
    pub fn comparison(kind: ScalarOpKind) -> Self {
        Pattern::Operator(OpMatcher::scalar(kind), vec![Pattern::Any, Pattern::Any])
    }

    /// Match `x IN (tuple)` with a tuple of any length.
    pub fn in_tuple() -> Self {
        Pattern::Operator(
            OpMatcher::scalar(ScalarOpKind::In),
            vec![Pattern::Any, Pattern::List(OpMatcher::scalar(ScalarOpKind::Tuple))],
        )
    }

    /// Match a function call with any arguments.
    pub fn function() -> Self {
        Pattern::List(OpMatcher::scalar(ScalarOpKind::Function))
    }
}

/// Check if a candidate expression matches a pattern.
pub fn matches(memo: &Memo, expr: &MemoExpr, pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Any => true,
        Pattern::Leaf => expr.children.is_empty(),
        Pattern::List(matcher) => matcher.matches(expr.kind()),
        Pattern::Operator(matcher, child_patterns) => {
            if !matcher.matches(expr.kind()) {
                return false;
            }

            if expr.children.len() != child_patterns.len() {
                return false;
            }

            expr.children
                .iter()
                .zip(child_patterns.iter())
                .all(|(child, p)| matches_group(memo, *child, p))
        }
    }
}

fn matches_group(memo: &Memo, group: GroupId, pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Any => true,
        _ => matches(memo, memo.expr(group), pattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ScalarOp;

    #[test]
    fn test_leaf_and_any() {
        let memo = Memo::new();
        let t = memo.expr(GroupId::TRUE).clone();
        assert!(matches(&memo, &t, &Pattern::Leaf));
        assert!(matches(&memo, &t, &Pattern::Any));
        assert!(!matches(&memo, &t, &Pattern::select()));
    }

    #[test]
    fn test_operator_checks_arity_and_children() {
        let memo = Memo::new();
        let eq = MemoExpr::scalar(ScalarOp::Eq, vec![GroupId::TRUE, GroupId::FALSE]);
        assert!(matches(&memo, &eq, &Pattern::comparison(ScalarOpKind::Eq)));
        assert!(!matches(&memo, &eq, &Pattern::comparison(ScalarOpKind::Ne)));

        let true_on_left = Pattern::Operator(
            OpMatcher::scalar(ScalarOpKind::Eq),
            vec![Pattern::Operator(OpMatcher::scalar(ScalarOpKind::True), vec![]), Pattern::Any],
        );
        assert!(matches(&memo, &eq, &true_on_left));

        let unary = MemoExpr::scalar(ScalarOp::Not, vec![GroupId::TRUE]);
        assert!(!matches(&memo, &unary, &Pattern::comparison(ScalarOpKind::Eq)));
    }

    #[test]
    fn test_list_matches_any_arity() {
        let memo = Memo::new();
        let empty = MemoExpr::scalar(ScalarOp::Filters, vec![]);
        let two = MemoExpr::scalar(ScalarOp::Filters, vec![GroupId::TRUE, GroupId::FALSE]);
        assert!(matches(&memo, &empty, &Pattern::filters()));
        assert!(matches(&memo, &two, &Pattern::filters()));
        assert_eq!(
            Pattern::filters().root_kind(),
            Some(OpKind::Scalar(ScalarOpKind::Filters))
        );
    }
}
