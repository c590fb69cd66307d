//! # Filter Simplification Rules
//!
//! Filters are conjunctions: a Select keeps a row only if every item of its
//! filter list holds. That gives three rewrites:
//!
//! ```text
//! Select(input, Filters[])                 =>  input
//! Filters[..., FiltersItem(True), ...]     =>  Filters[...]
//! Filters[..., FiltersItem(False), ...]    =>  Filters[FiltersItem(False)]
//! ```
//!
//! A NULL condition never holds either, so it is treated like False. Once a
//! Select's filters are reduced to a single false item, the properties
//! provider derives a zero cardinality for it and the factory's finishing hook
//! replaces the whole Select with an empty Values operator.

use normx_core::expr::{Operator, ScalarExpr, ScalarOp, ScalarOpKind};
use normx_core::factory::Factory;
use normx_core::memo::{GroupId, Memo, MemoExpr};
use normx_core::pattern::{OpMatcher, Pattern};
use normx_core::rule::{Captures, NormRule, Rewrite, RuleName};

use crate::enabled;

fn condition(memo: &Memo, item: GroupId) -> Option<GroupId> {
    memo.expr(item).children.first().copied()
}

fn is_false_or_null(memo: &Memo, cond: GroupId) -> bool {
    cond == GroupId::FALSE || matches!(memo.expr(cond).op, Operator::Scalar(ScalarOp::Null(_)))
}

/// Replace a Select that has no filters with its input.
pub struct EliminateSelect;

impl NormRule for EliminateSelect {
    fn name(&self) -> RuleName {
        RuleName::new("EliminateSelect")
    }

    fn pattern(&self) -> Pattern {
        // Match: Select(_, Filters[])
        Pattern::select_with(Pattern::Operator(OpMatcher::scalar(ScalarOpKind::Filters), vec![]))
    }

    fn check(&self, f: &Factory, _expr: &MemoExpr) -> Option<Captures> {
        enabled(f, self.name()).then(Captures::none)
    }

    fn replace(&self, _f: &mut Factory, expr: &MemoExpr, _captures: Captures) -> Rewrite {
        Rewrite::Expr(expr.children[0])
    }
}

/// Drop filter items whose condition is `True`.
pub struct SimplifyTrueFilters;

impl NormRule for SimplifyTrueFilters {
    fn name(&self) -> RuleName {
        RuleName::new("SimplifyTrueFilters")
    }

    fn pattern(&self) -> Pattern {
        Pattern::filters()
    }

    fn check(&self, f: &Factory, expr: &MemoExpr) -> Option<Captures> {
        if !enabled(f, self.name()) {
            return None;
        }
        let memo = f.memo();
        let kept: Vec<GroupId> = expr
            .children
            .iter()
            .copied()
            .filter(|item| condition(memo, *item) != Some(GroupId::TRUE))
            .collect();
        (kept.len() < expr.children.len()).then(|| Captures::groups(kept))
    }

    fn replace(&self, _f: &mut Factory, _expr: &MemoExpr, captures: Captures) -> Rewrite {
        Rewrite::Node(MemoExpr::scalar(ScalarOp::Filters, captures.groups))
    }
}

/// Collapse a filter list containing a false or NULL item to a single false
/// item.
pub struct FoldFalseFilters;

impl NormRule for FoldFalseFilters {
    fn name(&self) -> RuleName {
        RuleName::new("FoldFalseFilters")
    }

    fn pattern(&self) -> Pattern {
        Pattern::filters()
    }

    fn check(&self, f: &Factory, expr: &MemoExpr) -> Option<Captures> {
        if !enabled(f, self.name()) {
            return None;
        }
        let memo = f.memo();
        let contradiction = expr
            .children
            .iter()
            .any(|item| condition(memo, *item).is_some_and(|c| is_false_or_null(memo, c)));
        let folded = expr.children.len() == 1 && condition(memo, expr.children[0]) == Some(GroupId::FALSE);
        (contradiction && !folded).then(Captures::none)
    }

    fn replace(&self, f: &mut Factory, _expr: &MemoExpr, _captures: Captures) -> Rewrite {
        let item = f.construct_filters_item(ScalarExpr::FALSE);
        Rewrite::Node(MemoExpr::scalar(ScalarOp::Filters, vec![item.group()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::factory_with;
    use normx_core::catalog::{CatalogColumn, CatalogTable, TableName};
    use normx_core::expr::{ColumnId, DataType, Datum, OpKind, RelExpr, RelOpKind};
    use std::collections::HashSet;

    fn all_rules() -> Vec<Box<dyn NormRule>> {
        vec![Box::new(EliminateSelect), Box::new(SimplifyTrueFilters), Box::new(FoldFalseFilters)]
    }

    fn scan(f: &mut Factory) -> RelExpr {
        let table = CatalogTable::new(
            TableName::new("s", "t"),
            vec![CatalogColumn::new("a", DataType::Int), CatalogColumn::new("b", DataType::Int)],
        );
        let id = f.metadata_mut().add_table(&table);
        f.construct_table_scan(id)
    }

    #[test]
    fn test_select_without_filters_is_its_input() {
        let mut f = factory_with(all_rules());
        let input = scan(&mut f);
        let filters = f.construct_filters(&[]);
        let select = f.construct_select(input, filters);
        assert_eq!(select, input);
    }

    #[test]
    fn test_true_items_are_dropped() {
        let mut f = factory_with(all_rules());
        let input = scan(&mut f);
        let t = f.construct_filters_item(ScalarExpr::TRUE);
        let var = f.construct_variable(ColumnId(1));
        let five = f.construct_const(Datum::Int(5), DataType::Int);
        let eq = f.construct_eq(var, five);
        let item = f.construct_filters_item(eq);

        let filters = f.construct_filters(&[t, item]);
        assert_eq!(f.memo().expr(filters.group()).children, vec![item.group()]);

        // Only true items: the Select disappears altogether.
        let only_true = f.construct_filters(&[t]);
        assert_eq!(f.construct_select(input, only_true), input);
    }

    #[test]
    fn test_false_item_empties_the_select() {
        let mut f = factory_with(all_rules());
        let input = scan(&mut f);
        let null = f.construct_null(DataType::Bool);
        let null_item = f.construct_filters_item(null);
        let var = f.construct_variable(ColumnId(2));
        let not = f.construct_not(var);
        let other = f.construct_filters_item(not);
        let filters = f.construct_filters(&[other, null_item]);

        let children = &f.memo().expr(filters.group()).children;
        assert_eq!(children.len(), 1);
        assert_eq!(f.memo().expr(children[0]).children, vec![GroupId::FALSE]);

        let select = f.construct_select(input, filters);
        assert_eq!(
            f.memo().expr(select.group()).kind(),
            OpKind::Relational(RelOpKind::Values)
        );
        let props = f.memo().relational_props(select);
        assert!(props.cardinality.is_zero());
        assert_eq!(props.output_cols, [ColumnId(1), ColumnId(2)].into_iter().collect());
    }

    #[test]
    fn test_disabled_rule_does_not_match() {
        let mut f = factory_with(all_rules());
        f.set_disabled_rules(HashSet::from([RuleName::new("EliminateSelect")]));
        let input = scan(&mut f);
        let filters = f.construct_filters(&[]);
        let select = f.construct_select(input, filters);
        assert_ne!(select, input);
        assert_eq!(
            f.memo().expr(select.group()).kind(),
            OpKind::Relational(RelOpKind::Select)
        );
    }
}
