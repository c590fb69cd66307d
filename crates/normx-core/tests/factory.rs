//! Construction protocol tests: interning, the constructor depth guard, rule
//! notification and veto, the zero-cardinality finishing hook, and the
//! factory lifecycle.

use normx_core::catalog::{CatalogColumn, CatalogTable, InMemoryCatalog, TableName};
use normx_core::config::FactoryConfig;
use normx_core::error::NormError;
use normx_core::eval::{DefaultEvaluator, ErrorReporter, EvalContext};
use normx_core::expr::{
    ColumnId, DataType, Datum, OpKind, Operator, RelExpr, RelOp, RelOpKind, ScalarExpr, ScalarOp, ScalarOpKind,
};
use normx_core::factory::Factory;
use normx_core::memo::{GroupId, MemoExpr};
use normx_core::pattern::Pattern;
use normx_core::properties::{RequiredProps, Volatility};
use normx_core::rule::{Captures, NormRule, Rewrite, RuleName, RuleRegistry};
use normx_core::stats::ColumnStatistics;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn context(config: FactoryConfig) -> EvalContext {
    EvalContext::new(Arc::new(DefaultEvaluator::new(vec![]))).with_config(config)
}

fn factory(ctx: EvalContext, registry: RuleRegistry) -> Factory {
    init_tracing();
    Factory::new(Arc::new(ctx), Arc::new(registry))
}

fn default_factory() -> Factory {
    factory(context(FactoryConfig::verification()), normx_rules::default_rule_registry())
}

fn orders_table() -> CatalogTable {
    CatalogTable::new(
        TableName::new("shop", "orders"),
        vec![
            CatalogColumn::new("id", DataType::Int),
            CatalogColumn::new("status", DataType::String),
        ],
    )
    .with_row_count(500.0)
    .with_column_stats("id", ColumnStatistics::new(500.0, 0.0))
}

fn scan_orders(f: &mut Factory) -> RelExpr {
    let table = f.metadata_mut().add_table(&orders_table());
    f.construct_table_scan(table)
}

fn kind(f: &Factory, g: GroupId) -> OpKind {
    f.memo().expr(g).kind()
}

/// Rewrites `a = b` into `b = a`, forever.
struct SwapEq;

impl NormRule for SwapEq {
    fn name(&self) -> RuleName {
        RuleName::new("SwapEq")
    }

    fn pattern(&self) -> Pattern {
        Pattern::comparison(ScalarOpKind::Eq)
    }

    fn replace(&self, _f: &mut Factory, expr: &MemoExpr, _captures: Captures) -> Rewrite {
        Rewrite::Node(MemoExpr::new(expr.op.clone(), vec![expr.children[1], expr.children[0]]))
    }
}

fn swap_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    registry.add_rule(Box::new(SwapEq));
    registry
}

/// Rewrites `a < b` into `b > a` (or `a > b` into `b < a`) by building the
/// flipped comparison through a nested constructor call.
struct Flip {
    from: ScalarOpKind,
    to: ScalarOp,
}

impl NormRule for Flip {
    fn name(&self) -> RuleName {
        RuleName::new(if self.from == ScalarOpKind::Lt { "FlipLt" } else { "FlipGt" })
    }

    fn pattern(&self) -> Pattern {
        Pattern::comparison(self.from)
    }

    fn replace(&self, f: &mut Factory, expr: &MemoExpr, _captures: Captures) -> Rewrite {
        let flipped = f.construct(Operator::Scalar(self.to.clone()), vec![expr.children[1], expr.children[0]]);
        Rewrite::Expr(flipped)
    }
}

fn flip_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    registry.add_rule(Box::new(Flip { from: ScalarOpKind::Lt, to: ScalarOp::Gt }));
    registry.add_rule(Box::new(Flip { from: ScalarOpKind::Gt, to: ScalarOp::Lt }));
    registry
}

/// Rebuilds every Select unchanged, forever.
struct RepeatSelect;

impl NormRule for RepeatSelect {
    fn name(&self) -> RuleName {
        RuleName::new("RepeatSelect")
    }

    fn pattern(&self) -> Pattern {
        Pattern::select()
    }

    fn replace(&self, _f: &mut Factory, expr: &MemoExpr, _captures: Captures) -> Rewrite {
        Rewrite::Node(expr.clone())
    }
}

#[derive(Default)]
struct CountingReporter {
    reports: AtomicUsize,
}

impl ErrorReporter for CountingReporter {
    fn report(&self, err: &NormError) {
        assert!(matches!(err, NormError::MaxDepthExceeded(8)));
        self.reports.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Interning
// ---------------------------------------------------------------------------

#[test]
fn test_equal_trees_share_groups() {
    let mut f = default_factory();
    let input = scan_orders(&mut f);

    let build = |f: &mut Factory| {
        let id = f.construct_variable(ColumnId(1));
        let ten = f.construct_const(Datum::Int(10), DataType::Int);
        let gt = f.construct_gt(id, ten);
        let item = f.construct_filters_item(gt);
        let filters = f.construct_filters(&[item]);
        f.construct_select(input, filters)
    };
    let first = build(&mut f);
    let groups = f.memo().num_groups();
    let second = build(&mut f);

    assert_eq!(first, second);
    assert_eq!(f.memo().num_groups(), groups);
    assert_eq!(f.constructor_depth(), 0);
}

#[test]
fn test_empty_replacement_is_shared() {
    let mut f = default_factory();
    let input = scan_orders(&mut f);

    let build = |f: &mut Factory| {
        let item = f.construct_filters_item(ScalarExpr::FALSE);
        let filters = f.construct_filters(&[item]);
        f.construct_select(input, filters)
    };
    let first = build(&mut f);
    let groups = f.memo().num_groups();
    let second = build(&mut f);
    let third = build(&mut f);

    assert_eq!(kind(&f, first.group()), OpKind::Relational(RelOpKind::Values));
    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(f.memo().num_groups(), groups);
}

#[test]
fn test_true_and_false_are_reserved() {
    let mut f = default_factory();
    assert_eq!(f.construct_true(), ScalarExpr::TRUE);
    assert_eq!(f.construct_false(), ScalarExpr::FALSE);
    assert_eq!(f.construct_const_val(Datum::Bool(true), DataType::Bool), ScalarExpr::TRUE);
}

// ---------------------------------------------------------------------------
// Depth guard
// ---------------------------------------------------------------------------

#[test]
fn test_rule_cycle_is_cut_in_production() {
    let reporter = Arc::new(CountingReporter::default());
    let config = FactoryConfig {
        max_constructor_depth: 8,
        ..FactoryConfig::production()
    };
    let ctx = context(config).with_reporter(reporter.clone());
    let mut f = factory(ctx, swap_registry());

    let a = f.construct_variable(ColumnId(1));
    let b = f.construct_variable(ColumnId(2));
    let eq = f.construct_eq(a, b);

    assert_eq!(kind(&f, eq.group()), OpKind::Scalar(ScalarOpKind::Eq));
    assert_eq!(reporter.reports.load(Ordering::SeqCst), 1);
    assert_eq!(f.constructor_depth(), 0);
    f.check_constructor_stack_depth();

    // The factory stays usable after a trip.
    let c = f.construct_const(Datum::Int(1), DataType::Int);
    let _ = f.construct_not(c);
    assert_eq!(f.constructor_depth(), 0);
}

#[test]
#[should_panic(expected = "exceeded max depth")]
fn test_rule_cycle_panics_in_verification() {
    let config = FactoryConfig {
        max_constructor_depth: 8,
        ..FactoryConfig::verification()
    };
    let mut f = factory(context(config), swap_registry());
    let a = f.construct_variable(ColumnId(1));
    let b = f.construct_variable(ColumnId(2));
    let _ = f.construct_eq(a, b);
}

#[test]
fn test_nested_rule_cycle_is_cut_in_production() {
    let reporter = Arc::new(CountingReporter::default());
    let config = FactoryConfig {
        max_constructor_depth: 8,
        ..FactoryConfig::production()
    };
    let ctx = context(config).with_reporter(reporter.clone());
    let mut f = factory(ctx, flip_registry());
    let applied = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&applied);
    f.notify_on_applied_rule(Some(Arc::new(move |_: RuleName, _: Option<GroupId>, _: GroupId| {
        counter.fetch_add(1, Ordering::SeqCst);
    })));

    let a = f.construct_variable(ColumnId(1));
    let b = f.construct_variable(ColumnId(2));
    let lt = f.construct_lt(a, b);

    // Eight nested levels each applied a rule; the ninth was interned as is.
    assert_eq!(kind(&f, lt.group()), OpKind::Scalar(ScalarOpKind::Lt));
    assert_eq!(f.memo().expr(lt.group()).children, vec![a.group(), b.group()]);
    assert_eq!(applied.load(Ordering::SeqCst), 8);
    assert_eq!(reporter.reports.load(Ordering::SeqCst), 1);
    assert_eq!(f.constructor_depth(), 0);
    f.check_constructor_stack_depth();
}

#[test]
#[should_panic(expected = "exceeded max depth")]
fn test_nested_rule_cycle_panics_in_verification() {
    let config = FactoryConfig {
        max_constructor_depth: 8,
        ..FactoryConfig::verification()
    };
    let mut f = factory(context(config), flip_registry());
    let a = f.construct_variable(ColumnId(1));
    let b = f.construct_variable(ColumnId(2));
    let _ = f.construct_gt(a, b);
}

#[test]
fn test_depth_trip_reports_once_and_skips_finishing_hook() {
    let reporter = Arc::new(CountingReporter::default());
    let config = FactoryConfig {
        max_constructor_depth: 8,
        ..FactoryConfig::production()
    };
    let ctx = context(config).with_reporter(reporter.clone());
    let mut registry = RuleRegistry::new();
    registry.add_rule(Box::new(RepeatSelect));
    let mut f = factory(ctx, registry);

    let input = scan_orders(&mut f);
    let item = f.construct_filters_item(ScalarExpr::FALSE);
    let filters = f.construct_filters(&[item]);
    let groups = f.memo().num_groups();
    let select = f.construct_select(input, filters);

    // The Select is provably empty but stays a Select: nothing more is built
    // once the limit is hit.
    assert_eq!(kind(&f, select.group()), OpKind::Relational(RelOpKind::Select));
    assert!(f.memo().relational_props(select).cardinality.is_zero());
    assert_eq!(f.memo().num_groups(), groups + 1);
    assert_eq!(reporter.reports.load(Ordering::SeqCst), 1);
    assert_eq!(f.constructor_depth(), 0);
}

// ---------------------------------------------------------------------------
// Notification and veto
// ---------------------------------------------------------------------------

#[test]
fn test_applied_callback_sees_every_rewrite() {
    let mut f = default_factory();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    f.notify_on_applied_rule(Some(Arc::new(move |name: RuleName, source: Option<GroupId>, target: GroupId| {
        assert!(source.is_none());
        sink.lock().unwrap().push((name, target));
    })));

    let x = f.construct_variable(ColumnId(1));
    let five = f.construct_const(Datum::Int(5), DataType::Int);
    let eq = f.construct_eq(five, x);

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![(RuleName::new("CommuteConstEq"), eq.group())]);
}

#[test]
fn test_veto_blocks_rules() {
    let mut f = default_factory();
    let asked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&asked);
    f.notify_on_matched_rule(Some(Arc::new(move |name: RuleName| {
        counter.fetch_add(1, Ordering::SeqCst);
        name != RuleName::new("CommuteConstEq")
    })));

    let x = f.construct_variable(ColumnId(1));
    let five = f.construct_const(Datum::Int(5), DataType::Int);
    let eq = f.construct_eq(five, x);
    assert_eq!(f.memo().expr(eq.group()).children, vec![five.group(), x.group()]);
    assert_eq!(asked.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rules_disabled_scope_nests_and_restores() {
    let mut f = default_factory();
    let asked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&asked);
    f.notify_on_matched_rule(Some(Arc::new(move |_: RuleName| {
        counter.fetch_add(1, Ordering::SeqCst);
        true
    })));
    let applied = Arc::new(AtomicUsize::new(0));
    let applied_counter = Arc::clone(&applied);
    f.notify_on_applied_rule(Some(Arc::new(move |_: RuleName, _: Option<GroupId>, _: GroupId| {
        applied_counter.fetch_add(1, Ordering::SeqCst);
    })));

    let x = f.construct_variable(ColumnId(1));
    let (outer, inner) = f.run_with_rules_disabled(|f| {
        let five = f.construct_const(Datum::Int(5), DataType::Int);
        let inner = f.run_with_rules_disabled(|f| {
            let six = f.construct_const(Datum::Int(6), DataType::Int);
            f.construct_eq(six, x)
        });
        // Still disabled after the nested scope ends.
        (f.construct_eq(five, x), inner)
    });
    for e in [outer, inner] {
        assert_eq!(f.memo().expr(e.group()).children[1], x.group());
    }
    assert_eq!(asked.load(Ordering::SeqCst), 0);
    assert_eq!(applied.load(Ordering::SeqCst), 0);

    // The caller's veto is back in place.
    let seven = f.construct_const(Datum::Int(7), DataType::Int);
    let eq = f.construct_eq(seven, x);
    assert_eq!(f.memo().expr(eq.group()).children[0], x.group());
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(applied.load(Ordering::SeqCst), 1);
}

#[test]
fn test_disabled_rule_set_is_consulted_by_rules() {
    let mut f = default_factory();
    f.set_disabled_rules(HashSet::from([RuleName::new("CommuteConstEq")]));
    assert!(f.disabled_rules().contains(&RuleName::new("CommuteConstEq")));

    let x = f.construct_variable(ColumnId(1));
    let five = f.construct_const(Datum::Int(5), DataType::Int);
    let eq = f.construct_eq(five, x);
    assert_eq!(f.memo().expr(eq.group()).children, vec![five.group(), x.group()]);

    // Other rules still run.
    let t = f.construct_tuple(&[], DataType::Tuple(vec![]));
    assert_eq!(f.construct_in(x, t), ScalarExpr::FALSE);
}

// ---------------------------------------------------------------------------
// Zero-cardinality finishing hook
// ---------------------------------------------------------------------------

#[test]
fn test_contradiction_becomes_empty_values() {
    let mut f = default_factory();
    let applied = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&applied);
    f.notify_on_applied_rule(Some(Arc::new(move |name: RuleName, _: Option<GroupId>, _: GroupId| {
        sink.lock().unwrap().push(name);
    })));

    let input = scan_orders(&mut f);
    let item = f.construct_filters_item(ScalarExpr::FALSE);
    let filters = f.construct_filters(&[item]);
    let select = f.construct_select(input, filters);

    let Operator::Relational(RelOp::Values(values)) = &f.memo().expr(select.group()).op else {
        panic!("expected values, got {}", f.memo().expr(select.group()).op);
    };
    assert_eq!(values.cols, vec![ColumnId(1), ColumnId(2)]);
    let props = f.memo().relational_props(select);
    assert!(props.cardinality.is_zero());
    assert_eq!(props.output_cols, f.memo().relational_props(input).output_cols);
    assert!(applied.lock().unwrap().contains(&RuleName::SIMPLIFY_ZERO_CARDINALITY_GROUP));
}

#[test]
fn test_non_leakproof_empty_expression_is_kept() {
    let mut f = default_factory();
    let cols = [ColumnId(1)].into_iter().collect();
    let empty = f.construct_empty_values(&cols);
    let ten = f.construct_const(Datum::Int(10), DataType::Int);
    let limit = f.construct_limit(empty, ten);

    assert_eq!(kind(&f, limit.group()), OpKind::Relational(RelOpKind::Limit));
    assert!(f.memo().relational_props(limit).cardinality.is_zero());
}

#[test]
fn test_zero_cardinality_rule_can_be_vetoed() {
    let mut f = default_factory();
    f.notify_on_matched_rule(Some(Arc::new(|name: RuleName| {
        name != RuleName::SIMPLIFY_ZERO_CARDINALITY_GROUP
    })));
    let input = scan_orders(&mut f);
    let item = f.construct_filters_item(ScalarExpr::FALSE);
    let filters = f.construct_filters(&[item]);
    let select = f.construct_select(input, filters);
    assert_eq!(kind(&f, select.group()), OpKind::Relational(RelOpKind::Select));
}

#[test]
fn test_empty_join_input() {
    let mut f = default_factory();
    let left = scan_orders(&mut f);
    let cols = [ColumnId(9)].into_iter().collect();
    let right = f.construct_empty_values(&cols);
    let on = f.construct_filters(&[]);

    let inner = f
        .construct_join(RelOpKind::InnerJoin, left, right, on, Default::default())
        .unwrap();
    assert_eq!(kind(&f, inner.group()), OpKind::Relational(RelOpKind::Values));
    assert_eq!(
        f.memo().relational_props(inner).output_cols,
        [ColumnId(1), ColumnId(2), ColumnId(9)].into_iter().collect()
    );

    // A left join keeps every left row, so it is not empty.
    let left_join = f
        .construct_join(RelOpKind::LeftJoin, left, right, on, Default::default())
        .unwrap();
    assert_eq!(kind(&f, left_join.group()), OpKind::Relational(RelOpKind::LeftJoin));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_add_table_through_catalog() {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(orders_table());
    let mut f = default_factory();
    f.init(Arc::new(context(FactoryConfig::verification())), Some(Arc::new(catalog)));

    let id = f.add_table(&TableName::new("shop", "orders")).unwrap();
    assert_eq!(f.metadata().table(id).unwrap().columns, vec![ColumnId(1), ColumnId(2)]);
    assert_eq!(
        f.add_table(&TableName::new("shop", "missing")),
        Err(NormError::UnknownTable(TableName::new("shop", "missing")))
    );
}

#[test]
fn test_init_resets_everything_but_rules() {
    let mut f = default_factory();
    f.notify_on_matched_rule(Some(Arc::new(|_: RuleName| false)));
    f.set_disabled_rules(HashSet::from([RuleName::new("FoldFunction")]));
    f.folding_mut().allow_stable_folds();
    let _ = scan_orders(&mut f);
    assert!(!f.memo().is_empty());

    f.init(Arc::new(context(FactoryConfig::verification())), None);

    assert!(f.memo().is_empty());
    assert!(f.disabled_rules().is_empty());
    assert!(!f.folding().allows(Volatility::Stable));
    assert_eq!(f.rules().len(), normx_rules::default_rule_registry().len());

    // The veto callback is gone: rules apply again.
    let x = f.construct_variable(ColumnId(1));
    let five = f.construct_const(Datum::Int(5), DataType::Int);
    let eq = f.construct_eq(five, x);
    assert_eq!(f.memo().expr(eq.group()).children[0], x.group());
}

#[test]
fn test_detach_memo_freezes_it_and_resets_factory() {
    let mut f = default_factory();
    let input = scan_orders(&mut f);
    f.set_root(input, RequiredProps::with_presentation(vec![ColumnId(1)]))
        .unwrap();
    let explained = f.memo().explain(input.group());
    assert!(!f.metadata().tables()[0].stats.as_ref().unwrap().column_stats.is_empty());

    let memo = f.detach_memo();
    assert!(memo.is_detached());
    assert_eq!(memo.root(), Some(input));
    assert_eq!(memo.explain(input.group()), explained);
    let stats = memo.metadata().tables()[0].stats.as_ref().unwrap();
    assert!(stats.column_stats.is_empty());
    assert_eq!(stats.row_count, 500.0);

    assert!(f.memo().is_empty());
    assert!(f.catalog().is_none());
    assert_eq!(f.memo().root(), None);
}
