//! # The Normalizing Factory
//!
//! The factory is the only way to build expressions into a [`Memo`]. Every
//! constructor, typed or generic, runs the same protocol:
//!
//! ```text
//! construct(op, children)
//!   depth += 1
//!   loop:
//!     for each rule whose pattern matches the candidate:
//!       check -> veto callback -> replace
//!       Rewrite::Node(next) => candidate = next, depth += 1, continue loop
//!       Rewrite::Expr(id)   => done, result = id
//!     no rule matched       => result = finish(intern(candidate))
//!   fire applied-rule notifications, innermost first
//!   depth -= frames entered by this call
//! ```
//!
//! ## Interning
//!
//! A candidate that no rule rewrites is looked up in the memo. If a
//! structurally equal expression is already there, its group is reused;
//! otherwise a new group is created and its logical properties are derived by
//! the [`LogicalPropsProvider`](crate::logical::LogicalPropsProvider) from the
//! evaluation context.
//!
//! ## Finishing Hooks
//!
//! After interning, relational groups go through the built-in
//! `SimplifyZeroCardinalityGroup` rule: a leakproof expression other than
//! Values that can never produce a row is replaced by an empty Values
//! operator with the same output columns. The memo remembers the replacement
//! of each group, so the same input always maps to the same Values. Scalar
//! groups are returned as-is.
//!
//! ## Constructor Depth Guard
//!
//! Rules that rewrite into each other (A to B, B back to A) never reach a
//! fixpoint. The factory counts nested constructor entries and rule rewrites in
//! an explicit counter rather than on the native call stack. Once the counter
//! exceeds `max_constructor_depth`, the current candidate is interned without
//! trying further rules or finishing hooks. In verification mode this panics instead; in
//! production mode the condition is sent to the [`ErrorReporter`](crate::eval::ErrorReporter)
//! and the partially normalized tree is kept. The counter is back to zero after
//! every top-level constructor returns.
//!
//! ## Rule Control
//!
//! - The match-veto callback ([`MatchedRuleFn`]) is asked about every matched
//!   rule and can block it, including the built-in rule.
//! - The applied callback ([`AppliedRuleFn`]) is told about every rewrite.
//! - [`Factory::run_with_rules_disabled`] blocks all rules for the duration of
//!   a closure and restores the previous veto callback afterwards.
//! - The disabled-rule set is advisory. Rules read it through
//!   [`Factory::disabled_rules`]; the factory itself does not filter on it.

use crate::catalog::{Catalog, TableName};
use crate::error::NormError;
use crate::eval::EvalContext;
use crate::expr::{Operator, RelExpr, RelOp, ScalarExpr, TableId};
use crate::folding::FoldingControl;
use crate::memo::{GroupId, GroupProps, Memo, MemoExpr};
use crate::metadata::Metadata;
use crate::pattern;
use crate::properties::RequiredProps;
use crate::rule::{AppliedRuleFn, MatchedRuleFn, Rewrite, RuleName, RuleRegistry};
use std::collections::HashSet;
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub struct Factory {
    eval_ctx: Arc<EvalContext>,
    memo: Memo,
    rules: Arc<RuleRegistry>,
    catalog: Option<Arc<dyn Catalog>>,
    matched_rule: Option<MatchedRuleFn>,
    applied_rule: Option<AppliedRuleFn>,
    folding_control: FoldingControl,
    /// Nested constructor entries plus rule rewrites currently in progress.
    constructor_depth: usize,
    disabled_rules: HashSet<RuleName>,
}

impl Factory {
    pub fn new(eval_ctx: Arc<EvalContext>, rules: Arc<RuleRegistry>) -> Self {
        Self {
            eval_ctx,
            memo: Memo::new(),
            rules,
            catalog: None,
            matched_rule: None,
            applied_rule: None,
            folding_control: FoldingControl::new(),
            constructor_depth: 0,
            disabled_rules: HashSet::new(),
        }
    }

    /// Reset the factory for a new query. Everything except the rule registry
    /// is replaced: the memo, callbacks, disabled rules, folding control and
    /// depth counter all start blank, and stable folds are disallowed.
    pub fn init(&mut self, eval_ctx: Arc<EvalContext>, catalog: Option<Arc<dyn Catalog>>) {
        let rules = Arc::clone(&self.rules);
        *self = Factory {
            catalog,
            ..Factory::new(eval_ctx, rules)
        };
        self.folding_control.disallow_stable_folds();
    }

    /// Detach the memo from the factory and return it, frozen. The factory is
    /// reinitialized without a catalog and can be reused.
    pub fn detach_memo(&mut self) -> Memo {
        let mut memo = mem::take(&mut self.memo);
        memo.detach();
        debug!(groups = memo.num_groups(), "detached memo");
        let eval_ctx = Arc::clone(&self.eval_ctx);
        self.init(eval_ctx, None);
        memo
    }

    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    pub(crate) fn memo_mut(&mut self) -> &mut Memo {
        &mut self.memo
    }

    pub fn metadata(&self) -> &Metadata {
        self.memo.metadata()
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        self.memo.metadata_mut()
    }

    pub fn eval_context(&self) -> &EvalContext {
        &self.eval_ctx
    }

    pub fn catalog(&self) -> Option<&Arc<dyn Catalog>> {
        self.catalog.as_ref()
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Resolve a table through the catalog and register it in the metadata.
    pub fn add_table(&mut self, name: &TableName) -> Result<TableId, NormError> {
        let catalog = self.catalog.as_ref().ok_or(NormError::NoCatalog)?;
        let table = catalog
            .resolve_table(name)
            .ok_or_else(|| NormError::UnknownTable(name.clone()))?;
        Ok(self.memo.metadata_mut().add_table(&table))
    }

    /// Set the root of the memo. A root can be set once; setting the same root
    /// again is a no-op.
    pub fn set_root(&mut self, root: RelExpr, props: RequiredProps) -> Result<(), NormError> {
        if let Some(current) = self.memo.root() {
            if current == root && self.memo.root_props() == Some(&props) {
                return Ok(());
            }
            return Err(NormError::RootAlreadySet);
        }
        self.memo.set_root(root, props);
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Rule control
    // ----------------------------------------------------------------------

    /// Install a veto callback that rejects every rule.
    pub fn disable_all_rules(&mut self) {
        self.matched_rule = Some(Arc::new(|_: RuleName| false));
    }

    /// Run `f` with every rule disabled, then restore the previous veto
    /// callback. Calls nest.
    pub fn run_with_rules_disabled<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.matched_rule.take();
        self.disable_all_rules();
        let result = f(self);
        self.matched_rule = saved;
        result
    }

    /// Replace the match-veto callback. `None` allows every rule.
    pub fn notify_on_matched_rule(&mut self, matched_rule: Option<MatchedRuleFn>) {
        self.matched_rule = matched_rule;
    }

    /// Replace the applied-rule callback. `None` disables notifications.
    pub fn notify_on_applied_rule(&mut self, applied_rule: Option<AppliedRuleFn>) {
        self.applied_rule = applied_rule;
    }

    pub fn set_disabled_rules(&mut self, rules: HashSet<RuleName>) {
        self.disabled_rules = rules;
    }

    /// Rules the caller asked to be skipped. Advisory: rules consult it.
    pub fn disabled_rules(&self) -> &HashSet<RuleName> {
        &self.disabled_rules
    }

    fn allow_rule(&self, name: RuleName) -> bool {
        self.matched_rule.as_ref().map_or(true, |matched| matched(name))
    }

    fn notify_applied(&self, name: RuleName, source: Option<GroupId>, target: GroupId) {
        if let Some(applied) = &self.applied_rule {
            applied(name, source, target);
        }
    }

    // ----------------------------------------------------------------------
    // Folding control
    // ----------------------------------------------------------------------

    pub fn folding(&self) -> &FoldingControl {
        &self.folding_control
    }

    pub fn folding_mut(&mut self) -> &mut FoldingControl {
        &mut self.folding_control
    }

    /// Run `f` with stable folds disallowed, then restore the previous setting.
    pub fn run_with_stable_folds_disallowed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let allowed = self.folding_control.stable_folds_allowed();
        self.folding_control.disallow_stable_folds();
        let result = f(self);
        if allowed {
            self.folding_control.allow_stable_folds();
        }
        result
    }

    // ----------------------------------------------------------------------
    // Construction protocol
    // ----------------------------------------------------------------------

    pub fn constructor_depth(&self) -> usize {
        self.constructor_depth
    }

    /// Panics in verification mode if a constructor left the depth counter
    /// non-zero. Call only between top-level constructor calls.
    pub fn check_constructor_stack_depth(&self) {
        if self.eval_ctx.config().verify_invariants && self.constructor_depth != 0 {
            panic!("{}", NormError::NonZeroDepth(self.constructor_depth));
        }
    }

    fn on_max_constructor_depth_exceeded(&self) {
        let err = NormError::MaxDepthExceeded(self.eval_ctx.config().max_constructor_depth);
        if self.eval_ctx.config().verify_invariants {
            panic!("{}", err);
        }
        warn!(depth = self.constructor_depth, "skipping normalization rules: {}", err);
        self.eval_ctx.reporter().report(&err);
    }

    /// Build an expression from an operator and its child groups, normalize
    /// it and intern it. Returns the group of the normalized expression.
    ///
    /// Debug builds panic if the children do not fit the operator; see
    /// [`Memo::is_well_formed`].
    pub fn construct(&mut self, op: Operator, children: Vec<GroupId>) -> GroupId {
        let expr = MemoExpr::new(op, children);
        debug_assert!(
            self.memo.is_well_formed(&expr),
            "malformed expression: {} over {:?}",
            expr.op,
            expr.children
        );
        self.normalize(expr)
    }

    fn normalize(&mut self, mut expr: MemoExpr) -> GroupId {
        let max_depth = self.eval_ctx.config().max_constructor_depth;
        let mut frames = 0;
        let mut applied = Vec::new();

        let result = loop {
            self.constructor_depth += 1;
            frames += 1;
            if self.constructor_depth > max_depth {
                self.on_max_constructor_depth_exceeded();
                break self.intern(expr);
            }
            match self.apply_rules(&expr) {
                Some((name, Rewrite::Node(next))) => {
                    applied.push(name);
                    expr = next;
                }
                Some((name, Rewrite::Expr(id))) => {
                    applied.push(name);
                    break id;
                }
                None => {
                    let id = self.intern(expr);
                    break self.on_construct(id);
                }
            }
        };

        for name in applied.into_iter().rev() {
            self.notify_applied(name, None, result);
        }
        self.constructor_depth -= frames;
        result
    }

    /// Try the registered rules against a candidate. Returns the first rule
    /// that matched, passed the veto and was applied.
    fn apply_rules(&mut self, expr: &MemoExpr) -> Option<(RuleName, Rewrite)> {
        let rules = Arc::clone(&self.rules);
        for rule in rules.rules_for(expr.kind()) {
            if !pattern::matches(&self.memo, expr, &rule.pattern()) {
                continue;
            }
            let Some(captures) = rule.check(self, expr) else {
                continue;
            };
            if !self.allow_rule(rule.name()) {
                continue;
            }
            trace!(rule = %rule.name(), op = %expr.op, depth = self.constructor_depth, "applying rule");
            return Some((rule.name(), rule.replace(self, expr, captures)));
        }
        None
    }

    fn intern(&mut self, expr: MemoExpr) -> GroupId {
        if let Some(id) = self.memo.lookup(&expr) {
            return id;
        }
        debug_assert!(
            self.memo.is_well_formed(&expr),
            "malformed expression: {} over {:?}",
            expr.op,
            expr.children
        );
        let props = if expr.op.is_relational() {
            GroupProps::Relational(self.eval_ctx.props().relational(&self.memo, &expr))
        } else {
            GroupProps::Scalar(self.eval_ctx.props().scalar(&self.memo, &expr))
        };
        self.memo.add_group(expr, props)
    }

    fn on_construct(&mut self, id: GroupId) -> GroupId {
        if self.memo.is_relational(id) {
            self.on_construct_relational(RelExpr(id)).group()
        } else {
            self.on_construct_scalar(ScalarExpr(id)).group()
        }
    }

    /// Finishing hook for relational expressions: replace a provably empty,
    /// leakproof expression with an empty Values operator. The replacement is
    /// remembered per group, so rebuilding the same expression returns the
    /// same Values.
    fn on_construct_relational(&mut self, e: RelExpr) -> RelExpr {
        if matches!(self.memo.expr(e.group()).op, Operator::Relational(RelOp::Values(_))) {
            return e;
        }
        let props = self.memo.relational_props(e);
        if !props.cardinality.is_zero() || !props.volatility.is_leakproof() {
            return e;
        }
        if !self.allow_rule(RuleName::SIMPLIFY_ZERO_CARDINALITY_GROUP) {
            return e;
        }
        let values = match self.memo.empty_replacement(e) {
            Some(values) => values,
            None => {
                let cols = props.output_cols.clone();
                let values = self.construct_empty_values(&cols);
                self.memo.set_empty_replacement(e, values);
                trace!(from = %e, to = %values, "replaced zero-cardinality group");
                values
            }
        };
        self.notify_applied(RuleName::SIMPLIFY_ZERO_CARDINALITY_GROUP, None, values.group());
        values
    }

    fn on_construct_scalar(&mut self, e: ScalarExpr) -> ScalarExpr {
        e
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("groups", &self.memo.num_groups())
            .field("rules", &self.rules.len())
            .field("constructor_depth", &self.constructor_depth)
            .field("folding", &self.folding_control)
            .field("disabled_rules", &self.disabled_rules)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DataType, Datum};

    fn factory() -> Factory {
        Factory::new(Arc::new(EvalContext::default()), Arc::new(RuleRegistry::new()))
    }

    #[test]
    fn test_depth_is_zero_after_construct() {
        let mut f = factory();
        let c = f.construct_const(Datum::Int(1), DataType::Int);
        let _ = f.construct_eq(c, c);
        assert_eq!(f.constructor_depth(), 0);
        f.check_constructor_stack_depth();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "malformed expression")]
    fn test_construct_rejects_wrong_arity() {
        let mut f = factory();
        let _ = f.construct(Operator::Scalar(crate::expr::ScalarOp::Eq), vec![]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "malformed expression")]
    fn test_construct_rejects_scalar_join_input() {
        let mut f = factory();
        let on = f.construct_filters(&[]);
        let scan = f.construct_scan(TableId(1), vec![]);
        let _ = f.construct(
            Operator::Relational(RelOp::InnerJoin(Default::default())),
            vec![scan.group(), on.group(), on.group()],
        );
    }

    #[test]
    fn test_set_root_once() {
        let mut f = factory();
        let v = f.construct_zero_values();
        f.set_root(v, RequiredProps::any()).unwrap();
        f.set_root(v, RequiredProps::any()).unwrap();
        let other = f.construct_zero_values();
        assert_eq!(f.set_root(other, RequiredProps::any()), Err(NormError::RootAlreadySet));
    }

    #[test]
    fn test_add_table_without_catalog() {
        let mut f = factory();
        let err = f.add_table(&TableName::new("s", "t")).unwrap_err();
        assert_eq!(err, NormError::NoCatalog);
        assert!(!err.is_assertion());
    }
}
