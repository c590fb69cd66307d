//! # Rule System
//!
//! This module defines the normalization rule trait and the registry the
//! [`Factory`] consults while constructing expressions.
//!
//! ## Normalization Rules
//!
//! A normalization rule rewrites a candidate expression into a canonical
//! equivalent *before* it is interned. Rules fire transitively: the replacement
//! is itself a candidate, so rules keep applying until none matches (fixpoint).
//! Unlike exploration rules, a normalization rule never keeps the original
//! expression around as an alternative.
//!
//! ## Match, then Replace
//!
//! Each rule is applied in three steps:
//!
//! 1. The declared `Pattern` is checked structurally against the candidate.
//! 2. `check` inspects the candidate (and the memo, through the factory) and
//!    returns the values the replacement needs as [`Captures`], or `None`.
//! 3. If the factory's match-veto callback allows the rule, `replace` builds
//!    the replacement. Any new sub-expression must be built through factory
//!    constructors so it is normalized and interned as well. A rule never
//!    mutates the memo directly.
//!
//! `replace` returns a [`Rewrite`]: either a new candidate node (`Node`) that
//! goes around the loop again, or a group that is already normalized (`Expr`),
//! which ends the loop.
//!
//! ## Notification and Veto
//!
//! Callers can observe and steer rule application through two callbacks
//! installed on the factory: [`MatchedRuleFn`] may veto a matched rule, and
//! [`AppliedRuleFn`] is told about every rewrite that took place.
//!
//! ## Rule Registry
//!
//! The `RuleRegistry` collects all rules and indexes them by the operator kind
//! at the top of their pattern, so the factory only tries rules that can match.
//! Rules whose pattern has no fixed top kind are tried against every candidate.

use crate::expr::{Datum, OpKind};
use crate::factory::Factory;
use crate::memo::{GroupId, MemoExpr};
use crate::pattern::Pattern;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifier of a normalization rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleName(&'static str);

impl RuleName {
    /// The factory's built-in rule that replaces a provably empty relational
    /// expression with an empty Values operator.
    pub const SIMPLIFY_ZERO_CARDINALITY_GROUP: RuleName = RuleName::new("SimplifyZeroCardinalityGroup");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Values extracted by a rule's `check` and handed to its `replace`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures {
    pub groups: Vec<GroupId>,
    pub datum: Option<Datum>,
}

impl Captures {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn groups(groups: Vec<GroupId>) -> Self {
        Self { groups, datum: None }
    }

    pub fn datum(datum: Datum) -> Self {
        Self {
            groups: Vec::new(),
            datum: Some(datum),
        }
    }
}

/// Outcome of a rule application.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    /// A new candidate. It is matched against the rules again before interning.
    Node(MemoExpr),
    /// An expression that is already normalized and interned.
    Expr(GroupId),
}

/// A normalization rule.
pub trait NormRule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> RuleName;

    /// Pattern that this rule matches against.
    fn pattern(&self) -> Pattern;

    /// Decide whether the rule applies to a candidate that matched the pattern.
    fn check(&self, _f: &Factory, _expr: &MemoExpr) -> Option<Captures> {
        Some(Captures::none())
    }

    /// Build the replacement for a candidate accepted by `check`.
    fn replace(&self, f: &mut Factory, expr: &MemoExpr, captures: Captures) -> Rewrite;
}

/// Match-veto callback. Returning `false` prevents the named rule from being
/// applied to the current candidate.
pub type MatchedRuleFn = Arc<dyn Fn(RuleName) -> bool + Send + Sync>;

/// Applied-notification callback: `(rule, source, target)`. During
/// normalization `source` is `None` and `target` is the expression the
/// rewrite finally produced.
pub type AppliedRuleFn = Arc<dyn Fn(RuleName, Option<GroupId>, GroupId) + Send + Sync>;

/// Registry of normalization rules.
#[derive(Default)]
pub struct RuleRegistry {
    by_kind: HashMap<OpKind, Vec<Box<dyn NormRule>>>,
    generic: Vec<Box<dyn NormRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Box<dyn NormRule>) {
        match rule.pattern().root_kind() {
            Some(kind) => self.by_kind.entry(kind).or_default().push(rule),
            None => self.generic.push(rule),
        }
    }

    /// Rules that may match a candidate of the given kind: rules indexed on
    /// that kind in registration order, then generic rules.
    pub fn rules_for(&self, kind: OpKind) -> impl Iterator<Item = &dyn NormRule> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .chain(self.generic.iter())
            .map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum::<usize>() + self.generic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of every registered rule, sorted.
    pub fn names(&self) -> Vec<RuleName> {
        let mut names: Vec<RuleName> = self
            .by_kind
            .values()
            .flatten()
            .chain(self.generic.iter())
            .map(|r| r.name())
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry").field("rules", &self.names()).finish()
    }
}
