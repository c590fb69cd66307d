//! # The Memo
//!
//! The memo owns every expression the factory builds for one query. Each
//! expression lives in a *group*, an equivalence class for one position in the
//! tree. Children of an expression are referenced by group id rather than
//! stored inline, so a subtree shared by two parents is stored once.
//!
//! ## Interning
//!
//! The memo keeps an index from `(operator, child groups)` to group id. Two
//! constructions with the same operator kind, the same private data and the
//! same child groups always resolve to the same group. This is the memo's
//! central invariant: a memo never holds two distinct groups that are
//! structurally equal.
//!
//! ## Reserved Groups
//!
//! `True` and `False` are interned at fixed group ids in every memo
//! ([`GroupId::TRUE`], [`GroupId::FALSE`]). Rules can recognize them by id
//! alone, and they survive copies between memos unchanged.
//!
//! ## Scalar Ranks
//!
//! Every scalar group receives a rank from a monotonic counter when it is
//! interned. Ranks order scalar expressions deterministically. When a memo is
//! built by copying another one, the counter is first advanced past the
//! source's, so ranks never collide.
//!
//! ## Lifecycle
//!
//! A memo is mutable only through its [`Factory`](crate::factory::Factory).
//! Once detached ([`Factory::detach_memo`](crate::factory::Factory::detach_memo))
//! it is read-only and can be kept as a frozen query shape, later copied into a
//! fresh memo with placeholders assigned.

use crate::expr::{DataType, Datum, Operator, OpKind, RelExpr, RelOp, ScalarExpr, ScalarOp};
use crate::metadata::Metadata;
use crate::properties::{LogicalProperties, RequiredProps, ScalarProperties};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Write};

/// Identifier of a group in a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub(crate) u32);

impl GroupId {
    /// Reserved group of the `True` expression.
    pub const TRUE: GroupId = GroupId(0);
    /// Reserved group of the `False` expression.
    pub const FALSE: GroupId = GroupId(1);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

const RESERVED_GROUPS: usize = 2;

/// An operator together with its child groups. This is both the interned form
/// of an expression and the candidate form normalization rules operate on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoExpr {
    pub op: Operator,
    pub children: Vec<GroupId>,
}

impl MemoExpr {
    pub fn new(op: Operator, children: Vec<GroupId>) -> Self {
        Self { op, children }
    }

    pub fn scalar(op: ScalarOp, children: Vec<GroupId>) -> Self {
        Self::new(Operator::Scalar(op), children)
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }
}

/// Properties cached on a group, by family.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupProps {
    Relational(LogicalProperties),
    Scalar(ScalarProperties),
}

/// An equivalence class of interchangeable expressions.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    /// The normalized expression of the group.
    pub expr: MemoExpr,
    pub props: GroupProps,
}

#[derive(Debug, Clone)]
pub struct Memo {
    groups: Vec<Group>,
    index: HashMap<MemoExpr, GroupId>,
    metadata: Metadata,
    next_rank: u32,
    root: Option<RelExpr>,
    root_props: Option<RequiredProps>,
    /// Empty Values built in place of zero-cardinality groups.
    empty_replacements: HashMap<GroupId, RelExpr>,
    detached: bool,
}

impl Default for Memo {
    fn default() -> Self {
        Self::new()
    }
}

impl Memo {
    pub fn new() -> Self {
        let mut memo = Self {
            groups: Vec::new(),
            index: HashMap::new(),
            metadata: Metadata::new(),
            next_rank: 0,
            root: None,
            root_props: None,
            empty_replacements: HashMap::new(),
            detached: false,
        };
        let t = memo.add_group(
            MemoExpr::scalar(ScalarOp::True, vec![]),
            GroupProps::Scalar(ScalarProperties::new(DataType::Bool)),
        );
        let f = memo.add_group(
            MemoExpr::scalar(ScalarOp::False, vec![]),
            GroupProps::Scalar(ScalarProperties::new(DataType::Bool)),
        );
        debug_assert_eq!((t, f), (GroupId::TRUE, GroupId::FALSE));
        memo
    }

    /// True if nothing has been built into this memo yet.
    pub fn is_empty(&self) -> bool {
        self.groups.len() == RESERVED_GROUPS && self.root.is_none() && self.metadata.is_empty()
    }

    /// Number of groups, including the reserved `True` and `False` groups.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.index()]
    }

    pub fn expr(&self, id: GroupId) -> &MemoExpr {
        &self.groups[id.index()].expr
    }

    pub fn is_relational(&self, id: GroupId) -> bool {
        self.expr(id).op.is_relational()
    }

    /// Checked conversion of a group id into a relational handle.
    pub fn rel_expr(&self, id: GroupId) -> Option<RelExpr> {
        (id.index() < self.groups.len() && self.is_relational(id)).then_some(RelExpr(id))
    }

    /// Checked conversion of a group id into a scalar handle.
    pub fn scalar_expr(&self, id: GroupId) -> Option<ScalarExpr> {
        (id.index() < self.groups.len() && !self.is_relational(id)).then_some(ScalarExpr(id))
    }

    pub fn relational_props(&self, e: RelExpr) -> &LogicalProperties {
        match &self.group(e.group()).props {
            GroupProps::Relational(p) => p,
            GroupProps::Scalar(_) => unreachable!("relational handle {} names a scalar group", e),
        }
    }

    pub fn scalar_props(&self, e: ScalarExpr) -> &ScalarProperties {
        match &self.group(e.group()).props {
            GroupProps::Scalar(p) => p,
            GroupProps::Relational(_) => unreachable!("scalar handle {} names a relational group", e),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub(crate) fn next_unique_id(&mut self) -> u64 {
        self.metadata.next_unique_id()
    }

    /// The rank the next interned scalar group will receive.
    pub fn next_rank(&self) -> u32 {
        self.next_rank
    }

    /// Advance this memo's rank counter past every rank used by `other`.
    pub fn copy_next_rank_from(&mut self, other: &Memo) {
        self.next_rank = self.next_rank.max(other.next_rank);
    }

    /// Whether `expr` has the number and family of children its operator
    /// expects, and every child is a group of this memo.
    pub fn is_well_formed(&self, expr: &MemoExpr) -> bool {
        let children = &expr.children;
        if children.iter().any(|c| c.index() >= self.groups.len()) {
            return false;
        }
        let rel = |i: usize| self.is_relational(children[i]);
        let all_scalar = || children.iter().all(|c| !self.is_relational(*c));
        match &expr.op {
            Operator::Relational(op) => match op {
                RelOp::Scan(_) => children.is_empty(),
                RelOp::Values(_) => children.len() == 1 && !rel(0),
                RelOp::Select | RelOp::Project(_) | RelOp::Limit => children.len() == 2 && rel(0) && !rel(1),
                _ => children.len() == 3 && rel(0) && rel(1) && !rel(2),
            },
            Operator::Scalar(op) => {
                let arity = match op {
                    ScalarOp::Const { .. }
                    | ScalarOp::Null(_)
                    | ScalarOp::True
                    | ScalarOp::False
                    | ScalarOp::Variable(_)
                    | ScalarOp::Placeholder { .. } => Some(0),
                    ScalarOp::Not | ScalarOp::FiltersItem | ScalarOp::ProjectionsItem(_) => Some(1),
                    ScalarOp::Eq
                    | ScalarOp::Ne
                    | ScalarOp::Lt
                    | ScalarOp::Le
                    | ScalarOp::Gt
                    | ScalarOp::Ge
                    | ScalarOp::In
                    | ScalarOp::And
                    | ScalarOp::Or => Some(2),
                    ScalarOp::Tuple(_)
                    | ScalarOp::ScalarList
                    | ScalarOp::Filters
                    | ScalarOp::Projections
                    | ScalarOp::Function { .. } => None,
                };
                arity.map_or(true, |n| children.len() == n) && all_scalar()
            }
        }
    }

    pub(crate) fn lookup(&self, expr: &MemoExpr) -> Option<GroupId> {
        self.index.get(expr).copied()
    }

    /// Add a new group. The caller must have checked that `expr` is not
    /// already interned.
    pub(crate) fn add_group(&mut self, expr: MemoExpr, mut props: GroupProps) -> GroupId {
        debug_assert!(!self.index.contains_key(&expr), "expression already interned");
        let id = GroupId(self.groups.len() as u32);
        if let GroupProps::Scalar(p) = &mut props {
            p.rank = self.next_rank;
            self.next_rank += 1;
        }
        self.index.insert(expr.clone(), id);
        self.groups.push(Group { id, expr, props });
        id
    }

    /// The empty Values that replaced a zero-cardinality group, if any.
    pub fn empty_replacement(&self, e: RelExpr) -> Option<RelExpr> {
        self.empty_replacements.get(&e.group()).copied()
    }

    pub(crate) fn set_empty_replacement(&mut self, e: RelExpr, values: RelExpr) {
        self.empty_replacements.insert(e.group(), values);
    }

    pub fn root(&self) -> Option<RelExpr> {
        self.root
    }

    pub fn root_props(&self) -> Option<&RequiredProps> {
        self.root_props.as_ref()
    }

    pub(crate) fn set_root(&mut self, root: RelExpr, props: RequiredProps) {
        self.root = Some(root);
        self.root_props = Some(props);
    }

    /// Drop session-scoped auxiliary data (per-column table statistics) and
    /// freeze the memo. The tree itself is untouched.
    pub fn detach(&mut self) {
        self.metadata.clear_column_stats();
        self.detached = true;
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Whether a Placeholder is reachable from the root.
    pub fn has_placeholders(&self) -> bool {
        self.root
            .map(|root| self.relational_props(root).has_placeholder)
            .unwrap_or(false)
    }

    /// The value of a constant-like scalar group (`Const`, `Null`, `True`,
    /// `False`), or `None` for anything else.
    pub fn extract_const_datum(&self, id: GroupId) -> Option<Datum> {
        match &self.expr(id).op {
            Operator::Scalar(ScalarOp::Const { value, .. }) => Some(value.clone()),
            Operator::Scalar(ScalarOp::Null(_)) => Some(Datum::Null),
            Operator::Scalar(ScalarOp::True) => Some(Datum::Bool(true)),
            Operator::Scalar(ScalarOp::False) => Some(Datum::Bool(false)),
            _ => None,
        }
    }

    /// Render the tree rooted at `id`, one operator per line.
    pub fn explain(&self, id: GroupId) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.expr(id).op);
        self.explain_children(id, "", &mut out);
        out
    }

    fn explain_children(&self, id: GroupId, prefix: &str, out: &mut String) {
        let children = &self.expr(id).children;
        for (i, child) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            let (branch, indent) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
            let _ = writeln!(out, "{}{}{}", prefix, branch, self.expr(*child).op);
            self.explain_children(*child, &format!("{}{}", prefix, indent), out);
        }
    }
}
