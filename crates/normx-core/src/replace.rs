//! # Copy and Replace
//!
//! A generic traversal that rebuilds a tree through the factory while letting
//! a [`Replacer`] substitute any node on the way. It has two uses:
//!
//! - **Cross-memo copy** ([`Factory::copy_and_replace`]): the tree is read from
//!   another memo and rebuilt in the factory's own memo, which must be empty.
//!   Metadata is copied first, keeping every table and column id. Check
//!   constraints stored in the metadata are rebuilt with a plain copy.
//! - **Same-memo substitution** ([`Factory::replace`]): the tree is read from
//!   the factory's own memo. Nodes whose children did not change are reused.
//!
//! In both cases a rebuilt node goes back through [`Factory::construct`], so
//! the copy is normalized and interned like any other construction, and the
//! source memo is never written to.
//!
//! ## Replacers
//!
//! A replacer sees each node before its children. It either returns a
//! replacement or hands the node to [`Factory::copy_and_replace_default`],
//! which replaces each child through the same replacer and rebuilds the node.
//! Errors raised by a replacer propagate with `?` up to the top-level call.
//!
//! ## Placeholder Assignment
//!
//! [`Factory::assign_placeholders`] copies a frozen memo while evaluating every
//! Placeholder and substituting the canonical constant for its value. An
//! evaluation failure is returned as an error and the partially built memo is
//! discarded.

use crate::error::NormError;
use crate::expr::{ColMap, Operator, RelExpr, ScalarExpr, ScalarOp};
use crate::factory::Factory;
use crate::memo::{GroupId, Memo};
use crate::properties::RequiredProps;
use std::convert::Infallible;
use tracing::debug;

/// Where a replacer reads the node it is given.
#[derive(Debug, Clone, Copy)]
pub enum ExprSource<'a> {
    /// The factory's own memo.
    Local,
    /// Another memo being copied from.
    Memo(&'a Memo),
}

impl<'a> ExprSource<'a> {
    /// The memo to read nodes from.
    pub fn memo<'b>(self, f: &'b Factory) -> &'b Memo
    where
        'a: 'b,
    {
        match self {
            ExprSource::Local => f.memo(),
            ExprSource::Memo(m) => m,
        }
    }
}

/// A substitution applied to each node of a traversed tree.
pub trait Replacer {
    type Error;

    /// Return the group that replaces `expr` (read from `from`) in the
    /// factory's memo.
    fn replace(&mut self, f: &mut Factory, from: ExprSource<'_>, expr: GroupId) -> Result<GroupId, Self::Error>;
}

/// Copies every node as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyVerbatim;

impl Replacer for CopyVerbatim {
    type Error = Infallible;

    fn replace(&mut self, f: &mut Factory, from: ExprSource<'_>, expr: GroupId) -> Result<GroupId, Infallible> {
        f.copy_and_replace_default(from, expr, self)
    }
}

/// Replaces each Placeholder with the constant it evaluates to.
struct PlaceholderAssigner;

impl Replacer for PlaceholderAssigner {
    type Error = NormError;

    fn replace(&mut self, f: &mut Factory, from: ExprSource<'_>, expr: GroupId) -> Result<GroupId, NormError> {
        let source = from.memo(f);
        if let Operator::Scalar(ScalarOp::Placeholder { typ, .. }) = &source.expr(expr).op {
            let typ = typ.clone();
            let value = match from {
                ExprSource::Memo(m) => f.eval_context().evaluator().eval(m, ScalarExpr(expr))?,
                ExprSource::Local => f.eval_context().evaluator().eval(f.memo(), ScalarExpr(expr))?,
            };
            return Ok(f.construct_const_val(value, typ).group());
        }
        f.copy_and_replace_default(from, expr, self)
    }
}

/// Rewrites references to mapped columns.
struct ColumnRemapper<'m> {
    map: &'m ColMap,
}

impl Replacer for ColumnRemapper<'_> {
    type Error = Infallible;

    fn replace(&mut self, f: &mut Factory, from: ExprSource<'_>, expr: GroupId) -> Result<GroupId, Infallible> {
        let mapped = match &from.memo(f).expr(expr).op {
            Operator::Scalar(ScalarOp::Variable(col)) => self.map.get(col).copied(),
            _ => None,
        };
        match mapped {
            Some(col) => Ok(f.construct_variable(col).group()),
            None => f.copy_and_replace_default(from, expr, self),
        }
    }
}

fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

impl Factory {
    /// Rebuild `expr` with each child replaced through `replacer`.
    ///
    /// When reading from the factory's own memo, a node whose children are all
    /// unchanged is returned as-is. Otherwise the node is constructed anew
    /// with the same operator and private data.
    pub fn copy_and_replace_default<R: Replacer + ?Sized>(
        &mut self,
        from: ExprSource<'_>,
        expr: GroupId,
        replacer: &mut R,
    ) -> Result<GroupId, R::Error> {
        let source = from.memo(self).expr(expr).clone();
        let local = matches!(from, ExprSource::Local);

        let mut changed = false;
        let mut children = Vec::with_capacity(source.children.len());
        for child in &source.children {
            let replaced = replacer.replace(self, from, *child)?;
            changed |= replaced != *child;
            children.push(replaced);
        }

        if local && !changed {
            return Ok(expr);
        }
        Ok(self.construct(source.op, children))
    }

    /// Substitute nodes of a tree in this factory's memo.
    pub fn replace<R: Replacer + ?Sized>(&mut self, expr: GroupId, replacer: &mut R) -> Result<GroupId, R::Error> {
        self.copy_and_replace_default(ExprSource::Local, expr, replacer)
    }

    /// Copy the tree rooted at `root` from another memo into this factory's
    /// memo, passing each node through `replacer`, and make the copy the root.
    ///
    /// The destination memo must be empty. Metadata is copied with every id
    /// preserved, and the rank counter is advanced past the source's.
    pub fn copy_and_replace<R: Replacer + ?Sized>(
        &mut self,
        from: &Memo,
        root: RelExpr,
        props: &RequiredProps,
        replacer: &mut R,
    ) -> Result<(), NormError>
    where
        NormError: From<R::Error>,
    {
        if !self.memo().is_empty() {
            return Err(NormError::DestinationNotEmpty);
        }

        self.memo_mut().copy_next_rank_from(from);

        let (metadata, scalars) = from.metadata().clone_without_scalars();
        *self.metadata_mut() = metadata;
        for (table, constraint) in scalars {
            let copied = self.copy_without_assigning_placeholders(from, constraint);
            self.metadata_mut().add_check_constraint(table, copied);
        }

        let to = replacer.replace(self, ExprSource::Memo(from), root.group())?;
        debug_assert!(self.memo().is_relational(to), "root replaced by a scalar expression");
        self.memo_mut().set_root(RelExpr(to), props.clone());
        self.check_constructor_stack_depth();

        debug!(
            source_groups = from.num_groups(),
            groups = self.memo().num_groups(),
            "copied memo"
        );
        Ok(())
    }

    /// Copy a scalar expression from another memo without touching
    /// placeholders.
    pub fn copy_without_assigning_placeholders(&mut self, from: &Memo, expr: ScalarExpr) -> ScalarExpr {
        ScalarExpr(infallible(CopyVerbatim.replace(self, ExprSource::Memo(from), expr.group())))
    }

    /// Copy `from` into this factory's empty memo, replacing every Placeholder
    /// with the constant its value evaluates to, typed as the placeholder.
    ///
    /// On failure the destination memo is discarded and replaced by an empty
    /// one.
    pub fn assign_placeholders(&mut self, from: &Memo) -> Result<(), NormError> {
        let root = from.root().ok_or(NormError::NoRoot)?;
        let props = from.root_props().cloned().unwrap_or_default();
        let result = self.copy_and_replace(from, root, &props, &mut PlaceholderAssigner);
        match &result {
            Err(NormError::DestinationNotEmpty) => {}
            Err(err) => {
                debug!(error = %err, "placeholder assignment failed, discarding memo");
                *self.memo_mut() = Memo::new();
            }
            Ok(()) => debug!("assigned placeholders"),
        }
        result
    }

    /// Rewrite every reference to a column that is a key of `map` to the
    /// mapped column. Other columns are left alone.
    pub fn remap_cols(&mut self, scalar: ScalarExpr, map: &ColMap) -> ScalarExpr {
        let mut remapper = ColumnRemapper { map };
        ScalarExpr(infallible(remapper.replace(self, ExprSource::Local, scalar.group())))
    }
}
