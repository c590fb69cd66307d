//! # Typed Constructors
//!
//! One constructor per operator, each a thin wrapper over
//! [`Factory::construct`] so every node goes through normalization and
//! interning. List-valued children (filters, projections, tuple elements, the
//! rows of a Values operator) are themselves scalar groups built with the list
//! constructors.
//!
//! ## Convenience Constructors
//!
//! - [`Factory::construct_join`] dispatches on a join kind.
//! - [`Factory::construct_const_val`] canonicalizes a datum: NULL becomes a
//!   typed `Null`, booleans become the shared `True`/`False` expressions,
//!   anything else a typed `Const`.
//! - [`Factory::construct_const_filter`] builds `col = v` for one value and
//!   `col IN (v1, v2, ...)` for several.
//! - [`Factory::construct_zero_values`] and [`Factory::construct_empty_values`]
//!   build Values operators without rows.

use crate::error::NormError;
use crate::expr::{
    ColSet, ColumnId, DataType, Datum, JoinPrivate, OpKind, Operator, ProjectPrivate, RelExpr, RelOp, RelOpKind,
    ScalarExpr, ScalarOp, ScanPrivate, TableId, ValuesPrivate,
};
use crate::factory::Factory;
use crate::memo::GroupId;

fn groups(exprs: &[ScalarExpr]) -> Vec<GroupId> {
    exprs.iter().map(|e| e.group()).collect()
}

impl Factory {
    fn rel(&mut self, op: RelOp, children: Vec<GroupId>) -> RelExpr {
        RelExpr(self.construct(Operator::Relational(op), children))
    }

    fn scalar(&mut self, op: ScalarOp, children: Vec<GroupId>) -> ScalarExpr {
        ScalarExpr(self.construct(Operator::Scalar(op), children))
    }

    // ----------------------------------------------------------------------
    // Relational
    // ----------------------------------------------------------------------

    pub fn construct_scan(&mut self, table: TableId, cols: Vec<ColumnId>) -> RelExpr {
        self.rel(RelOp::Scan(ScanPrivate { table, cols }), vec![])
    }

    /// Scan every column of a table registered in the metadata.
    pub fn construct_table_scan(&mut self, table: TableId) -> RelExpr {
        let cols = self
            .metadata()
            .table(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default();
        self.construct_scan(table, cols)
    }

    /// `rows` is a `ScalarList` of `Tuple`s, one per row.
    pub fn construct_values(&mut self, rows: ScalarExpr, cols: Vec<ColumnId>) -> RelExpr {
        let id = self.memo_mut().next_unique_id();
        self.rel(RelOp::Values(ValuesPrivate { cols, id }), vec![rows.group()])
    }

    pub fn construct_select(&mut self, input: RelExpr, filters: ScalarExpr) -> RelExpr {
        self.rel(RelOp::Select, vec![input.group(), filters.group()])
    }

    pub fn construct_project(
        &mut self,
        input: RelExpr,
        projections: ScalarExpr,
        passthrough: Vec<ColumnId>,
    ) -> RelExpr {
        self.rel(
            RelOp::Project(ProjectPrivate { passthrough }),
            vec![input.group(), projections.group()],
        )
    }

    pub fn construct_limit(&mut self, input: RelExpr, limit: ScalarExpr) -> RelExpr {
        self.rel(RelOp::Limit, vec![input.group(), limit.group()])
    }

    pub fn construct_inner_join(&mut self, left: RelExpr, right: RelExpr, on: ScalarExpr, private: JoinPrivate) -> RelExpr {
        self.rel(RelOp::InnerJoin(private), vec![left.group(), right.group(), on.group()])
    }

    pub fn construct_inner_join_apply(
        &mut self,
        left: RelExpr,
        right: RelExpr,
        on: ScalarExpr,
        private: JoinPrivate,
    ) -> RelExpr {
        self.rel(RelOp::InnerJoinApply(private), vec![left.group(), right.group(), on.group()])
    }

    pub fn construct_left_join(&mut self, left: RelExpr, right: RelExpr, on: ScalarExpr, private: JoinPrivate) -> RelExpr {
        self.rel(RelOp::LeftJoin(private), vec![left.group(), right.group(), on.group()])
    }

    pub fn construct_left_join_apply(
        &mut self,
        left: RelExpr,
        right: RelExpr,
        on: ScalarExpr,
        private: JoinPrivate,
    ) -> RelExpr {
        self.rel(RelOp::LeftJoinApply(private), vec![left.group(), right.group(), on.group()])
    }

    pub fn construct_right_join(&mut self, left: RelExpr, right: RelExpr, on: ScalarExpr, private: JoinPrivate) -> RelExpr {
        self.rel(RelOp::RightJoin(private), vec![left.group(), right.group(), on.group()])
    }

    pub fn construct_full_join(&mut self, left: RelExpr, right: RelExpr, on: ScalarExpr, private: JoinPrivate) -> RelExpr {
        self.rel(RelOp::FullJoin(private), vec![left.group(), right.group(), on.group()])
    }

    pub fn construct_semi_join(&mut self, left: RelExpr, right: RelExpr, on: ScalarExpr, private: JoinPrivate) -> RelExpr {
        self.rel(RelOp::SemiJoin(private), vec![left.group(), right.group(), on.group()])
    }

    pub fn construct_semi_join_apply(
        &mut self,
        left: RelExpr,
        right: RelExpr,
        on: ScalarExpr,
        private: JoinPrivate,
    ) -> RelExpr {
        self.rel(RelOp::SemiJoinApply(private), vec![left.group(), right.group(), on.group()])
    }

    pub fn construct_anti_join(&mut self, left: RelExpr, right: RelExpr, on: ScalarExpr, private: JoinPrivate) -> RelExpr {
        self.rel(RelOp::AntiJoin(private), vec![left.group(), right.group(), on.group()])
    }

    pub fn construct_anti_join_apply(
        &mut self,
        left: RelExpr,
        right: RelExpr,
        on: ScalarExpr,
        private: JoinPrivate,
    ) -> RelExpr {
        self.rel(RelOp::AntiJoinApply(private), vec![left.group(), right.group(), on.group()])
    }

    // ----------------------------------------------------------------------
    // Scalar
    // ----------------------------------------------------------------------

    /// A typed constant. Use [`construct_const_val`](Self::construct_const_val)
    /// for NULL and boolean values.
    pub fn construct_const(&mut self, value: Datum, typ: DataType) -> ScalarExpr {
        self.scalar(ScalarOp::Const { value, typ }, vec![])
    }

    pub fn construct_null(&mut self, typ: DataType) -> ScalarExpr {
        self.scalar(ScalarOp::Null(typ), vec![])
    }

    pub fn construct_true(&mut self) -> ScalarExpr {
        ScalarExpr::TRUE
    }

    pub fn construct_false(&mut self) -> ScalarExpr {
        ScalarExpr::FALSE
    }

    pub fn construct_variable(&mut self, col: ColumnId) -> ScalarExpr {
        self.scalar(ScalarOp::Variable(col), vec![])
    }

    pub fn construct_placeholder(&mut self, index: u16, typ: DataType) -> ScalarExpr {
        self.scalar(ScalarOp::Placeholder { index, typ }, vec![])
    }

    pub fn construct_eq(&mut self, left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::Eq, vec![left.group(), right.group()])
    }

    pub fn construct_ne(&mut self, left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::Ne, vec![left.group(), right.group()])
    }

    pub fn construct_lt(&mut self, left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::Lt, vec![left.group(), right.group()])
    }

    pub fn construct_le(&mut self, left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::Le, vec![left.group(), right.group()])
    }

    pub fn construct_gt(&mut self, left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::Gt, vec![left.group(), right.group()])
    }

    pub fn construct_ge(&mut self, left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::Ge, vec![left.group(), right.group()])
    }

    /// `left IN right`, where `right` is a tuple.
    pub fn construct_in(&mut self, left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::In, vec![left.group(), right.group()])
    }

    pub fn construct_and(&mut self, left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::And, vec![left.group(), right.group()])
    }

    pub fn construct_or(&mut self, left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::Or, vec![left.group(), right.group()])
    }

    pub fn construct_not(&mut self, input: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::Not, vec![input.group()])
    }

    pub fn construct_tuple(&mut self, elems: &[ScalarExpr], typ: DataType) -> ScalarExpr {
        self.scalar(ScalarOp::Tuple(typ), groups(elems))
    }

    pub fn construct_scalar_list(&mut self, items: &[ScalarExpr]) -> ScalarExpr {
        self.scalar(ScalarOp::ScalarList, groups(items))
    }

    /// A filter list. Each item must be a `FiltersItem`.
    pub fn construct_filters(&mut self, items: &[ScalarExpr]) -> ScalarExpr {
        self.scalar(ScalarOp::Filters, groups(items))
    }

    pub fn construct_filters_item(&mut self, condition: ScalarExpr) -> ScalarExpr {
        self.scalar(ScalarOp::FiltersItem, vec![condition.group()])
    }

    /// A projection list. Each item must be a `ProjectionsItem`.
    pub fn construct_projections(&mut self, items: &[ScalarExpr]) -> ScalarExpr {
        self.scalar(ScalarOp::Projections, groups(items))
    }

    pub fn construct_projections_item(&mut self, element: ScalarExpr, col: ColumnId) -> ScalarExpr {
        self.scalar(ScalarOp::ProjectionsItem(col), vec![element.group()])
    }

    pub fn construct_function(&mut self, name: impl Into<String>, args: &[ScalarExpr], typ: DataType) -> ScalarExpr {
        self.scalar(
            ScalarOp::Function {
                name: name.into(),
                typ,
            },
            groups(args),
        )
    }

    // ----------------------------------------------------------------------
    // Convenience constructors
    // ----------------------------------------------------------------------

    /// A Values operator with no rows and no columns.
    pub fn construct_zero_values(&mut self) -> RelExpr {
        self.construct_empty_values(&ColSet::new())
    }

    /// A Values operator with no rows and the given columns.
    pub fn construct_empty_values(&mut self, cols: &ColSet) -> RelExpr {
        let rows = self.construct_scalar_list(&[]);
        self.construct_values(rows, cols.iter().copied().collect())
    }

    /// Construct the join operator of the given kind.
    pub fn construct_join(
        &mut self,
        kind: RelOpKind,
        left: RelExpr,
        right: RelExpr,
        on: ScalarExpr,
        private: JoinPrivate,
    ) -> Result<RelExpr, NormError> {
        let join: fn(&mut Self, RelExpr, RelExpr, ScalarExpr, JoinPrivate) -> RelExpr = match kind {
            RelOpKind::InnerJoin => Self::construct_inner_join,
            RelOpKind::InnerJoinApply => Self::construct_inner_join_apply,
            RelOpKind::LeftJoin => Self::construct_left_join,
            RelOpKind::LeftJoinApply => Self::construct_left_join_apply,
            RelOpKind::RightJoin => Self::construct_right_join,
            RelOpKind::FullJoin => Self::construct_full_join,
            RelOpKind::SemiJoin => Self::construct_semi_join,
            RelOpKind::SemiJoinApply => Self::construct_semi_join_apply,
            RelOpKind::AntiJoin => Self::construct_anti_join,
            RelOpKind::AntiJoinApply => Self::construct_anti_join_apply,
            RelOpKind::Scan | RelOpKind::Values | RelOpKind::Select | RelOpKind::Project | RelOpKind::Limit => {
                return Err(NormError::UnexpectedOperator(OpKind::Relational(kind)));
            }
        };
        Ok(join(self, left, right, on, private))
    }

    /// Construct the canonical constant operator for a datum of the given type.
    pub fn construct_const_val(&mut self, value: Datum, typ: DataType) -> ScalarExpr {
        match value {
            Datum::Null => self.construct_null(typ),
            Datum::Bool(true) => ScalarExpr::TRUE,
            Datum::Bool(false) => ScalarExpr::FALSE,
            value => self.construct_const(value, typ),
        }
    }

    /// A filter item constraining `col` to one of `values`: `col = v` for a
    /// single value, otherwise `col IN (v1, v2, ...)` with the tuple typed
    /// from each value's resolved type.
    pub fn construct_const_filter(&mut self, col: ColumnId, values: &[Datum]) -> ScalarExpr {
        if let [value] = values {
            let var = self.construct_variable(col);
            let val = self.construct_const_val(value.clone(), value.resolved_type());
            let eq = self.construct_eq(var, val);
            return self.construct_filters_item(eq);
        }
        let mut elems = Vec::with_capacity(values.len());
        let mut elem_types = Vec::with_capacity(values.len());
        for value in values {
            let typ = value.resolved_type();
            elems.push(self.construct_const_val(value.clone(), typ.clone()));
            elem_types.push(typ);
        }
        let var = self.construct_variable(col);
        let tuple = self.construct_tuple(&elems, DataType::Tuple(elem_types));
        let in_expr = self.construct_in(var, tuple);
        self.construct_filters_item(in_expr)
    }
}
