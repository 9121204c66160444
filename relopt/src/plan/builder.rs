use std::sync::Arc;

use datafusion_expr::JoinType;

use crate::catalog::TableDef;
use crate::error::OptResult;
use crate::expr::ScalarExpr;
use crate::operator::{
    BaseTable, Ddl, Delete, GroupBy, Insert, Join, Operator, Project, Sample, Select, SetOp,
    SetOpKind, TableFunc, TopN, Update, Values,
};
use crate::plan::{Field, RelFlag, RelNode, RelRef};

/// Builds a plan bottom-up.
///
/// ```
/// use std::sync::Arc;
/// use arrow_schema::DataType;
/// use relopt::catalog::{ColumnDef, TableDef};
/// use relopt::expr::{col, gt, lit};
/// use relopt::plan::RelBuilder;
///
/// let t = Arc::new(TableDef::new("t", vec![ColumnDef::new("a", DataType::Int64, false)]));
/// let plan = RelBuilder::scan(t)
///     .select(vec![gt(col("t.a"), lit(1i64))])?
///     .project(vec![col("t.a")])?
///     .build();
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct RelBuilder {
    root: RelRef,
}

impl RelBuilder {
    pub fn new(root: RelRef) -> Self {
        Self { root }
    }

    pub fn scan(table: Arc<TableDef>) -> Self {
        Self::leaf(BaseTable::new(table, None))
    }

    pub fn scan_as(table: Arc<TableDef>, alias: &str) -> Self {
        Self::leaf(BaseTable::new(table, Some(alias.to_string())))
    }

    pub fn values(fields: Vec<Field>, rows: Vec<Vec<ScalarExpr>>) -> OptResult<Self> {
        Ok(Self::new(
            RelNode::new(Operator::Values(Values::new(fields, rows)), vec![])?.into_ref(),
        ))
    }

    pub fn table_func(call: ScalarExpr, fields: Vec<Field>) -> OptResult<Self> {
        Ok(Self::new(
            RelNode::new(Operator::TableFunc(TableFunc::new(call, fields)), vec![])?
                .into_ref(),
        ))
    }

    pub fn ddl(name: &str, body: Vec<ScalarExpr>) -> OptResult<Self> {
        Ok(Self::new(
            RelNode::new(Operator::Ddl(Ddl::new(name, body)), vec![])?.into_ref(),
        ))
    }

    fn leaf(table: BaseTable) -> Self {
        Self::new(RelNode::scan(table).into_ref())
    }

    fn unary(self, operator: Operator) -> OptResult<Self> {
        Ok(Self::new(RelNode::new(operator, vec![self.root])?.into_ref()))
    }

    pub fn project(self, exprs: Vec<ScalarExpr>) -> OptResult<Self> {
        self.unary(Operator::Project(Project::new(exprs)))
    }

    pub fn project_ordered(
        self,
        exprs: Vec<ScalarExpr>,
        order_by: Vec<ScalarExpr>,
    ) -> OptResult<Self> {
        self.unary(Operator::Project(
            Project::new(exprs).with_order_by(order_by),
        ))
    }

    pub fn select(self, predicates: Vec<ScalarExpr>) -> OptResult<Self> {
        self.unary(Operator::Select(Select::new(predicates)))
    }

    pub fn join(self, right: RelRef, join_type: JoinType, on: Vec<ScalarExpr>) -> OptResult<Self> {
        Ok(Self::new(
            RelNode::new(
                Operator::Join(Join::new(join_type, on)),
                vec![self.root, right],
            )?
            .into_ref(),
        ))
    }

    pub fn inner_join(self, right: RelRef, on: Vec<ScalarExpr>) -> OptResult<Self> {
        self.join(right, JoinType::Inner, on)
    }

    pub fn group_by(self, keys: Vec<ScalarExpr>, exprs: Vec<ScalarExpr>) -> OptResult<Self> {
        self.unary(Operator::GroupBy(GroupBy::new(keys, exprs)))
    }

    pub fn set_op(self, kind: SetOpKind, all: bool, others: Vec<RelRef>) -> OptResult<Self> {
        let inputs = std::iter::once(self.root).chain(others);
        Ok(Self::new(
            RelNode::new(Operator::SetOp(SetOp::new(kind, all)), inputs)?.into_ref(),
        ))
    }

    pub fn union_all(self, other: RelRef) -> OptResult<Self> {
        self.set_op(SetOpKind::Union, true, vec![other])
    }

    pub fn top_n(self, limit: Option<usize>, offset: usize) -> OptResult<Self> {
        self.unary(Operator::TopN(TopN::new(limit, offset)))
    }

    pub fn limit(self, limit: usize) -> OptResult<Self> {
        self.top_n(Some(limit), 0)
    }

    pub fn sample(self, rows: usize) -> OptResult<Self> {
        self.unary(Operator::Sample(Sample::new(rows)))
    }

    pub fn insert(self, table: Arc<TableDef>) -> OptResult<Self> {
        self.unary(Operator::Insert(Insert::new(table)))
    }

    pub fn update(self, table: Arc<TableDef>, assignments: Vec<ScalarExpr>) -> OptResult<Self> {
        self.unary(Operator::Update(Update::new(table, assignments)))
    }

    pub fn delete(self, table: Arc<TableDef>) -> OptResult<Self> {
        self.unary(Operator::Delete(Delete::new(table)))
    }

    /// Marks the current root as duplicate free.
    pub fn distinct(self) -> Self {
        self.flag(RelFlag::Distinct)
    }

    pub fn flag(mut self, flag: RelFlag) -> Self {
        let node = Arc::make_mut(&mut self.root);
        *node = node.clone().with_flag(flag);
        self
    }

    pub fn build(self) -> RelRef {
        self.root
    }
}
