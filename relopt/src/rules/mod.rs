//! Rewrite rules.
//!
//! A rule defines an equivalent transformation of a plan. Every rule here is a rewrite rule: the
//! plan it produces is assumed to be better than the original, so the original is discarded.
//! Rules are grouped into passes by [`crate::heuristic`], and the join order planner is wrapped
//! into a rule as well.
//!
//! ## Pattern
//!
//! A pattern defines what sub tree the rule should operate on. The pass only calls
//! [`Rule::apply`] on nodes matching [`Rule::pattern`], so a rule only checks the preconditions
//! patterns cannot express, e.g. flags, expressions or properties.
//!
//! [`MergeTopNRule`] illustrates this, its pattern is defined as following:
//! ```no
//! static ref MERGE_TOP_N_PATTERN: Pattern = {
//!     pattern(|op| matches!(op, TopN(_)))
//!       .leaf(|op| matches!(op, TopN(_)))
//!     .finish()
//! };
//! ```
//!
//! ## Contract
//!
//! A rule returns the node it was given (the same `Arc`) when it does not apply. Otherwise it
//! returns a replacement with the same output columns, in the same order, with the same names
//! and types. The traversal engine counts a change whenever the returned node differs.
mod pattern;
pub use pattern::*;
mod aggregate;
pub use aggregate::*;
mod join;
pub use join::*;
mod project;
pub use project::*;
mod select;
pub use select::*;
mod set_op;
pub use set_op::*;
mod simplify;
pub use simplify::*;
mod top_n;
pub use top_n::*;

use std::fmt::{Debug, Formatter};

use enum_dispatch::enum_dispatch;
use enumset::EnumSetType;
use strum_macros::AsRefStr;

use crate::error::OptResult;
use crate::expr::{ColumnRef, ScalarExpr};
use crate::join_order::JoinOrderRule;
use crate::operator::Operator;
use crate::optimizer::OptimizerContext;
use crate::plan::{RelNode, RelRef, Schema};
use crate::properties::PropertyTable;

/// State a rule may consult while rewriting.
pub struct RuleContext<'a> {
    pub optimizer: &'a mut OptimizerContext,
    /// Properties inferred before the running pass.
    pub properties: &'a PropertyTable,
}

impl<'a> RuleContext<'a> {
    pub fn new(optimizer: &'a mut OptimizerContext, properties: &'a PropertyTable) -> Self {
        Self {
            optimizer,
            properties,
        }
    }

    /// A fresh column name, unique in the plan being optimized.
    pub fn fresh_column(&mut self) -> ColumnRef {
        ColumnRef::label(self.optimizer.next_label())
    }
}

/// A rule should only focus on providing equivalent transformations of plans.
#[enum_dispatch(RuleImpl)]
pub trait Rule {
    /// Rewrites `rel`, which matches [`Rule::pattern`]. Returns `rel` itself when the rule does
    /// not apply.
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef>;

    /// Pattern for rule.
    fn pattern(&self) -> &Pattern;

    /// Use to identify each rule, e.g. to disable it.
    fn rule_id(&self) -> RuleId;
}

#[enum_dispatch]
#[derive(Clone, AsRefStr)]
pub enum RuleImpl {
    // Simplify expressions
    SimplifyExprRule,
    NormalizePredicatesRule,
    ConstantSubstitutionRule,

    // Projections
    MergeProjectsRule,
    ProjectCseRule,
    MergeTopNRule,
    PushTopNBelowProjectRule,

    // Joins
    MergeSelectsRule,
    PushSelectThroughJoinRule,
    PushJoinPredicateDownRule,
    PushSelectIntoUnionRule,
    PushSelectThroughProjectRule,
    OuterToInnerRule,
    JoinToSemiJoinRule,
    RemoveRedundantJoinRule,

    // Aggregation
    RemoveRedundantDistinctRule,
    DistinctAggregateOnUniqueRule,
    PushAggregateThroughUnionRule,
    SplitDistinctAggregateRule,

    // Set operators
    MergeSetOpsRule,

    // Dead code
    DeadExpressionRule,

    // Join order
    JoinOrderRule,
}

#[derive(EnumSetType, Debug, Hash)]
pub enum RuleId {
    // Simplify expressions
    SimplifyExpr,
    NormalizePredicates,
    ConstantSubstitution,

    // Projections
    MergeProjects,
    ProjectCse,
    MergeTopN,
    PushTopNBelowProject,

    // Joins
    MergeSelects,
    PushSelectThroughJoin,
    PushJoinPredicateDown,
    PushSelectIntoUnion,
    PushSelectThroughProject,
    OuterToInner,
    JoinToSemiJoin,
    RemoveRedundantJoin,

    // Aggregation
    RemoveRedundantDistinct,
    DistinctAggregateOnUnique,
    PushAggregateThroughUnion,
    SplitDistinctAggregate,

    // Set operators
    MergeSetOps,

    // Dead code
    DeadExpression,

    // Join order
    JoinOrder,
}

impl Debug for RuleImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_ref())
    }
}

/// Builds a node replacing `original`, keeping its flags.
pub(crate) fn rebuild<I>(original: &RelNode, operator: Operator, inputs: I) -> OptResult<RelRef>
where
    I: IntoIterator<Item = RelRef>,
{
    Ok(RelNode::new(operator, inputs)?
        .with_flags(original.flags())
        .into_ref())
}

/// Names each expression after the field at the same position of `schema`.
pub(crate) fn pin_names(exprs: Vec<ScalarExpr>, schema: &Schema) -> Vec<ScalarExpr> {
    exprs
        .into_iter()
        .zip(schema.fields())
        .map(|(expr, field)| expr.with_output_name(&field.column_ref()))
        .collect()
}

/// Columns of `schema` as plain column expressions.
pub(crate) fn pass_through(schema: &Schema) -> Vec<ScalarExpr> {
    schema
        .column_refs()
        .into_iter()
        .map(crate::expr::column)
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::rules::{MergeTopNRule, RuleImpl};

    #[test]
    fn test_rule_debug() {
        assert_eq!(
            "\"MergeTopNRule\"",
            format!("{:?}", RuleImpl::from(MergeTopNRule::new()))
        );
    }
}
