//! Implementation of heuristic rewrite passes.
//!
//! A pass applies a batch of rewrite rules to every node of a plan in one traversal, bottom-up
//! or top-down. The optimizer repeats its passes until they report no change, or a maximum
//! number of iterations is reached. The approach is inspired by
//! [apache calcite](https://github.com/apache/calcite)'s HepPlanner, with the plan graph
//! replaced by an immutable dag rewritten copy-on-write.
//!
//! Properties of the plan are inferred once when a pass starts. Nodes rewritten during the pass
//! share the properties of the node they replace, and nodes created from scratch get the
//! conservative answers.
use std::sync::Arc;

use anyhow::bail;
use log::{debug, trace};

use crate::error::{OptResult, OptimizerError};
use crate::expr::ScalarExpr;
use crate::join_order::JoinOrderRule;
use crate::optimizer::OptimizerContext;
use crate::plan::visit::{RelRewriter, VisitOrder, Visitor};
use crate::plan::RelRef;
use crate::properties::{infer_properties, PropertyTable};
use crate::rules::*;

/// A named batch of rules applied in one traversal.
#[derive(Clone, Debug)]
pub struct RewritePass {
    name: &'static str,
    order: VisitOrder,
    rules: Vec<RuleImpl>,
    /// Also fold constant expressions during the traversal.
    simplify_exprs: bool,
}

impl RewritePass {
    pub fn new(name: &'static str, order: VisitOrder, rules: Vec<RuleImpl>) -> Self {
        Self {
            name,
            order,
            rules,
            simplify_exprs: false,
        }
    }

    pub fn with_expr_simplification(mut self) -> Self {
        self.simplify_exprs = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rules(&self) -> &[RuleImpl] {
        &self.rules
    }

    /// Runs the pass over `root`, returning the new plan and the number of changes.
    pub fn run(&self, root: RelRef, ctx: &mut OptimizerContext) -> OptResult<(RelRef, usize)> {
        let config = ctx.config.clone();
        let rules = self
            .rules
            .iter()
            .filter(|rule| !config.disabled_rules.contains(rule.rule_id()))
            .collect::<Vec<_>>();
        let simplify_exprs =
            self.simplify_exprs && !config.disabled_rules.contains(RuleId::SimplifyExpr);
        if rules.is_empty() && !simplify_exprs {
            return Ok((root, 0));
        }

        let properties = infer_properties(&root, config.max_depth)?;
        let mut rewriter = PassRewriter {
            rules,
            optimizer: ctx,
            properties,
            simplify_exprs,
            verify: config.verify_schemas,
        };
        let mut visitor = Visitor::new(self.order, config.max_depth);
        let new_root = visitor.visit(root, &mut rewriter)?;
        debug!("Pass {} made {} changes", self.name, visitor.changes());
        Ok((new_root, visitor.changes()))
    }
}

struct PassRewriter<'a> {
    rules: Vec<&'a RuleImpl>,
    optimizer: &'a mut OptimizerContext,
    properties: PropertyTable,
    simplify_exprs: bool,
    verify: bool,
}

impl<'a> RelRewriter for PassRewriter<'a> {
    fn rewrite_rel(&mut self, rel: RelRef, _depth: usize) -> OptResult<RelRef> {
        let mut current = rel;
        for rule in &self.rules {
            if !rule.pattern().matches(&current) {
                continue;
            }
            let mut ctx = RuleContext::new(self.optimizer, &self.properties);
            let new_rel = rule.apply(current.clone(), &mut ctx)?;
            if Arc::ptr_eq(&current, &new_rel) {
                continue;
            }
            trace!("Rule {:?} rewrote {} into {}", rule, current, new_rel);

            if self.verify
                && current.schema().names_and_types() != new_rel.schema().names_and_types()
            {
                let rule_name: &str = rule.as_ref();
                bail!(OptimizerError::invariant(
                    rule_name,
                    &current,
                    format!("output changed from {} to {}", current.schema(), new_rel.schema())
                ));
            }
            self.properties.alias(&new_rel, &current);
            current = new_rel;
        }
        Ok(current)
    }

    fn rewrites_exprs(&self) -> bool {
        self.simplify_exprs
    }

    fn rewrite_expr(&mut self, expr: ScalarExpr) -> OptResult<ScalarExpr> {
        Ok(fold_expr(expr))
    }

    fn replaced(&mut self, original: &RelRef, rebuilt: &RelRef) {
        self.properties.alias(rebuilt, original);
    }
}

/// Expression folding and predicate normalization.
pub fn simplify_pass() -> RewritePass {
    RewritePass::new(
        "simplify",
        VisitOrder::BottomUp,
        vec![
            SimplifyExprRule::new().into(),
            NormalizePredicatesRule::new().into(),
            ConstantSubstitutionRule::new().into(),
        ],
    )
    .with_expr_simplification()
}

pub fn projection_pass() -> RewritePass {
    RewritePass::new(
        "projections",
        VisitOrder::BottomUp,
        vec![
            MergeProjectsRule::new().into(),
            ProjectCseRule::new().into(),
            MergeTopNRule::new().into(),
            PushTopNBelowProjectRule::new().into(),
        ],
    )
}

/// Selection push down and join simplification. Top-down, so that a selection travels as far
/// as it can in one traversal.
pub fn join_pass() -> RewritePass {
    RewritePass::new(
        "joins",
        VisitOrder::TopDown,
        vec![
            MergeSelectsRule::new().into(),
            PushSelectThroughProjectRule::new().into(),
            OuterToInnerRule::new().into(),
            PushSelectThroughJoinRule::new().into(),
            PushJoinPredicateDownRule::new().into(),
            PushSelectIntoUnionRule::new().into(),
            JoinToSemiJoinRule::new().into(),
            RemoveRedundantJoinRule::new().into(),
        ],
    )
}

pub fn aggregation_pass() -> RewritePass {
    RewritePass::new(
        "aggregation",
        VisitOrder::BottomUp,
        vec![
            RemoveRedundantDistinctRule::new().into(),
            DistinctAggregateOnUniqueRule::new().into(),
            SplitDistinctAggregateRule::new().into(),
            PushAggregateThroughUnionRule::new().into(),
        ],
    )
}

pub fn set_op_pass() -> RewritePass {
    RewritePass::new(
        "set operators",
        VisitOrder::BottomUp,
        vec![MergeSetOpsRule::new().into()],
    )
}

pub fn dead_code_pass() -> RewritePass {
    RewritePass::new(
        "dead code",
        VisitOrder::TopDown,
        vec![DeadExpressionRule::new().into()],
    )
}

pub fn join_order_pass() -> RewritePass {
    RewritePass::new(
        "join order",
        VisitOrder::TopDown,
        vec![JoinOrderRule::new().into()],
    )
}

/// Passes of one rewrite cycle, in order.
pub fn rewrite_passes() -> Vec<RewritePass> {
    vec![
        simplify_pass(),
        projection_pass(),
        join_pass(),
        aggregation_pass(),
        set_op_pass(),
        dead_code_pass(),
    ]
}

/// Passes run after join ordering.
pub fn cleanup_passes() -> Vec<RewritePass> {
    vec![simplify_pass(), projection_pass()]
}
