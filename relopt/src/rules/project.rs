use crate::error::OptResult;
use crate::expr::{column, null_lit, ExprKind, ScalarExpr};
use crate::operator::Operator::Project;
use crate::operator::{self, OperatorTrait};
use crate::plan::{RelFlag, RelNode, RelRef};
use crate::rules::RuleId::{DeadExpression, MergeProjects, ProjectCse};
use crate::rules::{
    any, pass_through, pattern, pin_names, rebuild, Pattern, PatternBuilder, Rule, RuleContext,
    RuleId,
};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref MERGE_PROJECTS_PATTERN: Pattern = {
        pattern(|op| matches!(op, Project(_)))
          .leaf(|op| matches!(op, Project(_)))
        .finish()
    };
    static ref PROJECT_CSE_PATTERN: Pattern = {
        pattern(|op| matches!(op, Project(_)))
          .leaf(any)
        .finish()
    };
    static ref DEAD_EXPRESSION_PATTERN: Pattern = {
        pattern(|op| matches!(op, Project(_)))
          .leaf(any)
        .finish()
    };
}

/// Splices two stacked projections into one, rewriting references of the outer projection
/// through the inner one.
///
/// The inner projection must not be distinct or ordered, and no expensive expression of it may
/// be referenced more than once.
#[derive(Clone, Default)]
pub struct MergeProjectsRule {}

impl MergeProjectsRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for MergeProjectsRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let inner_rel = rel.input(0);
        let (outer, inner) = match (rel.operator(), inner_rel.operator()) {
            (Project(outer), Project(inner)) => (outer, inner),
            _ => return Ok(rel),
        };
        if !inner.order_by().is_empty()
            || inner_rel.is_distinct()
            || inner_rel.has_flag(RelFlag::Single)
        {
            return Ok(rel);
        }

        let inner_schema = inner_rel.schema();
        let mut uses = vec![0usize; inner.exprs().len()];
        for expr in outer.exprs().iter().chain(outer.order_by()) {
            for c in expr.columns() {
                uses[inner_schema.resolve(c)?] += 1;
            }
        }
        let duplicated = inner
            .exprs()
            .iter()
            .zip(&uses)
            .any(|(e, n)| *n > 1 && !e.is_trivial());
        let shared = ctx.properties.is_shared(inner_rel) && !inner.is_plain();
        if duplicated || shared {
            return Ok(rel);
        }

        let mut through_inner = |c: &crate::expr::ColumnRef| -> OptResult<ScalarExpr> {
            Ok(inner.exprs()[inner_schema.resolve(c)?].clone().without_alias())
        };
        let exprs = outer
            .exprs()
            .iter()
            .map(|e| e.rebind(&mut through_inner))
            .collect::<OptResult<Vec<_>>>()?;
        let order_by = outer
            .order_by()
            .iter()
            .map(|e| e.rebind(&mut through_inner))
            .collect::<OptResult<Vec<_>>>()?;

        let merged = operator::Project::new(pin_names(exprs, rel.schema())).with_order_by(order_by);
        rebuild(&rel, Project(merged), inner_rel.inputs().iter().cloned())
    }

    fn pattern(&self) -> &Pattern {
        &MERGE_PROJECTS_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        MergeProjects
    }
}

fn shareable(expr: &ScalarExpr) -> bool {
    !expr.is_trivial() && !expr.is_volatile() && !expr.contains_aggregate()
}

/// Computes expressions appearing several times in one projection once, in a projection below.
#[derive(Clone, Default)]
pub struct ProjectCseRule {}

impl ProjectCseRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for ProjectCseRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let project = match rel.operator() {
            Project(project) => project,
            _ => return Ok(rel),
        };
        let input = rel.input(0);
        if !input.schema().has_unique_names() {
            return Ok(rel);
        }

        let exprs = project.exprs();
        let mut shared: Vec<ScalarExpr> = vec![];
        for (idx, expr) in exprs.iter().enumerate() {
            if !shareable(expr) || shared.iter().any(|s| s.same_value(expr)) {
                continue;
            }
            if exprs[idx + 1..].iter().any(|other| other.same_value(expr)) {
                shared.push(expr.clone().without_alias());
            }
        }
        if shared.is_empty() {
            return Ok(rel);
        }

        let labels = shared.iter().map(|_| ctx.fresh_column()).collect::<Vec<_>>();
        let mut inner_exprs = pass_through(input.schema());
        inner_exprs.extend(
            shared
                .iter()
                .zip(&labels)
                .map(|(expr, label)| expr.clone().alias(label.clone())),
        );
        let inner = RelNode::new(
            Project(operator::Project::new(inner_exprs)),
            [input.clone()],
        )?
        .into_ref();

        let outer_exprs = exprs
            .iter()
            .map(|e| match shared.iter().position(|s| s.same_value(e)) {
                Some(idx) => column(labels[idx].clone()),
                None => e.clone(),
            })
            .collect();
        let outer = operator::Project::new(pin_names(outer_exprs, rel.schema()))
            .with_order_by(project.order_by().to_vec());
        rebuild(&rel, Project(outer), [inner])
    }

    fn pattern(&self) -> &Pattern {
        &PROJECT_CSE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        ProjectCse
    }
}

/// Replaces expressions of a projection that no ancestor needs by a NULL of the same type.
#[derive(Clone, Default)]
pub struct DeadExpressionRule {}

impl DeadExpressionRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for DeadExpressionRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        if rel.is_distinct() {
            return Ok(rel);
        }
        let mut operator = rel.operator().clone();
        let mut changed = false;
        if let Some(outputs) = operator.output_exprs_mut() {
            for (expr, field) in outputs.iter_mut().zip(rel.schema().fields()) {
                let dead = !expr.is_trivial()
                    && !matches!(expr.kind, ExprKind::Stmt(_))
                    && !ctx.properties.is_needed(&rel, &field.column_ref());
                if dead {
                    *expr = null_lit(&field.data_type)?.alias(field.column_ref());
                    changed = true;
                }
            }
        }
        if !changed {
            return Ok(rel);
        }
        debug_assert!(operator.exprs().iter().all(|e| !e.contains_subplan()));
        rebuild(&rel, operator, rel.inputs().iter().cloned())
    }

    fn pattern(&self) -> &Pattern {
        &DEAD_EXPRESSION_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        DeadExpression
    }
}
