use crate::error::OptResult;
use crate::operator::Operator::{Project, TopN};
use crate::plan::RelRef;
use crate::rules::RuleId::{MergeTopN, PushTopNBelowProject};
use crate::rules::{pattern, PatternBuilder, Pattern, Rule, RuleContext, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref MERGE_TOP_N_PATTERN: Pattern = {
        pattern(|op| matches!(op, TopN(_)))
          .leaf(|op| matches!(op, TopN(_)))
        .finish()
    };
    static ref PUSH_TOP_N_BELOW_PROJECT_PATTERN: Pattern = {
        pattern(|op| matches!(op, TopN(_)))
          .leaf(|op| matches!(op, Project(_)))
        .finish()
    };
}

/// Combines a top-N over a top-N into one.
#[derive(Clone, Default)]
pub struct MergeTopNRule {}

impl MergeTopNRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for MergeTopNRule {
    fn apply(&self, rel: RelRef, _ctx: &mut RuleContext) -> OptResult<RelRef> {
        let child = rel.input(0);
        match (rel.operator(), child.operator()) {
            (TopN(outer), TopN(inner)) if child.flags().is_empty() => {
                let merged = inner.merge(outer);
                Ok(child
                    .clone_with_operator(TopN(merged))?
                    .with_flags(rel.flags())
                    .into_ref())
            }
            _ => Ok(rel),
        }
    }

    fn pattern(&self) -> &Pattern {
        &MERGE_TOP_N_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        MergeTopN
    }
}

/// Swaps a top-N with the plain projection below it, so that fewer rows are projected.
#[derive(Clone, Default)]
pub struct PushTopNBelowProjectRule {}

impl PushTopNBelowProjectRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushTopNBelowProjectRule {
    fn apply(&self, rel: RelRef, _ctx: &mut RuleContext) -> OptResult<RelRef> {
        let project = rel.input(0);
        let movable = match project.operator() {
            Project(p) => {
                p.order_by().is_empty()
                    && project.flags().is_empty()
                    && rel.flags().is_empty()
                    && !p.exprs().iter().any(|e| e.is_volatile())
            }
            _ => false,
        };
        if !movable {
            return Ok(rel);
        }

        let top_n = rel.clone_with_inputs(project.inputs().iter().cloned())?;
        Ok(project.clone_with_inputs([top_n.into_ref()])?.into_ref())
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_TOP_N_BELOW_PROJECT_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        PushTopNBelowProject
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::expr::{col, lit, binary};
    use crate::operator::Operator;
    use crate::plan::RelBuilder;
    use crate::rules::{MergeTopNRule, PushTopNBelowProjectRule, Rule};
    use crate::test_utils::{apply_rule, table_t1};

    #[test]
    fn test_merge_top_n() {
        let plan = RelBuilder::scan(table_t1())
            .top_n(Some(10), 3)
            .unwrap()
            .top_n(Some(5), 2)
            .unwrap()
            .build();

        let rule = MergeTopNRule::new();
        assert!(rule.pattern().matches(&plan));
        let result = apply_rule(rule, plan);

        let top_n = result.operator().as_top_n().unwrap();
        assert_eq!(Some(5), top_n.limit());
        assert_eq!(5, top_n.offset());
        assert!(result.input(0).operator().as_base_table().is_some());
    }

    #[test]
    fn test_push_top_n_below_project() {
        let plan = RelBuilder::scan(table_t1())
            .project(vec![
                col("t1.c1"),
                binary(col("t1.c2"), datafusion_expr::Operator::Plus, lit(1i64)).alias("x"),
            ])
            .unwrap()
            .limit(10)
            .unwrap()
            .build();

        let result = apply_rule(PushTopNBelowProjectRule::new(), plan.clone());
        assert!(matches!(result.operator(), Operator::Project(_)));
        assert!(matches!(result.input(0).operator(), Operator::TopN(_)));
        assert_eq!(plan.schema(), result.schema());
    }

    #[test]
    fn test_top_n_stays_above_ordered_project() {
        let plan = RelBuilder::scan(table_t1())
            .project_ordered(vec![col("t1.c1")], vec![col("t1.c2")])
            .unwrap()
            .limit(10)
            .unwrap()
            .build();

        let result = apply_rule(PushTopNBelowProjectRule::new(), plan.clone());
        assert!(Arc::ptr_eq(&plan, &result));
    }
}
