use crate::error::OptResult;
use crate::expr::{column, ScalarExpr};
use crate::operator::Operator::{Join, Project, Select, SetOp};
use crate::operator::{self, SetOpKind};
use crate::plan::{RelNode, RelRef, Schema};
use crate::rules::RuleId::{
    MergeSelects, PushJoinPredicateDown, PushSelectIntoUnion, PushSelectThroughJoin,
    PushSelectThroughProject,
};
use crate::rules::{any, pattern, rebuild, Pattern, PatternBuilder, Rule, RuleContext, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref MERGE_SELECTS_PATTERN: Pattern = {
        pattern(|op| matches!(op, Select(_)))
          .leaf(|op| matches!(op, Select(_)))
        .finish()
    };
    static ref PUSH_SELECT_THROUGH_JOIN_PATTERN: Pattern = {
        pattern(|op| matches!(op, Select(_)))
          .pattern(|op| matches!(op, Join(_)))
            .leaf(any)
            .leaf(any)
          .finish()
        .finish()
    };
    static ref PUSH_JOIN_PREDICATE_DOWN_PATTERN: Pattern = {
        pattern(|op| matches!(op, Join(_)))
          .leaf(any)
          .leaf(any)
        .finish()
    };
    static ref PUSH_SELECT_INTO_UNION_PATTERN: Pattern = {
        pattern(|op| matches!(op, Select(_)))
          .leaf(|op| matches!(op, SetOp(s) if s.kind() == SetOpKind::Union))
        .finish()
    };
    static ref PUSH_SELECT_THROUGH_PROJECT_PATTERN: Pattern = {
        pattern(|op| matches!(op, Select(_)))
          .leaf(|op| matches!(op, Project(_)))
        .finish()
    };
}

/// Wraps `input` into a selection on `predicates`, or returns it when there are none.
pub(crate) fn filter(input: &RelRef, predicates: Vec<ScalarExpr>) -> OptResult<RelRef> {
    if predicates.is_empty() {
        return Ok(input.clone());
    }
    Ok(RelNode::new(Select(operator::Select::new(predicates)), [input.clone()])?.into_ref())
}

/// Whether a predicate may be evaluated somewhere else than where it is written.
fn movable(predicate: &ScalarExpr) -> bool {
    !predicate.is_volatile() && !predicate.contains_subplan() && !predicate.columns().is_empty()
}

fn bound_by(predicate: &ScalarExpr, schema: &Schema) -> bool {
    predicate.columns().iter().all(|c| schema.contains(c))
}

/// Predicates of `predicates` split into those for the left input, the right input and the
/// rest.
fn split_sides(
    predicates: &[ScalarExpr],
    left: &Schema,
    right: &Schema,
    (to_left, to_right): (bool, bool),
) -> (Vec<ScalarExpr>, Vec<ScalarExpr>, Vec<ScalarExpr>) {
    let (mut l, mut r, mut rest) = (vec![], vec![], vec![]);
    for predicate in predicates {
        if !movable(predicate) {
            rest.push(predicate.clone());
        } else if to_left && bound_by(predicate, left) {
            l.push(predicate.clone());
        } else if to_right && bound_by(predicate, right) {
            r.push(predicate.clone());
        } else {
            rest.push(predicate.clone());
        }
    }
    (l, r, rest)
}

/// Combines two stacked selections.
#[derive(Clone, Default)]
pub struct MergeSelectsRule {}

impl MergeSelectsRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for MergeSelectsRule {
    fn apply(&self, rel: RelRef, _ctx: &mut RuleContext) -> OptResult<RelRef> {
        let child = rel.input(0);
        match (rel.operator(), child.operator()) {
            (Select(outer), Select(inner)) if child.flags().is_empty() => {
                let predicates = inner
                    .predicates()
                    .iter()
                    .chain(outer.predicates())
                    .cloned()
                    .collect::<Vec<_>>();
                rebuild(
                    &rel,
                    Select(operator::Select::new(predicates)),
                    child.inputs().iter().cloned(),
                )
            }
            _ => Ok(rel),
        }
    }

    fn pattern(&self) -> &Pattern {
        &MERGE_SELECTS_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        MergeSelects
    }
}

/// Moves predicates of a selection over a join to the join inputs they reference. Predicates
/// spanning both inputs of an inner join become part of the join condition.
#[derive(Clone, Default)]
pub struct PushSelectThroughJoinRule {}

impl PushSelectThroughJoinRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushSelectThroughJoinRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let join_rel = rel.input(0);
        let (select, join) = match (rel.operator(), join_rel.operator()) {
            (Select(select), Join(join)) => (select, join),
            _ => return Ok(rel),
        };
        if !rel.flags().is_empty() || ctx.properties.is_shared(join_rel) {
            return Ok(rel);
        }

        let (left, right) = (join_rel.input(0), join_rel.input(1));
        let (to_left, to_right, rest) = split_sides(
            select.predicates(),
            left.schema(),
            right.schema(),
            join.can_push_below(),
        );
        let (to_on, remaining): (Vec<_>, Vec<_>) = if join.is_inner() {
            rest.into_iter().partition(movable)
        } else {
            (vec![], rest)
        };
        if to_left.is_empty() && to_right.is_empty() && to_on.is_empty() {
            return Ok(rel);
        }

        let mut on = join.on().to_vec();
        on.extend(to_on);
        let new_join = rebuild(
            join_rel,
            Join(join.clone().with_on(on)),
            [filter(left, to_left)?, filter(right, to_right)?],
        )?;
        if remaining.is_empty() {
            Ok(new_join)
        } else {
            rebuild(&rel, Select(operator::Select::new(remaining)), [new_join])
        }
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_SELECT_THROUGH_JOIN_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        PushSelectThroughJoin
    }
}

/// Evaluates join predicates referencing a single input on that input, where the join type
/// allows it.
#[derive(Clone, Default)]
pub struct PushJoinPredicateDownRule {}

impl PushJoinPredicateDownRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushJoinPredicateDownRule {
    fn apply(&self, rel: RelRef, _ctx: &mut RuleContext) -> OptResult<RelRef> {
        let join = match rel.operator() {
            Join(join) => join,
            _ => return Ok(rel),
        };
        let (left, right) = (rel.input(0), rel.input(1));
        let (to_left, to_right, rest) = split_sides(
            join.on(),
            left.schema(),
            right.schema(),
            join.can_push_condition(),
        );
        if to_left.is_empty() && to_right.is_empty() {
            return Ok(rel);
        }
        rebuild(
            &rel,
            Join(join.clone().with_on(rest)),
            [filter(left, to_left)?, filter(right, to_right)?],
        )
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_JOIN_PREDICATE_DOWN_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        PushJoinPredicateDown
    }
}

/// Distributes a selection over the branches of a union.
#[derive(Clone, Default)]
pub struct PushSelectIntoUnionRule {}

impl PushSelectIntoUnionRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushSelectIntoUnionRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let union = rel.input(0);
        let select = match rel.operator() {
            Select(select) => select,
            _ => return Ok(rel),
        };
        let pushable = rel.flags().is_empty()
            && !ctx.properties.is_shared(union)
            && select.predicates().iter().all(movable)
            && union.inputs().iter().all(|b| b.schema().has_unique_names());
        if !pushable {
            return Ok(rel);
        }

        let union_schema = union.schema();
        let branches = union
            .inputs()
            .iter()
            .map(|branch| {
                let predicates = select
                    .predicates()
                    .iter()
                    .map(|p| {
                        p.rebind(&mut |c| {
                            let idx = union_schema.resolve(c)?;
                            Ok(column(branch.schema().field(idx).column_ref()))
                        })
                    })
                    .collect::<OptResult<Vec<_>>>()?;
                filter(branch, predicates)
            })
            .collect::<OptResult<Vec<_>>>()?;
        Ok(union.clone_with_inputs(branches)?.into_ref())
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_SELECT_INTO_UNION_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        PushSelectIntoUnion
    }
}

/// Moves predicates of a selection below a projection by substituting the projected
/// expressions. Predicates over volatile expressions stay above.
#[derive(Clone, Default)]
pub struct PushSelectThroughProjectRule {}

impl PushSelectThroughProjectRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushSelectThroughProjectRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let project_rel = rel.input(0);
        let (select, project) = match (rel.operator(), project_rel.operator()) {
            (Select(select), Project(project)) => (select, project),
            _ => return Ok(rel),
        };
        if ctx.properties.is_shared(project_rel) {
            return Ok(rel);
        }

        let project_schema = project_rel.schema();
        let mut below = vec![];
        let mut above = vec![];
        for predicate in select.predicates() {
            let sources = predicate
                .columns()
                .into_iter()
                .map(|c| Ok(&project.exprs()[project_schema.resolve(c)?]))
                .collect::<OptResult<Vec<_>>>()?;
            let pushable = movable(predicate)
                && sources
                    .iter()
                    .all(|e| !e.is_volatile() && !e.contains_subplan());
            if !pushable {
                above.push(predicate.clone());
                continue;
            }
            below.push(predicate.rebind(&mut |c| {
                Ok(project.exprs()[project_schema.resolve(c)?]
                    .clone()
                    .without_alias())
            })?);
        }
        if below.is_empty() {
            return Ok(rel);
        }

        let pushed = project_rel
            .clone_with_inputs([filter(project_rel.input(0), below)?])?
            .into_ref();
        if above.is_empty() && rel.flags().is_empty() {
            Ok(pushed)
        } else {
            rebuild(&rel, Select(operator::Select::new(above)), [pushed])
        }
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_SELECT_THROUGH_PROJECT_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        PushSelectThroughProject
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use datafusion_expr::JoinType;

    use crate::expr::{col, eq, gt, lit, volatile_func};
    use crate::operator::Operator;
    use crate::plan::{RelBuilder, RelRef};
    use crate::rules::{
        MergeSelectsRule, PushJoinPredicateDownRule, PushSelectIntoUnionRule,
        PushSelectThroughJoinRule, PushSelectThroughProjectRule,
    };
    use crate::test_utils::{apply_rule, table_t1, table_t2};

    fn join(join_type: JoinType) -> RelBuilder {
        RelBuilder::scan(table_t1())
            .join(
                RelBuilder::scan(table_t2()).build(),
                join_type,
                vec![eq(col("t1.c1"), col("t2.c1"))],
            )
            .unwrap()
    }

    fn predicates(rel: &RelRef) -> Vec<String> {
        match rel.operator() {
            Operator::Select(s) => s.predicates().iter().map(|p| p.to_string()).collect(),
            _ => vec![],
        }
    }

    #[test]
    fn test_merge_selects() {
        let plan = RelBuilder::scan(table_t1())
            .select(vec![gt(col("t1.c1"), lit(1i64))])
            .unwrap()
            .select(vec![gt(col("t1.c2"), lit(2i64))])
            .unwrap()
            .build();

        let result = apply_rule(MergeSelectsRule::new(), plan);
        assert_eq!(vec!["t1.c1 > 1", "t1.c2 > 2"], predicates(&result));
        assert!(result.input(0).operator().as_base_table().is_some());
    }

    #[test]
    fn test_push_select_through_inner_join() {
        let plan = join(JoinType::Inner)
            .select(vec![
                gt(col("t1.c2"), lit(1i64)),
                gt(col("t2.c2"), lit(2i64)),
                gt(col("t1.c2"), col("t2.c2")),
            ])
            .unwrap()
            .build();

        let result = apply_rule(PushSelectThroughJoinRule::new(), plan.clone());
        assert_eq!(plan.schema(), result.schema());
        let join = result.operator().as_join().unwrap();
        assert_eq!(2, join.on().len());
        assert_eq!(vec!["t1.c2 > 1"], predicates(result.input(0)));
        assert_eq!(vec!["t2.c2 > 2"], predicates(result.input(1)));
    }

    #[test]
    fn test_push_select_through_left_join() {
        let plan = join(JoinType::Left)
            .select(vec![
                gt(col("t1.c2"), lit(1i64)),
                gt(col("t2.c2"), lit(2i64)),
            ])
            .unwrap()
            .build();

        let result = apply_rule(PushSelectThroughJoinRule::new(), plan);
        assert_eq!(vec!["t2.c2 > 2"], predicates(&result));
        let join = result.input(0);
        assert_eq!(vec!["t1.c2 > 1"], predicates(join.input(0)));
        assert!(join.input(1).operator().as_base_table().is_some());
    }

    #[test]
    fn test_push_join_predicate_down() {
        let plan = RelBuilder::scan(table_t1())
            .join(
                RelBuilder::scan(table_t2()).build(),
                JoinType::Left,
                vec![
                    eq(col("t1.c1"), col("t2.c1")),
                    gt(col("t1.c2"), lit(1i64)),
                    gt(col("t2.c2"), lit(2i64)),
                ],
            )
            .unwrap()
            .build();

        let result = apply_rule(PushJoinPredicateDownRule::new(), plan.clone());
        assert_eq!(plan.schema(), result.schema());
        let join = result.operator().as_join().unwrap();
        assert_eq!(2, join.on().len());
        assert!(result.input(0).operator().as_base_table().is_some());
        assert_eq!(vec!["t2.c2 > 2"], predicates(result.input(1)));
    }

    #[test]
    fn test_push_select_into_union() {
        let branch = || {
            RelBuilder::scan(table_t2())
                .project(vec![col("t2.c1"), col("t2.c2")])
                .unwrap()
                .build()
        };
        let plan = RelBuilder::new(
            RelBuilder::scan(table_t1())
                .project(vec![col("t1.c1"), col("t1.c2")])
                .unwrap()
                .build(),
        )
        .union_all(branch())
        .unwrap()
        .select(vec![gt(col("t1.c2"), lit(3i64))])
        .unwrap()
        .build();

        let result = apply_rule(PushSelectIntoUnionRule::new(), plan.clone());
        assert_eq!(plan.schema(), result.schema());
        assert!(matches!(result.operator(), Operator::SetOp(_)));
        assert_eq!(vec!["t1.c2 > 3"], predicates(result.input(0)));
        assert_eq!(vec!["t2.c2 > 3"], predicates(result.input(1)));
    }

    #[test]
    fn test_push_select_through_project() {
        let plan = RelBuilder::scan(table_t1())
            .project(vec![
                col("t1.c2").alias("x"),
                volatile_func("rand", vec![], arrow_schema::DataType::Float64).alias("r"),
            ])
            .unwrap()
            .select(vec![gt(col("x"), lit(1i64)), gt(col("r"), lit(0.5f64))])
            .unwrap()
            .build();

        let result = apply_rule(PushSelectThroughProjectRule::new(), plan.clone());
        assert_eq!(plan.schema(), result.schema());
        assert_eq!(vec!["r > 0.5"], predicates(&result));
        let project = result.input(0);
        assert_eq!(vec!["t1.c2 > 1"], predicates(project.input(0)));
    }

    #[test]
    fn test_volatile_predicate_stays() {
        let plan = join(JoinType::Inner)
            .select(vec![gt(
                volatile_func("rand", vec![], arrow_schema::DataType::Float64),
                lit(0.5f64),
            )])
            .unwrap()
            .build();

        let result = apply_rule(PushSelectThroughJoinRule::new(), plan.clone());
        assert!(Arc::ptr_eq(&plan, &result));
    }
}
