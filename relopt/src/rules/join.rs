use datafusion_expr::JoinType;
use itertools::Itertools;
use log::trace;

use crate::error::OptResult;
use crate::expr::{column, ColumnRef, ExprKind, ScalarExpr};
use crate::operator::Operator::{BaseTable, GroupBy, Join, Project, Select};
use crate::plan::{RelRef, Schema};
use crate::properties::equi_join_columns;
use crate::rules::RuleId::{JoinToSemiJoin, OuterToInner, RemoveRedundantJoin};
use crate::rules::{any, pattern, Pattern, PatternBuilder, Rule, RuleContext, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref OUTER_TO_INNER_PATTERN: Pattern = {
        pattern(|op| matches!(op, Select(_)))
          .pattern(|op| matches!(op, Join(j) if !j.is_inner()))
            .leaf(any)
            .leaf(any)
          .finish()
        .finish()
    };
    static ref JOIN_TO_SEMI_JOIN_PATTERN: Pattern = {
        pattern(|op| matches!(op, Project(_) | GroupBy(_)))
          .pattern(|op| matches!(op, Join(j) if j.is_inner()))
            .leaf(any)
            .leaf(any)
          .finish()
        .finish()
    };
    static ref REMOVE_REDUNDANT_JOIN_PATTERN: Pattern = {
        pattern(|op| matches!(op, Join(j) if j.is_inner()))
          .leaf(|op| matches!(op, BaseTable(_)))
          .pattern(|op| matches!(op, Project(_)))
            .pattern(|op| matches!(op, Join(j) if j.is_inner()))
              .leaf(any)
              .leaf(any)
            .finish()
          .finish()
        .finish()
    };
}

/// Columns whose NULL makes `expr` NULL.
fn strict_columns(expr: &ScalarExpr) -> Vec<&ColumnRef> {
    match &expr.kind {
        ExprKind::Column(c) => vec![c],
        ExprKind::Binary(b) => strict_columns(&b.left)
            .into_iter()
            .chain(strict_columns(&b.right))
            .collect(),
        ExprKind::Convert(c) => strict_columns(&c.expr),
        _ => vec![],
    }
}

/// Whether `predicate` is never true when a column of `schema` is NULL.
fn rejects_nulls(predicate: &ScalarExpr, schema: &Schema) -> bool {
    let columns = match &predicate.kind {
        ExprKind::Compare(c) if !c.null_semantics => {
            let mut columns = strict_columns(&c.left);
            columns.extend(strict_columns(&c.right));
            if let Some(upper) = &c.upper {
                columns.extend(strict_columns(&upper.expr));
            }
            columns
        }
        ExprKind::InList(l) => strict_columns(&l.expr),
        _ => vec![],
    };
    columns.iter().any(|c| schema.contains(c))
}

/// Turns an outer join into an inner join (or a less outer join) when a selection above it
/// removes every row padded with NULLs.
#[derive(Clone, Default)]
pub struct OuterToInnerRule {}

impl OuterToInnerRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for OuterToInnerRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let join_rel = rel.input(0);
        let (select, join) = match (rel.operator(), join_rel.operator()) {
            (Select(select), Join(join)) => (select, join),
            _ => return Ok(rel),
        };
        if ctx.properties.is_shared(join_rel) {
            return Ok(rel);
        }

        let rejects = |schema: &Schema| select.predicates().iter().any(|p| rejects_nulls(p, schema));
        let left_rejected = rejects(join_rel.input(0).schema());
        let right_rejected = rejects(join_rel.input(1).schema());
        let join_type = match (join.join_type(), left_rejected, right_rejected) {
            (JoinType::Left, _, true) | (JoinType::Right, true, _) => JoinType::Inner,
            (JoinType::Full, true, true) => JoinType::Inner,
            (JoinType::Full, true, false) => JoinType::Left,
            (JoinType::Full, false, true) => JoinType::Right,
            _ => return Ok(rel),
        };

        trace!("{:?} join becomes {:?}", join.join_type(), join_type);
        let join_rel = join_rel
            .clone_with_operator(Join(join.clone().with_join_type(join_type)))?
            .into_ref();
        Ok(rel.clone_with_inputs([join_rel])?.into_ref())
    }

    fn pattern(&self) -> &Pattern {
        &OUTER_TO_INNER_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        OuterToInner
    }
}

/// Replaces an inner join by a semijoin when the parent only uses columns of one input and the
/// other input is unique on the equi-join columns.
#[derive(Clone, Default)]
pub struct JoinToSemiJoinRule {}

impl JoinToSemiJoinRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for JoinToSemiJoinRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let join_rel = rel.input(0);
        let join = match join_rel.operator() {
            Join(join) if join_rel.flags().is_empty() => join,
            _ => return Ok(rel),
        };
        if ctx.properties.is_shared(join_rel) {
            return Ok(rel);
        }

        let (left, right) = (join_rel.input(0), join_rel.input(1));
        let (left_cols, right_cols) = equi_join_columns(join.on(), left, right);
        if left_cols.is_empty() {
            return Ok(rel);
        }
        let used = rel
            .exprs()
            .into_iter()
            .flat_map(|e| e.columns())
            .collect::<Vec<_>>();
        let only_uses = |side: &RelRef| used.iter().all(|c| side.schema().contains(c));
        let unique_on = |side: &RelRef, cols: &[ColumnRef]| {
            ctx.properties
                .is_unique_on(side, &cols.iter().collect::<Vec<_>>())
        };

        let join_type = if only_uses(left) && unique_on(right, &right_cols) {
            JoinType::LeftSemi
        } else if only_uses(right) && unique_on(left, &left_cols) {
            JoinType::RightSemi
        } else {
            return Ok(rel);
        };

        trace!("Inner join becomes {:?}", join_type);
        let semi = join_rel
            .clone_with_operator(Join(join.clone().with_join_type(join_type)))?
            .into_ref();
        Ok(rel.clone_with_inputs([semi])?.into_ref())
    }

    fn pattern(&self) -> &Pattern {
        &JOIN_TO_SEMI_JOIN_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        JoinToSemiJoin
    }
}

/// Equality predicates as unordered column pairs, `None` if any predicate is not one.
fn equi_pairs(on: &[ScalarExpr]) -> Option<Vec<(ColumnRef, ColumnRef)>> {
    on.iter()
        .map(|p| {
            let (a, b) = p.as_compare()?.equi_columns()?;
            Some(if a <= b {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            })
        })
        .collect::<Option<Vec<_>>>()
        .map(|pairs| pairs.into_iter().sorted().dedup().collect())
}

/// Removes the inner join of `L join distinct project(L join P)` when both joins use the same
/// condition, projecting `P` directly.
#[derive(Clone, Default)]
pub struct RemoveRedundantJoinRule {}

impl RemoveRedundantJoinRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for RemoveRedundantJoinRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let (outer, base, project_rel) = match rel.operator() {
            Join(join) => (join, rel.input(0), rel.input(1)),
            _ => return Ok(rel),
        };
        let project = match project_rel.operator() {
            Project(p) if project_rel.is_distinct() && p.is_plain() => p,
            _ => return Ok(rel),
        };
        let inner_rel = project_rel.input(0);
        let inner = match inner_rel.operator() {
            Join(join) if inner_rel.flags().is_empty() => join,
            _ => return Ok(rel),
        };
        if ctx.properties.is_shared(project_rel) || ctx.properties.is_shared(inner_rel) {
            return Ok(rel);
        }
        let other = if inner_rel.input(0).operator() == base.operator() {
            inner_rel.input(1)
        } else if inner_rel.input(1).operator() == base.operator() {
            inner_rel.input(0)
        } else {
            return Ok(rel);
        };
        if !project
            .exprs()
            .iter()
            .flat_map(|e| e.columns())
            .all(|c| other.schema().contains(c))
        {
            return Ok(rel);
        }

        let project_schema = project_rel.schema();
        let through_project = outer
            .on()
            .iter()
            .map(|p| {
                p.rebind(&mut |c| match project_schema.index_of(c) {
                    Some(idx) => Ok(project.exprs()[idx].clone().without_alias()),
                    None => Ok(column(c.clone())),
                })
            })
            .collect::<OptResult<Vec<_>>>()?;
        let same_condition = match (equi_pairs(&through_project), equi_pairs(inner.on())) {
            (Some(a), Some(b)) => !a.is_empty() && a == b,
            _ => false,
        };
        if !same_condition {
            return Ok(rel);
        }

        trace!("Removing join below distinct projection");
        let project_rel = project_rel.clone_with_inputs([other.clone()])?.into_ref();
        Ok(rel.clone_with_inputs([base.clone(), project_rel])?.into_ref())
    }

    fn pattern(&self) -> &Pattern {
        &REMOVE_REDUNDANT_JOIN_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RemoveRedundantJoin
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use datafusion_expr::JoinType;

    use crate::expr::{col, count_star, eq, gt, lit};
    use crate::plan::RelBuilder;
    use crate::rules::{JoinToSemiJoinRule, OuterToInnerRule, RemoveRedundantJoinRule};
    use crate::test_utils::{apply_rule, table_t1, table_t2};

    fn outer_join(join_type: JoinType) -> RelBuilder {
        RelBuilder::scan(table_t1())
            .join(
                RelBuilder::scan(table_t2()).build(),
                join_type,
                vec![eq(col("t1.c1"), col("t2.c1"))],
            )
            .unwrap()
    }

    fn join_type(rel: &crate::plan::RelRef) -> JoinType {
        rel.operator().as_join().unwrap().join_type()
    }

    #[test]
    fn test_left_join_to_inner() {
        let plan = outer_join(JoinType::Left)
            .select(vec![gt(col("t2.c2"), lit(1i64))])
            .unwrap()
            .build();

        let result = apply_rule(OuterToInnerRule::new(), plan.clone());
        assert_eq!(JoinType::Inner, join_type(result.input(0)));
        assert_eq!(
            plan.schema().names_and_types(),
            result.schema().names_and_types()
        );
    }

    #[test]
    fn test_left_join_kept_for_preserved_side_predicate() {
        let plan = outer_join(JoinType::Left)
            .select(vec![gt(col("t1.c2"), lit(1i64))])
            .unwrap()
            .build();

        let result = apply_rule(OuterToInnerRule::new(), plan.clone());
        assert!(Arc::ptr_eq(&plan, &result));
    }

    #[test]
    fn test_full_join_to_left() {
        let plan = outer_join(JoinType::Full)
            .select(vec![gt(col("t1.c2"), lit(1i64))])
            .unwrap()
            .build();

        let result = apply_rule(OuterToInnerRule::new(), plan);
        assert_eq!(JoinType::Left, join_type(result.input(0)));
    }

    #[test]
    fn test_join_to_semi_join() {
        let distinct_side = RelBuilder::scan(table_t2())
            .project(vec![col("t2.c2")])
            .unwrap()
            .distinct()
            .build();
        let plan = RelBuilder::scan(table_t1())
            .inner_join(distinct_side, vec![eq(col("t1.c2"), col("t2.c2"))])
            .unwrap()
            .project(vec![col("t1.c1"), col("t1.c3")])
            .unwrap()
            .build();

        let result = apply_rule(JoinToSemiJoinRule::new(), plan.clone());
        assert_eq!(JoinType::LeftSemi, join_type(result.input(0)));
        assert_eq!(plan.schema(), result.schema());
    }

    #[test]
    fn test_no_semi_join_on_duplicates() {
        let plan = RelBuilder::scan(table_t1())
            .inner_join(
                RelBuilder::scan(table_t2()).build(),
                vec![eq(col("t1.c2"), col("t2.c2"))],
            )
            .unwrap()
            .group_by(vec![], vec![count_star().alias("n")])
            .unwrap()
            .build();

        let result = apply_rule(JoinToSemiJoinRule::new(), plan.clone());
        assert!(Arc::ptr_eq(&plan, &result));
    }

    #[test]
    fn test_remove_redundant_join() {
        let inner = RelBuilder::scan(table_t1())
            .inner_join(
                RelBuilder::scan(table_t2()).build(),
                vec![eq(col("t1.c2"), col("t2.c2"))],
            )
            .unwrap()
            .project(vec![col("t2.c2").alias("k")])
            .unwrap()
            .distinct()
            .build();
        let plan = RelBuilder::scan(table_t1())
            .inner_join(inner, vec![eq(col("t1.c2"), col("k"))])
            .unwrap()
            .build();

        let result = apply_rule(RemoveRedundantJoinRule::new(), plan.clone());
        assert_eq!(plan.schema(), result.schema());
        let project = result.input(1);
        assert!(project.is_distinct());
        assert!(project.input(0).operator().as_base_table().is_some());
    }
}
