use log::trace;

use crate::error::OptResult;
use crate::expr::{aggr, column, AggrCall, AggrFunc, ColumnRef, ExprKind, ScalarExpr};
use crate::operator::Operator::{GroupBy, SetOp};
use crate::operator::{self, Operator};
use crate::plan::{RelFlag, RelNode, RelRef};
use crate::rules::RuleId::{
    DistinctAggregateOnUnique, PushAggregateThroughUnion, RemoveRedundantDistinct,
    SplitDistinctAggregate,
};
use crate::rules::{any, pattern, pin_names, rebuild, Pattern, PatternBuilder, Rule, RuleContext, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref REMOVE_REDUNDANT_DISTINCT_PATTERN: Pattern = {
        pattern(any)
        .finish()
    };
    static ref DISTINCT_AGGREGATE_ON_UNIQUE_PATTERN: Pattern = {
        pattern(|op| matches!(op, GroupBy(_)))
          .leaf(any)
        .finish()
    };
    static ref PUSH_AGGREGATE_THROUGH_UNION_PATTERN: Pattern = {
        pattern(|op| matches!(op, GroupBy(_)))
          .leaf(|op| matches!(op, SetOp(s) if s.is_union_all()))
        .finish()
    };
    static ref SPLIT_DISTINCT_AGGREGATE_PATTERN: Pattern = {
        pattern(|op| matches!(op, GroupBy(_)))
          .leaf(any)
        .finish()
    };
}

fn plain_columns(exprs: &[ScalarExpr]) -> Option<Vec<&ColumnRef>> {
    exprs.iter().map(|e| e.as_column()).collect()
}

/// Single plain column argument of an aggregate call.
fn single_column(call: &AggrCall) -> Option<&ColumnRef> {
    match call.args.as_slice() {
        [arg] => arg.as_column(),
        _ => None,
    }
}

/// Clears the distinct flag of nodes whose output is already free of duplicates.
#[derive(Clone, Default)]
pub struct RemoveRedundantDistinctRule {}

impl RemoveRedundantDistinctRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl RemoveRedundantDistinctRule {
    fn is_redundant(rel: &RelRef, ctx: &RuleContext) -> bool {
        if rel.is_single_row() {
            return true;
        }
        let props = ctx.properties;
        match rel.operator() {
            Operator::BaseTable(scan) => !scan.table().keys().is_empty(),
            Operator::Project(project) => {
                let columns = project
                    .exprs()
                    .iter()
                    .filter_map(|e| e.as_column())
                    .collect::<Vec<_>>();
                props.is_unique_on(rel.input(0), &columns)
            }
            Operator::GroupBy(group_by) => match plain_columns(group_by.keys()) {
                Some(keys) => keys.iter().all(|key| {
                    group_by
                        .exprs()
                        .iter()
                        .any(|e| e.as_column() == Some(*key))
                }),
                None => false,
            },
            Operator::Select(_) | Operator::TopN(_) | Operator::Sample(_) => {
                let input = rel.input(0);
                props.is_unique_on(input, &input.schema().column_refs().iter().collect::<Vec<_>>())
            }
            Operator::SetOp(set_op) => !set_op.all(),
            _ => false,
        }
    }
}

impl Rule for RemoveRedundantDistinctRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        if !rel.is_distinct() || !Self::is_redundant(&rel, ctx) {
            return Ok(rel);
        }
        trace!("Dropping distinct of {}", rel.operator().as_ref());
        Ok((*rel).clone().without_flag(RelFlag::Distinct).into_ref())
    }

    fn pattern(&self) -> &Pattern {
        &REMOVE_REDUNDANT_DISTINCT_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        RemoveRedundantDistinct
    }
}

/// Clears the distinct flag of `agg(DISTINCT c)` when the values of `c` are unique within each
/// group, or when the aggregate ignores duplicates anyway.
#[derive(Clone, Default)]
pub struct DistinctAggregateOnUniqueRule {}

impl DistinctAggregateOnUniqueRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for DistinctAggregateOnUniqueRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let group_by = match rel.operator() {
            GroupBy(group_by) => group_by,
            _ => return Ok(rel),
        };
        let input = rel.input(0);
        let keys = plain_columns(group_by.keys());

        let mut exprs = group_by.exprs().to_vec();
        let mut changed = false;
        for expr in exprs.iter_mut() {
            if let ExprKind::Aggr(call) = &mut expr.kind {
                if !call.distinct {
                    continue;
                }
                let duplicate_insensitive = matches!(call.func, AggrFunc::Min | AggrFunc::Max);
                let unique = match (&keys, single_column(call)) {
                    (Some(keys), Some(arg)) => {
                        let mut columns = keys.clone();
                        columns.push(arg);
                        ctx.properties.is_unique_on(input, &columns)
                    }
                    _ => false,
                };
                if duplicate_insensitive || unique {
                    call.distinct = false;
                    changed = true;
                }
            }
        }
        if !changed {
            return Ok(rel);
        }
        let group_by = operator::GroupBy::new(group_by.keys().to_vec(), exprs);
        rebuild(&rel, GroupBy(group_by), [input.clone()])
    }

    fn pattern(&self) -> &Pattern {
        &DISTINCT_AGGREGATE_ON_UNIQUE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        DistinctAggregateOnUnique
    }
}

/// Function combining partial results of `func` computed per union branch.
fn second_phase(func: AggrFunc) -> Option<AggrFunc> {
    match func {
        AggrFunc::Count | AggrFunc::Sum => Some(AggrFunc::Sum),
        AggrFunc::Min => Some(AggrFunc::Min),
        AggrFunc::Max => Some(AggrFunc::Max),
        AggrFunc::Avg => None,
    }
}

/// Aggregates each branch of a union before the union, and combines the partial results in a
/// second aggregation above it.
#[derive(Clone, Default)]
pub struct PushAggregateThroughUnionRule {}

impl PushAggregateThroughUnionRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for PushAggregateThroughUnionRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let union = rel.input(0);
        let group_by = match rel.operator() {
            GroupBy(group_by) => group_by,
            _ => return Ok(rel),
        };
        let keys = match plain_columns(group_by.keys()) {
            Some(keys) => keys,
            None => return Ok(rel),
        };
        let splittable = |expr: &ScalarExpr| match &expr.kind {
            ExprKind::Column(c) => keys.contains(&c),
            ExprKind::Aggr(call) => {
                !call.distinct
                    && second_phase(call.func).is_some()
                    && call.args.iter().all(|a| a.as_column().is_some())
            }
            _ => false,
        };
        let applicable = union.flags().is_empty()
            && !ctx.properties.is_shared(union)
            && group_by.exprs().iter().all(splittable)
            && union.inputs().iter().all(|branch| {
                !matches!(branch.operator(), GroupBy(_)) && branch.schema().has_unique_names()
            });
        if !applicable {
            return Ok(rel);
        }

        let key_labels = keys.iter().map(|_| ctx.fresh_column()).collect::<Vec<_>>();
        let aggr_labels = group_by
            .exprs()
            .iter()
            .map(|e| e.as_aggr().map(|_| ctx.fresh_column()))
            .collect::<Vec<_>>();

        let union_schema = union.schema();
        let branches = union
            .inputs()
            .iter()
            .map(|branch| {
                let mut to_branch = |c: &ColumnRef| -> OptResult<ScalarExpr> {
                    let idx = union_schema.resolve(c)?;
                    Ok(column(branch.schema().field(idx).column_ref()))
                };
                let branch_keys = keys
                    .iter()
                    .map(|k| to_branch(k))
                    .collect::<OptResult<Vec<_>>>()?;
                let mut exprs = branch_keys
                    .iter()
                    .zip(&key_labels)
                    .map(|(k, label)| k.clone().alias(label.clone()))
                    .collect::<Vec<_>>();
                for (expr, label) in group_by.exprs().iter().zip(&aggr_labels) {
                    if let Some(label) = label {
                        exprs.push(expr.rebind(&mut to_branch)?.alias(label.clone()));
                    }
                }
                let partial = operator::GroupBy::new(branch_keys, exprs);
                Ok(RelNode::new(GroupBy(partial), [branch.clone()])?.into_ref())
            })
            .collect::<OptResult<Vec<_>>>()?;
        let union = union.clone_with_inputs(branches)?.into_ref();

        let mut exprs = vec![];
        for (expr, label) in group_by.exprs().iter().zip(&aggr_labels) {
            match (label, expr.as_aggr()) {
                (Some(label), Some(call)) => {
                    let func = second_phase(call.func).unwrap_or(call.func);
                    exprs.push(aggr(func, vec![column(label.clone())], false));
                }
                _ => {
                    let idx = keys
                        .iter()
                        .position(|k| Some(*k) == expr.as_column())
                        .unwrap_or_default();
                    exprs.push(column(key_labels[idx].clone()));
                }
            }
        }
        let final_keys = key_labels.into_iter().map(column).collect();
        let combined = operator::GroupBy::new(final_keys, pin_names(exprs, rel.schema()));
        rebuild(&rel, GroupBy(combined), [union])
    }

    fn pattern(&self) -> &Pattern {
        &PUSH_AGGREGATE_THROUGH_UNION_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        PushAggregateThroughUnion
    }
}

/// Rewrites a grouping with one `agg(DISTINCT c)` into a grouping on the keys and `c`, followed
/// by a grouping on the keys applying `agg(c)`.
#[derive(Clone, Default)]
pub struct SplitDistinctAggregateRule {}

impl SplitDistinctAggregateRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for SplitDistinctAggregateRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let group_by = match rel.operator() {
            GroupBy(group_by) => group_by,
            _ => return Ok(rel),
        };
        let keys = match plain_columns(group_by.keys()) {
            Some(keys) => keys,
            None => return Ok(rel),
        };
        let distinct = group_by
            .aggregates()
            .filter(|call| call.distinct)
            .collect::<Vec<_>>();
        let arg = match distinct.as_slice() {
            [call] if matches!(call.func, AggrFunc::Count | AggrFunc::Sum | AggrFunc::Avg) => {
                match single_column(call) {
                    Some(arg) if !keys.contains(&arg) => arg,
                    _ => return Ok(rel),
                }
            }
            _ => return Ok(rel),
        };
        let splittable = group_by.exprs().iter().all(|e| match &e.kind {
            ExprKind::Column(c) => keys.contains(&c),
            ExprKind::Aggr(call) if call.distinct => true,
            ExprKind::Aggr(call) => {
                matches!(call.func, AggrFunc::Min | AggrFunc::Max) && single_column(call).is_some()
            }
            _ => false,
        });
        if !splittable {
            return Ok(rel);
        }

        let mut inner_keys = group_by.keys().to_vec();
        inner_keys.push(column(arg.clone()));
        let mut inner_exprs = inner_keys.clone();
        let mut outer_exprs = vec![];
        for expr in group_by.exprs() {
            match &expr.kind {
                ExprKind::Aggr(call) if call.distinct => {
                    outer_exprs.push(aggr(call.func, vec![column(arg.clone())], false));
                }
                ExprKind::Aggr(call) => {
                    let label = ctx.fresh_column();
                    inner_exprs.push(expr.clone().without_alias().alias(label.clone()));
                    outer_exprs.push(aggr(call.func, vec![column(label)], false));
                }
                _ => outer_exprs.push(expr.clone()),
            }
        }

        let inner = RelNode::new(
            GroupBy(operator::GroupBy::new(inner_keys, inner_exprs)),
            [rel.input(0).clone()],
        )?
        .into_ref();
        let outer = operator::GroupBy::new(
            group_by.keys().to_vec(),
            pin_names(outer_exprs, rel.schema()),
        );
        rebuild(&rel, GroupBy(outer), [inner])
    }

    fn pattern(&self) -> &Pattern {
        &SPLIT_DISTINCT_AGGREGATE_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        SplitDistinctAggregate
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::expr::{col, count, count_distinct, count_star, max, min, sum};
    use crate::operator::Operator;
    use crate::plan::RelBuilder;
    use crate::rules::{
        DistinctAggregateOnUniqueRule, PushAggregateThroughUnionRule,
        RemoveRedundantDistinctRule, SplitDistinctAggregateRule,
    };
    use crate::test_utils::{apply_rule, table_t1, table_t2};

    #[test]
    fn test_distinct_over_group_by() {
        let plan = RelBuilder::scan(table_t1())
            .group_by(vec![col("t1.c2")], vec![col("t1.c2")])
            .unwrap()
            .distinct()
            .build();

        let result = apply_rule(RemoveRedundantDistinctRule::new(), plan.clone());
        assert!(!result.is_distinct());
        assert_eq!(plan.schema(), result.schema());
    }

    #[test]
    fn test_distinct_project_over_key() {
        let plan = RelBuilder::scan(table_t1())
            .project(vec![col("t1.c1"), col("t1.c3")])
            .unwrap()
            .distinct()
            .build();
        let result = apply_rule(RemoveRedundantDistinctRule::new(), plan);
        assert!(!result.is_distinct());

        let plan = RelBuilder::scan(table_t1())
            .project(vec![col("t1.c2")])
            .unwrap()
            .distinct()
            .build();
        let result = apply_rule(RemoveRedundantDistinctRule::new(), plan.clone());
        assert!(Arc::ptr_eq(&plan, &result));
    }

    #[test]
    fn test_distinct_aggregate_on_unique() {
        let plan = RelBuilder::scan(table_t1())
            .group_by(
                vec![],
                vec![
                    count_distinct(col("t1.c1")).alias("a"),
                    count_distinct(col("t1.c2")).alias("b"),
                ],
            )
            .unwrap()
            .build();

        let result = apply_rule(DistinctAggregateOnUniqueRule::new(), plan.clone());
        let group_by = result.operator().as_group_by().unwrap();
        let distinct = group_by.aggregates().map(|a| a.distinct).collect::<Vec<_>>();
        assert_eq!(vec![false, true], distinct);
        assert_eq!(plan.schema(), result.schema());
    }

    #[test]
    fn test_push_aggregate_through_union() {
        let branch = |t| {
            RelBuilder::scan(t)
                .project(vec![col("c1"), col("c2")])
                .unwrap()
                .build()
        };
        let plan = RelBuilder::new(branch(table_t1()))
            .union_all(branch(table_t2()))
            .unwrap()
            .group_by(
                vec![col("t1.c2")],
                vec![
                    col("t1.c2"),
                    count_star().alias("n"),
                    sum(col("t1.c1")).alias("s"),
                    max(col("t1.c1")).alias("m"),
                ],
            )
            .unwrap()
            .build();

        let result = apply_rule(PushAggregateThroughUnionRule::new(), plan.clone());
        assert_eq!(
            plan.schema().names_and_types(),
            result.schema().names_and_types()
        );
        let outer = result.operator().as_group_by().unwrap();
        let funcs = outer
            .aggregates()
            .map(|a| a.func.to_string())
            .collect::<Vec<_>>();
        assert_eq!(vec!["sum", "sum", "max"], funcs);

        let union = result.input(0);
        assert!(matches!(union.operator(), Operator::SetOp(_)));
        assert!(union
            .inputs()
            .iter()
            .all(|b| matches!(b.operator(), Operator::GroupBy(_))));
    }

    #[test]
    fn test_split_distinct_aggregate() {
        let plan = RelBuilder::scan(table_t1())
            .group_by(
                vec![col("t1.c3")],
                vec![
                    col("t1.c3"),
                    count_distinct(col("t1.c2")).alias("n"),
                    min(col("t1.c1")).alias("lo"),
                ],
            )
            .unwrap()
            .build();

        let result = apply_rule(SplitDistinctAggregateRule::new(), plan.clone());
        assert_eq!(
            plan.schema().names_and_types(),
            result.schema().names_and_types()
        );
        let outer = result.operator().as_group_by().unwrap();
        assert!(outer.aggregates().all(|a| !a.distinct));
        let inner = result.input(0).operator().as_group_by().unwrap();
        assert_eq!(2, inner.keys().len());
    }

    #[test]
    fn test_no_split_with_sensitive_aggregate() {
        let plan = RelBuilder::scan(table_t1())
            .group_by(
                vec![],
                vec![
                    count_distinct(col("t1.c2")).alias("n"),
                    count(col("t1.c1")).alias("m"),
                ],
            )
            .unwrap()
            .build();

        let result = apply_rule(SplitDistinctAggregateRule::new(), plan.clone());
        assert!(Arc::ptr_eq(&plan, &result));
    }
}
