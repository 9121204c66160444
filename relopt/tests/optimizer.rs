use std::sync::Arc;

use datafusion_expr::{JoinType, Operator as ArithOp};
use relopt::expr::{binary, col, count_distinct, eq, gt, lit, max};
use relopt::operator::Operator;
use relopt::plan::explain::explain_to_string;
use relopt::plan::{RelBuilder, RelRef};
use relopt::rules::RuleId;
use relopt::{optimize, Optimizer, OptimizerConfig, OptimizerContext, OptimizerError};

use crate::utils::{catalog, find_nodes, table};

mod utils;

fn scan(name: &str) -> RelRef {
    RelBuilder::scan(table(name)).build()
}

/// Plans touching most rewrite passes.
fn plans() -> Vec<RelRef> {
    let outer_join = RelBuilder::new(scan("t1"))
        .join(scan("t2"), JoinType::Left, vec![eq(col("t1.c1"), col("t2.c1"))])
        .unwrap()
        .select(vec![gt(col("t2.c2"), lit(1i64))])
        .unwrap()
        .project(vec![
            col("t1.c1"),
            binary(col("t2.c2"), ArithOp::Plus, lit(0i64)).alias("p"),
        ])
        .unwrap()
        .build();
    let aggregate = RelBuilder::new(scan("t1"))
        .group_by(
            vec![col("t1.c3")],
            vec![
                col("t1.c3"),
                count_distinct(col("t1.c2")).alias("n"),
                max(col("t1.c1")).alias("m"),
            ],
        )
        .unwrap()
        .build();
    let union = RelBuilder::new(scan("t2"))
        .union_all(scan("t2"))
        .unwrap()
        .union_all(scan("t2"))
        .unwrap()
        .select(vec![eq(col("t2.c2"), lit(4i64))])
        .unwrap()
        .build();
    let chain = RelBuilder::new(scan("a"))
        .inner_join(scan("b"), vec![eq(col("a.x"), col("b.y"))])
        .unwrap()
        .inner_join(scan("c"), vec![eq(col("b.z"), col("c.w"))])
        .unwrap()
        .select(vec![gt(col("c.u"), lit("m"))])
        .unwrap()
        .project(vec![col("a.v"), col("c.u")])
        .unwrap()
        .build();
    vec![outer_join, aggregate, union, chain]
}

#[test]
fn test_schema_preserved() {
    for plan in plans() {
        let result = optimize(plan.clone(), catalog()).unwrap();
        assert_eq!(
            plan.schema().names_and_types(),
            result.schema().names_and_types(),
            "{}",
            explain_to_string(&result).unwrap()
        );
    }
}

#[test]
fn test_idempotent() {
    for plan in plans() {
        let once = optimize(plan, catalog()).unwrap();
        let twice = optimize(once.clone(), catalog()).unwrap();
        assert_eq!(
            explain_to_string(&once).unwrap(),
            explain_to_string(&twice).unwrap()
        );
    }
}

#[test]
fn test_report() {
    let plan = plans().remove(0);
    let ctx = OptimizerContext::new(catalog());
    let (_, report) = Optimizer::new(ctx).optimize_with_report(plan).unwrap();
    assert!(report.cycles >= 2);
    assert!(report.total_changes() > 0);
    assert!(report.pass_changes.iter().any(|(name, _)| *name == "join order"));
}

#[test]
fn test_disabled_rule() {
    let plan = RelBuilder::new(scan("t1"))
        .project(vec![col("t1.c1").alias("b")])
        .unwrap()
        .project(vec![col("b").alias("c")])
        .unwrap()
        .build();
    let config = OptimizerConfig::default().with_disabled_rule(RuleId::MergeProjects);
    let ctx = OptimizerContext::new(catalog()).with_config(config);
    let result = Optimizer::new(ctx).optimize(plan).unwrap();

    let projects = find_nodes(&result, |rel| matches!(rel.operator(), Operator::Project(_)));
    assert_eq!(2, projects.len());
}

#[test]
fn test_depth_exceeded() {
    let mut builder = RelBuilder::new(scan("t1"));
    for i in 0..20 {
        builder = builder.select(vec![gt(col("t1.c2"), lit(i as i64))]).unwrap();
    }
    let config = OptimizerConfig::default().with_max_depth(8);
    let ctx = OptimizerContext::new(catalog()).with_config(config);
    let err = Optimizer::new(ctx).optimize(builder.build()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<OptimizerError>(),
        Some(OptimizerError::DepthExceeded { limit: 8, .. })
    ));
}

#[test]
fn test_trivial_plan_untouched() {
    let plan = RelBuilder::values(
        vec![relopt::plan::Field::new(None, "x", arrow_schema::DataType::Int64, false)],
        vec![vec![lit(1i64)]],
    )
    .unwrap()
    .build();
    let result = optimize(plan.clone(), catalog()).unwrap();
    assert!(Arc::ptr_eq(&plan, &result));
}
