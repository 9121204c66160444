use std::sync::Arc;

use datafusion_common::ScalarValue;
use datafusion_expr::JoinType;
use relopt::cost::{CostModel, Estimator};
use relopt::expr::{col, eq, lit, ColumnRef};
use relopt::join_order::{JoinCoster, JoinGraph, JoinTree, Memo};
use relopt::operator::Operator;
use relopt::optimize;
use relopt::plan::{RelBuilder, RelFlag, RelRef};
use relopt::properties::infer_properties;

use crate::utils::{catalog, find_nodes, table};

mod utils;

fn scan(name: &str) -> RelRef {
    RelBuilder::scan(table(name)).build()
}

#[test]
fn test_join_constants() {
    // a join b on a.x = b.y where a.x = 1
    let filtered = RelBuilder::new(scan("a"))
        .select(vec![eq(col("a.x"), lit(1i64))])
        .unwrap()
        .build();
    let join = RelBuilder::new(filtered)
        .inner_join(scan("b"), vec![eq(col("a.x"), col("b.y"))])
        .unwrap()
        .build();
    let properties = infer_properties(&join, 64).unwrap();
    let one = ScalarValue::Int64(Some(1));
    assert_eq!(Some(&one), properties.constant(&join, &ColumnRef::parse("a.x")));
    assert_eq!(Some(&one), properties.constant(&join, &ColumnRef::parse("b.y")));

    // Same query with the selection above the join.
    let select = RelBuilder::new(scan("a"))
        .inner_join(scan("b"), vec![eq(col("a.x"), col("b.y"))])
        .unwrap()
        .select(vec![eq(col("a.x"), lit(1i64))])
        .unwrap()
        .build();
    let plan = RelBuilder::new(select.clone())
        .project(vec![col("a.v"), col("b.y")])
        .unwrap()
        .build();
    let properties = infer_properties(&plan, 64).unwrap();
    assert_eq!(Some(&one), properties.constant(&select, &ColumnRef::parse("a.x")));
    assert_eq!(Some(&one), properties.constant(&select, &ColumnRef::parse("b.y")));
    assert_eq!(Some(&one), properties.constant(&plan, &ColumnRef::parse("b.y")));
    assert_eq!(None, properties.constant(select.input(0), &ColumnRef::parse("b.y")));

    // The constant replaces the column in the projection.
    let result = optimize(plan.clone(), catalog()).unwrap();
    assert_eq!(plan.schema().names_and_types(), result.schema().names_and_types());
    let exprs = result.operator().output_exprs().unwrap();
    assert_eq!(Some(&one), exprs[1].as_literal());
}

#[test]
fn test_join_order_no_worse_than_written() {
    let catalog = catalog();
    let plan = RelBuilder::new(scan("a"))
        .inner_join(scan("b"), vec![eq(col("a.x"), col("b.y"))])
        .unwrap()
        .inner_join(scan("c"), vec![eq(col("b.z"), col("c.w"))])
        .unwrap()
        .build();

    let properties = infer_properties(&plan, 64).unwrap();
    let estimator = Estimator::new(catalog.as_ref());
    let graph = JoinGraph::flatten(&plan, &properties, &estimator, 64)
        .unwrap()
        .unwrap();
    assert_eq!(3, graph.len());
    assert!(graph.is_connected());
    let coster = JoinCoster::new(&graph, &estimator, CostModel::default());
    let best = Memo::build(&coster, 64).best_tree(graph.all()).unwrap();
    let written = JoinTree::join(
        JoinTree::join(JoinTree::Leaf(0), JoinTree::Leaf(1)),
        JoinTree::Leaf(2),
    );
    assert!(coster.estimate_tree(&best).cost <= coster.estimate_tree(&written).cost);

    let result = optimize(plan.clone(), catalog).unwrap();
    assert_eq!(plan.schema().names_and_types(), result.schema().names_and_types());
    let joins = find_nodes(&result, |rel| matches!(rel.operator(), Operator::Join(_)));
    assert_eq!(2, joins.len());
    assert!(joins.iter().all(|j| j.has_flag(RelFlag::Processed)));
}

#[test]
fn test_distinct_over_group_by_dropped() {
    // SELECT DISTINCT c2 FROM t1 GROUP BY c2
    let plan = RelBuilder::new(scan("t1"))
        .group_by(vec![col("t1.c2")], vec![col("t1.c2")])
        .unwrap()
        .distinct()
        .build();
    let result = optimize(plan.clone(), catalog()).unwrap();
    assert!(find_nodes(&result, |rel| rel.is_distinct()).is_empty());
    assert_eq!(plan.schema().names_and_types(), result.schema().names_and_types());
}

#[test]
fn test_stacked_renames_merged() {
    let plan = RelBuilder::new(scan("t1"))
        .project(vec![col("t1.c1").alias("b")])
        .unwrap()
        .project(vec![col("b").alias("c")])
        .unwrap()
        .build();
    let result = optimize(plan.clone(), catalog()).unwrap();

    let exprs = result.operator().output_exprs().unwrap();
    assert_eq!(1, exprs.len());
    assert_eq!("t1.c1 AS c", exprs[0].to_string());
    assert!(result.input(0).operator().as_base_table().is_some());
}

#[test]
fn test_join_to_semi_join() {
    let distinct_side = RelBuilder::new(scan("t2"))
        .project(vec![col("t2.c2")])
        .unwrap()
        .distinct()
        .build();
    let plan = RelBuilder::new(scan("t1"))
        .inner_join(distinct_side, vec![eq(col("t1.c2"), col("t2.c2"))])
        .unwrap()
        .project(vec![col("t1.c1"), col("t1.c3")])
        .unwrap()
        .build();
    let result = optimize(plan.clone(), catalog()).unwrap();

    let semi_joins = find_nodes(&result, |rel| {
        matches!(rel.operator(), Operator::Join(j) if j.join_type() == JoinType::LeftSemi)
    });
    assert_eq!(1, semi_joins.len());
    assert_eq!(plan.schema().names_and_types(), result.schema().names_and_types());
}

#[test]
fn test_shared_subplan_stays_shared() {
    let shared = RelBuilder::new(scan("t1"))
        .select(vec![eq(col("t1.c2"), lit(3i64))])
        .unwrap()
        .build();
    let plan = RelBuilder::new(shared.clone())
        .union_all(shared)
        .unwrap()
        .build();
    let result = optimize(plan.clone(), Arc::new(relopt::catalog::MemoryCatalog::new())).unwrap();
    assert_eq!(plan.schema().names_and_types(), result.schema().names_and_types());
    assert!(Arc::ptr_eq(result.input(0), result.input(1)));
}
