use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};
use maplit::hashmap;
use relopt::catalog::{MemoryCatalog, TableDef};
use relopt::plan::{bfs_iter, RelRef};
use relopt::stat::{ColumnStatistics, TableStatistics};

pub fn create_table(name: &str, fields: Vec<Field>, primary_key: &[&str]) -> TableDef {
    TableDef::from_arrow_schema(name, &Schema::new(fields)).with_primary_key(primary_key)
}

/// Tables of the test catalog.
///
/// * `t1(c1 pk, c2, c3)` and `t2(c1 pk, c2)`, without statistics.
/// * `a(x pk, v)` of 1000 rows, `b(y, z)` of 10 rows and `c(w pk, u)` of 100 rows.
pub fn tables() -> HashMap<&'static str, TableDef> {
    hashmap! {
        "t1" => create_table("t1", vec![
                Field::new("c1", DataType::Int64, false),
                Field::new("c2", DataType::Int64, true),
                Field::new("c3", DataType::Utf8, true)], &["c1"]),
        "t2" => create_table("t2", vec![
                Field::new("c1", DataType::Int64, false),
                Field::new("c2", DataType::Int64, true)], &["c1"]),
        "a" => create_table("a", vec![
                Field::new("x", DataType::Int64, false),
                Field::new("v", DataType::Int64, true)], &["x"]),
        "b" => create_table("b", vec![
                Field::new("y", DataType::Int64, false),
                Field::new("z", DataType::Int64, true)], &[]),
        "c" => create_table("c", vec![
                Field::new("w", DataType::Int64, false),
                Field::new("u", DataType::Utf8, true)], &["w"]),
    }
}

pub fn catalog() -> Arc<MemoryCatalog> {
    let mut catalog = MemoryCatalog::new();
    for (_, table) in tables() {
        catalog.register_table(table);
    }
    catalog.register_statistics("a", TableStatistics::new(1000.0));
    catalog.register_statistics(
        "b",
        TableStatistics::new(10.0)
            .with_column("y", ColumnStatistics::default().with_distinct_count(10.0))
            .with_column("z", ColumnStatistics::default().with_distinct_count(5.0)),
    );
    catalog.register_statistics("c", TableStatistics::new(100.0));
    Arc::new(catalog)
}

pub fn table(name: &str) -> Arc<TableDef> {
    use relopt::catalog::Catalog;
    catalog().table(name).unwrap()
}

/// Nodes of `plan` satisfying `predicate`.
pub fn find_nodes<F: Fn(&RelRef) -> bool>(plan: &RelRef, predicate: F) -> Vec<RelRef> {
    bfs_iter(plan).filter(|rel| predicate(rel)).collect()
}
