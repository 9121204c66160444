use std::sync::Arc;

use arrow_schema::Schema;
use maplit::hashmap;

use crate::catalog::{Catalog, MemoryCatalog, TableDef};
use crate::expr::{col, eq};
use crate::optimizer::OptimizerContext;
use crate::plan::{RelBuilder, RelRef};
use crate::properties::{infer_properties, PropertyTable};
use crate::rules::{Rule, RuleContext, RuleImpl};
use crate::stat::{ColumnStatistics, TableStatistics};

const T1_SCHEMA: &str = r#"{
        "fields": [
            {
                "name": "c1",
                "nullable": false,
                "data_type": "Int64",
                "dict_id": 0,
                "dict_is_ordered": false,
                "metadata": {}
            },
            {
                "name": "c2",
                "nullable": true,
                "data_type": "Int64",
                "dict_id": 0,
                "dict_is_ordered": false,
                "metadata": {}
            },
            {
                "name": "c3",
                "nullable": true,
                "data_type": "Utf8",
                "dict_id": 0,
                "dict_is_ordered": false,
                "metadata": {}
            }
        ],
        "metadata": {}
    }"#;

const T2_SCHEMA: &str = r#"{
        "fields": [
            {
                "name": "c1",
                "nullable": false,
                "data_type": "Int64",
                "dict_id": 0,
                "dict_is_ordered": false,
                "metadata": {}
            },
            {
                "name": "c2",
                "nullable": true,
                "data_type": "Int64",
                "dict_id": 0,
                "dict_is_ordered": false,
                "metadata": {}
            }
        ],
        "metadata": {}
    }"#;

/// Two integer columns, the first one not null.
const PAIR_SCHEMA: &str = r#"{
        "fields": [
            {
                "name": "k",
                "nullable": false,
                "data_type": "Int64",
                "dict_id": 0,
                "dict_is_ordered": false,
                "metadata": {}
            },
            {
                "name": "v",
                "nullable": true,
                "data_type": "Int64",
                "dict_id": 0,
                "dict_is_ordered": false,
                "metadata": {}
            }
        ],
        "metadata": {}
    }"#;

pub fn table_from_schema(name: &str, json: &str) -> TableDef {
    let schema: Schema = serde_json::from_str(json).unwrap();
    TableDef::from_arrow_schema(name, &schema)
}

/// Renames the columns of `table`.
fn renamed(mut table: TableDef, names: &[&str]) -> TableDef {
    for (column, name) in table.columns.iter_mut().zip(names) {
        column.name = name.to_string();
    }
    table
}

/// `t1(c1 pk, c2, c3)`.
pub fn table_t1() -> Arc<TableDef> {
    Arc::new(table_from_schema("t1", T1_SCHEMA).with_primary_key(&["c1"]))
}

/// `t2(c1 pk, c2)`.
pub fn table_t2() -> Arc<TableDef> {
    Arc::new(table_from_schema("t2", T2_SCHEMA).with_primary_key(&["c1"]))
}

/// `a(x pk, v)`.
pub fn table_a() -> Arc<TableDef> {
    let table = renamed(table_from_schema("a", PAIR_SCHEMA), &["x", "v"]);
    Arc::new(table.with_primary_key(&["x"]))
}

/// `b(y, z)`, no key.
pub fn table_b() -> Arc<TableDef> {
    Arc::new(renamed(table_from_schema("b", PAIR_SCHEMA), &["y", "z"]))
}

/// `c(w pk, u)`.
pub fn table_c() -> Arc<TableDef> {
    let table = renamed(table_from_schema("c", PAIR_SCHEMA), &["w", "u"]);
    Arc::new(table.with_primary_key(&["w"]))
}

/// Catalog with `a` of 1000 rows, `b` of 10 rows and `c` of 100 rows.
pub fn chain_catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    for table in [table_t1(), table_t2(), table_a(), table_b(), table_c()] {
        catalog.register_table(table.as_ref().clone());
    }
    let rows = hashmap! {
        "a" => 1000.0,
        "c" => 100.0,
    };
    for (table, rows) in rows {
        catalog.register_statistics(table, TableStatistics::new(rows));
    }
    catalog.register_statistics(
        "b",
        TableStatistics::new(10.0)
            .with_column("y", ColumnStatistics::default().with_distinct_count(10.0))
            .with_column("z", ColumnStatistics::default().with_distinct_count(5.0)),
    );
    catalog
}

/// `(a join b on a.x = b.y) join c on b.z = c.w`.
pub fn chain_join() -> RelRef {
    RelBuilder::scan(table_a())
        .inner_join(
            RelBuilder::scan(table_b()).build(),
            vec![eq(col("a.x"), col("b.y"))],
        )
        .unwrap()
        .inner_join(
            RelBuilder::scan(table_c()).build(),
            vec![eq(col("b.z"), col("c.w"))],
        )
        .unwrap()
        .build()
}

/// Applies `rule` to the root of `plan` if its pattern matches, with properties of `plan`.
pub fn apply_rule<R: Into<RuleImpl>>(rule: R, plan: RelRef) -> RelRef {
    let properties = infer_properties(&plan, 64).unwrap();
    apply_rule_with(rule, plan, &properties)
}

/// Applies `rule` to the root of `plan` with the given properties.
pub fn apply_rule_with<R: Into<RuleImpl>>(
    rule: R,
    plan: RelRef,
    properties: &PropertyTable,
) -> RelRef {
    let mut optimizer = OptimizerContext::new(Arc::new(MemoryCatalog::new()));
    apply(rule.into(), plan, &mut optimizer, properties)
}

/// Applies `rule` to the root of `plan` with tables and statistics of `catalog`.
pub fn apply_rule_in<R: Into<RuleImpl>>(
    rule: R,
    plan: RelRef,
    catalog: Arc<dyn Catalog>,
) -> RelRef {
    let properties = infer_properties(&plan, 64).unwrap();
    let mut optimizer = OptimizerContext::new(catalog);
    apply(rule.into(), plan, &mut optimizer, &properties)
}

fn apply(
    rule: RuleImpl,
    plan: RelRef,
    optimizer: &mut OptimizerContext,
    properties: &PropertyTable,
) -> RelRef {
    if !rule.pattern().matches(&plan) {
        return plan;
    }
    let mut ctx = RuleContext::new(optimizer, properties);
    rule.apply(plan, &mut ctx).unwrap()
}
