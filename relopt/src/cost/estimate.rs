use arrow_schema::DataType;
use datafusion_common::ScalarValue;
use datafusion_expr::JoinType;

use crate::catalog::Catalog;
use crate::expr::{scalar_to_f64, ColumnRef, Compare, CompareOp, ExprKind, ScalarExpr};
use crate::operator::{Operator, SetOpKind};
use crate::plan::{RelRef, Schema};
use crate::stat::{ColumnStatistics, TableStatistics};

/// Rows of a table without statistics.
pub const DEFAULT_ROW_COUNT: f64 = 1000.0;
/// Selectivity of predicates nothing is known about.
pub const DEFAULT_SELECTIVITY: f64 = 0.1;
pub const MIN_SELECTIVITY: f64 = 1e-6;

/// Statistics of a base table column an expression column traces back to.
pub struct ColumnOrigin<'a> {
    pub table: Option<&'a TableStatistics>,
    pub column: Option<&'a ColumnStatistics>,
    /// Whether the column alone is a key of its table.
    pub is_key: bool,
}

/// Cardinality and selectivity estimation over catalog statistics.
pub struct Estimator<'a> {
    catalog: &'a dyn Catalog,
}

impl<'a> Estimator<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog }
    }

    /// Follows `column` down through column preserving operators to a base table.
    pub fn column_origin(&self, rel: &RelRef, column: &ColumnRef) -> Option<ColumnOrigin<'a>> {
        let mut rel = rel.clone();
        let mut column = column.clone();
        loop {
            let idx = rel.schema().index_of(&column)?;
            let next = match rel.operator() {
                Operator::BaseTable(scan) => {
                    let table = scan.table();
                    let name = rel.schema().field(idx).name.clone();
                    let stats = self.catalog.statistics(&table.name);
                    return Some(ColumnOrigin {
                        table: stats,
                        column: stats.and_then(|s| s.column(&name)),
                        is_key: table.is_unique_on(&[name.as_str()]),
                    });
                }
                Operator::Project(_) | Operator::GroupBy(_) => {
                    let expr = rel.operator().output_exprs()?.get(idx)?;
                    (rel.input(0).clone(), expr.as_column()?.clone())
                }
                Operator::Join(_) => {
                    let left_len = rel.input(0).schema().len();
                    let side = match rel.operator().as_join()?.output_sides() {
                        (true, true) if idx >= left_len => 1,
                        (false, true) => 1,
                        _ => 0,
                    };
                    let field = rel.schema().field(idx).column_ref();
                    (rel.input(side).clone(), field)
                }
                Operator::Select(_) | Operator::TopN(_) | Operator::Sample(_) => {
                    (rel.input(0).clone(), column.clone())
                }
                Operator::SetOp(_) => {
                    let input = rel.input(0).clone();
                    let field = input.schema().field(idx).column_ref();
                    (input, field)
                }
                _ => return None,
            };
            rel = next.0;
            column = next.1;
        }
    }

    fn distinct_count(&self, inputs: &[&RelRef], column: &ColumnRef) -> Option<f64> {
        let origin = self.origin_in(inputs, column)?;
        if origin.is_key {
            return origin.table.map(|t| t.row_count);
        }
        origin.column?.distinct_count.filter(|n| *n > 0.0)
    }

    fn origin_in(&self, inputs: &[&RelRef], column: &ColumnRef) -> Option<ColumnOrigin<'a>> {
        inputs
            .iter()
            .find(|rel| rel.schema().contains(column))
            .and_then(|rel| self.column_origin(rel, column))
    }

    /// Estimated number of output rows of `rel`.
    pub fn row_count(&self, rel: &RelRef) -> f64 {
        if rel.is_single_row() {
            return 1.0;
        }
        let rows = match rel.operator() {
            Operator::BaseTable(scan) => self
                .catalog
                .statistics(&scan.table().name)
                .map_or(DEFAULT_ROW_COUNT, |s| s.row_count),
            Operator::Values(values) => values.rows().len() as f64,
            Operator::Select(select) => {
                let input = rel.input(0);
                self.row_count(input) * self.conjunction_selectivity(select.predicates(), &[input])
            }
            Operator::Project(_) => self.row_count(rel.input(0)),
            Operator::Sample(sample) => self.row_count(rel.input(0)).min(sample.rows() as f64),
            Operator::TopN(top_n) => {
                let input = self.row_count(rel.input(0));
                top_n.limit().map_or(input, |limit| input.min(limit as f64))
            }
            Operator::GroupBy(group_by) => {
                let input = rel.input(0);
                let groups = group_by
                    .keys()
                    .iter()
                    .map(|key| {
                        key.as_column()
                            .and_then(|c| self.distinct_count(&[input], c))
                            .unwrap_or(DEFAULT_ROW_COUNT * DEFAULT_SELECTIVITY)
                    })
                    .product::<f64>();
                groups.min(self.row_count(input))
            }
            Operator::Join(join) => {
                let (left, right) = (rel.input(0), rel.input(1));
                let (l, r) = (self.row_count(left), self.row_count(right));
                let joined = l * r * self.conjunction_selectivity(join.on(), &[left, right]);
                match join.join_type() {
                    JoinType::Inner => joined,
                    JoinType::Left => joined.max(l),
                    JoinType::Right => joined.max(r),
                    JoinType::Full => joined.max(l).max(r),
                    JoinType::LeftSemi | JoinType::LeftAnti => l,
                    JoinType::RightSemi | JoinType::RightAnti => r,
                }
            }
            Operator::SetOp(set_op) => {
                let mut inputs = rel.inputs().iter().map(|input| self.row_count(input));
                match set_op.kind() {
                    SetOpKind::Union => inputs.sum(),
                    SetOpKind::Intersect => inputs.fold(f64::INFINITY, f64::min),
                    SetOpKind::Except => inputs.next().unwrap_or(0.0),
                }
            }
            _ => DEFAULT_ROW_COUNT,
        };
        rows.max(1.0)
    }

    /// Estimated row width in bytes of the output of `rel`.
    pub fn row_width(&self, rel: &RelRef) -> f64 {
        rel.schema()
            .fields()
            .iter()
            .map(|field| {
                self.column_origin(rel, &field.column_ref())
                    .and_then(|origin| origin.column?.avg_width)
                    .unwrap_or_else(|| type_width(&field.data_type))
            })
            .sum()
    }

    pub fn conjunction_selectivity(&self, predicates: &[ScalarExpr], inputs: &[&RelRef]) -> f64 {
        predicates
            .iter()
            .map(|p| self.selectivity(p, inputs))
            .product::<f64>()
            .clamp(MIN_SELECTIVITY, 1.0)
    }

    /// Fraction of rows of `inputs` expected to satisfy `predicate`.
    pub fn selectivity(&self, predicate: &ScalarExpr, inputs: &[&RelRef]) -> f64 {
        let selectivity = match &predicate.kind {
            ExprKind::Literal(ScalarValue::Boolean(Some(true))) => 1.0,
            ExprKind::Literal(_) => MIN_SELECTIVITY,
            ExprKind::Compare(compare) => {
                let s = self.compare_selectivity(compare, inputs);
                if compare.anti {
                    1.0 - s
                } else {
                    s
                }
            }
            ExprKind::InList(in_list) => {
                let s = in_list
                    .expr
                    .as_column()
                    .and_then(|c| self.distinct_count(inputs, c))
                    .map_or(DEFAULT_SELECTIVITY, |ndv| in_list.list.len() as f64 / ndv);
                if in_list.anti {
                    1.0 - s.min(1.0)
                } else {
                    s
                }
            }
            ExprKind::And(list) => list.iter().map(|p| self.selectivity(p, inputs)).product(),
            ExprKind::Or(list) => {
                1.0 - list
                    .iter()
                    .map(|p| 1.0 - self.selectivity(p, inputs))
                    .product::<f64>()
            }
            ExprKind::Not(inner) => 1.0 - self.selectivity(inner, inputs),
            _ => DEFAULT_SELECTIVITY,
        };
        selectivity.clamp(MIN_SELECTIVITY, 1.0)
    }

    fn compare_selectivity(&self, compare: &Compare, inputs: &[&RelRef]) -> f64 {
        // Column on the left.
        let (column, op, value) = match (compare.left.as_column(), compare.right.as_column()) {
            (Some(l), Some(r)) if compare.op == CompareOp::Eq => {
                return self.equi_join_selectivity(l, r, inputs);
            }
            (Some(c), _) => (c, compare.op, &compare.right),
            (None, Some(c)) if compare.upper.is_none() => (c, compare.op.swap(), &compare.left),
            _ => return DEFAULT_SELECTIVITY,
        };

        match op {
            CompareOp::Eq => self
                .distinct_count(inputs, column)
                .map_or(DEFAULT_SELECTIVITY, |ndv| 1.0 / ndv),
            CompareOp::NotEq => self
                .distinct_count(inputs, column)
                .map_or(1.0 - DEFAULT_SELECTIVITY, |ndv| 1.0 - 1.0 / ndv),
            _ => {
                let bounds = self
                    .origin_in(inputs, column)
                    .and_then(|origin| origin.column)
                    .and_then(|stats| {
                        Some((
                            scalar_to_f64(stats.min.as_ref()?)?,
                            scalar_to_f64(stats.max.as_ref()?)?,
                        ))
                    })
                    .filter(|(min, max)| max > min);
                let bound = |op: CompareOp, expr: &ScalarExpr| {
                    let (min, max) = bounds?;
                    let v = scalar_to_f64(expr.as_literal()?)?;
                    Some(if op.is_lower_bound() {
                        (max - v) / (max - min)
                    } else {
                        (v - min) / (max - min)
                    })
                };
                match &compare.upper {
                    Some(upper) => match (bound(op, value), bound(upper.op, &upper.expr)) {
                        (Some(low), Some(high)) => low + high - 1.0,
                        _ => 0.25,
                    },
                    None => bound(op, value).unwrap_or(0.5),
                }
            }
        }
    }

    fn equi_join_selectivity(
        &self,
        left: &ColumnRef,
        right: &ColumnRef,
        inputs: &[&RelRef],
    ) -> f64 {
        let origins = [self.origin_in(inputs, left), self.origin_in(inputs, right)];
        for origin in origins.iter().flatten() {
            if let (true, Some(table)) = (origin.is_key, origin.table) {
                return 1.0 / table.row_count.max(1.0);
            }
        }
        [left, right]
            .iter()
            .filter_map(|c| self.distinct_count(inputs, c))
            .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.max(n))))
            .map_or(DEFAULT_SELECTIVITY, |ndv| 1.0 / ndv)
    }

    /// Whether `left = right` matches a key of one side.
    pub fn is_key_join(&self, left: &ColumnRef, right: &ColumnRef, inputs: &[&RelRef]) -> bool {
        [left, right]
            .iter()
            .filter_map(|c| self.origin_in(inputs, c))
            .any(|origin| origin.is_key)
    }
}

pub fn type_width(data_type: &DataType) -> f64 {
    match data_type {
        DataType::Null => 0.0,
        DataType::Boolean | DataType::Int8 | DataType::UInt8 => 1.0,
        DataType::Int16 | DataType::UInt16 | DataType::Float16 => 2.0,
        DataType::Int32 | DataType::UInt32 | DataType::Float32 | DataType::Date32 => 4.0,
        DataType::Decimal128(_, _) => 16.0,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Binary | DataType::LargeBinary => 16.0,
        _ => 8.0,
    }
}

/// Row width of `schema` from column types alone.
pub fn schema_width(schema: &Schema) -> f64 {
    schema.fields().iter().map(|f| type_width(&f.data_type)).sum()
}

#[cfg(test)]
mod tests {
    use datafusion_common::ScalarValue;

    use crate::catalog::MemoryCatalog;
    use crate::cost::{Estimator, DEFAULT_ROW_COUNT, DEFAULT_SELECTIVITY, MIN_SELECTIVITY};
    use crate::expr::{col, eq, gt, in_list, lit, lt, not_eq, or, range, CompareOp};
    use crate::plan::RelBuilder;
    use crate::stat::{ColumnStatistics, TableStatistics};
    use crate::test_utils::{table_t1, table_t2};

    fn catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.register_table(table_t1().as_ref().clone());
        catalog.register_statistics(
            "t1",
            TableStatistics::new(500.0).with_column(
                "c2",
                ColumnStatistics::default()
                    .with_distinct_count(50.0)
                    .with_range(ScalarValue::Int64(Some(0)), ScalarValue::Int64(Some(100))),
            ),
        );
        catalog
    }

    #[test]
    fn test_row_count() {
        let catalog = catalog();
        let estimator = Estimator::new(&catalog);
        let t1 = RelBuilder::scan(table_t1()).build();
        let t2 = RelBuilder::scan(table_t2()).build();
        assert_eq!(500.0, estimator.row_count(&t1));
        assert_eq!(DEFAULT_ROW_COUNT, estimator.row_count(&t2));

        let filtered = RelBuilder::new(t1)
            .select(vec![eq(col("t1.c2"), lit(3i64))])
            .unwrap()
            .build();
        assert!((estimator.row_count(&filtered) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_selectivity() {
        let catalog = catalog();
        let estimator = Estimator::new(&catalog);
        let t1 = RelBuilder::scan(table_t1()).build();
        let t2 = RelBuilder::scan(table_t2()).build();
        let inputs = [&t1, &t2];

        let s = |p| estimator.selectivity(&p, &inputs);
        assert_eq!(1.0 / 50.0, s(eq(col("t1.c2"), lit(1i64))));
        assert_eq!(1.0 - 1.0 / 50.0, s(not_eq(col("t1.c2"), lit(1i64))));
        assert_eq!(0.75, s(gt(col("t1.c2"), lit(25i64))));
        assert_eq!(0.75, s(lt(lit(25i64), col("t1.c2"))));
        let between = range(
            col("t1.c2"),
            CompareOp::Gt,
            lit(10i64),
            CompareOp::Lt,
            lit(30i64),
        );
        assert!((s(between) - 0.2).abs() < 1e-9);
        let list = in_list(col("t1.c2"), vec![lit(1i64), lit(2i64), lit(3i64)], false);
        assert_eq!(3.0 / 50.0, s(list));
        assert_eq!(DEFAULT_SELECTIVITY, s(eq(col("t2.c2"), lit(1i64))));
        assert_eq!(0.5, s(gt(col("t2.c2"), lit(1i64))));
        // t1.c1 is the primary key of t1.
        assert_eq!(1.0 / 500.0, s(eq(col("t1.c1"), col("t2.c1"))));
        assert!(s(or(vec![eq(col("t1.c2"), lit(1i64)), eq(col("t1.c2"), lit(2i64))])) < 0.04);
        assert_eq!(MIN_SELECTIVITY, s(lit(false)));
    }

    #[test]
    fn test_selectivity_bounds() {
        let catalog = catalog();
        let estimator = Estimator::new(&catalog);
        let t1 = RelBuilder::scan(table_t1()).build();
        let preds = vec![
            gt(col("t1.c2"), lit(1000i64)),
            lt(col("t1.c2"), lit(-5i64)),
            in_list(col("t1.c2"), (0..200i64).map(lit).collect(), false),
        ];
        for p in preds {
            let s = estimator.selectivity(&p, &[&t1]);
            assert!(s > 0.0 && s <= 1.0, "{} has selectivity {}", p, s);
        }
    }
}
