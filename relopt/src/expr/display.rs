use std::fmt::{Display, Formatter, Result};

use datafusion_common::ScalarValue;
use itertools::Itertools;

use crate::expr::{ColumnRef, Compare, ExprKind, ScalarExpr, Statement};

impl Display for ColumnRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match &self.relation {
            Some(relation) => write!(f, "{}.{}", relation, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl Display for ScalarExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.kind)?;
        match &self.alias {
            Some(alias) => write!(f, " AS {}", alias),
            None => Ok(()),
        }
    }
}

fn fmt_literal(value: &ScalarValue, f: &mut Formatter<'_>) -> Result {
    if value.is_null() {
        return write!(f, "NULL");
    }
    match value {
        ScalarValue::Utf8(Some(s)) | ScalarValue::LargeUtf8(Some(s)) => write!(f, "'{}'", s),
        v => write!(f, "{}", v),
    }
}

fn fmt_compare(compare: &Compare, f: &mut Formatter<'_>) -> Result {
    if compare.anti {
        write!(f, "NOT (")?;
    }
    write!(
        f,
        "{} {} {}",
        compare.left.kind,
        compare.op.symbol(),
        compare.right.kind
    )?;
    if let Some(upper) = &compare.upper {
        write!(
            f,
            " AND {} {} {}",
            compare.left.kind,
            upper.op.symbol(),
            upper.expr.kind
        )?;
    }
    if compare.anti {
        write!(f, ")")?;
    }
    Ok(())
}

impl Display for ExprKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            ExprKind::Column(c) => write!(f, "{}", c),
            ExprKind::Literal(v) => fmt_literal(v, f),
            ExprKind::Binary(b) => write!(f, "{} {} {}", b.left.kind, b.op, b.right.kind),
            ExprKind::Compare(c) => fmt_compare(c, f),
            ExprKind::And(list) => {
                write!(f, "{}", list.iter().map(|e| &e.kind).join(" AND "))
            }
            ExprKind::Or(list) => {
                write!(f, "({})", list.iter().map(|e| &e.kind).join(" OR "))
            }
            ExprKind::Not(e) => write!(f, "NOT {}", e.kind),
            ExprKind::Func(call) => write!(
                f,
                "{}({})",
                call.name,
                call.args.iter().map(|e| &e.kind).join(", ")
            ),
            ExprKind::Aggr(call) => {
                let distinct = if call.distinct { "DISTINCT " } else { "" };
                if call.args.is_empty() {
                    write!(f, "{}({}*)", call.func, distinct)
                } else {
                    write!(
                        f,
                        "{}({}{})",
                        call.func,
                        distinct,
                        call.args.iter().map(|e| &e.kind).join(", ")
                    )
                }
            }
            ExprKind::Convert(c) => write!(f, "CAST({} AS {:?})", c.expr.kind, c.to),
            ExprKind::InList(i) => write!(
                f,
                "{} {}IN ({})",
                i.expr.kind,
                if i.anti { "NOT " } else { "" },
                i.list.iter().map(|e| &e.kind).join(", ")
            ),
            ExprKind::Stmt(s) => match s {
                Statement::Query(plan) => write!(f, "QUERY({})", plan.operator()),
                Statement::Return(e) => write!(f, "RETURN {}", e.kind),
                Statement::Assign { target, value } => write!(f, "SET {} = {}", target, value.kind),
                Statement::If {
                    cond,
                    then,
                    otherwise,
                } => write!(
                    f,
                    "IF {} THEN {} ELSE {} END IF",
                    cond.kind,
                    then.iter().join("; "),
                    otherwise.iter().join("; ")
                ),
                Statement::While { cond, body } => {
                    write!(f, "WHILE {} DO {} END WHILE", cond.kind, body.iter().join("; "))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::*;
    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;
    use datafusion_expr::Operator;

    #[test]
    fn test_display() {
        assert_eq!("t.a = 1", eq(col("t.a"), lit(1i64)).to_string());
        assert_eq!(
            "t.a > 5 AND t.a < 10",
            range(col("t.a"), CompareOp::Gt, lit(5i64), CompareOp::Lt, lit(10i64)).to_string()
        );
        assert_eq!(
            "(a = 'x' OR b = NULL)",
            or(vec![eq(col("a"), lit("x")), eq(col("b"), lit(ScalarValue::Null))]).to_string()
        );
        assert_eq!("x IN (1, 2)", in_list(col("x"), vec![lit(1i32), lit(2i32)], false).to_string());
        assert_eq!("count(*) AS n", count_star().alias("n").to_string());
        assert_eq!("count(DISTINCT t.x)", count_distinct(col("t.x")).to_string());
        assert_eq!("CAST(a AS Int64)", cast(col("a"), DataType::Int64).to_string());
        assert_eq!(
            "a + 1 AS t.b",
            binary(col("a"), Operator::Plus, lit(1i32))
                .alias(ColumnRef::qualified("t", "b"))
                .to_string()
        );
    }
}
