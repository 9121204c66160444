use arrow_schema::DataType;
use datafusion_common::ScalarValue;
use datafusion_expr::Operator;

use crate::error::OptResult;
use crate::expr::{
    AggrCall, AggrFunc, BinaryExpr, ColumnRef, Compare, CompareOp, Convert, ExprKind,
    FuncCall, InList, RangeEnd, ScalarExpr, Statement,
};
use crate::plan::RelRef;

/// Column reference parsed from `relation.name` or `name`.
pub fn col(name: &str) -> ScalarExpr {
    column(ColumnRef::parse(name))
}

pub fn column(c: ColumnRef) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Column(c))
}

pub fn lit<V: Into<ScalarValue>>(value: V) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Literal(value.into()))
}

/// Typed `NULL` literal.
pub fn null_lit(data_type: &DataType) -> OptResult<ScalarExpr> {
    Ok(ScalarExpr::new(ExprKind::Literal(ScalarValue::try_from(
        data_type,
    )?)))
}

pub fn binary(left: ScalarExpr, op: Operator, right: ScalarExpr) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Binary(BinaryExpr {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }))
}

pub fn compare(left: ScalarExpr, op: CompareOp, right: ScalarExpr) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Compare(Compare {
        left: Box::new(left),
        op,
        right: Box::new(right),
        upper: None,
        anti: false,
        null_semantics: false,
    }))
}

pub fn eq(left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
    compare(left, CompareOp::Eq, right)
}

pub fn not_eq(left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
    compare(left, CompareOp::NotEq, right)
}

pub fn lt(left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
    compare(left, CompareOp::Lt, right)
}

pub fn lt_eq(left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
    compare(left, CompareOp::LtEq, right)
}

pub fn gt(left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
    compare(left, CompareOp::Gt, right)
}

pub fn gt_eq(left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
    compare(left, CompareOp::GtEq, right)
}

/// Two sided range `low low_op expr AND expr high_op high`, expressed on `expr`.
///
/// `low_op` must be `>` or `>=`, `high_op` must be `<` or `<=`.
pub fn range(
    expr: ScalarExpr,
    low_op: CompareOp,
    low: ScalarExpr,
    high_op: CompareOp,
    high: ScalarExpr,
) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Compare(Compare {
        left: Box::new(expr),
        op: low_op,
        right: Box::new(low),
        upper: Some(RangeEnd {
            op: high_op,
            expr: Box::new(high),
        }),
        anti: false,
        null_semantics: false,
    }))
}

/// Conjunction, collapsing the trivial cases.
pub fn and(mut exprs: Vec<ScalarExpr>) -> ScalarExpr {
    match exprs.len() {
        0 => lit(true),
        1 => exprs.remove(0),
        _ => ScalarExpr::new(ExprKind::And(exprs)),
    }
}

/// Disjunction, collapsing the trivial cases.
pub fn or(mut exprs: Vec<ScalarExpr>) -> ScalarExpr {
    match exprs.len() {
        0 => lit(false),
        1 => exprs.remove(0),
        _ => ScalarExpr::new(ExprKind::Or(exprs)),
    }
}

pub fn not(expr: ScalarExpr) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Not(Box::new(expr)))
}

pub fn in_list(expr: ScalarExpr, list: Vec<ScalarExpr>, anti: bool) -> ScalarExpr {
    ScalarExpr::new(ExprKind::InList(InList {
        expr: Box::new(expr),
        list,
        anti,
    }))
}

pub fn func(name: &str, args: Vec<ScalarExpr>, return_type: DataType) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Func(FuncCall {
        name: name.to_string(),
        args,
        return_type,
        volatile: false,
    }))
}

pub fn volatile_func(name: &str, args: Vec<ScalarExpr>, return_type: DataType) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Func(FuncCall {
        name: name.to_string(),
        args,
        return_type,
        volatile: true,
    }))
}

pub fn aggr(func: AggrFunc, args: Vec<ScalarExpr>, distinct: bool) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Aggr(AggrCall {
        func,
        args,
        distinct,
    }))
}

pub fn count_star() -> ScalarExpr {
    aggr(AggrFunc::Count, vec![], false)
}

pub fn count(expr: ScalarExpr) -> ScalarExpr {
    aggr(AggrFunc::Count, vec![expr], false)
}

pub fn count_distinct(expr: ScalarExpr) -> ScalarExpr {
    aggr(AggrFunc::Count, vec![expr], true)
}

pub fn sum(expr: ScalarExpr) -> ScalarExpr {
    aggr(AggrFunc::Sum, vec![expr], false)
}

pub fn min(expr: ScalarExpr) -> ScalarExpr {
    aggr(AggrFunc::Min, vec![expr], false)
}

pub fn max(expr: ScalarExpr) -> ScalarExpr {
    aggr(AggrFunc::Max, vec![expr], false)
}

pub fn avg(expr: ScalarExpr) -> ScalarExpr {
    aggr(AggrFunc::Avg, vec![expr], false)
}

pub fn cast(expr: ScalarExpr, to: DataType) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Convert(Convert {
        expr: Box::new(expr),
        to,
    }))
}

/// Procedural statement embedding a relational subplan.
pub fn query_stmt(plan: RelRef) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Stmt(Statement::Query(plan)))
}

pub fn return_stmt(expr: ScalarExpr) -> ScalarExpr {
    ScalarExpr::new(ExprKind::Stmt(Statement::Return(Box::new(expr))))
}
