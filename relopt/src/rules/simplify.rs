use std::cmp::Ordering;

use datafusion_common::ScalarValue;
use datafusion_expr::Operator as ArithOp;

use crate::error::OptResult;
use crate::expr::{
    and, cast, compare, in_list, lit, or, range, scalar_to_f64, split_conjunction, CompareOp,
    ExprKind, ScalarExpr,
};
use crate::operator::Operator::{self, Join, Project, Select};
use crate::operator::OperatorTrait;
use crate::plan::{RelRef, Schema};
use crate::rules::RuleId::{ConstantSubstitution, NormalizePredicates, SimplifyExpr};
use crate::rules::{
    any, pattern, pin_names, rebuild, Pattern, PatternBuilder, Rule, RuleContext, RuleId,
};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref SIMPLIFY_EXPR_PATTERN: Pattern = {
        pattern(|op| matches!(op, Select(_) | Join(_) | Project(_) | Operator::GroupBy(_)))
        .finish()
    };
    static ref NORMALIZE_PREDICATES_PATTERN: Pattern = {
        pattern(|op| matches!(op, Select(_) | Join(_)))
        .finish()
    };
    static ref CONSTANT_SUBSTITUTION_PATTERN: Pattern = {
        pattern(|op| matches!(op, Project(_)))
          .leaf(any)
        .finish()
    };
}

/// Folds one expression node whose operands are already folded. Only rewrites that keep the
/// result type are applied, so no input schema is needed.
pub fn fold_expr(expr: ScalarExpr) -> ScalarExpr {
    match fold(&expr) {
        Some(mut folded) => {
            folded.alias = expr.alias;
            folded
        }
        None => expr,
    }
}

fn fold(expr: &ScalarExpr) -> Option<ScalarExpr> {
    match &expr.kind {
        ExprKind::And(list) => {
            if list.iter().any(|e| e.is_false()) {
                return Some(lit(false));
            }
            let kept = split_conjunction(list.iter().filter(|e| !e.is_true()).cloned());
            (kept != *list).then(|| and(kept))
        }
        ExprKind::Or(list) => {
            if list.iter().any(|e| e.is_true()) {
                return Some(lit(true));
            }
            let mut kept = vec![];
            for e in list.iter().filter(|e| !e.is_false()) {
                match &e.kind {
                    ExprKind::Or(inner) if e.alias.is_none() => kept.extend(inner.iter().cloned()),
                    _ => kept.push(e.clone()),
                }
            }
            (kept != *list).then(|| or(kept))
        }
        ExprKind::Not(inner) => match &inner.kind {
            ExprKind::Literal(ScalarValue::Boolean(Some(b))) => Some(lit(!b)),
            ExprKind::Not(x) => Some((**x).clone()),
            ExprKind::Compare(c) => {
                let mut c = c.clone();
                c.anti = !c.anti;
                Some(ScalarExpr::new(ExprKind::Compare(c)))
            }
            ExprKind::InList(i) => {
                let mut i = i.clone();
                i.anti = !i.anti;
                Some(ScalarExpr::new(ExprKind::InList(i)))
            }
            _ => None,
        },
        ExprKind::Compare(c) if c.upper.is_none() => {
            let (l, r) = (c.left.as_literal()?, c.right.as_literal()?);
            if l.is_null() || r.is_null() {
                return None;
            }
            let ordering = l.partial_cmp(r)?;
            let result = match c.op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::NotEq => ordering != Ordering::Equal,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::LtEq => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::GtEq => ordering != Ordering::Less,
            };
            Some(lit(result != c.anti))
        }
        ExprKind::Binary(b) => {
            let value = fold_arith(b.op, b.left.as_literal()?, b.right.as_literal()?)?;
            Some(lit(value))
        }
        ExprKind::Convert(c) => {
            let value = c.expr.as_literal()?;
            (value.get_datatype() == c.to).then(|| (*c.expr).clone())
        }
        _ => None,
    }
}

fn fold_arith(op: ArithOp, l: &ScalarValue, r: &ScalarValue) -> Option<ScalarValue> {
    use ScalarValue::{Float64, Int32, Int64};
    Some(match (l, r) {
        (Int64(Some(a)), Int64(Some(b))) => Int64(Some(match op {
            ArithOp::Plus => a.checked_add(*b)?,
            ArithOp::Minus => a.checked_sub(*b)?,
            ArithOp::Multiply => a.checked_mul(*b)?,
            ArithOp::Divide => a.checked_div(*b)?,
            _ => return None,
        })),
        (Int32(Some(a)), Int32(Some(b))) => Int32(Some(match op {
            ArithOp::Plus => a.checked_add(*b)?,
            ArithOp::Minus => a.checked_sub(*b)?,
            ArithOp::Multiply => a.checked_mul(*b)?,
            ArithOp::Divide => a.checked_div(*b)?,
            _ => return None,
        })),
        (Float64(Some(a)), Float64(Some(b))) => Float64(Some(match op {
            ArithOp::Plus => a + b,
            ArithOp::Minus => a - b,
            ArithOp::Multiply => a * b,
            ArithOp::Divide if *b != 0.0 => a / b,
            _ => return None,
        })),
        _ => return None,
    })
}

fn is_numeric_literal(expr: &ScalarExpr, value: f64) -> bool {
    expr.as_literal().and_then(scalar_to_f64) == Some(value)
}

/// Drops identity operands of arithmetic when the result type is unchanged.
fn strip_identities(expr: ScalarExpr, schema: &Schema) -> OptResult<ScalarExpr> {
    expr.transform_up(&mut |e: ScalarExpr| {
        let candidate = match &e.kind {
            ExprKind::Binary(b) => match b.op {
                ArithOp::Plus if is_numeric_literal(&b.right, 0.0) => Some(&b.left),
                ArithOp::Plus if is_numeric_literal(&b.left, 0.0) => Some(&b.right),
                ArithOp::Minus if is_numeric_literal(&b.right, 0.0) => Some(&b.left),
                ArithOp::Multiply if is_numeric_literal(&b.right, 1.0) => Some(&b.left),
                ArithOp::Multiply if is_numeric_literal(&b.left, 1.0) => Some(&b.right),
                ArithOp::Divide if is_numeric_literal(&b.right, 1.0) => Some(&b.left),
                _ => None,
            },
            _ => None,
        };
        match candidate {
            Some(operand) if operand.data_type(schema)? == e.data_type(schema)? => {
                let mut operand = (**operand).clone();
                operand.alias = e.alias;
                Ok(operand)
            }
            _ => Ok(e),
        }
    })
}

/// Algebraic simplification of node expressions: identity operands of arithmetic are dropped,
/// `TRUE` predicates are removed and a selection left without predicates disappears.
///
/// Folding of constant operands happens during the traversal, see [`fold_expr`].
#[derive(Clone, Default)]
pub struct SimplifyExprRule {}

impl SimplifyExprRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for SimplifyExprRule {
    fn apply(&self, rel: RelRef, _ctx: &mut RuleContext) -> OptResult<RelRef> {
        match rel.operator() {
            Select(select) => {
                let input = rel.input(0);
                let predicates = simplify_predicates(select.predicates(), input.schema())?;
                if predicates.is_empty() && rel.flags().is_empty() {
                    return Ok(input.clone());
                }
                if predicates == select.predicates() {
                    return Ok(rel);
                }
                rebuild(
                    &rel,
                    Select(crate::operator::Select::new(predicates)),
                    [input.clone()],
                )
            }
            Join(join) => {
                let schema = join_condition_schema(&rel);
                let on = simplify_predicates(join.on(), &schema)?;
                if on == join.on() {
                    return Ok(rel);
                }
                rebuild(
                    &rel,
                    Join(join.clone().with_on(on)),
                    rel.inputs().iter().cloned(),
                )
            }
            Project(_) | Operator::GroupBy(_) => {
                let input = rel.input(0).schema();
                let mut operator = rel.operator().clone();
                let mut changed = false;
                for expr in operator.exprs_mut() {
                    let new_expr = strip_identities(expr.clone(), input)?;
                    if new_expr != *expr {
                        *expr = new_expr;
                        changed = true;
                    }
                }
                if !changed {
                    return Ok(rel);
                }
                if let Some(outputs) = operator.output_exprs_mut() {
                    *outputs = pin_names(std::mem::take(outputs), rel.schema());
                }
                rebuild(&rel, operator, rel.inputs().iter().cloned())
            }
            _ => Ok(rel),
        }
    }

    fn pattern(&self) -> &Pattern {
        &SIMPLIFY_EXPR_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        SimplifyExpr
    }
}

fn join_condition_schema(rel: &RelRef) -> Schema {
    crate::operator::Join::condition_schema(rel.input(0).schema(), rel.input(1).schema())
}

fn simplify_predicates(predicates: &[ScalarExpr], schema: &Schema) -> OptResult<Vec<ScalarExpr>> {
    split_conjunction(predicates.iter().cloned())
        .into_iter()
        .filter(|p| !p.is_true())
        .map(|p| strip_identities(p, schema))
        .collect()
}

/// One side of a range on a column.
#[derive(Clone)]
struct Bound {
    op: CompareOp,
    value: ScalarValue,
}

impl Bound {
    /// Whether `self` restricts more than `other`. `None` when the values are incomparable.
    fn tighter_than(&self, other: &Bound, lower: bool) -> Option<bool> {
        let ordering = self.value.partial_cmp(&other.value)?;
        let strict = matches!(self.op, CompareOp::Gt | CompareOp::Lt);
        Some(match ordering {
            Ordering::Equal => strict,
            Ordering::Greater => lower,
            Ordering::Less => !lower,
        })
    }
}

/// Range bounds on one column expression, collected from a conjunction.
struct ColumnRange {
    column: ScalarExpr,
    lower: Option<Bound>,
    upper: Option<Bound>,
    /// Positions of the predicates merged into this range.
    positions: Vec<usize>,
    comparable: bool,
}

impl ColumnRange {
    fn add(&mut self, bound: Bound) {
        let lower = bound.op.is_lower_bound();
        let slot = if lower {
            &mut self.lower
        } else {
            &mut self.upper
        };
        match slot {
            None => *slot = Some(bound),
            Some(current) => match bound.tighter_than(current, lower) {
                Some(true) => *slot = Some(bound),
                Some(false) => {}
                None => self.comparable = false,
            },
        }
    }

    fn into_predicate(self) -> Option<ScalarExpr> {
        Some(match (self.lower, self.upper) {
            (Some(low), Some(high)) => range(
                self.column,
                low.op,
                lit(low.value),
                high.op,
                lit(high.value),
            ),
            (Some(bound), None) | (None, Some(bound)) => {
                compare(self.column, bound.op, lit(bound.value))
            }
            (None, None) => return None,
        })
    }
}

/// Range bounds of a predicate `column op literal`, in either operand order.
fn range_bounds(predicate: &ScalarExpr) -> Option<(ScalarExpr, Vec<Bound>)> {
    let c = predicate.as_compare()?;
    if c.anti || c.null_semantics || !c.op.is_range() {
        return None;
    }
    let literal = |e: &ScalarExpr| e.as_literal().filter(|v| !v.is_null()).cloned();
    let (column, op, value) = match (c.left.as_column(), c.right.as_column()) {
        (Some(_), None) => ((*c.left).clone(), c.op, literal(&c.right)?),
        (None, Some(_)) if c.upper.is_none() => {
            ((*c.right).clone(), c.op.swap(), literal(&c.left)?)
        }
        _ => return None,
    };
    let mut bounds = vec![Bound { op, value }];
    if let Some(upper) = &c.upper {
        bounds.push(Bound {
            op: upper.op,
            value: literal(&upper.expr)?,
        });
    }
    Some((column.without_alias(), bounds))
}

/// Column and literal values of `col = literal` or `col IN (literals)`.
fn equality_values(predicate: &ScalarExpr) -> Option<(ScalarExpr, Vec<ScalarExpr>)> {
    match &predicate.kind {
        ExprKind::Compare(c) if c.is_equality() && !c.null_semantics => {
            let (column, value) = match (c.left.as_column(), c.right.as_column()) {
                (Some(_), None) => (&c.left, &c.right),
                (None, Some(_)) => (&c.right, &c.left),
                _ => return None,
            };
            value.as_literal()?;
            Some(((**column).clone(), vec![(**value).clone()]))
        }
        ExprKind::InList(i) if !i.anti && i.expr.as_column().is_some() => {
            i.list
                .iter()
                .all(|e| e.as_literal().is_some())
                .then(|| ((*i.expr).clone(), i.list.clone()))
        }
        _ => None,
    }
}

/// Rewrites a disjunction of equalities on one column into an IN list.
fn disjunction_to_in_list(predicate: &ScalarExpr) -> Option<ScalarExpr> {
    let list = predicate.kind.as_or()?;
    let mut column: Option<ScalarExpr> = None;
    let mut values: Vec<ScalarExpr> = vec![];
    for branch in list {
        let (c, branch_values) = equality_values(branch)?;
        let c = c.without_alias();
        match &column {
            Some(existing) if !existing.same_value(&c) => return None,
            Some(_) => {}
            None => column = Some(c),
        }
        for v in branch_values {
            if !values.iter().any(|e| e.same_value(&v)) {
                values.push(v.without_alias());
            }
        }
    }
    let mut rewritten = in_list(column?, values, false);
    rewritten.alias = predicate.alias.clone();
    Some(rewritten)
}

/// Normalizes a predicate list. Returns `None` when nothing changes.
fn normalize(predicates: &[ScalarExpr]) -> Option<Vec<ScalarExpr>> {
    let flat = split_conjunction(predicates.iter().cloned());
    let mut changed = flat.len() != predicates.len();

    let mut ranges: Vec<ColumnRange> = vec![];
    for (idx, predicate) in flat.iter().enumerate() {
        if let Some((column, bounds)) = range_bounds(predicate) {
            let pos = match ranges.iter().position(|r| r.column.same_value(&column)) {
                Some(pos) => pos,
                None => {
                    ranges.push(ColumnRange {
                        column,
                        lower: None,
                        upper: None,
                        positions: vec![],
                        comparable: true,
                    });
                    ranges.len() - 1
                }
            };
            ranges[pos].positions.push(idx);
            for bound in bounds {
                ranges[pos].add(bound);
            }
        }
    }

    let mut slots: Vec<Option<ScalarExpr>> = flat.into_iter().map(Some).collect();
    for range in ranges {
        if range.positions.len() < 2 || !range.comparable {
            continue;
        }
        let first = range.positions[0];
        for pos in &range.positions {
            slots[*pos] = None;
        }
        slots[first] = range.into_predicate();
        changed = true;
    }

    let mut result = vec![];
    for predicate in slots.into_iter().flatten() {
        match disjunction_to_in_list(&predicate) {
            Some(in_list) => {
                result.push(in_list);
                changed = true;
            }
            None => result.push(predicate),
        }
    }
    changed.then(|| result)
}

/// Merges range comparisons on one column of a conjunction into a two sided range, and turns
/// disjunctions of equalities on one column into IN lists.
#[derive(Clone, Default)]
pub struct NormalizePredicatesRule {}

impl NormalizePredicatesRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for NormalizePredicatesRule {
    fn apply(&self, rel: RelRef, _ctx: &mut RuleContext) -> OptResult<RelRef> {
        match rel.operator() {
            Select(select) => match normalize(select.predicates()) {
                Some(predicates) => rebuild(
                    &rel,
                    Select(crate::operator::Select::new(predicates)),
                    rel.inputs().iter().cloned(),
                ),
                None => Ok(rel),
            },
            Join(join) => match normalize(join.on()) {
                Some(on) => rebuild(
                    &rel,
                    Join(join.clone().with_on(on)),
                    rel.inputs().iter().cloned(),
                ),
                None => Ok(rel),
            },
            _ => Ok(rel),
        }
    }

    fn pattern(&self) -> &Pattern {
        &NORMALIZE_PREDICATES_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        NormalizePredicates
    }
}

/// Replaces references to columns the input proves constant by the constant.
#[derive(Clone, Default)]
pub struct ConstantSubstitutionRule {}

impl ConstantSubstitutionRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for ConstantSubstitutionRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let project = match rel.operator() {
            Project(project) => project,
            _ => return Ok(rel),
        };
        let input = rel.input(0);
        let properties = ctx.properties;
        let substitute = |c: &crate::expr::ColumnRef| {
            let value = properties.constant(input, c)?;
            let data_type = &input.schema().field_for(c).ok()?.data_type;
            Some(if value.get_datatype() == *data_type {
                lit(value.clone())
            } else {
                cast(lit(value.clone()), data_type.clone())
            })
        };

        let exprs = project
            .exprs()
            .iter()
            .map(|e| e.replace_columns(&substitute))
            .collect::<Vec<_>>();
        if exprs == project.exprs() {
            return Ok(rel);
        }
        let exprs = pin_names(exprs, rel.schema());
        let new_project = crate::operator::Project::new(exprs)
            .with_order_by(project.order_by().to_vec());
        rebuild(&rel, Project(new_project), [input.clone()])
    }

    fn pattern(&self) -> &Pattern {
        &CONSTANT_SUBSTITUTION_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        ConstantSubstitution
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use datafusion_common::ScalarValue;
    use datafusion_expr::Operator as ArithOp;

    use crate::expr::{
        and, binary, col, eq, gt, gt_eq, lit, lt, lt_eq, not, or, CompareOp, ExprKind, ScalarExpr,
    };
    use crate::plan::RelBuilder;
    use crate::rules::{
        fold_expr, ConstantSubstitutionRule, NormalizePredicatesRule, SimplifyExprRule,
    };
    use crate::test_utils::{apply_rule, table_t1};

    #[test]
    fn test_fold_expr() {
        let folded = fold_expr(binary(lit(2i64), ArithOp::Plus, lit(3i64)).alias("x"));
        assert_eq!(Some(&ScalarValue::Int64(Some(5))), folded.as_literal());
        assert_eq!(Some("x"), folded.alias.as_ref().map(|a| a.name.as_str()));

        assert!(fold_expr(and(vec![eq(col("a"), lit(1i64)), lit(false)])).is_false());
        assert!(fold_expr(or(vec![eq(col("a"), lit(1i64)), lit(true)])).is_true());
        assert!(fold_expr(gt(lit(3i64), lit(2i64))).is_true());
        assert_eq!(
            eq(col("a"), lit(1i64)),
            fold_expr(ScalarExpr::new(ExprKind::And(vec![
                eq(col("a"), lit(1i64)),
                lit(true)
            ])))
        );

        let negated = fold_expr(not(eq(col("a"), lit(1i64))));
        assert!(negated.as_compare().unwrap().anti);
        // Division by zero is left to execution.
        let division = binary(lit(1i64), ArithOp::Divide, lit(0i64));
        assert_eq!(division.clone(), fold_expr(division));
    }

    #[test]
    fn test_simplify_drops_true_predicates() {
        let scan = RelBuilder::scan(table_t1()).build();
        let plan = RelBuilder::new(scan.clone())
            .select(vec![lit(true)])
            .unwrap()
            .build();
        let result = apply_rule(SimplifyExprRule::new(), plan);
        assert!(Arc::ptr_eq(&scan, &result));
    }

    #[test]
    fn test_simplify_identity_operand() {
        let plan = RelBuilder::scan(table_t1())
            .project(vec![binary(col("t1.c2"), ArithOp::Plus, lit(0i64)).alias("x")])
            .unwrap()
            .build();
        let result = apply_rule(SimplifyExprRule::new(), plan.clone());
        let exprs = result.operator().output_exprs().unwrap();
        assert_eq!("t1.c2 AS x", exprs[0].to_string());
        assert_eq!(plan.schema().names_and_types(), result.schema().names_and_types());
    }

    #[test]
    fn test_merge_ranges() {
        let plan = RelBuilder::scan(table_t1())
            .select(vec![
                gt(col("t1.c2"), lit(1i64)),
                gt_eq(col("t1.c2"), lit(5i64)),
                lt(col("t1.c2"), lit(10i64)),
                lt_eq(lit(20i64), col("t1.c1")),
            ])
            .unwrap()
            .build();
        let result = apply_rule(NormalizePredicatesRule::new(), plan);
        let predicates = result.operator().as_select().unwrap().predicates();
        assert_eq!(2, predicates.len());

        let range = predicates[0].as_compare().unwrap();
        assert_eq!(CompareOp::GtEq, range.op);
        assert_eq!(Some(&ScalarValue::Int64(Some(5))), range.right.as_literal());
        assert_eq!(CompareOp::Lt, range.upper.as_ref().unwrap().op);
        assert_eq!("20 <= t1.c1", predicates[1].to_string());
    }

    #[test]
    fn test_disjunction_to_in_list() {
        let plan = RelBuilder::scan(table_t1())
            .select(vec![or(vec![
                eq(col("t1.c2"), lit(1i64)),
                eq(lit(2i64), col("t1.c2")),
                eq(col("t1.c2"), lit(1i64)),
            ])])
            .unwrap()
            .build();
        let result = apply_rule(NormalizePredicatesRule::new(), plan);
        let predicates = result.operator().as_select().unwrap().predicates();
        assert_eq!("t1.c2 IN (1, 2)", predicates[0].to_string());

        let again = apply_rule(NormalizePredicatesRule::new(), result.clone());
        assert!(Arc::ptr_eq(&result, &again));
    }

    #[test]
    fn test_constant_substitution() {
        let plan = RelBuilder::scan(table_t1())
            .select(vec![eq(col("t1.c2"), lit(7i64))])
            .unwrap()
            .project(vec![col("t1.c1"), col("t1.c2")])
            .unwrap()
            .build();
        let result = apply_rule(ConstantSubstitutionRule::new(), plan.clone());
        let exprs = result.operator().output_exprs().unwrap();
        assert_eq!("t1.c1", exprs[0].to_string());
        assert_eq!("7 AS t1.c2", exprs[1].to_string());
        assert_eq!(plan.schema().names_and_types(), result.schema().names_and_types());
    }
}
