//! Scalar expressions.
//!
//! Every relational node carries one or more lists of [`ScalarExpr`]: projection lists,
//! predicates, group keys and aggregates. Expressions reference columns of the node's inputs by
//! [`ColumnRef`], a `(relation, name)` pair. Columns introduced by rewrites are named with unique
//! numeric labels (`%1`, `%2`, ...) so they never clash with user visible names.
//!
//! Expressions are plain values: rewriting an expression produces a new one, and structural
//! equality is used to detect common subexpressions.
mod builder;
pub use builder::*;
mod display;

use std::iter::once;

use arrow_schema::DataType;
use datafusion_common::ScalarValue;
use datafusion_expr::Operator;
use enum_as_inner::EnumAsInner;
use strum_macros::{AsRefStr, Display, EnumIter};

use crate::error::OptResult;
use crate::plan::{Field, RelRef, Schema};

/// Unique numeric label of a column introduced by a rewrite.
pub type Label = u32;

/// Reference to a column of an input schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub relation: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new<R: Into<String>, N: Into<String>>(relation: Option<R>, name: N) -> Self {
        Self {
            relation: relation.map(Into::into),
            name: name.into(),
        }
    }

    pub fn qualified<R: Into<String>, N: Into<String>>(relation: R, name: N) -> Self {
        Self::new(Some(relation), name)
    }

    pub fn bare<N: Into<String>>(name: N) -> Self {
        Self {
            relation: None,
            name: name.into(),
        }
    }

    pub fn label(label: Label) -> Self {
        Self::bare(format!("%{}", label))
    }

    /// Returns the label if this column was introduced by a rewrite.
    pub fn as_label(&self) -> Option<Label> {
        match &self.relation {
            None => self.name.strip_prefix('%').and_then(|l| l.parse().ok()),
            Some(_) => None,
        }
    }

    /// Parses `relation.name` or `name`.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((relation, name)) => Self::qualified(relation, name),
            None => Self::bare(s),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(s: &str) -> Self {
        ColumnRef::parse(s)
    }
}

/// Property bag entries attached to an expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Annotation {
    HashIndex(String),
    JoinIndex(String),
    PrimaryKey,
    ForeignKey { table: String },
    Unique,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScalarExpr {
    pub kind: ExprKind,
    /// Output name of this expression in a projection or aggregate list.
    pub alias: Option<ColumnRef>,
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumAsInner, AsRefStr)]
pub enum ExprKind {
    Column(ColumnRef),
    Literal(ScalarValue),
    /// Arithmetic.
    Binary(BinaryExpr),
    Compare(Compare),
    And(Vec<ScalarExpr>),
    Or(Vec<ScalarExpr>),
    Not(Box<ScalarExpr>),
    Func(FuncCall),
    Aggr(AggrCall),
    Convert(Convert),
    InList(InList),
    /// Procedural statement of a function or procedure body.
    Stmt(Statement),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BinaryExpr {
    pub left: Box<ScalarExpr>,
    pub op: Operator,
    pub right: Box<ScalarExpr>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }

    /// Operator after swapping both operands, `a < b` is `b > a`.
    pub fn swap(&self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }

    pub fn is_lower_bound(&self) -> bool {
        matches!(self, CompareOp::Gt | CompareOp::GtEq)
    }

    pub fn is_upper_bound(&self) -> bool {
        matches!(self, CompareOp::Lt | CompareOp::LtEq)
    }

    pub fn is_range(&self) -> bool {
        self.is_lower_bound() || self.is_upper_bound()
    }
}

/// Upper end of a two sided range comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RangeEnd {
    pub op: CompareOp,
    pub expr: Box<ScalarExpr>,
}

/// `left op right`, or `left op right AND left upper.op upper.expr` when `upper` is set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Compare {
    pub left: Box<ScalarExpr>,
    pub op: CompareOp,
    pub right: Box<ScalarExpr>,
    pub upper: Option<RangeEnd>,
    /// Negates the result.
    pub anti: bool,
    /// `NULL = NULL` is true.
    pub null_semantics: bool,
}

impl Compare {
    pub fn is_equality(&self) -> bool {
        self.op == CompareOp::Eq && self.upper.is_none() && !self.anti
    }

    /// Both operands of an equality if they are plain columns.
    pub fn equi_columns(&self) -> Option<(&ColumnRef, &ColumnRef)> {
        if !self.is_equality() {
            return None;
        }
        match (self.left.as_column(), self.right.as_column()) {
            (Some(l), Some(r)) => Some((l, r)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<ScalarExpr>,
    pub return_type: DataType,
    pub volatile: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum AggrFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggrCall {
    pub func: AggrFunc,
    /// Empty for `count(*)`.
    pub args: Vec<ScalarExpr>,
    pub distinct: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Convert {
    pub expr: Box<ScalarExpr>,
    pub to: DataType,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InList {
    pub expr: Box<ScalarExpr>,
    pub list: Vec<ScalarExpr>,
    pub anti: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Statement {
    /// Relational subplan embedded in a procedure body.
    Query(RelRef),
    Return(Box<ScalarExpr>),
    Assign {
        target: ColumnRef,
        value: Box<ScalarExpr>,
    },
    If {
        cond: Box<ScalarExpr>,
        then: Vec<ScalarExpr>,
        otherwise: Vec<ScalarExpr>,
    },
    While {
        cond: Box<ScalarExpr>,
        body: Vec<ScalarExpr>,
    },
}

impl Default for ScalarExpr {
    fn default() -> Self {
        ScalarExpr::new(ExprKind::Literal(ScalarValue::Null))
    }
}

impl ScalarExpr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            alias: None,
            annotations: vec![],
        }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn alias<C: Into<ColumnRef>>(mut self, alias: C) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn without_alias(mut self) -> Self {
        self.alias = None;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        if !self.annotations.contains(&annotation) {
            self.annotations.push(annotation);
        }
        self
    }

    pub fn has_annotation(&self, annotation: &Annotation) -> bool {
        self.annotations.contains(annotation)
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        self.kind.as_column()
    }

    pub fn as_literal(&self) -> Option<&ScalarValue> {
        self.kind.as_literal()
    }

    pub fn as_compare(&self) -> Option<&Compare> {
        self.kind.as_compare()
    }

    pub fn as_aggr(&self) -> Option<&AggrCall> {
        self.kind.as_aggr()
    }

    /// Column references and literals are cheap to evaluate and never worth sharing.
    pub fn is_trivial(&self) -> bool {
        matches!(self.kind, ExprKind::Column(_) | ExprKind::Literal(_))
    }

    /// Structural equality ignoring output names and annotations.
    pub fn same_value(&self, other: &ScalarExpr) -> bool {
        self.kind == other.kind
    }

    pub fn is_true(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(ScalarValue::Boolean(Some(true))))
    }

    pub fn is_false(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(ScalarValue::Boolean(Some(false))))
    }

    /// Direct operands, excluding subplans embedded in statements.
    pub fn operands(&self) -> Vec<&ScalarExpr> {
        match &self.kind {
            ExprKind::Column(_) | ExprKind::Literal(_) => vec![],
            ExprKind::Binary(b) => vec![&*b.left, &*b.right],
            ExprKind::Compare(c) => once(&*c.left)
                .chain(once(&*c.right))
                .chain(c.upper.iter().map(|u| &*u.expr))
                .collect(),
            ExprKind::And(list) | ExprKind::Or(list) => list.iter().collect(),
            ExprKind::Not(e) => vec![&**e],
            ExprKind::Func(f) => f.args.iter().collect(),
            ExprKind::Aggr(a) => a.args.iter().collect(),
            ExprKind::Convert(c) => vec![&*c.expr],
            ExprKind::InList(i) => once(&*i.expr).chain(i.list.iter()).collect(),
            ExprKind::Stmt(s) => match s {
                Statement::Query(_) => vec![],
                Statement::Return(e) => vec![&**e],
                Statement::Assign { value, .. } => vec![&**value],
                Statement::If {
                    cond,
                    then,
                    otherwise,
                } => once(&**cond)
                    .chain(then.iter())
                    .chain(otherwise.iter())
                    .collect(),
                Statement::While { cond, body } => {
                    once(&**cond).chain(body.iter()).collect()
                }
            },
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut ScalarExpr> {
        match &mut self.kind {
            ExprKind::Column(_) | ExprKind::Literal(_) => vec![],
            ExprKind::Binary(b) => vec![&mut *b.left, &mut *b.right],
            ExprKind::Compare(c) => once(&mut *c.left)
                .chain(once(&mut *c.right))
                .chain(c.upper.iter_mut().map(|u| &mut *u.expr))
                .collect(),
            ExprKind::And(list) | ExprKind::Or(list) => list.iter_mut().collect(),
            ExprKind::Not(e) => vec![&mut **e],
            ExprKind::Func(f) => f.args.iter_mut().collect(),
            ExprKind::Aggr(a) => a.args.iter_mut().collect(),
            ExprKind::Convert(c) => vec![&mut *c.expr],
            ExprKind::InList(i) => once(&mut *i.expr).chain(i.list.iter_mut()).collect(),
            ExprKind::Stmt(s) => match s {
                Statement::Query(_) => vec![],
                Statement::Return(e) => vec![&mut **e],
                Statement::Assign { value, .. } => vec![&mut **value],
                Statement::If {
                    cond,
                    then,
                    otherwise,
                } => once(&mut **cond)
                    .chain(then.iter_mut())
                    .chain(otherwise.iter_mut())
                    .collect(),
                Statement::While { cond, body } => {
                    once(&mut **cond).chain(body.iter_mut()).collect()
                }
            },
        }
    }

    /// Rewrites this expression bottom-up.
    pub fn transform_up<F>(self, f: &mut F) -> OptResult<ScalarExpr>
    where
        F: FnMut(ScalarExpr) -> OptResult<ScalarExpr>,
    {
        let mut expr = self;
        for operand in expr.operands_mut() {
            let child = std::mem::take(operand);
            *operand = child.transform_up(f)?;
        }
        f(expr)
    }

    /// All column references, in depth first order.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut columns = vec![];
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        if let ExprKind::Column(c) = &self.kind {
            out.push(c);
        }
        for operand in self.operands() {
            operand.collect_columns(out);
        }
    }

    /// Relational subplans embedded anywhere in this expression.
    pub fn subplans(&self) -> Vec<&RelRef> {
        let mut plans = vec![];
        self.collect_subplans(&mut plans);
        plans
    }

    fn collect_subplans<'a>(&'a self, out: &mut Vec<&'a RelRef>) {
        if let ExprKind::Stmt(Statement::Query(plan)) = &self.kind {
            out.push(plan);
        }
        for operand in self.operands() {
            operand.collect_subplans(out);
        }
    }

    pub fn subplans_mut(&mut self) -> Vec<&mut RelRef> {
        let mut plans = vec![];
        self.collect_subplans_mut(&mut plans);
        plans
    }

    fn collect_subplans_mut<'a>(&'a mut self, out: &mut Vec<&'a mut RelRef>) {
        if matches!(self.kind, ExprKind::Stmt(Statement::Query(_))) {
            if let ExprKind::Stmt(Statement::Query(plan)) = &mut self.kind {
                out.push(plan);
            }
            return;
        }
        for operand in self.operands_mut() {
            operand.collect_subplans_mut(out);
        }
    }

    pub fn contains_subplan(&self) -> bool {
        !self.subplans().is_empty()
    }

    pub fn contains_aggregate(&self) -> bool {
        matches!(self.kind, ExprKind::Aggr(_))
            || self.operands().iter().any(|e| e.contains_aggregate())
    }

    /// Whether evaluating the expression twice may yield different results.
    pub fn is_volatile(&self) -> bool {
        match &self.kind {
            ExprKind::Func(f) if f.volatile => true,
            ExprKind::Stmt(_) => true,
            _ => self.operands().iter().any(|e| e.is_volatile()),
        }
    }

    /// Replaces column references for which `f` returns a substitute.
    ///
    /// The alias of `self` is kept, aliases of substitutes are dropped.
    pub fn replace_columns<F>(&self, f: &F) -> ScalarExpr
    where
        F: Fn(&ColumnRef) -> Option<ScalarExpr>,
    {
        let mut expr = self.clone();
        expr.replace_columns_in_place(f);
        expr
    }

    fn replace_columns_in_place<F>(&mut self, f: &F)
    where
        F: Fn(&ColumnRef) -> Option<ScalarExpr>,
    {
        if let ExprKind::Column(c) = &self.kind {
            if let Some(new) = f(c) {
                let alias = self.alias.take();
                *self = new;
                self.alias = alias;
            }
            return;
        }
        for operand in self.operands_mut() {
            operand.replace_columns_in_place(f);
        }
    }

    /// Like [`ScalarExpr::replace_columns`], but every column must be rebound.
    pub fn rebind<F>(&self, f: &mut F) -> OptResult<ScalarExpr>
    where
        F: FnMut(&ColumnRef) -> OptResult<ScalarExpr>,
    {
        let mut expr = self.clone();
        expr.rebind_in_place(f)?;
        Ok(expr)
    }

    fn rebind_in_place<F>(&mut self, f: &mut F) -> OptResult<()>
    where
        F: FnMut(&ColumnRef) -> OptResult<ScalarExpr>,
    {
        if let ExprKind::Column(c) = &self.kind {
            let new = f(c)?;
            let alias = self.alias.take();
            *self = new;
            self.alias = alias;
            return Ok(());
        }
        for operand in self.operands_mut() {
            operand.rebind_in_place(f)?;
        }
        Ok(())
    }

    pub fn data_type(&self, input: &Schema) -> OptResult<DataType> {
        Ok(match &self.kind {
            ExprKind::Column(c) => input.field_for(c)?.data_type.clone(),
            ExprKind::Literal(v) => v.get_datatype(),
            ExprKind::Binary(b) => match b.op {
                Operator::Eq
                | Operator::NotEq
                | Operator::Lt
                | Operator::LtEq
                | Operator::Gt
                | Operator::GtEq
                | Operator::And
                | Operator::Or
                | Operator::IsDistinctFrom
                | Operator::IsNotDistinctFrom => DataType::Boolean,
                _ => promote(&b.left.data_type(input)?, &b.right.data_type(input)?),
            },
            ExprKind::Compare(_)
            | ExprKind::And(_)
            | ExprKind::Or(_)
            | ExprKind::Not(_)
            | ExprKind::InList(_) => DataType::Boolean,
            ExprKind::Func(f) => f.return_type.clone(),
            ExprKind::Aggr(a) => match a.func {
                AggrFunc::Count => DataType::Int64,
                AggrFunc::Avg => DataType::Float64,
                AggrFunc::Sum => match a.args.first() {
                    Some(arg) => sum_type(&arg.data_type(input)?),
                    None => DataType::Int64,
                },
                AggrFunc::Min | AggrFunc::Max => match a.args.first() {
                    Some(arg) => arg.data_type(input)?,
                    None => DataType::Null,
                },
            },
            ExprKind::Convert(c) => c.to.clone(),
            ExprKind::Stmt(_) => DataType::Null,
        })
    }

    pub fn nullable(&self, input: &Schema) -> bool {
        match &self.kind {
            ExprKind::Column(c) => input.field_for(c).map(|f| f.nullable).unwrap_or(true),
            ExprKind::Literal(v) => v.is_null(),
            ExprKind::Aggr(a) => a.func != AggrFunc::Count,
            _ => true,
        }
    }

    /// The field this expression produces when it appears in an output list.
    pub fn output_field(&self, input: &Schema) -> OptResult<Field> {
        let data_type = self.data_type(input)?;
        Ok(match (&self.alias, &self.kind) {
            (Some(alias), _) => Field::new(
                alias.relation.clone(),
                alias.name.clone(),
                data_type,
                self.nullable(input),
            ),
            (None, ExprKind::Column(c)) => input.field_for(c)?.clone(),
            (None, _) => Field::new(None, self.to_string(), data_type, self.nullable(input)),
        })
    }

    /// Gives `self` the output name `name`, adding an alias only where needed.
    pub fn with_output_name(self, name: &ColumnRef) -> ScalarExpr {
        if self.alias.is_some() {
            return self.alias(name.clone());
        }
        match self.as_column() {
            Some(c)
                if c.name == name.name
                    && (c.relation.is_none() || c.relation == name.relation) =>
            {
                self
            }
            _ => self.alias(name.clone()),
        }
    }
}

/// Result type of arithmetic between `l` and `r`.
pub fn promote(l: &DataType, r: &DataType) -> DataType {
    if l == r {
        return l.clone();
    }
    match (numeric_rank(l), numeric_rank(r)) {
        (Some(a), Some(b)) if b > a => r.clone(),
        _ => l.clone(),
    }
}

fn numeric_rank(t: &DataType) -> Option<u8> {
    match t {
        DataType::Int8 | DataType::UInt8 => Some(1),
        DataType::Int16 | DataType::UInt16 => Some(2),
        DataType::Int32 | DataType::UInt32 => Some(3),
        DataType::Int64 | DataType::UInt64 => Some(4),
        DataType::Decimal128(_, _) => Some(5),
        DataType::Float32 => Some(6),
        DataType::Float64 => Some(7),
        _ => None,
    }
}

fn sum_type(t: &DataType) -> DataType {
    match t {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => DataType::Int64,
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            DataType::UInt64
        }
        DataType::Float32 | DataType::Float64 => DataType::Float64,
        other => other.clone(),
    }
}

/// Flattens nested conjunctions into a predicate list.
pub fn split_conjunction<I: IntoIterator<Item = ScalarExpr>>(exprs: I) -> Vec<ScalarExpr> {
    let mut out = vec![];
    for expr in exprs {
        match expr.kind {
            ExprKind::And(list) if expr.alias.is_none() => out.extend(split_conjunction(list)),
            kind => out.push(ScalarExpr { kind, ..expr }),
        }
    }
    out
}

/// Interprets a numeric literal as `f64`.
pub fn scalar_to_f64(v: &ScalarValue) -> Option<f64> {
    match v {
        ScalarValue::Int8(Some(x)) => Some(*x as f64),
        ScalarValue::Int16(Some(x)) => Some(*x as f64),
        ScalarValue::Int32(Some(x)) => Some(*x as f64),
        ScalarValue::Int64(Some(x)) => Some(*x as f64),
        ScalarValue::UInt8(Some(x)) => Some(*x as f64),
        ScalarValue::UInt16(Some(x)) => Some(*x as f64),
        ScalarValue::UInt32(Some(x)) => Some(*x as f64),
        ScalarValue::UInt64(Some(x)) => Some(*x as f64),
        ScalarValue::Float32(Some(x)) => Some(*x as f64),
        ScalarValue::Float64(Some(x)) => Some(*x),
        ScalarValue::Date32(Some(x)) => Some(*x as f64),
        ScalarValue::Date64(Some(x)) => Some(*x as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new(Some("t".to_string()), "a", DataType::Int32, false),
            Field::new(Some("t".to_string()), "b", DataType::Int64, true),
        ])
    }

    #[test]
    fn test_compare_op_swap() {
        use strum::IntoEnumIterator;

        for op in CompareOp::iter() {
            assert_eq!(op, op.swap().swap());
            assert_eq!(op.is_lower_bound(), op.swap().is_upper_bound());
        }
    }

    #[test]
    fn test_column_ref_parse() {
        assert_eq!(ColumnRef::qualified("t", "a"), ColumnRef::parse("t.a"));
        assert_eq!(ColumnRef::bare("a"), ColumnRef::parse("a"));
        assert_eq!(Some(7), ColumnRef::label(7).as_label());
        assert_eq!(None, ColumnRef::parse("t.%7").as_label());
    }

    #[test]
    fn test_data_type() {
        let schema = schema();
        assert_eq!(
            DataType::Int64,
            binary(col("t.a"), Operator::Plus, col("t.b"))
                .data_type(&schema)
                .unwrap()
        );
        assert_eq!(
            DataType::Int64,
            sum(col("t.a")).data_type(&schema).unwrap()
        );
        assert_eq!(
            DataType::Boolean,
            eq(col("a"), lit(1i32)).data_type(&schema).unwrap()
        );
        assert!(col("t.c").data_type(&schema).is_err());
    }

    #[test]
    fn test_output_field() {
        let schema = schema();
        let field = col("a").output_field(&schema).unwrap();
        assert_eq!(ColumnRef::qualified("t", "a"), field.column_ref());

        let field = col("t.a").alias("x").output_field(&schema).unwrap();
        assert_eq!(ColumnRef::bare("x"), field.column_ref());
        assert_eq!(DataType::Int32, field.data_type);
    }

    #[test]
    fn test_replace_columns_keeps_alias() {
        let expr = binary(col("t.a"), Operator::Plus, lit(1i64)).alias("x");
        let replaced = expr.replace_columns(&|c| {
            (c == &ColumnRef::parse("t.a")).then(|| lit(5i64).alias("ignored"))
        });
        assert_eq!(binary(lit(5i64), Operator::Plus, lit(1i64)).alias("x"), replaced);
    }

    #[test]
    fn test_split_conjunction() {
        let preds = split_conjunction(vec![
            and(vec![eq(col("a"), lit(1)), and(vec![gt(col("b"), lit(2))])]),
            lt(col("a"), lit(5)),
        ]);
        assert_eq!(3, preds.len());
    }

    #[test]
    fn test_columns_and_subplans() {
        let expr = and(vec![eq(col("t.a"), col("s.b")), gt(col("t.a"), lit(3))]);
        let columns = expr.columns();
        assert_eq!(3, columns.len());
        assert!(!expr.contains_subplan());
        assert!(!expr.contains_aggregate());
        assert!(count_distinct(col("a")).contains_aggregate());
    }
}
