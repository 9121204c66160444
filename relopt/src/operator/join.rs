use std::fmt::Formatter;

use anyhow::ensure;
use datafusion_expr::JoinType;

use crate::error::OptResult;
use crate::expr::ScalarExpr;
use crate::operator::{check_columns, DisplayFields, ExprList, OperatorTrait};
use crate::plan::Schema;

/// Binary join on a conjunction of predicates. An empty condition is a cross product.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Join {
    join_type: JoinType,
    on: Vec<ScalarExpr>,
}

impl Join {
    pub fn new<I: IntoIterator<Item = ScalarExpr>>(join_type: JoinType, on: I) -> Self {
        Self {
            join_type,
            on: on.into_iter().collect(),
        }
    }

    pub fn inner<I: IntoIterator<Item = ScalarExpr>>(on: I) -> Self {
        Self::new(JoinType::Inner, on)
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn on(&self) -> &[ScalarExpr] {
        &self.on
    }

    pub fn into_on(self) -> Vec<ScalarExpr> {
        self.on
    }

    pub fn with_on(mut self, on: Vec<ScalarExpr>) -> Self {
        self.on = on;
        self
    }

    pub fn with_join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    pub fn is_inner(&self) -> bool {
        self.join_type == JoinType::Inner
    }

    /// Whether the output contains columns of the left and right input.
    pub fn output_sides(&self) -> (bool, bool) {
        match self.join_type {
            JoinType::LeftSemi | JoinType::LeftAnti => (true, false),
            JoinType::RightSemi | JoinType::RightAnti => (false, true),
            _ => (true, true),
        }
    }

    /// Whether a predicate above the join on columns of the left (right) input may be
    /// evaluated below the join.
    pub fn can_push_below(&self) -> (bool, bool) {
        match self.join_type {
            JoinType::Inner => (true, true),
            JoinType::Left | JoinType::LeftSemi | JoinType::LeftAnti => (true, false),
            JoinType::Right | JoinType::RightSemi | JoinType::RightAnti => (false, true),
            JoinType::Full => (false, false),
        }
    }

    /// Whether a join predicate on columns of the left (right) input only may be evaluated on
    /// that input before joining.
    pub fn can_push_condition(&self) -> (bool, bool) {
        match self.join_type {
            JoinType::Inner | JoinType::LeftSemi | JoinType::RightSemi => (true, true),
            JoinType::Left | JoinType::LeftAnti => (false, true),
            JoinType::Right | JoinType::RightAnti => (true, false),
            JoinType::Full => (false, false),
        }
    }

    /// Input schema the join condition is evaluated over.
    pub fn condition_schema(left: &Schema, right: &Schema) -> Schema {
        left.join(right)
    }
}

impl OperatorTrait for Join {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        ensure!(inputs.len() == 2, "join requires two inputs");
        let (left, right) = (inputs[0], inputs[1]);
        check_columns(&self.on, &Join::condition_schema(left, right))?;
        Ok(match self.join_type {
            JoinType::Inner => left.join(right),
            JoinType::Left => left.join(&right.with_nullable(true)),
            JoinType::Right => left.with_nullable(true).join(right),
            JoinType::Full => left.with_nullable(true).join(&right.with_nullable(true)),
            JoinType::LeftSemi | JoinType::LeftAnti => left.clone(),
            JoinType::RightSemi | JoinType::RightAnti => right.clone(),
        })
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        self.on.iter().collect()
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        self.on.iter_mut().collect()
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }
}

impl DisplayFields for Join {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("join_type", &self.join_type)
            .field("on", &ExprList(&self.on))
            .finish()
    }
}
