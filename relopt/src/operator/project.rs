use std::fmt::Formatter;

use crate::error::OptResult;
use crate::expr::ScalarExpr;
use crate::operator::{
    check_columns, output_schema, single_input, DisplayFields, ExprList, OperatorTrait,
};
use crate::plan::Schema;

/// Projection, optionally ordered.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Project {
    exprs: Vec<ScalarExpr>,
    /// Evaluated over the input.
    order_by: Vec<ScalarExpr>,
}

impl Project {
    pub fn new<I: IntoIterator<Item = ScalarExpr>>(exprs: I) -> Self {
        Self {
            exprs: exprs.into_iter().collect(),
            order_by: vec![],
        }
    }

    pub fn with_order_by(mut self, order_by: Vec<ScalarExpr>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn exprs(&self) -> &[ScalarExpr] {
        &self.exprs
    }

    pub fn order_by(&self) -> &[ScalarExpr] {
        &self.order_by
    }

    pub(crate) fn output_mut(&mut self) -> &mut Vec<ScalarExpr> {
        &mut self.exprs
    }

    pub fn into_exprs(self) -> Vec<ScalarExpr> {
        self.exprs
    }

    /// Whether every output is a plain column reference.
    pub fn is_plain(&self) -> bool {
        self.exprs.iter().all(|e| e.as_column().is_some())
    }
}

impl OperatorTrait for Project {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        let input = single_input(inputs)?;
        check_columns(&self.order_by, input)?;
        output_schema(&self.exprs, input)
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        self.exprs.iter().chain(self.order_by.iter()).collect()
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        self.exprs
            .iter_mut()
            .chain(self.order_by.iter_mut())
            .collect()
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
}

impl DisplayFields for Project {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("");
        s.field("exprs", &ExprList(&self.exprs));
        if !self.order_by.is_empty() {
            s.field("order_by", &ExprList(&self.order_by));
        }
        s.finish()
    }
}
