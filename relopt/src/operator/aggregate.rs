use std::fmt::Formatter;

use crate::error::OptResult;
use crate::expr::{AggrCall, ScalarExpr};
use crate::operator::{
    check_columns, output_schema, single_input, DisplayFields, ExprList, OperatorTrait,
};
use crate::plan::Schema;

/// Grouping with aggregation.
///
/// The output is `exprs`, a mix of aggregate calls and expressions over `keys`. Without keys
/// the whole input forms one group and the output is a single row.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct GroupBy {
    keys: Vec<ScalarExpr>,
    exprs: Vec<ScalarExpr>,
}

impl GroupBy {
    pub fn new(keys: Vec<ScalarExpr>, exprs: Vec<ScalarExpr>) -> Self {
        Self { keys, exprs }
    }

    pub fn keys(&self) -> &[ScalarExpr] {
        &self.keys
    }

    pub fn exprs(&self) -> &[ScalarExpr] {
        &self.exprs
    }

    /// Aggregate calls of the output list.
    pub fn aggregates(&self) -> impl Iterator<Item = &AggrCall> {
        self.exprs.iter().filter_map(|e| e.as_aggr())
    }

    pub(crate) fn output_mut(&mut self) -> &mut Vec<ScalarExpr> {
        &mut self.exprs
    }

    pub fn into_parts(self) -> (Vec<ScalarExpr>, Vec<ScalarExpr>) {
        (self.keys, self.exprs)
    }
}

impl OperatorTrait for GroupBy {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        let input = single_input(inputs)?;
        check_columns(&self.keys, input)?;
        output_schema(&self.exprs, input)
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        self.keys.iter().chain(self.exprs.iter()).collect()
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        self.keys.iter_mut().chain(self.exprs.iter_mut()).collect()
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
}

impl DisplayFields for GroupBy {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("keys", &ExprList(&self.keys))
            .field("exprs", &ExprList(&self.exprs))
            .finish()
    }
}
