use std::fmt::Formatter;

use crate::error::OptResult;
use crate::expr::ScalarExpr;
use crate::operator::{check_columns, single_input, DisplayFields, ExprList, OperatorTrait};
use crate::plan::Schema;

/// Selection on a conjunction of predicates.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Select {
    predicates: Vec<ScalarExpr>,
}

impl Select {
    pub fn new<I: IntoIterator<Item = ScalarExpr>>(predicates: I) -> Self {
        Self {
            predicates: predicates.into_iter().collect(),
        }
    }

    pub fn predicates(&self) -> &[ScalarExpr] {
        &self.predicates
    }

    pub fn into_predicates(self) -> Vec<ScalarExpr> {
        self.predicates
    }
}

impl OperatorTrait for Select {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        let input = single_input(inputs)?;
        check_columns(&self.predicates, input)?;
        Ok(input.clone())
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        self.predicates.iter().collect()
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        self.predicates.iter_mut().collect()
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
}

impl DisplayFields for Select {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("predicates", &ExprList(&self.predicates))
            .finish()
    }
}
