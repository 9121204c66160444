use std::fmt::Formatter;

use crate::error::OptResult;
use crate::expr::ScalarExpr;
use crate::operator::{single_input, DisplayFields, OperatorTrait};
use crate::plan::Schema;

/// `LIMIT limit OFFSET offset`. No limit means all rows after the offset.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TopN {
    limit: Option<usize>,
    offset: usize,
}

impl TopN {
    pub fn new(limit: Option<usize>, offset: usize) -> Self {
        Self { limit, offset }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Applying `outer` over `self`, as a single top-N.
    pub fn merge(&self, outer: &TopN) -> TopN {
        let offset = self.offset.saturating_add(outer.offset);
        let remaining = self.limit.map(|l| l.saturating_sub(outer.offset));
        let limit = match (remaining, outer.limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        TopN::new(limit, offset)
    }
}

impl OperatorTrait for TopN {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        Ok(single_input(inputs)?.clone())
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        vec![]
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        vec![]
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
}

impl DisplayFields for TopN {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("");
        if let Some(limit) = self.limit {
            s.field("limit", &limit);
        }
        if self.offset > 0 {
            s.field("offset", &self.offset);
        }
        s.finish()
    }
}

/// Random sample of `rows` input rows.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Sample {
    rows: usize,
}

impl Sample {
    pub fn new(rows: usize) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl OperatorTrait for Sample {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        Ok(single_input(inputs)?.clone())
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        vec![]
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        vec![]
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
}

impl DisplayFields for Sample {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("").field("rows", &self.rows).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        // LIMIT 5 OFFSET 2 over LIMIT 10 OFFSET 3 returns inner rows 5..10.
        let merged = TopN::new(Some(10), 3).merge(&TopN::new(Some(5), 2));
        assert_eq!(TopN::new(Some(5), 5), merged);

        let merged = TopN::new(Some(4), 0).merge(&TopN::new(Some(5), 2));
        assert_eq!(TopN::new(Some(2), 2), merged);

        let merged = TopN::new(None, 1).merge(&TopN::new(Some(5), 0));
        assert_eq!(TopN::new(Some(5), 1), merged);
    }
}
