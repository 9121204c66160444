//! Relational operators.
//!
//! Every [`RelNode`](crate::plan::RelNode) carries exactly one [`Operator`]. The operator owns
//! the node's expression lists, and derives the node's output schema from its inputs' schemas.
mod table;
pub use table::*;
mod project;
pub use project::*;
mod select;
pub use select::*;
mod join;
pub use join::*;
mod aggregate;
pub use aggregate::*;
mod set_op;
pub use set_op::*;
mod top_n;
pub use top_n::*;
mod modify;
pub use modify::*;

use std::fmt::{Debug, Display, Formatter};

use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use strum_macros::AsRefStr;

use crate::error::{OptResult, OptimizerError};
use crate::expr::ScalarExpr;
use crate::plan::Schema;

/// Relational operator.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EnumAsInner, AsRefStr)]
#[enum_dispatch]
pub enum Operator {
    BaseTable(BaseTable),
    Values(Values),
    Project(Project),
    Select(Select),
    Join(Join),
    GroupBy(GroupBy),
    SetOp(SetOp),
    TopN(TopN),
    Sample(Sample),
    TableFunc(TableFunc),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Ddl(Ddl),
}

#[enum_dispatch(Operator)]
pub trait OperatorTrait {
    /// Output schema given the schemas of the inputs.
    ///
    /// Fails when an expression references a column missing from the inputs.
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema>;

    /// All expression lists of this operator, in a fixed order.
    fn exprs(&self) -> Vec<&ScalarExpr>;

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr>;

    /// Number of inputs, `None` for n-ary operators.
    fn arity(&self) -> Option<usize>;
}

/// Writes operator specific fields.
#[enum_dispatch(Operator)]
pub trait DisplayFields {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result;
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())?;
        self.display(f)
    }
}

impl Operator {
    pub fn check_arity(&self, inputs: usize) -> OptResult<()> {
        let ok = match self.arity() {
            Some(n) => n == inputs,
            None => inputs >= 2,
        };
        if ok {
            Ok(())
        } else {
            Err(OptimizerError::invariant(
                "build",
                self,
                format!("unexpected number of inputs {}", inputs),
            )
            .into())
        }
    }

    /// Output expression list of operators computing their output columns.
    pub fn output_exprs(&self) -> Option<&[ScalarExpr]> {
        match self {
            Operator::Project(p) => Some(p.exprs()),
            Operator::GroupBy(g) => Some(g.exprs()),
            _ => None,
        }
    }

    pub(crate) fn output_exprs_mut(&mut self) -> Option<&mut Vec<ScalarExpr>> {
        match self {
            Operator::Project(p) => Some(p.output_mut()),
            Operator::GroupBy(g) => Some(g.output_mut()),
            _ => None,
        }
    }

    /// Whether the operator only filters or reorders input rows, keeping the input schema.
    pub fn preserves_schema(&self) -> bool {
        matches!(
            self,
            Operator::Select(_) | Operator::TopN(_) | Operator::Sample(_)
        )
    }
}

/// Renders an expression list as `[a, b]` in operator fields.
pub struct ExprList<'a>(pub &'a [ScalarExpr]);

impl<'a> Debug for ExprList<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

/// Checks that every column referenced by `exprs` resolves in `schema`.
pub(crate) fn check_columns<'a, I>(exprs: I, schema: &Schema) -> OptResult<()>
where
    I: IntoIterator<Item = &'a ScalarExpr>,
{
    for expr in exprs {
        for column in expr.columns() {
            schema.resolve(column)?;
        }
    }
    Ok(())
}

/// Output schema of an expression list evaluated over `input`.
pub(crate) fn output_schema(exprs: &[ScalarExpr], input: &Schema) -> OptResult<Schema> {
    Ok(Schema::new(
        exprs
            .iter()
            .map(|e| e.output_field(input))
            .collect::<OptResult<Vec<_>>>()?,
    ))
}

fn single_input<'a>(inputs: &[&'a Schema]) -> OptResult<&'a Schema> {
    inputs
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("operator requires an input"))
}
