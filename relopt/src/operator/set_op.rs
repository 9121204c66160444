use std::fmt::Formatter;

use anyhow::ensure;
use strum_macros::AsRefStr;

use crate::error::OptResult;
use crate::expr::ScalarExpr;
use crate::operator::{DisplayFields, OperatorTrait};
use crate::plan::{Field, Schema};

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, AsRefStr)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

/// Set operation over two or more inputs with positionally matching columns.
///
/// Output columns are named after the first input.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SetOp {
    kind: SetOpKind,
    all: bool,
}

impl SetOp {
    pub fn new(kind: SetOpKind, all: bool) -> Self {
        Self { kind, all }
    }

    pub fn union_all() -> Self {
        Self::new(SetOpKind::Union, true)
    }

    pub fn kind(&self) -> SetOpKind {
        self.kind
    }

    pub fn all(&self) -> bool {
        self.all
    }

    pub fn is_union_all(&self) -> bool {
        self.kind == SetOpKind::Union && self.all
    }
}

impl OperatorTrait for SetOp {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        ensure!(inputs.len() >= 2, "set operation requires two or more inputs");
        let first = inputs[0];
        ensure!(
            inputs.iter().all(|s| s.len() == first.len()),
            "set operation inputs differ in width"
        );
        let fields = first
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let nullable = inputs.iter().any(|s| s.field(idx).nullable);
                Field::new(
                    field.qualifier.clone(),
                    field.name.clone(),
                    field.data_type.clone(),
                    nullable,
                )
            })
            .collect();
        Ok(Schema::new(fields))
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        vec![]
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        vec![]
    }

    fn arity(&self) -> Option<usize> {
        None
    }
}

impl DisplayFields for SetOp {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("kind", &self.kind)
            .field("all", &self.all)
            .finish()
    }
}
