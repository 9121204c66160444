use std::fmt::Formatter;
use std::sync::Arc;

use arrow_schema::DataType;

use crate::catalog::TableDef;
use crate::error::OptResult;
use crate::expr::ScalarExpr;
use crate::operator::{check_columns, single_input, DisplayFields, ExprList, OperatorTrait};
use crate::plan::{Field, Schema};

/// Data modifications output the number of affected rows.
fn row_count_schema() -> Schema {
    Schema::new(vec![Field::new(None, "rowcount", DataType::Int64, false)])
}

/// Inserts all input rows into `table`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Insert {
    table: Arc<TableDef>,
}

impl Insert {
    pub fn new(table: Arc<TableDef>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Arc<TableDef> {
        &self.table
    }
}

impl OperatorTrait for Insert {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        single_input(inputs)?;
        Ok(row_count_schema())
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

impl DisplayFields for Insert {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("").field("table", &self.table.name).finish()
    }
}

/// Updates the input rows of `table`. Each assignment is aliased by its target column.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Update {
    table: Arc<TableDef>,
    assignments: Vec<ScalarExpr>,
}

impl Update {
    pub fn new(table: Arc<TableDef>, assignments: Vec<ScalarExpr>) -> Self {
        Self { table, assignments }
    }

    pub fn assignments(&self) -> &[ScalarExpr] {
        &self.assignments
    }
}

impl OperatorTrait for Update {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        check_columns(&self.assignments, single_input(inputs)?)?;
        Ok(row_count_schema())
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        self.assignments.iter().collect()
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        self.assignments.iter_mut().collect()
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
}

impl DisplayFields for Update {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("table", &self.table.name)
            .field("assignments", &ExprList(&self.assignments))
            .finish()
    }
}

/// Deletes the input rows of `table`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Delete {
    table: Arc<TableDef>,
}

impl Delete {
    pub fn new(table: Arc<TableDef>) -> Self {
        Self { table }
    }
}

impl OperatorTrait for Delete {
    fn derive_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        single_input(inputs)?;
        Ok(row_count_schema())
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

impl DisplayFields for Delete {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("").field("table", &self.table.name).finish()
    }
}

/// Schema statement, e.g. a function or procedure definition whose body is a statement list.
///
/// Statements are opaque to the optimizer, apart from relational subplans embedded in them.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Ddl {
    name: String,
    body: Vec<ScalarExpr>,
}

impl Ddl {
    pub fn new<S: Into<String>>(name: S, body: Vec<ScalarExpr>) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    pub fn body(&self) -> &[ScalarExpr] {
        &self.body
    }
}

impl OperatorTrait for Ddl {
    fn derive_schema(&self, _inputs: &[&Schema]) -> OptResult<Schema> {
        Ok(Schema::empty())
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        self.body.iter().collect()
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        self.body.iter_mut().collect()
    }

    fn arity(&self) -> Option<usize> {
        Some(0)
    }
}

impl DisplayFields for Ddl {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("name", &self.name)
            .field("body", &ExprList(&self.body))
            .finish()
    }
}
