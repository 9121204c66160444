use std::fmt::Formatter;
use std::sync::Arc;

use anyhow::ensure;

use crate::catalog::TableDef;
use crate::error::OptResult;
use crate::expr::ScalarExpr;
use crate::operator::{check_columns, DisplayFields, ExprList, OperatorTrait};
use crate::plan::{Field, Schema};

/// Scan of a catalog table.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct BaseTable {
    table: Arc<TableDef>,
    alias: Option<String>,
}

impl BaseTable {
    pub fn new(table: Arc<TableDef>, alias: Option<String>) -> Self {
        Self { table, alias }
    }

    pub fn table(&self) -> &Arc<TableDef> {
        &self.table
    }

    /// Qualifier of the output columns.
    pub fn relation_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table.name)
    }

    pub fn schema(&self) -> Schema {
        let qualifier = Some(self.relation_name().to_string());
        Schema::new(
            self.table
                .columns
                .iter()
                .map(|c| {
                    Field::new(
                        qualifier.clone(),
                        c.name.clone(),
                        c.data_type.clone(),
                        c.nullable,
                    )
                })
                .collect(),
        )
    }
}

impl OperatorTrait for BaseTable {
    fn derive_schema(&self, _inputs: &[&Schema]) -> OptResult<Schema> {
        Ok(self.schema())
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        vec![]
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        vec![]
    }

    fn arity(&self) -> Option<usize> {
        Some(0)
    }
}

impl DisplayFields for BaseTable {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("");
        s.field("table_name", &self.table.name);
        if let Some(alias) = &self.alias {
            s.field("alias", alias);
        }
        s.finish()
    }
}

/// Literal table.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Values {
    fields: Vec<Field>,
    rows: Vec<Vec<ScalarExpr>>,
}

impl Values {
    pub fn new(fields: Vec<Field>, rows: Vec<Vec<ScalarExpr>>) -> Self {
        Self { fields, rows }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn rows(&self) -> &[Vec<ScalarExpr>] {
        &self.rows
    }

    /// Values of column `idx` over all rows.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &ScalarExpr> {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }
}

impl OperatorTrait for Values {
    fn derive_schema(&self, _inputs: &[&Schema]) -> OptResult<Schema> {
        ensure!(
            self.rows.iter().all(|row| row.len() == self.fields.len()),
            "values row width does not match {} fields",
            self.fields.len()
        );
        check_columns(self.rows.iter().flatten(), &Schema::empty())?;
        Ok(Schema::new(self.fields.clone()))
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        self.rows.iter().flatten().collect()
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        self.rows.iter_mut().flatten().collect()
    }

    fn arity(&self) -> Option<usize> {
        Some(0)
    }
}

impl DisplayFields for Values {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field(
                "rows",
                &self
                    .rows
                    .iter()
                    .map(|row| ExprList(row))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Table producing function.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TableFunc {
    call: ScalarExpr,
    fields: Vec<Field>,
}

impl TableFunc {
    pub fn new(call: ScalarExpr, fields: Vec<Field>) -> Self {
        Self { call, fields }
    }

    pub fn call(&self) -> &ScalarExpr {
        &self.call
    }
}

impl OperatorTrait for TableFunc {
    fn derive_schema(&self, _inputs: &[&Schema]) -> OptResult<Schema> {
        check_columns([&self.call], &Schema::empty())?;
        Ok(Schema::new(self.fields.clone()))
    }

    fn exprs(&self) -> Vec<&ScalarExpr> {
        vec![&self.call]
    }

    fn exprs_mut(&mut self) -> Vec<&mut ScalarExpr> {
        vec![&mut self.call]
    }

    fn arity(&self) -> Option<usize> {
        Some(0)
    }
}

impl DisplayFields for TableFunc {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("")
            .field("call", &ExprList(std::slice::from_ref(&self.call)))
            .finish()
    }
}
