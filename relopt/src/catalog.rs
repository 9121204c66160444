//! Read-only catalog consumed by the optimizer.
//!
//! The catalog describes tables (columns, keys, indexes) and optionally their statistics. The
//! optimizer never mutates it, and a missing entry only degrades estimates.
use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{DataType, Schema as ArrowSchema};

use crate::stat::TableStatistics;

/// Table definitions and statistics provider.
pub trait Catalog {
    fn table(&self, name: &str) -> Option<Arc<TableDef>>;

    fn statistics(&self, name: &str) -> Option<&TableStatistics>;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new<S: Into<String>>(name: S, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// `columns` of the owning table reference `referenced_columns` of `referenced_table`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub unique_keys: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn new<S: Into<String>>(name: S, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: vec![],
            unique_keys: vec![],
            foreign_keys: vec![],
            indexes: vec![],
        }
    }

    pub fn from_arrow_schema<S: Into<String>>(name: S, schema: &ArrowSchema) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| ColumnDef::new(f.name().clone(), f.data_type().clone(), f.is_nullable()))
            .collect();
        Self::new(name, columns)
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = to_strings(columns);
        self
    }

    pub fn with_unique_key(mut self, columns: &[&str]) -> Self {
        self.unique_keys.push(to_strings(columns));
        self
    }

    pub fn with_foreign_key(
        mut self,
        columns: &[&str],
        referenced_table: &str,
        referenced_columns: &[&str],
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            columns: to_strings(columns),
            referenced_table: referenced_table.to_string(),
            referenced_columns: to_strings(referenced_columns),
        });
        self
    }

    pub fn with_index(mut self, name: &str, columns: &[&str], unique: bool) -> Self {
        self.indexes.push(IndexDef {
            name: name.to_string(),
            columns: to_strings(columns),
            unique,
        });
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column sets on which rows of this table are unique.
    pub fn keys(&self) -> Vec<&[String]> {
        let unique_indexes = self
            .indexes
            .iter()
            .filter(|idx| idx.unique)
            .map(|idx| idx.columns.as_slice());
        Some(self.primary_key.as_slice())
            .filter(|pk| !pk.is_empty())
            .into_iter()
            .chain(self.unique_keys.iter().map(Vec::as_slice))
            .chain(unique_indexes)
            .collect()
    }

    /// Whether `columns` contain a key of this table.
    pub fn is_unique_on(&self, columns: &[&str]) -> bool {
        self.keys()
            .iter()
            .any(|key| key.iter().all(|k| columns.contains(&k.as_str())))
    }

    pub fn is_primary_key(&self, columns: &[&str]) -> bool {
        !self.primary_key.is_empty()
            && self.primary_key.len() == columns.len()
            && self.primary_key.iter().all(|k| columns.contains(&k.as_str()))
    }
}

fn to_strings(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// Catalog held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryCatalog {
    tables: HashMap<String, Arc<TableDef>>,
    statistics: HashMap<String, TableStatistics>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&mut self, table: TableDef) -> Arc<TableDef> {
        let table = Arc::new(table);
        self.tables.insert(table.name.clone(), table.clone());
        table
    }

    pub fn register_statistics<S: Into<String>>(&mut self, table: S, stats: TableStatistics) {
        self.statistics.insert(table.into(), stats);
    }
}

impl Catalog for MemoryCatalog {
    fn table(&self, name: &str) -> Option<Arc<TableDef>> {
        self.tables.get(name).cloned()
    }

    fn statistics(&self, name: &str) -> Option<&TableStatistics> {
        self.statistics.get(name)
    }
}
