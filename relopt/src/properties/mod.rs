//! Facts about plan nodes that gate rewrites.
//!
//! Properties are inferred for a whole plan at once by [`infer_properties`]: constants and keys
//! bottom-up, needed columns top-down. They are never patched incrementally. A rewrite pass
//! infers them again before it starts.
//!
//! Lookups of nodes unknown to the table, e.g. nodes created by the running pass, return the
//! conservative answer.
mod column_set;
pub use column_set::*;
mod infer;
pub use infer::*;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use datafusion_common::ScalarValue;

use crate::expr::ColumnRef;
use crate::plan::{rel_id, RelNode, RelRef};

/// Facts about one node's output.
#[derive(Clone, Debug, Default)]
pub struct PropertyRecord {
    /// Output columns holding a single value in all rows.
    pub constants: HashMap<ColumnId, ScalarValue>,
    /// Pairs of output columns equal in all rows.
    pub equivalences: Vec<(ColumnId, ColumnId)>,
    /// Output columns that ancestors still need.
    pub needed: ColumnSet,
    /// Column sets on which the output is unique. An empty set means at most one row.
    pub unique_keys: Vec<ColumnSet>,
    /// Number of parent references.
    pub parents: usize,
}

#[derive(Default)]
pub struct PropertyTable {
    registry: ColumnRegistry,
    records: HashMap<usize, (Weak<RelNode>, PropertyRecord)>,
    /// Nodes rebuilt during a pass, mapped to the node they replace.
    aliases: HashMap<usize, (Weak<RelNode>, usize)>,
}

impl PropertyTable {
    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn get(&self, rel: &RelRef) -> Option<&PropertyRecord> {
        let id = rel_id(rel);
        let id = self.aliases.get(&id).map_or(id, |(_, original)| *original);
        self.records.get(&id).map(|(_, record)| record)
    }

    /// Lets `rebuilt`, equivalent to `original`, share the record of `original`.
    pub fn alias(&mut self, rebuilt: &RelRef, original: &RelRef) {
        let id = rel_id(original);
        let id = self.aliases.get(&id).map_or(id, |(_, original)| *original);
        if self.records.contains_key(&id) {
            self.aliases
                .insert(rel_id(rebuilt), (Arc::downgrade(rebuilt), id));
        }
    }

    /// Id of an output column of `rel`, referenced by `column`.
    pub fn column_id(&self, rel: &RelNode, column: &ColumnRef) -> Option<ColumnId> {
        let idx = rel.schema().index_of(column)?;
        self.registry.id(&rel.schema().field(idx).column_ref())
    }

    pub fn constant(&self, rel: &RelRef, column: &ColumnRef) -> Option<&ScalarValue> {
        let id = self.column_id(rel, column)?;
        self.get(rel)?.constants.get(&id)
    }

    /// Whether ancestors of `rel` need its output `column`. Unknown means needed.
    pub fn is_needed(&self, rel: &RelRef, column: &ColumnRef) -> bool {
        match (self.get(rel), self.column_id(rel, column)) {
            (Some(record), Some(id)) => record.needed.contains(id),
            _ => true,
        }
    }

    /// Whether the output of `rel` has no duplicates on `columns`.
    pub fn is_unique_on(&self, rel: &RelRef, columns: &[&ColumnRef]) -> bool {
        let record = match self.get(rel) {
            Some(record) => record,
            None => return rel.is_single_row(),
        };
        let ids = columns
            .iter()
            .filter_map(|c| self.column_id(rel, c))
            .collect::<ColumnSet>();
        record.unique_keys.iter().any(|key| key.is_subset(&ids))
    }

    /// Whether `rel` is referenced by more than one parent.
    pub fn is_shared(&self, rel: &RelRef) -> bool {
        self.get(rel).map_or(false, |record| record.parents > 1)
    }

    fn insert(&mut self, rel: &RelRef, record: PropertyRecord) {
        self.records
            .insert(rel_id(rel), (Arc::downgrade(rel), record));
    }

    fn record_mut(&mut self, rel: &RelRef) -> Option<&mut PropertyRecord> {
        self.records.get_mut(&rel_id(rel)).map(|(_, record)| record)
    }
}
