use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use bit_set::BitSet;

use crate::expr::ColumnRef;

pub type ColumnId = usize;

/// Interns column references of one plan into dense ids.
#[derive(Default, Debug)]
pub struct ColumnRegistry {
    ids: HashMap<ColumnRef, ColumnId>,
    columns: Vec<ColumnRef>,
}

impl ColumnRegistry {
    pub fn intern(&mut self, column: &ColumnRef) -> ColumnId {
        if let Some(id) = self.ids.get(column) {
            return *id;
        }
        let id = self.columns.len();
        self.columns.push(column.clone());
        self.ids.insert(column.clone(), id);
        id
    }

    pub fn id(&self, column: &ColumnRef) -> Option<ColumnId> {
        self.ids.get(column).copied()
    }

    pub fn column(&self, id: ColumnId) -> Option<&ColumnRef> {
        self.columns.get(id)
    }
}

/// Growable set of column ids.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ColumnSet(BitSet);

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ColumnId) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: ColumnId) -> bool {
        self.0.contains(id)
    }

    pub fn union_with(&mut self, other: &ColumnSet) {
        self.0.union_with(&other.0)
    }

    pub fn is_subset(&self, other: &ColumnSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.0.iter()
    }
}

impl FromIterator<ColumnId> for ColumnSet {
    fn from_iter<T: IntoIterator<Item = ColumnId>>(iter: T) -> Self {
        ColumnSet(iter.into_iter().collect())
    }
}

impl Debug for ColumnSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}
