//! Relational nodes.
//!
//! A query plan is a single root dag of [`RelNode`]s connected by [`RelRef`]s. A node referenced
//! by several parents is shared, and is never mutated in place: rewrites go through
//! [`Arc::make_mut`], which clones a shared node before changing it.
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::mem::swap;
use std::sync::Arc;

use enumset::{EnumSet, EnumSetType};
use itertools::Itertools;
use smallvec::SmallVec;

use crate::error::OptResult;
use crate::expr::ScalarExpr;
use crate::operator::{BaseTable, Operator, OperatorTrait};

mod schema;
pub use schema::*;
mod builder;
pub use builder::*;
pub mod explain;
pub mod visit;

pub type RelRef = Arc<RelNode>;

pub type RelInputs = SmallVec<[RelRef; 2]>;

/// Identity of a node within one plan, stable as long as the node is alive.
pub fn rel_id(rel: &RelRef) -> usize {
    Arc::as_ptr(rel) as usize
}

#[derive(EnumSetType, Debug, Hash)]
pub enum RelFlag {
    /// Duplicate rows are removed from the output.
    Distinct,
    /// Produces at most one row.
    Single,
    /// Already normalized by the join order planner.
    Processed,
    /// Input is grouped.
    Grouped,
}

/// Coarse number of output rows.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// At most one row.
    Atom,
    /// One row per group of an aggregation without keys.
    Aggregated,
    MultiRow,
}

/// One node in a plan.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelNode {
    operator: Operator,
    inputs: RelInputs,
    flags: EnumSet<RelFlag>,
    card: Cardinality,
    /// Derived from `operator` and the inputs' schemas.
    schema: Schema,
}

impl RelNode {
    pub fn new<I: IntoIterator<Item = RelRef>>(operator: Operator, inputs: I) -> OptResult<Self> {
        let mut node = Self {
            operator,
            inputs: inputs.into_iter().collect(),
            flags: EnumSet::empty(),
            card: Cardinality::MultiRow,
            schema: Schema::empty(),
        };
        node.rederive()?;
        Ok(node)
    }

    /// Leaf scan of a catalog table.
    pub fn scan(table: BaseTable) -> RelNode {
        let schema = table.schema();
        Self {
            operator: Operator::BaseTable(table),
            inputs: RelInputs::new(),
            flags: EnumSet::empty(),
            card: Cardinality::MultiRow,
            schema,
        }
    }

    pub fn into_ref(self) -> RelRef {
        Arc::new(self)
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn inputs(&self) -> &[RelRef] {
        &self.inputs
    }

    pub fn input(&self, idx: usize) -> &RelRef {
        &self.inputs[idx]
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn card(&self) -> Cardinality {
        self.card
    }

    pub fn is_single_row(&self) -> bool {
        self.card != Cardinality::MultiRow
    }

    pub fn flags(&self) -> EnumSet<RelFlag> {
        self.flags
    }

    pub fn has_flag(&self, flag: RelFlag) -> bool {
        self.flags.contains(flag)
    }

    pub fn is_distinct(&self) -> bool {
        self.has_flag(RelFlag::Distinct)
    }

    pub fn with_flags(mut self, flags: EnumSet<RelFlag>) -> Self {
        self.flags = flags;
        self.card = self.derive_card();
        self
    }

    pub fn with_flag(self, flag: RelFlag) -> Self {
        let mut flags = self.flags;
        flags.insert(flag);
        self.with_flags(flags)
    }

    pub fn without_flag(self, flag: RelFlag) -> Self {
        let mut flags = self.flags;
        flags.remove(flag);
        self.with_flags(flags)
    }

    /// Same operator and flags over new inputs.
    pub fn clone_with_inputs<I: IntoIterator<Item = RelRef>>(
        &self,
        inputs: I,
    ) -> OptResult<RelNode> {
        Ok(RelNode::new(self.operator.clone(), inputs)?.with_flags(self.flags))
    }

    /// Same inputs and flags with a new operator.
    pub fn clone_with_operator(&self, operator: Operator) -> OptResult<RelNode> {
        Ok(RelNode::new(operator, self.inputs.iter().cloned())?.with_flags(self.flags))
    }

    /// Relational subplans embedded in this node's expressions.
    pub fn subplans(&self) -> Vec<&RelRef> {
        self.operator
            .exprs()
            .into_iter()
            .flat_map(|e| e.subplans())
            .collect()
    }

    pub fn exprs(&self) -> Vec<&ScalarExpr> {
        self.operator.exprs()
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut RelInputs {
        &mut self.inputs
    }

    pub(crate) fn operator_mut(&mut self) -> &mut Operator {
        &mut self.operator
    }

    /// Recomputes the schema and cardinality after the operator or inputs changed in place.
    pub(crate) fn rederive(&mut self) -> OptResult<()> {
        self.operator.check_arity(self.inputs.len())?;
        let input_schemas = self.inputs.iter().map(|i| i.schema()).collect::<Vec<_>>();
        self.schema = self.operator.derive_schema(&input_schemas)?;
        self.card = self.derive_card();
        Ok(())
    }

    fn derive_card(&self) -> Cardinality {
        if self.flags.contains(RelFlag::Single) {
            return Cardinality::Atom;
        }
        let inputs_single = !self.inputs.is_empty() && self.inputs.iter().all(|i| i.is_single_row());
        match &self.operator {
            Operator::Values(v) if v.rows().len() <= 1 => Cardinality::Atom,
            Operator::GroupBy(g) if g.keys().is_empty() => Cardinality::Aggregated,
            Operator::TopN(t) if t.limit().map_or(false, |l| l <= 1) => Cardinality::Atom,
            Operator::Project(_) | Operator::Select(_) | Operator::TopN(_) | Operator::Sample(_) => {
                self.inputs
                    .first()
                    .map_or(Cardinality::MultiRow, |i| i.card())
            }
            Operator::Join(_) if inputs_single => Cardinality::Atom,
            Operator::Insert(_) | Operator::Update(_) | Operator::Delete(_) | Operator::Ddl(_) => {
                Cardinality::Atom
            }
            _ => Cardinality::MultiRow,
        }
    }
}

impl Display for RelNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.operator)?;
        if !self.flags.is_empty() {
            write!(
                f,
                " [{}]",
                self.flags.iter().map(|flag| format!("{:?}", flag)).join(", ")
            )?;
        }
        Ok(())
    }
}

/// Breath first iterator of a single root dag plan, visiting shared nodes once.
struct BfsRelIter {
    visited: HashSet<usize>,
    cur_level: Vec<RelRef>,
    next_level: Vec<RelRef>,
}

impl Iterator for BfsRelIter {
    type Item = RelRef;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur_level.is_empty() {
            swap(&mut self.cur_level, &mut self.next_level);
        }

        if let Some(p) = self.cur_level.pop() {
            for input in p.inputs().iter().chain(p.subplans()) {
                if self.visited.insert(rel_id(input)) {
                    self.next_level.push(input.clone());
                }
            }

            Some(p)
        } else {
            None
        }
    }
}

/// Iterates all nodes reachable from `root`, including nodes of embedded subplans.
pub fn bfs_iter(root: &RelRef) -> impl Iterator<Item = RelRef> {
    let mut visited = HashSet::new();
    visited.insert(rel_id(root));

    BfsRelIter {
        cur_level: vec![root.clone()],
        next_level: vec![],
        visited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, eq, lit};
    use crate::operator::{Join, SetOp};
    use crate::test_utils::{table_t1, table_t2};

    #[test]
    fn test_bfs_visits_shared_node_once() {
        let shared = RelBuilder::scan(table_t1()).build();
        let root = RelNode::new(
            Operator::SetOp(SetOp::union_all()),
            vec![shared.clone(), shared],
        )
        .unwrap()
        .into_ref();

        assert_eq!(2, bfs_iter(&root).count());
    }

    #[test]
    fn test_join_schema() {
        let left = RelBuilder::scan(table_t1()).build();
        let right = RelBuilder::scan(table_t2()).build();
        let join = RelNode::new(
            Operator::Join(Join::new(
                datafusion_expr::JoinType::Left,
                vec![eq(col("t1.c1"), col("t2.c1"))],
            )),
            vec![left.clone(), right.clone()],
        )
        .unwrap();

        assert_eq!(left.schema().len() + right.schema().len(), join.schema().len());
        assert!(join.schema().fields()[left.schema().len()].nullable);
    }

    #[test]
    fn test_invalid_column() {
        let result = RelBuilder::scan(table_t1()).select(vec![eq(col("t9.c1"), lit(1))]);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_arity() {
        let scan = RelBuilder::scan(table_t1()).build();
        assert!(RelNode::new(Operator::Join(Join::inner(vec![])), vec![scan]).is_err());
    }

    #[test]
    fn test_cardinality() {
        let rel = RelBuilder::scan(table_t1())
            .group_by(vec![], vec![crate::expr::count_star().alias("n")])
            .unwrap()
            .build();
        assert_eq!(Cardinality::Aggregated, rel.card());
        assert!(rel.is_single_row());
    }
}
