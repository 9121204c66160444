use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use log::debug;
use petgraph::algo::connected_components;
use petgraph::graph::UnGraph;

use crate::cost::Estimator;
use crate::error::OptResult;
use crate::expr::{split_conjunction, ExprKind, ScalarExpr};
use crate::operator::{self, Operator};
use crate::plan::{RelFlag, RelNode, RelRef};
use crate::properties::PropertyTable;
use crate::rules::filter;

/// Set of leaf relations of a join graph.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelSet(u64);

impl RelSet {
    /// Relations a set can hold.
    pub const CAPACITY: usize = 64;

    pub fn single(idx: usize) -> Self {
        RelSet(1 << idx)
    }

    /// The first `n` relations.
    pub fn first(n: usize) -> Self {
        if n >= Self::CAPACITY {
            RelSet(u64::MAX)
        } else {
            RelSet((1 << n) - 1)
        }
    }

    pub fn union(self, other: RelSet) -> RelSet {
        RelSet(self.0 | other.0)
    }

    pub fn difference(self, other: RelSet) -> RelSet {
        RelSet(self.0 & !other.0)
    }

    pub fn intersects(self, other: RelSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_subset(self, other: RelSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn contains(self, idx: usize) -> bool {
        self.intersects(RelSet::single(idx))
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..Self::CAPACITY).filter(move |idx| self.contains(*idx))
    }

    /// Non-empty proper subsets of this set.
    pub fn proper_subsets(self) -> impl Iterator<Item = RelSet> {
        let all = self.0;
        let mut next = all.wrapping_sub(1) & all;
        std::iter::from_fn(move || {
            if next == 0 {
                return None;
            }
            let current = next;
            next = (next - 1) & all;
            Some(RelSet(current))
        })
    }
}

impl Debug for RelSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.iter().join(", "))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PredicateKind {
    Equality,
    InList,
    /// Two sided range.
    Between,
    Range,
    Other,
}

impl PredicateKind {
    fn of(expr: &ScalarExpr) -> PredicateKind {
        match &expr.kind {
            ExprKind::Compare(c) if c.is_equality() => PredicateKind::Equality,
            ExprKind::Compare(c) if c.op.is_range() && !c.anti => match c.upper {
                Some(_) => PredicateKind::Between,
                None => PredicateKind::Range,
            },
            ExprKind::InList(l) if !l.anti => PredicateKind::InList,
            _ => PredicateKind::Other,
        }
    }
}

/// A predicate over two or more leaves.
#[derive(Clone, Debug)]
pub struct JoinPredicate {
    pub expr: ScalarExpr,
    pub relations: RelSet,
    pub kind: PredicateKind,
    /// Equality on a key of one side.
    pub key_join: bool,
}

impl JoinPredicate {
    /// Preference of the greedy planner.
    pub fn score(&self) -> i32 {
        let score = match self.kind {
            PredicateKind::Equality => 90,
            PredicateKind::InList => 14,
            PredicateKind::Between => 12,
            PredicateKind::Range => 6,
            PredicateKind::Other => 3,
        };
        if self.key_join {
            score + 100
        } else {
            score
        }
    }

    /// Whether the predicate connects two relations by equality, forming an edge of the join
    /// graph.
    pub fn is_edge(&self) -> bool {
        self.kind == PredicateKind::Equality && self.relations.len() == 2
    }
}

/// Binary join tree over the leaves of a [`JoinGraph`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinTree {
    Leaf(usize),
    Join(Box<JoinTree>, Box<JoinTree>),
}

impl JoinTree {
    pub fn join(left: JoinTree, right: JoinTree) -> JoinTree {
        JoinTree::Join(Box::new(left), Box::new(right))
    }

    pub fn relations(&self) -> RelSet {
        match self {
            JoinTree::Leaf(idx) => RelSet::single(*idx),
            JoinTree::Join(l, r) => l.relations().union(r.relations()),
        }
    }
}

/// A maximal cluster of inner joins, flattened into leaf relations and a predicate pool.
pub struct JoinGraph {
    /// Leaf relations, with the predicates on a single leaf applied.
    pub leaves: Vec<RelRef>,
    pub predicates: Vec<JoinPredicate>,
    /// Predicates evaluated above the whole cluster.
    pub residual: Vec<ScalarExpr>,
}

impl JoinGraph {
    /// Flattens the inner joins rooted at `root`. Joins referenced by several parents, or
    /// carrying flags, stay leaves.
    ///
    /// Returns `None` when the cluster can not be reordered, e.g. a column can not be traced to
    /// exactly one leaf.
    pub fn flatten(
        root: &RelRef,
        properties: &PropertyTable,
        estimator: &Estimator,
        max_depth: usize,
    ) -> OptResult<Option<JoinGraph>> {
        let mut leaves = vec![];
        let mut conditions = vec![];
        let mut stack = vec![(root.clone(), 0)];
        while let Some((rel, depth)) = stack.pop() {
            if depth > max_depth {
                debug!("Join cluster deeper than {}, keeping join order", max_depth);
                return Ok(None);
            }
            let expandable = Arc::ptr_eq(&rel, root)
                || (rel.flags().is_empty() && !properties.is_shared(&rel));
            match rel.operator() {
                Operator::Join(join) if join.is_inner() && expandable => {
                    conditions.extend(join.on().iter().cloned());
                    stack.push((rel.input(1).clone(), depth + 1));
                    stack.push((rel.input(0).clone(), depth + 1));
                }
                _ => leaves.push(rel),
            }
        }
        if leaves.len() > RelSet::CAPACITY {
            debug!("{} relations exceed the join planner capacity", leaves.len());
            return Ok(None);
        }

        let mut leaf_predicates = vec![vec![]; leaves.len()];
        let mut predicates = vec![];
        let mut residual = vec![];
        for expr in split_conjunction(conditions) {
            let mut relations = RelSet::default();
            for column in expr.columns() {
                let owners = leaves
                    .iter()
                    .positions(|leaf| leaf.schema().contains(column))
                    .collect::<Vec<_>>();
                match owners.as_slice() {
                    [idx] => relations = relations.union(RelSet::single(*idx)),
                    _ => return Ok(None),
                }
            }

            let single = match relations.iter().collect::<Vec<_>>().as_slice() {
                [idx] => Some(*idx),
                _ => None,
            };
            if relations.is_empty() || expr.is_volatile() || expr.contains_subplan() {
                residual.push(expr);
            } else if let Some(idx) = single {
                leaf_predicates[idx].push(expr);
            } else {
                let kind = PredicateKind::of(&expr);
                let leaf_refs = leaves.iter().collect::<Vec<_>>();
                let key_join = expr
                    .as_compare()
                    .and_then(|c| c.equi_columns())
                    .map_or(false, |(l, r)| estimator.is_key_join(l, r, &leaf_refs));
                predicates.push(JoinPredicate {
                    expr,
                    relations,
                    kind,
                    key_join,
                });
            }
        }

        let leaves = leaves
            .iter()
            .zip(leaf_predicates)
            .map(|(leaf, predicates)| filter(leaf, predicates))
            .collect::<OptResult<Vec<_>>>()?;
        Ok(Some(JoinGraph {
            leaves,
            predicates,
            residual,
        }))
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn all(&self) -> RelSet {
        RelSet::first(self.len())
    }

    /// Whether equality predicates connect all leaves.
    pub fn is_connected(&self) -> bool {
        let mut graph = UnGraph::<(), ()>::new_undirected();
        let nodes = self
            .leaves
            .iter()
            .map(|_| graph.add_node(()))
            .collect::<Vec<_>>();
        for predicate in self.predicates.iter().filter(|p| p.is_edge()) {
            if let Some((a, b)) = predicate.relations.iter().collect_tuple() {
                graph.add_edge(nodes[a], nodes[b], ());
            }
        }
        connected_components(&graph) <= 1
    }

    /// Predicates to evaluate when joining `left` with `right`: those over both sides and
    /// nothing else.
    pub fn join_predicates(&self, left: RelSet, right: RelSet) -> Vec<usize> {
        let both = left.union(right);
        self.predicates
            .iter()
            .positions(|p| {
                p.relations.is_subset(both)
                    && !p.relations.is_subset(left)
                    && !p.relations.is_subset(right)
            })
            .collect()
    }

    /// Builds the plan of `tree`. Joins are marked processed, residual predicates are applied
    /// on top.
    pub fn build_plan(&self, tree: &JoinTree) -> OptResult<RelRef> {
        let joined = self.build_join(tree)?;
        filter(&joined, self.residual.clone())
    }

    fn build_join(&self, tree: &JoinTree) -> OptResult<RelRef> {
        match tree {
            JoinTree::Leaf(idx) => Ok(self.leaves[*idx].clone()),
            JoinTree::Join(l, r) => {
                let on = self
                    .join_predicates(l.relations(), r.relations())
                    .into_iter()
                    .map(|idx| self.predicates[idx].expr.clone())
                    .collect::<Vec<_>>();
                let inputs = [self.build_join(l)?, self.build_join(r)?];
                Ok(
                    RelNode::new(Operator::Join(operator::Join::inner(on)), inputs)?
                        .with_flag(RelFlag::Processed)
                        .into_ref(),
                )
            }
        }
    }
}
