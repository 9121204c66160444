use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};

use itertools::Itertools;
use log::trace;
use prettytable::{row, Table};

use crate::cost::{CostModel, Estimate, Estimator};
use crate::expr::ScalarExpr;
use crate::join_order::{JoinGraph, JoinTree, RelSet};
use crate::plan::RelRef;

/// Costs joins of leaf subsets of a [`JoinGraph`].
pub struct JoinCoster<'a> {
    graph: &'a JoinGraph,
    estimator: &'a Estimator<'a>,
    model: CostModel,
    leaves: Vec<Estimate>,
}

impl<'a> JoinCoster<'a> {
    pub fn new(graph: &'a JoinGraph, estimator: &'a Estimator<'a>, model: CostModel) -> Self {
        let leaves = graph
            .leaves
            .iter()
            .map(|leaf| model.leaf(estimator.row_count(leaf), estimator.row_width(leaf)))
            .collect();
        Self {
            graph,
            estimator,
            model,
            leaves,
        }
    }

    pub fn graph(&self) -> &JoinGraph {
        self.graph
    }

    pub fn leaf(&self, idx: usize) -> Estimate {
        self.leaves[idx]
    }

    /// Selectivity of the predicates evaluated when joining `left` with `right`.
    pub fn selectivity(&self, left: RelSet, right: RelSet) -> f64 {
        let predicates = self
            .graph
            .join_predicates(left, right)
            .into_iter()
            .map(|idx| self.graph.predicates[idx].expr.clone())
            .collect::<Vec<ScalarExpr>>();
        let inputs = self.graph.leaves.iter().collect::<Vec<&RelRef>>();
        self.estimator.conjunction_selectivity(&predicates, &inputs)
    }

    pub fn join(
        &self,
        left: RelSet,
        left_estimate: &Estimate,
        right: RelSet,
        right_estimate: &Estimate,
    ) -> Estimate {
        let key_join = self
            .graph
            .join_predicates(left, right)
            .into_iter()
            .any(|idx| self.graph.predicates[idx].key_join);
        self.model.join(
            left_estimate,
            right_estimate,
            self.selectivity(left, right),
            key_join,
        )
    }

    /// Estimate of a whole join tree.
    pub fn estimate_tree(&self, tree: &JoinTree) -> Estimate {
        match tree {
            JoinTree::Leaf(idx) => self.leaf(*idx),
            JoinTree::Join(l, r) => {
                let (left, right) = (self.estimate_tree(l), self.estimate_tree(r));
                self.join(l.relations(), &left, r.relations(), &right)
            }
        }
    }
}

/// One way of joining the relations of a memo item.
#[derive(Copy, Clone, Debug)]
pub struct Alternative {
    pub left: RelSet,
    pub right: RelSet,
    pub estimate: Estimate,
}

pub struct MemoItem {
    pub relations: RelSet,
    /// Alternatives costed for this item, in enumeration order. Empty for leaves.
    pub alternatives: Vec<Alternative>,
    /// Estimate of the best alternative, or of the leaf.
    pub estimate: Estimate,
}

impl MemoItem {
    /// Cheapest alternative, `None` for leaves.
    pub fn best(&self) -> Option<&Alternative> {
        self.alternatives
            .iter()
            .min_by(|a, b| a.estimate.cost.value().total_cmp(&b.estimate.cost.value()))
    }
}

/// Bottom-up dynamic programming over connected leaf subsets.
///
/// Level `k` holds the subsets of `k` leaves reachable by adding one leaf, connected through
/// an equality predicate, to a subset of level `k - 1`. Every split of a subset into two
/// connected parts already in the memo is an alternative, both orientations included, up to
/// `max_alternatives` per item. Plans are built from the cheapest alternative of each item.
pub struct Memo {
    items: HashMap<RelSet, MemoItem>,
    max_alternatives: usize,
}

impl Memo {
    pub fn build(coster: &JoinCoster, max_alternatives: usize) -> Memo {
        let graph = coster.graph();
        let mut memo = Memo {
            items: HashMap::new(),
            max_alternatives: max_alternatives.max(1),
        };

        let mut level = BTreeSet::new();
        for idx in 0..graph.len() {
            let relations = RelSet::single(idx);
            memo.items.insert(
                relations,
                MemoItem {
                    relations,
                    alternatives: vec![],
                    estimate: coster.leaf(idx),
                },
            );
            level.insert(relations);
        }

        let edges = graph
            .predicates
            .iter()
            .filter(|p| p.is_edge())
            .map(|p| p.relations)
            .collect::<Vec<_>>();
        let connected = |left: RelSet, right: RelSet| {
            edges
                .iter()
                .any(|e| e.intersects(left) && e.intersects(right))
        };

        for _ in 2..=graph.len() {
            let mut next = BTreeSet::new();
            for set in &level {
                for idx in 0..graph.len() {
                    let leaf = RelSet::single(idx);
                    if !set.contains(idx) && connected(*set, leaf) {
                        next.insert(set.union(leaf));
                    }
                }
            }
            for set in &next {
                memo.add_item(*set, coster, &connected);
            }
            level = next;
        }

        trace!("Join order memo: {:?}", memo);
        memo
    }

    fn add_item<F>(&mut self, relations: RelSet, coster: &JoinCoster, connected: &F)
    where
        F: Fn(RelSet, RelSet) -> bool,
    {
        let mut alternatives = vec![];
        for left in relations.proper_subsets() {
            if alternatives.len() >= self.max_alternatives {
                break;
            }
            let right = relations.difference(left);
            let (l, r) = match (self.items.get(&left), self.items.get(&right)) {
                (Some(l), Some(r)) => (l, r),
                _ => continue,
            };
            if !connected(left, right) {
                continue;
            }
            alternatives.push(Alternative {
                left,
                right,
                estimate: coster.join(left, &l.estimate, right, &r.estimate),
            });
        }

        let best = alternatives
            .iter()
            .map(|alt| alt.estimate)
            .min_by(|a, b| a.cost.value().total_cmp(&b.cost.value()));
        if let Some(estimate) = best {
            self.items.insert(
                relations,
                MemoItem {
                    relations,
                    alternatives,
                    estimate,
                },
            );
        }
    }

    pub fn get(&self, relations: RelSet) -> Option<&MemoItem> {
        self.items.get(&relations)
    }

    /// Cheapest join tree of `relations`, if the memo reached it.
    pub fn best_tree(&self, relations: RelSet) -> Option<JoinTree> {
        let item = self.items.get(&relations)?;
        match item.best() {
            None => relations.iter().next().map(JoinTree::Leaf),
            Some(alt) => Some(JoinTree::join(
                self.best_tree(alt.left)?,
                self.best_tree(alt.right)?,
            )),
        }
    }
}

impl Debug for Memo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new();
        table.add_row(row![
            "Relations",
            "Left",
            "Right",
            "Rows",
            "Cost",
            "Alternatives"
        ]);
        for item in self
            .items
            .values()
            .sorted_by_key(|item| (item.relations.len(), item.relations))
        {
            let (left, right) = match item.best() {
                Some(alt) => (format!("{:?}", alt.left), format!("{:?}", alt.right)),
                None => (String::new(), String::new()),
            };
            table.add_row(row![
                format!("{:?}", item.relations),
                left,
                right,
                item.estimate.rows,
                item.estimate.cost.value(),
                item.alternatives.len()
            ]);
        }
        writeln!(f)?;
        writeln!(f, "{}", table)
    }
}
