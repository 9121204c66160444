use std::cmp::Reverse;

use itertools::Itertools;

use crate::cost::Estimate;
use crate::join_order::{JoinCoster, JoinTree, RelSet};

struct Component {
    tree: JoinTree,
    relations: RelSet,
    estimate: Estimate,
}

/// Orders the joins of a graph the dynamic programming planner can not handle.
///
/// Components start as single leaves. Predicates are taken by descending score and merge the
/// components they touch, the smaller component on the left. Components left unconnected are
/// cross joined, smallest first.
pub fn greedy_order(coster: &JoinCoster) -> Option<JoinTree> {
    let graph = coster.graph();
    let mut components = (0..graph.len())
        .map(|idx| Component {
            tree: JoinTree::Leaf(idx),
            relations: RelSet::single(idx),
            estimate: coster.leaf(idx),
        })
        .collect::<Vec<_>>();

    let predicates = graph
        .predicates
        .iter()
        .filter(|p| p.relations.len() >= 2)
        .sorted_by_key(|p| Reverse(p.score()));
    for predicate in predicates {
        let touched = components
            .iter()
            .positions(|c| c.relations.intersects(predicate.relations))
            .collect::<Vec<_>>();
        if touched.len() < 2 {
            continue;
        }
        let mut merging = touched
            .into_iter()
            .rev()
            .map(|idx| components.remove(idx))
            .sorted_by(|a, b| a.estimate.rows.total_cmp(&b.estimate.rows));
        if let Some(first) = merging.next() {
            let merged = merging.fold(first, |acc, next| merge(coster, acc, next));
            components.push(merged);
        }
    }

    components
        .into_iter()
        .sorted_by(|a, b| a.estimate.rows.total_cmp(&b.estimate.rows))
        .reduce(|acc, next| merge(coster, acc, next))
        .map(|c| c.tree)
}

fn merge(coster: &JoinCoster, left: Component, right: Component) -> Component {
    let estimate = coster.join(left.relations, &left.estimate, right.relations, &right.estimate);
    Component {
        tree: JoinTree::join(left.tree, right.tree),
        relations: left.relations.union(right.relations),
        estimate,
    }
}

#[cfg(test)]
mod tests {
    use crate::cost::{CostModel, Estimator};
    use crate::expr::{col, eq};
    use crate::join_order::{greedy_order, JoinCoster, JoinGraph};
    use crate::operator::Operator;
    use crate::plan::{bfs_iter, RelBuilder};
    use crate::properties::infer_properties;
    use crate::test_utils::{chain_catalog, chain_join, table_a, table_b, table_c};

    #[test]
    fn test_greedy_covers_all_relations() {
        let catalog = chain_catalog();
        let plan = chain_join();
        let properties = infer_properties(&plan, 64).unwrap();
        let estimator = Estimator::new(&catalog);
        let graph = JoinGraph::flatten(&plan, &properties, &estimator, 64)
            .unwrap()
            .unwrap();
        let coster = JoinCoster::new(&graph, &estimator, CostModel::default());

        let tree = greedy_order(&coster).unwrap();
        assert_eq!(graph.all(), tree.relations());
    }

    #[test]
    fn test_greedy_cross_joins_components() {
        let catalog = chain_catalog();
        // c is not connected to a or b.
        let plan = RelBuilder::scan(table_a())
            .inner_join(
                RelBuilder::scan(table_b()).build(),
                vec![eq(col("a.x"), col("b.y"))],
            )
            .unwrap()
            .inner_join(RelBuilder::scan(table_c()).build(), vec![])
            .unwrap()
            .build();
        let properties = infer_properties(&plan, 64).unwrap();
        let estimator = Estimator::new(&catalog);
        let graph = JoinGraph::flatten(&plan, &properties, &estimator, 64)
            .unwrap()
            .unwrap();
        assert!(!graph.is_connected());
        let coster = JoinCoster::new(&graph, &estimator, CostModel::default());

        let tree = greedy_order(&coster).unwrap();
        assert_eq!(graph.all(), tree.relations());
        let plan = graph.build_plan(&tree).unwrap();
        assert_eq!(6, plan.schema().len());
        let joins_with_predicates = bfs_iter(&plan)
            .filter(|rel| matches!(rel.operator(), Operator::Join(j) if !j.on().is_empty()))
            .count();
        assert_eq!(1, joins_with_predicates);
    }
}
