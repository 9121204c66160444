//! Cost based join ordering.
//!
//! A maximal cluster of inner joins is flattened into a [`JoinGraph`]: leaf relations and the
//! predicates among them. When the graph is connected and small enough, a [`Memo`] enumerates
//! the connected subsets bottom-up and keeps the cheapest tree of each. Otherwise the joins are
//! ordered greedily by [`greedy_order`].
//!
//! The planner never fails. When a cluster can not be flattened the original order is kept.
mod graph;
pub use graph::*;
mod greedy;
pub use greedy::*;
mod memo;
pub use memo::*;

use log::debug;

use crate::cost::{CostModel, Estimator};
use crate::error::OptResult;
use crate::operator::{self, Operator::Join, Operator::Project};
use crate::plan::{RelNode, RelRef};
use crate::rules::RuleId::JoinOrder;
use crate::rules::{any, pass_through, pattern, Pattern, PatternBuilder, Rule, RuleContext, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref JOIN_ORDER_PATTERN: Pattern = {
        pattern(|op| matches!(op, Join(j) if j.is_inner()))
          .leaf(any)
          .leaf(any)
        .finish()
    };
}

/// Reorders the inner join cluster rooted at the matched join.
#[derive(Clone, Default)]
pub struct JoinOrderRule {}

impl JoinOrderRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for JoinOrderRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        if !rel.flags().is_empty() || !rel.schema().has_unique_names() {
            return Ok(rel);
        }

        let catalog = ctx.optimizer.catalog.clone();
        let config = &ctx.optimizer.config;
        let estimator = Estimator::new(catalog.as_ref());
        let graph = match JoinGraph::flatten(&rel, ctx.properties, &estimator, config.max_depth)? {
            Some(graph) if graph.len() >= 3 => graph,
            _ => return Ok(rel),
        };

        let coster = JoinCoster::new(
            &graph,
            &estimator,
            CostModel::new(config.build_cost, config.probe_cost),
        );
        let tree = if graph.len() <= config.dp_relation_limit && graph.is_connected() {
            Memo::build(&coster, config.max_alternatives).best_tree(graph.all())
        } else {
            debug!(
                "Ordering {} relations greedily, connected: {}",
                graph.len(),
                graph.is_connected()
            );
            greedy_order(&coster)
        };
        let tree = match tree {
            Some(tree) => tree,
            None => {
                debug!("No join order found for {}", rel);
                return Ok(rel);
            }
        };
        debug!(
            "Chose join order {:?} with cost {:?}",
            tree,
            coster.estimate_tree(&tree).cost
        );

        let planned = graph.build_plan(&tree)?;
        if planned.schema().column_refs() == rel.schema().column_refs() {
            return Ok(planned);
        }
        let project = operator::Project::new(pass_through(rel.schema()));
        Ok(RelNode::new(Project(project), [planned])?.into_ref())
    }

    fn pattern(&self) -> &Pattern {
        &JOIN_ORDER_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        JoinOrder
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::expr::{col, eq};
    use crate::join_order::JoinOrderRule;
    use crate::operator::Operator;
    use crate::plan::{bfs_iter, RelBuilder, RelFlag};
    use crate::test_utils::{apply_rule_in, chain_catalog, chain_join, table_a, table_b};

    #[test]
    fn test_reorder_chain() {
        let catalog = Arc::new(chain_catalog());
        let plan = chain_join();
        let result = apply_rule_in(JoinOrderRule::new(), plan.clone(), catalog.clone());

        assert_eq!(plan.schema().names_and_types(), result.schema().names_and_types());
        let joins = bfs_iter(&result)
            .filter(|rel| matches!(rel.operator(), Operator::Join(_)))
            .collect::<Vec<_>>();
        assert_eq!(2, joins.len());
        assert!(joins.iter().all(|j| j.has_flag(RelFlag::Processed)));
        assert!(joins.iter().all(|j| !j.operator().as_join().unwrap().on().is_empty()));
    }

    #[test]
    fn test_keep_two_way_join() {
        let plan = RelBuilder::scan(table_a())
            .inner_join(
                RelBuilder::scan(table_b()).build(),
                vec![eq(col("a.x"), col("b.y"))],
            )
            .unwrap()
            .build();
        let result = apply_rule_in(JoinOrderRule::new(), plan.clone(), Arc::new(chain_catalog()));
        assert!(Arc::ptr_eq(&plan, &result));
    }

    #[test]
    fn test_skip_processed_join() {
        let plan = RelBuilder::new(chain_join())
            .flag(RelFlag::Processed)
            .build();
        let result = apply_rule_in(JoinOrderRule::new(), plan.clone(), Arc::new(chain_catalog()));
        assert!(Arc::ptr_eq(&plan, &result));
    }
}
