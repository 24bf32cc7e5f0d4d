//! Orders the nodes of a final plan state into a join tree.

use crate::cardinality::OpCardinalityEstimator;
use crate::join_graph::{can_join, JoinGraph};
use crate::{Op, PlanContext};
use fedfusion_model::Cardinality;
use std::fmt::Debug;
use std::sync::Arc;

/// Builds a join tree over a set of nodes that together cover a connected component.
pub trait JoinOrderPlanner: Debug + Send + Sync {
    /// Returns a tree joining all `nodes`, or [None] if no legal order exists.
    fn plan(&self, ctx: &PlanContext, nodes: Vec<Arc<Op>>) -> Option<Arc<Op>>;
}

/// Builds a left-deep tree greedily.
///
/// The tree starts with the cheapest legal pair and then grows by the cheapest node that is
/// adjacent to the tree and whose required inputs the tree binds. The cost of a candidate is the
/// estimated cardinality of the join result. Ties are broken by input order.
#[derive(Debug, Clone)]
pub struct GreedyJoinOrderPlanner {
    estimator: OpCardinalityEstimator,
}

impl GreedyJoinOrderPlanner {
    pub fn new(estimator: OpCardinalityEstimator) -> Self {
        Self { estimator }
    }

    fn cheapest_pair(&self, graph: &JoinGraph) -> Option<(usize, usize, Op)> {
        let mut best: Option<(Cardinality, usize, usize, Op)> = None;
        for (i, left) in graph.nodes().iter().enumerate() {
            if !left.required_inputs().is_empty() {
                continue;
            }
            for (j, right) in graph.nodes().iter().enumerate() {
                if i == j
                    || !graph.are_adjacent(i, j)
                    || !right.required_inputs().is_subset(left.result_vars())
                {
                    continue;
                }
                let candidate = Op::join(Arc::clone(left), Arc::clone(right));
                let cost = self.estimator.estimate(&candidate);
                if best
                    .as_ref()
                    .map_or(true, |(best_cost, ..)| cost < *best_cost)
                {
                    best = Some((cost, i, j, candidate));
                }
            }
        }
        best.map(|(_, i, j, join)| (i, j, join))
    }
}

impl JoinOrderPlanner for GreedyJoinOrderPlanner {
    fn plan(&self, _ctx: &PlanContext, mut nodes: Vec<Arc<Op>>) -> Option<Arc<Op>> {
        if nodes.len() <= 1 {
            return nodes.pop();
        }

        let graph = JoinGraph::new(nodes);
        let Some((first, second, pair)) = self.cheapest_pair(&graph) else {
            tracing::debug!("No legal pair to start a join order among {} nodes", graph.len());
            return None;
        };
        let mut tree = Arc::new(pair);
        let mut remaining = graph
            .nodes()
            .iter()
            .enumerate()
            .filter(|(id, _)| *id != first && *id != second)
            .map(|(_, node)| Arc::clone(node))
            .collect::<Vec<_>>();

        while !remaining.is_empty() {
            let mut best: Option<(Cardinality, usize, Op)> = None;
            for (idx, node) in remaining.iter().enumerate() {
                if !can_join(&tree, node) || !node.required_inputs().is_subset(tree.result_vars())
                {
                    continue;
                }
                let candidate = Op::join(Arc::clone(&tree), Arc::clone(node));
                let cost = self.estimator.estimate(&candidate);
                if best
                    .as_ref()
                    .map_or(true, |(best_cost, ..)| cost < *best_cost)
                {
                    best = Some((cost, idx, candidate));
                }
            }

            let Some((_, idx, join)) = best else {
                tracing::debug!(
                    "Join order is stuck with {} nodes left to join",
                    remaining.len()
                );
                return None;
            };
            remaining.remove(idx);
            tree = Arc::new(join);
        }
        Some(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardinality::QuickSelectivityHeuristic;
    use crate::test_utils::{leaf, source, triple};
    use fedfusion_model::ConjunctiveQuery;
    use insta::assert_snapshot;

    fn planner() -> GreedyJoinOrderPlanner {
        GreedyJoinOrderPlanner::new(OpCardinalityEstimator::new(Arc::new(
            QuickSelectivityHeuristic,
        )))
    }

    #[test]
    fn starts_with_the_cheapest_pair() {
        let query = ConjunctiveQuery::new([
            triple("?x", "knows", "?y"),
            triple("?y", "name", "?n"),
            triple("alice", "knows", "?x"),
        ]);
        let ctx = PlanContext::new(&query);
        let a = source("a");
        let nodes = query
            .triples()
            .iter()
            .map(|t| leaf(&ctx, &a, &[t.clone()], &[]))
            .collect();

        let tree = planner().plan(&ctx, nodes).unwrap();

        assert_snapshot!(tree, @r"
        Join: Inner
          Join: Inner
            Endpoint(a): ?x <http://example.com/knows> ?y
            Endpoint(a): <http://example.com/alice> <http://example.com/knows> ?x
          Endpoint(a): ?y <http://example.com/name> ?n
        ");
    }

    #[test]
    fn required_inputs_are_bound_first() {
        let query = ConjunctiveQuery::new([
            triple("?x", "name", "?n"),
            triple("?x", "knows", "?y"),
        ]);
        let ctx = PlanContext::new(&query);
        let a = source("a");
        let nodes = vec![
            leaf(&ctx, &a, &[query.triples()[0].clone()], &["x"]),
            leaf(&ctx, &a, &[query.triples()[1].clone()], &[]),
        ];

        let tree = planner().plan(&ctx, nodes).unwrap();

        assert!(tree.required_inputs().is_empty(), "{tree}");
        assert_snapshot!(tree, @r"
        Join: Inner
          Endpoint(a): ?x <http://example.com/knows> ?y
          Endpoint(a): ?x <http://example.com/name> ?n (required: ?x)
        ");
    }

    #[test]
    fn fails_without_a_legal_order() {
        let query = ConjunctiveQuery::new([
            triple("?x", "name", "?n"),
            triple("?x", "knows", "?y"),
        ]);
        let ctx = PlanContext::new(&query);
        let a = source("a");
        let nodes = query
            .triples()
            .iter()
            .map(|t| leaf(&ctx, &a, &[t.clone()], &["x"]))
            .collect();

        assert!(planner().plan(&ctx, nodes).is_none(), "No node binds ?x");
    }
}
