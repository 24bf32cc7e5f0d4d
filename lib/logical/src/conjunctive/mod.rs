//! Assembles agglutinated leaves into join trees that cover the whole query.
//!
//! The search runs over states of two bitsets (nodes, triples). A state only grows by a node
//! covering the lowest triple of the component it does not cover yet, so every set of nodes is
//! built in one canonical order and a star of single-triple leaves yields a single path instead
//! of every subset. States covering every triple of a connected component are final. A final
//! state is kept if its nodes can be joined one after the other, each one adjacent to an earlier
//! node and with its required inputs bound. Every minimal final state is turned into a tree by a
//! [JoinOrderPlanner] and the alternatives are combined in a union.

mod state;

use crate::join_graph::JoinGraph;
use crate::join_order::JoinOrderPlanner;
use crate::{Op, PlanContext};
use fedfusion_model::{FixedBitSet, TripleSet};
use rustc_hash::{FxHashMap, FxHashSet};
use state::{PlanState, StatePool};
use std::fmt::Debug;
use std::sync::Arc;

/// Combines leaves into a plan for the query of a [PlanContext].
pub trait ConjunctivePlanner: Debug + Send + Sync {
    /// Returns a plan covering all triples of the query, or an [OpKind::Empty](crate::OpKind)
    /// node if the leaves cannot be combined into one.
    fn plan(&self, ctx: &PlanContext, leaves: &[Arc<Op>]) -> Arc<Op>;
}

/// The [ConjunctivePlanner] searching over bitset plan states.
#[derive(Debug)]
pub struct BitsetConjunctivePlanner {
    join_order: Arc<dyn JoinOrderPlanner>,
}

impl BitsetConjunctivePlanner {
    pub fn new(join_order: Arc<dyn JoinOrderPlanner>) -> Self {
        Self { join_order }
    }

    fn plan_component(
        &self,
        ctx: &PlanContext,
        component: &FixedBitSet,
        leaves: Vec<Arc<Op>>,
    ) -> Option<Arc<Op>> {
        if leaves.is_empty() {
            return None;
        }
        let graph = JoinGraph::new(leaves);
        let finals = minimal(search(&graph, component));
        tracing::debug!(
            "Found {} minimal final states over {} nodes",
            finals.len(),
            graph.len()
        );

        let trees = finals
            .iter()
            .filter_map(|members| {
                let nodes = members
                    .ones()
                    .map(|id| Arc::clone(graph.node(id)))
                    .collect();
                self.join_order.plan(ctx, nodes)
            })
            .collect::<Vec<_>>();
        (!trees.is_empty()).then(|| Op::union(ctx, trees))
    }
}

impl ConjunctivePlanner for BitsetConjunctivePlanner {
    fn plan(&self, ctx: &PlanContext, leaves: &[Arc<Op>]) -> Arc<Op> {
        let query_triples = ctx.query_triples();
        let empty = || Arc::new(Op::empty(ctx, ctx.query().triples()));
        if query_triples.is_empty() {
            return empty();
        }

        let leaves = leaves
            .iter()
            .filter(|leaf| {
                let inside = !leaf.matched_triples().is_empty()
                    && leaf.matched_triples().is_subset(&query_triples);
                if !inside {
                    tracing::warn!("Ignoring a leaf that does not match triples of the query");
                }
                inside
            })
            .cloned()
            .collect::<Vec<_>>();

        let components = components(ctx, &query_triples, &leaves);
        let mut plans = Vec::with_capacity(components.len());
        for component in &components {
            let members = leaves
                .iter()
                .filter(|leaf| {
                    leaf.matched_triples()
                        .bits()
                        .ones()
                        .next()
                        .is_some_and(|first| component.contains(first))
                })
                .cloned()
                .collect();
            let Some(plan) = self.plan_component(ctx, component, members) else {
                tracing::debug!(
                    "No combination of leaves covers a component of {} triples",
                    component.count_ones(..)
                );
                return empty();
            };
            plans.push(plan);
        }
        Op::cartesian(ctx, plans)
    }
}

/// Partitions the query triples into components connected by shared variables or by leaves that
/// span several triples. Components are ordered by their lowest triple id.
fn components(
    ctx: &PlanContext,
    query_triples: &TripleSet,
    leaves: &[Arc<Op>],
) -> Vec<FixedBitSet> {
    let mut sets = DisjointSets::new(ctx.triples().len());
    let triples = query_triples
        .bits()
        .ones()
        .filter_map(|id| {
            let triple = ctx.triples().get(id)?;
            Some((id, ctx.vars_of_triples([triple]).into_bits()))
        })
        .collect::<Vec<_>>();
    for (i, (a, a_vars)) in triples.iter().enumerate() {
        for (b, b_vars) in &triples[i + 1..] {
            if !a_vars.is_disjoint(b_vars) {
                sets.union(*a, *b);
            }
        }
    }
    for leaf in leaves {
        let mut ids = leaf.matched_triples().bits().ones();
        if let Some(first) = ids.next() {
            for other in ids {
                sets.union(first, other);
            }
        }
    }

    let mut index = FxHashMap::default();
    let mut result: Vec<FixedBitSet> = Vec::new();
    for (id, _) in &triples {
        let root = sets.find(*id);
        let idx = *index.entry(root).or_insert_with(|| {
            result.push(FixedBitSet::with_capacity(ctx.triples().len()));
            result.len() - 1
        });
        result[idx].insert(*id);
    }
    result
}

/// Enumerates the node sets of all legal final states reachable in `graph`.
fn search(graph: &JoinGraph, component: &FixedBitSet) -> Vec<FixedBitSet> {
    // Without required inputs only the connectivity of a final state has to be checked.
    let fast_path = graph
        .nodes()
        .iter()
        .all(|node| node.required_inputs().is_empty());
    let mut covering = vec![Vec::new(); component.len()];
    for (id, node) in graph.nodes().iter().enumerate() {
        for triple in node.matched_triples().bits().ones() {
            if let Some(nodes) = covering.get_mut(triple) {
                nodes.push(id);
            }
        }
    }

    let mut pool = StatePool::new(graph.len(), component.len());
    let mut visited = FxHashSet::default();
    let mut stack = vec![pool.take()];
    let mut finals = Vec::new();

    while let Some(state) = stack.pop() {
        let lowest = component.difference(&state.triples).next();
        let Some(lowest) = lowest else {
            if has_join_order(graph, &state.nodes, fast_path) {
                finals.push(state.nodes.clone());
            }
            pool.release(state);
            continue;
        };
        for &id in &covering[lowest] {
            if !state.nodes.contains(id) {
                let mut next = pool.take_copy(&state);
                next.add(id, graph.node(id));
                push_unvisited(&mut visited, &mut stack, &mut pool, next);
            }
        }
        pool.release(state);
    }
    finals
}

fn push_unvisited(
    visited: &mut FxHashSet<FixedBitSet>,
    stack: &mut Vec<PlanState>,
    pool: &mut StatePool,
    state: PlanState,
) {
    if visited.insert(state.nodes.clone()) {
        stack.push(state);
    } else {
        pool.release(state);
    }
}

/// Returns whether `members` can be joined one after the other, each member adjacent to an
/// earlier one and with its required inputs bound by the earlier ones.
///
/// Joining a member never removes candidates, so trying each possible start once is enough. With
/// `connectivity_only` every member may start and the first one decides.
fn has_join_order(graph: &JoinGraph, members: &FixedBitSet, connectivity_only: bool) -> bool {
    let starts = members
        .ones()
        .filter(|id| graph.node(*id).required_inputs().is_empty())
        .take(if connectivity_only { 1 } else { usize::MAX });
    for start in starts {
        let mut joined = FixedBitSet::with_capacity(graph.len());
        joined.insert(start);
        let mut vars = graph.node(start).result_vars().bits().clone();
        loop {
            let next = members.difference(&joined).find(|id| {
                !graph.neighbours(*id).is_disjoint(&joined)
                    && graph
                        .node(*id)
                        .required_inputs()
                        .bits()
                        .is_subset(&vars)
            });
            let Some(id) = next else {
                break;
            };
            joined.insert(id);
            vars.union_with(graph.node(id).result_vars().bits());
        }
        if joined == *members {
            return true;
        }
    }
    false
}

/// Drops final states that are strict supersets of other final states and sorts the rest.
fn minimal(finals: Vec<FixedBitSet>) -> Vec<FixedBitSet> {
    let mut result = finals
        .iter()
        .filter(|candidate| {
            !finals
                .iter()
                .any(|other| other != *candidate && other.is_subset(candidate))
        })
        .cloned()
        .collect::<Vec<_>>();
    result.sort_by_cached_key(|nodes| nodes.ones().collect::<Vec<_>>());
    result
}

#[derive(Debug)]
struct DisjointSets {
    parents: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parents: (0..len).collect(),
        }
    }

    fn find(&mut self, mut id: usize) -> usize {
        while self.parents[id] != id {
            self.parents[id] = self.parents[self.parents[id]];
            id = self.parents[id];
        }
        id
    }

    fn union(&mut self, a: usize, b: usize) {
        let a = self.find(a);
        let b = self.find(b);
        if a != b {
            self.parents[a.max(b)] = a.min(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardinality::{OpCardinalityEstimator, QuickSelectivityHeuristic};
    use crate::join_order::GreedyJoinOrderPlanner;
    use crate::test_utils::{leaf, source, triple};
    use fedfusion_model::ConjunctiveQuery;
    use insta::assert_snapshot;
    use std::time::{Duration, Instant};

    fn planner() -> BitsetConjunctivePlanner {
        BitsetConjunctivePlanner::new(Arc::new(GreedyJoinOrderPlanner::new(
            OpCardinalityEstimator::new(Arc::new(QuickSelectivityHeuristic)),
        )))
    }

    #[test]
    fn joins_leaves_of_different_sources() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?y", "name", "?n")]);
        let ctx = PlanContext::new(&query);
        let leaves = vec![
            leaf(&ctx, &source("a"), &[query.triples()[0].clone()], &[]),
            leaf(&ctx, &source("b"), &[query.triples()[1].clone()], &[]),
        ];

        let plan = planner().plan(&ctx, &leaves);

        assert_snapshot!(plan, @r"
        Join: Inner
          Endpoint(a): ?x <http://example.com/knows> ?y
          Endpoint(b): ?y <http://example.com/name> ?n
        ");
    }

    #[test]
    fn disconnected_components_become_a_cartesian_product() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?z", "name", "?n")]);
        let ctx = PlanContext::new(&query);
        let leaves = vec![
            leaf(&ctx, &source("a"), &[query.triples()[0].clone()], &[]),
            leaf(&ctx, &source("a"), &[query.triples()[1].clone()], &[]),
        ];

        let plan = planner().plan(&ctx, &leaves);

        assert_snapshot!(plan, @r"
        Cartesian
          Endpoint(a): ?x <http://example.com/knows> ?y
          Endpoint(a): ?z <http://example.com/name> ?n
        ");
    }

    #[test]
    fn uncovered_triple_gives_an_empty_plan() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?y", "name", "?n")]);
        let ctx = PlanContext::new(&query);
        let leaves = vec![leaf(&ctx, &source("a"), &[query.triples()[0].clone()], &[])];

        let plan = planner().plan(&ctx, &leaves);

        assert_snapshot!(plan, @"Empty: ?x ?y ?n");
    }

    #[test]
    fn alternative_covers_are_combined_in_a_union() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?y", "name", "?n")]);
        let ctx = PlanContext::new(&query);
        let leaves = vec![
            leaf(&ctx, &source("a"), query.triples(), &[]),
            leaf(&ctx, &source("b"), &[query.triples()[0].clone()], &[]),
            leaf(&ctx, &source("b"), &[query.triples()[1].clone()], &[]),
        ];

        let plan = planner().plan(&ctx, &leaves);

        assert_snapshot!(plan, @r"
        Union
          Endpoint(a): ?x <http://example.com/knows> ?y . ?y <http://example.com/name> ?n
          Join: Inner
            Endpoint(b): ?x <http://example.com/knows> ?y
            Endpoint(b): ?y <http://example.com/name> ?n
        ");
    }

    #[test]
    fn required_inputs_are_respected() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?y", "name", "?n")]);
        let ctx = PlanContext::new(&query);
        let leaves = vec![
            leaf(&ctx, &source("a"), &[query.triples()[1].clone()], &["y"]),
            leaf(&ctx, &source("b"), &[query.triples()[0].clone()], &[]),
        ];

        let plan = planner().plan(&ctx, &leaves);

        assert!(plan.required_inputs().is_empty(), "{plan}");
        assert_snapshot!(plan, @r"
        Join: Inner
          Endpoint(b): ?x <http://example.com/knows> ?y
          Endpoint(a): ?y <http://example.com/name> ?n (required: ?y)
        ");
    }

    #[test]
    fn leaves_with_only_required_inputs_never_start() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y")]);
        let ctx = PlanContext::new(&query);
        let leaves = vec![leaf(&ctx, &source("a"), query.triples(), &["x"])];

        let plan = planner().plan(&ctx, &leaves);

        assert!(plan.is_empty_op(), "{plan}");
    }

    #[test]
    fn inputs_of_the_lowest_triple_may_be_bound_later() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?y", "name", "?n")]);
        let ctx = PlanContext::new(&query);
        let leaves = vec![
            leaf(&ctx, &source("a"), &[query.triples()[0].clone()], &["y"]),
            leaf(&ctx, &source("b"), &[query.triples()[1].clone()], &[]),
        ];

        let plan = planner().plan(&ctx, &leaves);

        assert!(!plan.is_empty_op(), "{plan}");
        assert!(plan.required_inputs().is_empty(), "{plan}");
    }

    #[test]
    fn disconnected_final_states_are_dropped() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y"), triple("?x", "name", "?n")]);
        let ctx = PlanContext::new(&query);
        let a = source("a");
        let leaves = vec![
            leaf(&ctx, &a, &[query.triples()[0].clone()], &[]).with_optional(true),
            leaf(&ctx, &a, &[query.triples()[1].clone()], &[]).with_optional(true),
        ];
        let graph = JoinGraph::new(leaves.into_iter().map(Arc::new).collect());

        assert!(search(&graph, ctx.query_triples().bits()).is_empty());
    }

    #[test]
    fn star_queries_visit_one_state_per_triple() {
        let query = ConjunctiveQuery::new(
            (0..24).map(|i| triple("?x", &format!("p{i}"), &format!("?o{i}"))),
        );
        let ctx = PlanContext::new(&query);
        let a = source("a");
        let leaves = query
            .triples()
            .iter()
            .map(|t| leaf(&ctx, &a, &[t.clone()], &[]))
            .collect::<Vec<_>>();
        let started = Instant::now();

        let finals = search(&JoinGraph::new(leaves.clone()), ctx.query_triples().bits());
        let plan = planner().plan(&ctx, &leaves);

        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].count_ones(..), 24);
        assert!(!plan.is_empty_op(), "{plan}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
