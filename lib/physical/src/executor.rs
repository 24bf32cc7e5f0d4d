use crate::multiplex::ResultsExecutor;
use crate::pushdown::split_modifiers;
use crate::results::{
    apply_modifiers, BindJoinResults, CartesianResults, DistinctResults, FailSafeResults,
    HashJoinResults,
};
use fedfusion_common::{
    close_all, BoxedResults, CartesianMode, EmptyResults, FedResult, FederationConfig,
    JoinStrategy,
};
use fedfusion_logical::cardinality::OpCardinalityEstimator;
use fedfusion_logical::{JoinType, Op, OpKind, Source};
use fedfusion_model::{ConjunctiveQuery, Solution};
use std::cmp::Reverse;
use std::sync::Arc;

/// Turns plans into trees of result streams.
///
/// Every node evaluates its own modifiers on top of the stream of its kind: filters, then
/// projection, distinct, and limit. Endpoint leaves push a prefix of these modifiers down to the
/// source. Failures of a source are logged and turn its leaf into an empty stream, so a single
/// failing source never aborts the whole query.
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    config: FederationConfig,
    multiplexer: Arc<dyn ResultsExecutor>,
    estimator: OpCardinalityEstimator,
}

impl PlanExecutor {
    /// Creates a new [PlanExecutor].
    ///
    /// The `multiplexer` combines the children of unions, and the `estimator` decides the order of
    /// the operands of cartesian products and the build side of hash joins.
    pub fn new(
        config: FederationConfig,
        multiplexer: Arc<dyn ResultsExecutor>,
        estimator: OpCardinalityEstimator,
    ) -> Self {
        Self {
            config,
            multiplexer,
            estimator,
        }
    }

    /// Executes `plan`.
    pub fn execute(&self, plan: &Op) -> FedResult<BoxedResults> {
        self.execute_bound(plan, &Solution::new())
    }

    /// Executes `op` with the variables of `bindings` already bound.
    ///
    /// The produced solutions do not contain the bindings themselves.
    ///
    /// # Panics
    ///
    /// Panics if the plan contains an unresolved [OpKind::Query] node.
    pub fn execute_bound(&self, op: &Op, bindings: &Solution) -> FedResult<BoxedResults> {
        if let Some(mut results) = self.execute_sub_plan(op, bindings) {
            results.set_optional(op.is_optional());
            return Ok(results);
        }

        let results = match op.kind() {
            OpKind::Endpoint { source, query } => {
                return Ok(self.execute_endpoint(op, source, query, bindings));
            }
            OpKind::Query { query } => unresolved(query),
            OpKind::Empty => EmptyResults::new(op.result_vars().to_vec()).boxed(),
            OpKind::Union(children) => self.execute_union(children, bindings)?,
            OpKind::Cartesian(children) => self.execute_cartesian(children, bindings)?,
            OpKind::Join { left, right } => self.execute_join(op, left, right, bindings)?,
            OpKind::Pipe(child) => self.execute_bound(child, bindings)?,
        };

        let mut results = apply_modifiers(results, op.modifiers(), bindings);
        results.set_optional(op.is_optional());
        Ok(results)
    }

    fn execute_endpoint(
        &self,
        op: &Op,
        source: &Source,
        query: &ConjunctiveQuery,
        bindings: &Solution,
    ) -> BoxedResults {
        let fragment = query.with_modifiers(op.modifiers().clone()).bind(bindings);
        let endpoint = source.endpoint();
        let (remote, local) = split_modifiers(fragment.modifiers(), endpoint.as_ref());

        let results: BoxedResults = match endpoint.query(&fragment.with_modifiers(remote)) {
            Ok(results) => Box::new(FailSafeResults::new(results, source.name())),
            Err(error) => {
                tracing::warn!(
                    "Source {} failed to answer {fragment}, continuing without it: {error}",
                    source.name()
                );
                EmptyResults::new(fragment.variables()).boxed()
            }
        };
        let mut results = apply_modifiers(results, &local, bindings);
        results.set_optional(op.is_optional());
        results
    }

    /// Sends `op` as a whole to its source if the source evaluates sub-plans.
    fn execute_sub_plan(&self, op: &Op, bindings: &Solution) -> Option<BoxedResults> {
        if !self.config.push_down_sub_plans()
            || !bindings.is_empty()
            || !matches!(op.kind(), OpKind::Join { .. } | OpKind::Cartesian(_))
        {
            return None;
        }
        let source = op.bound_source()?;
        let endpoint = source.sub_plan_endpoint()?;
        if !endpoint.accepts(op) {
            return None;
        }

        tracing::debug!(
            "Pushing a sub-plan over {} triples down to {}",
            op.matched_triples().len(),
            source.name()
        );
        Some(match endpoint.execute_plan(op) {
            Ok(results) => Box::new(FailSafeResults::new(results, source.name())),
            Err(error) => {
                tracing::warn!(
                    "Source {} failed to evaluate a sub-plan, continuing without it: {error}",
                    source.name()
                );
                EmptyResults::new(op.result_vars().to_vec()).boxed()
            }
        })
    }

    fn execute_union(&self, children: &[Arc<Op>], bindings: &Solution) -> FedResult<BoxedResults> {
        let children = self.execute_all(children.iter(), bindings)?;
        let multiplexed = self.multiplexer.multiplex(children)?;
        Ok(Box::new(DistinctResults::new(multiplexed)))
    }

    fn execute_cartesian(
        &self,
        children: &[Arc<Op>],
        bindings: &Solution,
    ) -> FedResult<BoxedResults> {
        if self.config.cartesian_mode() == CartesianMode::UnionShortcut {
            tracing::debug!(
                "Executing a cartesian product of {} operands as a union",
                children.len()
            );
            return self.execute_union(children, bindings);
        }

        // The largest operand is streamed, the others are materialized from smallest to largest.
        let mut ordered = children.iter().collect::<Vec<_>>();
        ordered.sort_by_key(|child| Reverse(self.estimator.estimate(child).value()));
        if let Some(inners) = ordered.get_mut(1..) {
            inners.reverse();
        }

        let mut operands = self.execute_all(ordered, bindings)?;
        if operands.is_empty() {
            return Ok(EmptyResults::new(Vec::new()).boxed());
        }
        let outer = operands.remove(0);
        Ok(Box::new(CartesianResults::new(outer, operands)))
    }

    fn execute_join(
        &self,
        op: &Op,
        left: &Arc<Op>,
        right: &Arc<Op>,
        bindings: &Solution,
    ) -> FedResult<BoxedResults> {
        let left_outer = op.join_type() == Some(JoinType::Left);
        let mut left_results = self.execute_bound(left, bindings)?;

        if self.config.join_strategy() == JoinStrategy::Bind || right.needs_bindings() {
            return Ok(Box::new(BindJoinResults::new(
                left_results,
                Arc::clone(right),
                self.clone(),
                bindings.clone(),
                left_outer,
            )));
        }

        let right_results = match self.execute_bound(right, bindings) {
            Ok(results) => results,
            Err(error) => {
                if let Err(close_error) = left_results.close() {
                    tracing::warn!("Failed to close the left side of a join: {close_error}");
                }
                return Err(error);
            }
        };
        let keys = left
            .result_vars()
            .intersection(right.result_vars())
            .iter()
            .filter(|variable| bindings.get(variable).is_none())
            .cloned()
            .collect();
        if !left_outer && self.builds_on_left(left, right) {
            tracing::trace!("Building the hash table of a join on its left side");
            return Ok(Box::new(HashJoinResults::build_left(
                left_results,
                right_results,
                keys,
            )));
        }
        Ok(Box::new(HashJoinResults::new(
            left_results,
            right_results,
            keys,
            left_outer,
        )))
    }

    /// Returns whether the left operand of an inner hash join is estimated to be smaller than the
    /// right one.
    fn builds_on_left(&self, left: &Op, right: &Op) -> bool {
        self.estimator.estimate(left) < self.estimator.estimate(right)
    }

    /// Executes all `children`. If one of them fails, the streams created so far are closed.
    fn execute_all<'a>(
        &self,
        children: impl IntoIterator<Item = &'a Arc<Op>>,
        bindings: &Solution,
    ) -> FedResult<Vec<BoxedResults>> {
        let mut results = Vec::new();
        for child in children {
            match self.execute_bound(child, bindings) {
                Ok(child) => results.push(child),
                Err(error) => {
                    if let Err(close_error) = close_all(&mut results) {
                        tracing::warn!("Failed to close streams of a failed node: {close_error}");
                    }
                    return Err(error);
                }
            }
        }
        Ok(results)
    }
}

#[allow(clippy::panic, reason = "Executing an unresolved fragment is a planner bug")]
fn unresolved(query: &ConjunctiveQuery) -> ! {
    panic!("Cannot execute the unresolved fragment {query}")
}
