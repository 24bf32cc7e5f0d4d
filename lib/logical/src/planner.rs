use crate::agglutinator::{Agglutinator, MatchingOptions};
use crate::cardinality::{default_heuristic, OpCardinalityEstimator};
use crate::conjunctive::{BitsetConjunctivePlanner, ConjunctivePlanner};
use crate::filter_placement::{place_filters, sanitize_filters};
use crate::join_order::GreedyJoinOrderPlanner;
use crate::{Op, PlanContext, Source};
use fedfusion_common::FedResult;
use fedfusion_model::{ConjunctiveQuery, Filter, Modifiers};
use std::sync::Arc;

/// Turns conjunctive queries into executable plans.
///
/// Planning runs in four steps: agglutinate the source verdicts into leaves, combine the leaves
/// into join trees, place the filters of the query, and wrap the result in a node applying the
/// remaining solution modifiers.
#[derive(Debug, Clone)]
pub struct FederationPlanner {
    agglutinator: Arc<dyn Agglutinator>,
    conjunctive: Arc<dyn ConjunctivePlanner>,
    estimator: OpCardinalityEstimator,
    options: MatchingOptions,
}

impl FederationPlanner {
    pub fn new(
        agglutinator: Arc<dyn Agglutinator>,
        conjunctive: Arc<dyn ConjunctivePlanner>,
        estimator: OpCardinalityEstimator,
        options: MatchingOptions,
    ) -> Self {
        Self {
            agglutinator,
            conjunctive,
            estimator,
            options,
        }
    }

    /// Creates a planner with the bitset conjunctive planner, greedy join ordering, and the
    /// default cardinality heuristic.
    pub fn with_agglutinator(agglutinator: Arc<dyn Agglutinator>, options: MatchingOptions) -> Self {
        let estimator = OpCardinalityEstimator::new(default_heuristic());
        let join_order = Arc::new(GreedyJoinOrderPlanner::new(estimator.clone()));
        Self::new(
            agglutinator,
            Arc::new(BitsetConjunctivePlanner::new(join_order)),
            estimator,
            options,
        )
    }

    /// Returns the estimator used for join ordering. The executor uses it to order operands.
    pub fn estimator(&self) -> &OpCardinalityEstimator {
        &self.estimator
    }

    pub fn options(&self) -> MatchingOptions {
        self.options
    }

    /// Plans `query` over `sources`.
    ///
    /// A query that the sources cannot answer yields an [Empty](crate::OpKind::Empty) plan.
    pub fn plan(&self, query: &ConjunctiveQuery, sources: &[Source]) -> FedResult<Arc<Op>> {
        let ctx = PlanContext::new(query);
        let root = self.plan_conjunctive(&ctx, sources)?;
        let root = attach_filters(&ctx, root, query.modifiers().filters());
        Ok(self.finish(root, query.modifiers()))
    }

    /// Plans `query` and left-joins each of the `optionals` onto it.
    ///
    /// Filters of `query` that only mention variables of its triples are placed below the left
    /// joins. The others are evaluated after all optional blocks have been joined.
    pub fn plan_with_optionals(
        &self,
        query: &ConjunctiveQuery,
        optionals: &[ConjunctiveQuery],
        sources: &[Source],
    ) -> FedResult<Arc<Op>> {
        let ctx = PlanContext::with_optionals(query, optionals);
        let mandatory = ctx.vars_of_triples(query.triples());
        let (core_filters, late_filters): (Vec<_>, Vec<_>) =
            query.modifiers().filters().iter().cloned().partition(|filter| {
                filter
                    .variables()
                    .iter()
                    .all(|variable| mandatory.contains(variable))
            });

        let mut root = self.plan_conjunctive(&ctx, sources)?;
        root = attach_filters(&ctx, root, &core_filters);
        for optional in optionals {
            let optional_ctx = ctx.for_query(optional.clone());
            let optional_root = self.plan_conjunctive(&optional_ctx, sources)?;
            if optional_root.is_empty_op() {
                tracing::debug!("Skipping optional block {optional} that no source answers");
                continue;
            }
            let optional_root =
                attach_filters(&optional_ctx, optional_root, optional.modifiers().filters());
            root = Arc::new(Op::join(
                root,
                Arc::new(optional_root.with_optional(true)),
            ));
        }
        root = attach_filters(&ctx, root, &late_filters);
        Ok(self.finish(root, query.modifiers()))
    }

    fn plan_conjunctive(&self, ctx: &Arc<PlanContext>, sources: &[Source]) -> FedResult<Arc<Op>> {
        let leaves = self.agglutinator.agglutinate(ctx, sources, self.options)?;
        tracing::debug!(
            "Agglutinated {} leaves for {} triples",
            leaves.len(),
            ctx.query().len()
        );
        Ok(self.conjunctive.plan(ctx, &leaves))
    }

    fn finish(&self, mut root: Arc<Op>, modifiers: &Modifiers) -> Arc<Op> {
        let solution_modifiers = Modifiers::new()
            .with_projection(modifiers.projection().map(<[_]>::to_vec))
            .with_distinct(modifiers.is_distinct())
            .with_limit(modifiers.limit());
        if solution_modifiers.has_solution_modifiers() {
            root = Arc::new(Op::pipe(root, solution_modifiers));
        }
        if modifiers.is_optional() {
            root = Arc::new(root.with_optional(true));
        } else if root.is_empty_op() {
            tracing::warn!(
                "The plan is empty. No combination of sources answers all triples of the query"
            );
        }
        self.estimator.estimate(&root);
        root
    }
}

/// Adds `filters` to `root`, places them, and drops those that cannot be evaluated.
fn attach_filters(ctx: &PlanContext, root: Arc<Op>, filters: &[Filter]) -> Arc<Op> {
    if filters.is_empty() || root.is_empty_op() {
        return root;
    }
    let root = Arc::new(root.with_filters(filters.iter().cloned()));
    let placed = place_filters(ctx, &root);
    sanitize_filters(ctx, &placed)
}
