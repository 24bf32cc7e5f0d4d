use crate::cardinality::CardinalityHeuristic;
use crate::{JoinType, Op, OpKind};
use fedfusion_model::{Cardinality, ConjunctiveQuery, Modifiers};
use std::sync::Arc;

/// Estimates the cardinality of plan nodes and caches the estimate on each node.
///
/// Leaves and joins are estimated by the heuristic on the fragment they answer. Unions sum their
/// children, cartesian products multiply them, and a limit caps any estimate.
#[derive(Debug, Clone)]
pub struct OpCardinalityEstimator {
    heuristic: Arc<dyn CardinalityHeuristic>,
}

impl OpCardinalityEstimator {
    pub fn new(heuristic: Arc<dyn CardinalityHeuristic>) -> Self {
        Self { heuristic }
    }

    pub fn heuristic(&self) -> &Arc<dyn CardinalityHeuristic> {
        &self.heuristic
    }

    /// Returns the estimate of `op`, computing it on first use.
    pub fn estimate(&self, op: &Op) -> Cardinality {
        op.cardinality_or_init(|| self.compute(op))
    }

    fn compute(&self, op: &Op) -> Cardinality {
        let estimate = match op.kind() {
            OpKind::Endpoint { source, query } => self.heuristic.estimate(
                &query.with_modifiers(Modifiers::new().with_filters(op.filters().iter().cloned())),
                Some(source),
            ),
            OpKind::Query { query } => self.heuristic.estimate(query, None),
            OpKind::Empty => Cardinality::EMPTY,
            OpKind::Union(children) => children
                .iter()
                .map(|child| self.estimate(child))
                .fold(Cardinality::EMPTY, Cardinality::add),
            OpKind::Cartesian(children) => children
                .iter()
                .map(|child| self.estimate(child))
                .fold(Cardinality::exact(1), Cardinality::multiply),
            OpKind::Join { left, .. } => {
                let fragment = ConjunctiveQuery::new(op.matched_triples().to_vec()).with_modifiers(
                    Modifiers::new().with_filters(op.filters().iter().cloned()),
                );
                let joined = self.heuristic.estimate(&fragment, op.bound_source());
                if op.join_type() == Some(JoinType::Left) {
                    // A left join keeps every solution of its left side.
                    let left = self.estimate(left);
                    if left.value() > joined.value() {
                        left
                    } else {
                        joined
                    }
                } else {
                    joined
                }
            }
            OpKind::Pipe(child) => self.estimate(child),
        };

        match op.modifiers().limit() {
            Some(limit) => estimate.limit(u64::try_from(limit).unwrap_or(u64::MAX)),
            None => estimate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardinality::QuickSelectivityHeuristic;
    use crate::test_utils::{leaf, source, triple};
    use crate::PlanContext;

    fn estimator() -> OpCardinalityEstimator {
        OpCardinalityEstimator::new(Arc::new(QuickSelectivityHeuristic))
    }

    #[test]
    fn union_sums_and_cartesian_multiplies() {
        let query = ConjunctiveQuery::new([triple("alice", "knows", "?y"), triple("bob", "knows", "?z")]);
        let ctx = PlanContext::new(&query);
        let first = leaf(&ctx, &source("a"), &[query.triples()[0].clone()], &[]);
        let second = leaf(&ctx, &source("b"), &[query.triples()[0].clone()], &[]);
        let third = leaf(&ctx, &source("a"), &[query.triples()[1].clone()], &[]);
        let estimator = estimator();
        let single = estimator.estimate(&first);

        let union = Op::union(&ctx, vec![first, second]);
        let cartesian = Op::cartesian(&ctx, vec![Arc::clone(&union), third]);

        assert_eq!(estimator.estimate(&union).value(), single.value() * 2);
        assert_eq!(
            estimator.estimate(&cartesian).value(),
            single.value() * 2 * single.value()
        );
    }

    #[test]
    fn limit_caps_the_estimate() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y")]);
        let ctx = PlanContext::new(&query);
        let child = leaf(&ctx, &source("a"), query.triples(), &[]);
        let pipe = Op::pipe(child, Modifiers::new().with_limit(Some(5)));

        assert_eq!(estimator().estimate(&pipe), Cardinality::guess(5));
    }

    #[test]
    fn estimates_are_cached_on_the_node() {
        let query = ConjunctiveQuery::new([triple("?x", "knows", "?y")]);
        let ctx = PlanContext::new(&query);
        let node = leaf(&ctx, &source("a"), query.triples(), &[]);

        let estimate = estimator().estimate(&node);

        assert_eq!(node.cached_cardinality(), Some(estimate));
    }
}
