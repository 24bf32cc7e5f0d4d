//! Cardinality estimation.
//!
//! A [CardinalityHeuristic] estimates the number of solutions of a fragment, optionally in the
//! context of the source that answers it. The [OpCardinalityEstimator] lifts such a heuristic to
//! whole plans and caches the estimates on the plan nodes.

mod cached;
mod endpoint_stats;
mod ensemble;
mod estimator;
mod quick;

use crate::Source;
pub use cached::CachedEstimator;
pub use endpoint_stats::EndpointStatsHeuristic;
pub use ensemble::WorstCaseEnsemble;
pub use estimator::OpCardinalityEstimator;
use fedfusion_model::{Cardinality, ConjunctiveQuery};
pub use quick::QuickSelectivityHeuristic;
use std::fmt::Debug;
use std::sync::Arc;

/// Estimates the number of solutions of a fragment.
pub trait CardinalityHeuristic: Debug + Send + Sync {
    /// Estimates the cardinality of `query` when sent to `source`. Heuristics that cannot give
    /// an estimate return [Cardinality::UNSUPPORTED].
    fn estimate(&self, query: &ConjunctiveQuery, source: Option<&Source>) -> Cardinality;
}

/// Returns the heuristic used when nothing else is configured: the worst case of the endpoint
/// statistics and the [QuickSelectivityHeuristic], memoized per fragment.
pub fn default_heuristic() -> Arc<dyn CardinalityHeuristic> {
    Arc::new(CachedEstimator::new(Arc::new(WorstCaseEnsemble::new(vec![
        Arc::new(EndpointStatsHeuristic),
        Arc::new(QuickSelectivityHeuristic),
    ]))))
}
