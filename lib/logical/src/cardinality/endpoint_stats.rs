use crate::cardinality::CardinalityHeuristic;
use crate::Source;
use fedfusion_model::{Cardinality, ConjunctiveQuery};

/// Asks the endpoint of the source for an estimate it can give without an expensive request.
#[derive(Debug, Default, Clone, Copy)]
pub struct EndpointStatsHeuristic;

impl CardinalityHeuristic for EndpointStatsHeuristic {
    fn estimate(&self, query: &ConjunctiveQuery, source: Option<&Source>) -> Cardinality {
        source
            .and_then(|source| source.endpoint().estimate(query))
            .unwrap_or(Cardinality::UNSUPPORTED)
    }
}
