use crate::cardinality::CardinalityHeuristic;
use crate::Source;
use fedfusion_model::{Cardinality, ConjunctiveQuery};
use std::sync::Arc;

/// Combines several heuristics by taking the most pessimistic supported estimate: the largest
/// one, and among equally large ones the least reliable.
#[derive(Debug, Clone)]
pub struct WorstCaseEnsemble {
    heuristics: Vec<Arc<dyn CardinalityHeuristic>>,
}

impl WorstCaseEnsemble {
    pub fn new(heuristics: Vec<Arc<dyn CardinalityHeuristic>>) -> Self {
        Self { heuristics }
    }
}

impl CardinalityHeuristic for WorstCaseEnsemble {
    fn estimate(&self, query: &ConjunctiveQuery, source: Option<&Source>) -> Cardinality {
        self.heuristics
            .iter()
            .map(|heuristic| heuristic.estimate(query, source))
            .filter(|estimate| !estimate.is_unsupported())
            .max_by_key(|estimate| (estimate.value(), estimate.reliability()))
            .unwrap_or(Cardinality::UNSUPPORTED)
    }
}
