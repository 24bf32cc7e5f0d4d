use crate::cardinality::CardinalityHeuristic;
use crate::Source;
use dashmap::DashMap;
use fedfusion_model::{Cardinality, ConjunctiveQuery};
use std::sync::Arc;

type CacheKey = (Option<Arc<str>>, ConjunctiveQuery);

/// Memoizes the estimates of another heuristic per source and fragment.
///
/// Estimates are deterministic, so concurrent misses computing the same entry are harmless.
#[derive(Debug)]
pub struct CachedEstimator {
    inner: Arc<dyn CardinalityHeuristic>,
    cache: DashMap<CacheKey, Cardinality>,
}

impl CachedEstimator {
    pub fn new(inner: Arc<dyn CardinalityHeuristic>) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    /// Returns the number of cached estimates.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl CardinalityHeuristic for CachedEstimator {
    fn estimate(&self, query: &ConjunctiveQuery, source: Option<&Source>) -> Cardinality {
        let key = (source.map(|s| Arc::clone(s.shared_name())), query.clone());
        if let Some(estimate) = self.cache.get(&key) {
            return *estimate;
        }
        // The shard lock must not be held while the inner heuristic runs.
        let estimate = self.inner.estimate(query, source);
        self.cache.insert(key, estimate);
        estimate
    }
}
