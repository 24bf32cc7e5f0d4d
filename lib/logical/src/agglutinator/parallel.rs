use crate::agglutinator::{
    match_source, AgglutinationState, Agglutinator, FragmentCollector, MatchingOptions,
};
use crate::{Op, PlanContext, Source};
use fedfusion_common::{FedResult, WorkerPool};
use std::sync::Arc;

/// Matches all sources concurrently on a [WorkerPool] and merges the verdicts like the
/// [StandardAgglutinator](crate::agglutinator::StandardAgglutinator).
#[derive(Debug)]
pub struct ParallelAgglutinator {
    pool: Arc<WorkerPool>,
}

impl ParallelAgglutinator {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

impl Agglutinator for ParallelAgglutinator {
    fn create_state(&self, ctx: &Arc<PlanContext>) -> Arc<dyn AgglutinationState> {
        Arc::new(FragmentCollector::new(Arc::clone(ctx), true))
    }

    fn agglutinate(
        &self,
        ctx: &Arc<PlanContext>,
        sources: &[Source],
        options: MatchingOptions,
    ) -> FedResult<Vec<Arc<Op>>> {
        let state = self.create_state(ctx);
        let tasks = sources.iter().cloned().map(|source| {
            let state = Arc::clone(&state);
            let query = ctx.query().clone();
            move || match match_source(&query, &source, options) {
                Some(verdict) => state.add_match(&source, verdict),
                None => Ok(()),
            }
        });

        for outcome in self.pool.run_all(tasks)? {
            outcome?;
        }
        state.take_leaves()
    }
}
