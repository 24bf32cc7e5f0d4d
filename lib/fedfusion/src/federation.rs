use fedfusion_common::{
    AgglutinatorKind, BoxedResults, FedResult, FederationConfig, FederationError,
    MultiplexStrategy, WorkerPool,
};
use fedfusion_logical::agglutinator::{
    Agglutinator, MatchingOptions, NaiveAgglutinator, ParallelAgglutinator, StandardAgglutinator,
};
use fedfusion_logical::{FederationPlanner, Op, Source};
use fedfusion_model::ConjunctiveQuery;
use fedfusion_physical::{
    BufferedResultsExecutor, PlanExecutor, ResultsExecutor, SequentialResultsExecutor,
};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for the blocking threads of the worker pool. Every multiplexed union child holds
/// one of them until it is exhausted.
const MAX_BLOCKING_THREADS: usize = 512;

/// Extra time granted to sources that do not honor the timeout of
/// [Federation::init_all_sources].
const INIT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// A set of sources that answer queries together.
///
/// The federation owns the planner, the executor, and a [WorkerPool] shared by parallel
/// agglutination, buffered multiplexing, and source initialization. Result streams returned by
/// [Federation::execute] may use the pool, hence they must be consumed before the federation is
/// dropped.
pub struct Federation {
    config: FederationConfig,
    sources: Vec<Source>,
    pool: Arc<WorkerPool>,
    planner: FederationPlanner,
    executor: PlanExecutor,
}

impl Default for Federation {
    #[allow(
        clippy::expect_used,
        reason = "Building the default runtime only fails if the OS refuses to spawn threads"
    )]
    fn default() -> Self {
        Self::new(FederationConfig::default()).expect("Could not create the worker pool")
    }
}

impl Federation {
    /// Creates an empty federation configured by `config`.
    pub fn new(config: FederationConfig) -> FedResult<Self> {
        let pool = Arc::new(WorkerPool::with_blocking_limit(
            config.worker_threads(),
            MAX_BLOCKING_THREADS,
            config.shutdown_timeout(),
        )?);

        let agglutinator: Arc<dyn Agglutinator> = match config.agglutinator() {
            AgglutinatorKind::Naive => Arc::new(NaiveAgglutinator),
            AgglutinatorKind::Standard => Arc::new(StandardAgglutinator),
            AgglutinatorKind::Parallel => Arc::new(ParallelAgglutinator::new(Arc::clone(&pool))),
        };
        let options = MatchingOptions {
            reasoning: config.reasoning(),
            mode: config.matching_mode(),
        };
        let planner = FederationPlanner::with_agglutinator(agglutinator, options);

        let multiplexer: Arc<dyn ResultsExecutor> = match config.multiplex_strategy() {
            MultiplexStrategy::Sequential => Arc::new(SequentialResultsExecutor),
            MultiplexStrategy::Buffered => Arc::new(BufferedResultsExecutor::new(
                Arc::clone(&pool),
                config.channel_capacity(),
                config.close_timeout(),
            )),
        };
        let executor = PlanExecutor::new(config.clone(), multiplexer, planner.estimator().clone());

        Ok(Self {
            config,
            sources: Vec::new(),
            pool,
            planner,
            executor,
        })
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Returns the registered sources in registration order.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Adds `source` to the federation. Source names must be unique.
    pub fn register_source(&mut self, source: Source) -> FedResult<()> {
        if self.sources.contains(&source) {
            return Err(FederationError::DuplicateSource(source.name().to_owned()));
        }
        tracing::debug!("Registering source {}", source.name());
        self.sources.push(source);
        Ok(())
    }

    /// Starts initializing every source and waits until all of them are ready or `timeout`
    /// elapsed. Returns whether all sources are initialized.
    pub fn init_all_sources(&self, timeout: Duration) -> FedResult<bool> {
        for source in &self.sources {
            source.matcher().init();
        }
        let tasks = self.sources.iter().map(|source| {
            let matcher = Arc::clone(source.matcher());
            move || matcher.wait_for_init(timeout)
        });
        let ready = match self.pool.run_all_timeout(tasks, timeout + INIT_GRACE_PERIOD) {
            Ok(ready) => ready,
            Err(FederationError::Timeout(_)) => {
                tracing::warn!("Some sources did not report their initialization state in time");
                return Ok(false);
            }
            Err(error) => return Err(error),
        };

        let pending = self
            .sources
            .iter()
            .zip(&ready)
            .filter(|(_, ready)| !**ready)
            .map(|(source, _)| source.name())
            .collect::<Vec<_>>();
        if !pending.is_empty() {
            tracing::warn!(
                "Sources not initialized after {timeout:?}: {}",
                pending.join(", ")
            );
        }
        Ok(pending.is_empty())
    }

    /// Plans `query` over the registered sources.
    pub fn plan(&self, query: &ConjunctiveQuery) -> FedResult<Arc<Op>> {
        let plan = self.planner.plan(query, &self.sources)?;
        tracing::debug!("Planned {query}:\n{plan}");
        Ok(plan)
    }

    /// Plans `query` and left-joins each block of `optionals` onto it.
    pub fn plan_with_optionals(
        &self,
        query: &ConjunctiveQuery,
        optionals: &[ConjunctiveQuery],
    ) -> FedResult<Arc<Op>> {
        let plan = self
            .planner
            .plan_with_optionals(query, optionals, &self.sources)?;
        tracing::debug!("Planned {query} with {} optional blocks:\n{plan}", optionals.len());
        Ok(plan)
    }

    /// Executes `plan`, which must have been planned for `query`.
    pub fn execute(&self, query: &ConjunctiveQuery, plan: &Op) -> FedResult<BoxedResults> {
        tracing::debug!("Executing the plan of {query}");
        self.executor.execute(plan)
    }

    /// Plans and executes `query`.
    pub fn query(&self, query: &ConjunctiveQuery) -> FedResult<BoxedResults> {
        let plan = self.plan(query)?;
        self.execute(query, &plan)
    }
}

impl Debug for Federation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federation")
            .field("config", &self.config)
            .field("sources", &self.sources)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
