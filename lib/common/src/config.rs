use crate::ReasoningMode;
use std::num::NonZeroUsize;
use std::time::Duration;

/// How joins without required inputs are executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum JoinStrategy {
    /// Materialize one side into a hash table and look up the other side in it.
    #[default]
    Hash,
    /// Evaluate the right side once per binding of the left side.
    Bind,
}

/// How cartesian products are executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CartesianMode {
    /// Compute the product of all operands.
    #[default]
    Product,
    /// Concatenate the operands instead of multiplying them. This changes the results and is only
    /// meant for sources that model alternatives as disconnected fragments.
    UnionShortcut,
}

/// How the children of a union are consumed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MultiplexStrategy {
    /// Pull the children one after another on the consumer's thread.
    #[default]
    Sequential,
    /// Pull all children concurrently on dedicated workers and funnel their solutions through a
    /// bounded channel.
    Buffered,
}

/// Which agglutinator turns source verdicts into plan leaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AgglutinatorKind {
    /// One leaf per source and fragment.
    Naive,
    /// Fragments answered by several sources are merged into a union.
    #[default]
    Standard,
    /// Like [AgglutinatorKind::Standard], but sources are matched concurrently.
    Parallel,
}

/// Whether sources may be contacted while matching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MatchingMode {
    /// Ask every source for a verdict.
    #[default]
    Full,
    /// Only use verdicts that are available without contacting the source.
    CacheOnly,
}

/// Configures planning and execution of federated queries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FederationConfig {
    join_strategy: JoinStrategy,
    cartesian_mode: CartesianMode,
    multiplex_strategy: MultiplexStrategy,
    agglutinator: AgglutinatorKind,
    matching_mode: MatchingMode,
    reasoning: ReasoningMode,
    worker_threads: usize,
    channel_capacity: usize,
    close_timeout: Duration,
    shutdown_timeout: Duration,
    push_down_sub_plans: bool,
}

impl FederationConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_join_strategy(mut self, join_strategy: JoinStrategy) -> Self {
        self.join_strategy = join_strategy;
        self
    }

    #[must_use]
    pub fn with_cartesian_mode(mut self, cartesian_mode: CartesianMode) -> Self {
        self.cartesian_mode = cartesian_mode;
        self
    }

    #[must_use]
    pub fn with_multiplex_strategy(mut self, multiplex_strategy: MultiplexStrategy) -> Self {
        self.multiplex_strategy = multiplex_strategy;
        self
    }

    #[must_use]
    pub fn with_agglutinator(mut self, agglutinator: AgglutinatorKind) -> Self {
        self.agglutinator = agglutinator;
        self
    }

    #[must_use]
    pub fn with_matching_mode(mut self, matching_mode: MatchingMode) -> Self {
        self.matching_mode = matching_mode;
        self
    }

    #[must_use]
    pub fn with_reasoning(mut self, reasoning: ReasoningMode) -> Self {
        self.reasoning = reasoning;
        self
    }

    /// Sets the number of threads of the worker pool and of the multiplexing runtime.
    #[must_use]
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    /// Sets the number of solutions buffered by a multiplexed union.
    #[must_use]
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity.max(1);
        self
    }

    /// Sets how long closing a multiplexed union waits for its workers.
    #[must_use]
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Sets how long dropping a runtime waits for running tasks.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Enables sending whole sub-plans to sources that accept them.
    #[must_use]
    pub fn with_push_down_sub_plans(mut self, push_down_sub_plans: bool) -> Self {
        self.push_down_sub_plans = push_down_sub_plans;
        self
    }

    pub fn join_strategy(&self) -> JoinStrategy {
        self.join_strategy
    }

    pub fn cartesian_mode(&self) -> CartesianMode {
        self.cartesian_mode
    }

    pub fn multiplex_strategy(&self) -> MultiplexStrategy {
        self.multiplex_strategy
    }

    pub fn agglutinator(&self) -> AgglutinatorKind {
        self.agglutinator
    }

    pub fn matching_mode(&self) -> MatchingMode {
        self.matching_mode
    }

    pub fn reasoning(&self) -> ReasoningMode {
        self.reasoning
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn push_down_sub_plans(&self) -> bool {
        self.push_down_sub_plans
    }
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            join_strategy: JoinStrategy::default(),
            cartesian_mode: CartesianMode::default(),
            multiplex_strategy: MultiplexStrategy::default(),
            agglutinator: AgglutinatorKind::default(),
            matching_mode: MatchingMode::default(),
            reasoning: ReasoningMode::default(),
            worker_threads: std::thread::available_parallelism()
                .map_or(4, NonZeroUsize::get)
                .min(16),
            channel_capacity: 1024,
            close_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
            push_down_sub_plans: true,
        }
    }
}
