mod capability;
mod config;
mod endpoint;
pub mod error;
mod matching;
mod pool;
pub mod results;

pub use capability::Capability;
pub use config::{
    AgglutinatorKind, CartesianMode, FederationConfig, JoinStrategy, MatchingMode,
    MultiplexStrategy,
};
pub use endpoint::Endpoint;
pub use error::{FedResult, FederationError};
pub use matching::{Fragment, ReasoningMode, SourceMatcher, SourceVerdict};
pub use pool::WorkerPool;
pub use results::{
    BoxedResults, CollectionResults, EmptyResults, Results, ResultsIter, close_all, drain,
};
