use crate::{BoxedResults, Capability, FedResult};
use fedfusion_model::{Cardinality, ConjunctiveQuery};
use std::fmt::Debug;

/// The execution boundary of a source.
///
/// The executor sends each fragment to the endpoint of the source it is bound to. The modifiers
/// of the query passed to [Endpoint::query] are exactly those the endpoint reported as remote
/// capabilities; everything else is evaluated locally on the returned stream.
pub trait Endpoint: Debug + Send + Sync {
    /// Returns the name used in logs and plan renderings.
    fn name(&self) -> &str;

    /// Returns whether the endpoint can answer fragments that use `capability`.
    fn has_capability(&self, capability: Capability) -> bool;

    /// Returns whether the source itself evaluates `capability`.
    fn has_remote_capability(&self, capability: Capability) -> bool;

    /// Evaluates `query` and returns a stream over its solutions.
    fn query(&self, query: &ConjunctiveQuery) -> FedResult<BoxedResults>;

    /// Returns a cardinality estimate for `query` if one is available without an expensive
    /// request.
    fn estimate(&self, _query: &ConjunctiveQuery) -> Option<Cardinality> {
        None
    }
}
