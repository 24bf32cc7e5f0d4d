use crate::Op;
use fedfusion_common::{BoxedResults, Endpoint, FedResult, SourceMatcher};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An endpoint that can evaluate whole sub-plans whose leaves are all bound to it.
pub trait SubPlanEndpoint: Debug + Send + Sync {
    /// Returns whether the endpoint can evaluate `plan` in one request.
    fn accepts(&self, plan: &Op) -> bool;

    /// Evaluates `plan`, including the modifiers of its nodes.
    fn execute_plan(&self, plan: &Op) -> FedResult<BoxedResults>;
}

/// A data source taking part in a federation.
///
/// A source combines the matching boundary (which parts of a query can it answer?) with the
/// execution boundary (answer this fragment). Sources are identified by their name.
#[derive(Clone)]
pub struct Source {
    name: Arc<str>,
    matcher: Arc<dyn SourceMatcher>,
    endpoint: Arc<dyn Endpoint>,
    sub_plan_endpoint: Option<Arc<dyn SubPlanEndpoint>>,
}

impl Source {
    /// Creates a new [Source].
    pub fn new(
        name: impl Into<Arc<str>>,
        matcher: Arc<dyn SourceMatcher>,
        endpoint: Arc<dyn Endpoint>,
    ) -> Self {
        Self {
            name: name.into(),
            matcher,
            endpoint,
            sub_plan_endpoint: None,
        }
    }

    /// Creates a [Source] from a single object that implements both boundaries.
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: SourceMatcher + Endpoint + 'static,
    {
        let name = backend.name().to_owned();
        Self::new(name, Arc::clone(&backend) as Arc<dyn SourceMatcher>, backend)
    }

    #[must_use]
    pub fn with_sub_plan_endpoint(mut self, endpoint: Arc<dyn SubPlanEndpoint>) -> Self {
        self.sub_plan_endpoint = Some(endpoint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn matcher(&self) -> &Arc<dyn SourceMatcher> {
        &self.matcher
    }

    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    pub fn sub_plan_endpoint(&self) -> Option<&Arc<dyn SubPlanEndpoint>> {
        self.sub_plan_endpoint.as_ref()
    }
}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("sub_plans", &self.sub_plan_endpoint.is_some())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Source {}

impl Hash for Source {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Source {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Source {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}
