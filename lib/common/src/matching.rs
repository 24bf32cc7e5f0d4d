use crate::FedResult;
use fedfusion_model::{ConjunctiveQuery, TriplePattern, Variable};
use std::fmt::Debug;
use std::time::Duration;

/// The entailment regime under which a source is matched against a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReasoningMode {
    /// Plain graph matching.
    #[default]
    Disabled,
    /// Matching under RDFS entailment (sub-classes and sub-properties).
    Rdfs,
}

/// A sub-query that a source can answer, together with the input interface it requires.
///
/// Required inputs must be bound before the source can answer the fragment (e.g., a lookup
/// service that needs a subject). Optional inputs may be bound to restrict the answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fragment {
    triples: Vec<TriplePattern>,
    required_inputs: Vec<Variable>,
    optional_inputs: Vec<Variable>,
}

impl Fragment {
    /// Creates a fragment without inputs.
    pub fn new(triples: impl IntoIterator<Item = TriplePattern>) -> Self {
        Self {
            triples: triples.into_iter().collect(),
            required_inputs: Vec::new(),
            optional_inputs: Vec::new(),
        }
    }

    /// Creates a fragment holding a single triple pattern.
    pub fn single(triple: TriplePattern) -> Self {
        Self::new([triple])
    }

    #[must_use]
    pub fn with_required_inputs(mut self, inputs: impl IntoIterator<Item = Variable>) -> Self {
        self.required_inputs = inputs.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_optional_inputs(mut self, inputs: impl IntoIterator<Item = Variable>) -> Self {
        self.optional_inputs = inputs.into_iter().collect();
        self
    }

    pub fn triples(&self) -> &[TriplePattern] {
        &self.triples
    }

    pub fn required_inputs(&self) -> &[Variable] {
        &self.required_inputs
    }

    pub fn optional_inputs(&self) -> &[Variable] {
        &self.optional_inputs
    }
}

/// The result of matching one source against one query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceVerdict {
    exclusive_groups: Vec<Fragment>,
    relevant: Vec<Fragment>,
    unknown: Vec<TriplePattern>,
}

impl SourceVerdict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group of triples that the source answers atomically in a single request.
    #[must_use]
    pub fn with_exclusive_group(mut self, fragment: Fragment) -> Self {
        self.exclusive_groups.push(fragment);
        self
    }

    /// Adds a triple that the source can answer on its own.
    #[must_use]
    pub fn with_relevant(mut self, fragment: Fragment) -> Self {
        debug_assert_eq!(
            fragment.triples().len(),
            1,
            "Relevant fragments hold exactly one triple"
        );
        self.relevant.push(fragment);
        self
    }

    /// Adds a triple whose relevance could not be determined.
    #[must_use]
    pub fn with_unknown(mut self, triple: TriplePattern) -> Self {
        self.unknown.push(triple);
        self
    }

    pub fn exclusive_groups(&self) -> &[Fragment] {
        &self.exclusive_groups
    }

    pub fn relevant(&self) -> &[Fragment] {
        &self.relevant
    }

    pub fn unknown(&self) -> &[TriplePattern] {
        &self.unknown
    }

    pub fn is_empty(&self) -> bool {
        self.exclusive_groups.is_empty() && self.relevant.is_empty() && self.unknown.is_empty()
    }

    /// Iterates all triples that this verdict considers answerable, including the triples of
    /// unknown relevance.
    pub fn matched_triples(&self) -> impl Iterator<Item = &TriplePattern> {
        self.exclusive_groups
            .iter()
            .chain(&self.relevant)
            .flat_map(Fragment::triples)
            .chain(&self.unknown)
    }
}

/// Decides which parts of a query a source can answer.
pub trait SourceMatcher: Debug + Send + Sync {
    /// Matches the source against `query`.
    fn match_query(
        &self,
        query: &ConjunctiveQuery,
        reasoning: ReasoningMode,
    ) -> FedResult<SourceVerdict>;

    /// Returns a verdict only if it is available without contacting the source.
    fn cached_match(
        &self,
        _query: &ConjunctiveQuery,
        _reasoning: ReasoningMode,
    ) -> Option<SourceVerdict> {
        None
    }

    /// Returns whether the matcher supports the given `reasoning` mode.
    fn supports(&self, reasoning: ReasoningMode) -> bool {
        reasoning == ReasoningMode::Disabled
    }

    /// Starts initializing the matcher (e.g., building an index) in the background.
    fn init(&self) {}

    /// Blocks until initialization finished or `timeout` elapsed. Returns whether the matcher is
    /// initialized.
    fn wait_for_init(&self, _timeout: Duration) -> bool {
        true
    }

    /// Synchronously refreshes the matcher's view of the source. Returns whether the update
    /// finished within `timeout`.
    fn update_sync(&self, _timeout: Duration) -> bool {
        true
    }
}
