use crate::options::Fault;
use crate::{MemSourceOptions, TripleIndex};
use fedfusion_common::{
    BoxedResults, Capability, CollectionResults, Endpoint, FedResult, FederationError, Fragment,
    ReasoningMode, Results, SourceMatcher, SourceVerdict,
};
use fedfusion_logical::{JoinType, Op, OpKind, Source, SubPlanEndpoint};
use fedfusion_model::{
    triple_variables, Cardinality, ConjunctiveQuery, Filter, NamedNodePattern, Solution,
    TermPattern, Triple, TriplePattern, Variable,
};
use fedfusion_physical::results::apply_modifiers;
use oxrdfio::RdfParser;
use rustc_hash::FxHashSet;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

/// The data of a [MemSource] and its lazily built index.
#[derive(Debug)]
struct IndexState {
    triples: Vec<Triple>,
    index: OnceLock<TripleIndex>,
    started: AtomicBool,
    ready: Mutex<bool>,
    built: Condvar,
}

impl IndexState {
    fn new(triples: Vec<Triple>) -> Self {
        Self {
            triples,
            index: OnceLock::new(),
            started: AtomicBool::new(false),
            ready: Mutex::new(false),
            built: Condvar::new(),
        }
    }

    /// Returns the index, building it on the calling thread if no other thread does.
    fn get_or_build(&self, delay: Option<Duration>) -> &TripleIndex {
        let index = self.index.get_or_init(|| {
            if let Some(delay) = delay {
                thread::sleep(delay);
            }
            let index = TripleIndex::new(self.triples.iter().cloned());
            tracing::debug!("Indexed {} triples", index.len());
            index
        });
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        if !*ready {
            *ready = true;
            self.built.notify_all();
        }
        index
    }

    /// Blocks until the index is built or `timeout` elapsed.
    fn wait(&self, timeout: Duration) -> bool {
        let ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        let (ready, _) = self
            .built
            .wait_timeout_while(ready, timeout, |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
        *ready
    }
}

/// A source that holds its triples in memory.
///
/// The source matches a triple pattern if at least one of its triples matches it. Depending on
/// its [MemSourceOptions], it reports connected patterns as exclusive groups, requires bound
/// subjects, or evaluates whole sub-plans. The index the matcher relies on is built in the
/// background by [SourceMatcher::init], or on first use.
#[derive(Debug)]
pub struct MemSource {
    name: String,
    options: MemSourceOptions,
    state: Arc<IndexState>,
    requests: AtomicUsize,
}

impl MemSource {
    /// Creates a new [MemSource] with default options.
    pub fn new(name: impl Into<String>, triples: impl IntoIterator<Item = Triple>) -> Self {
        Self {
            name: name.into(),
            options: MemSourceOptions::default(),
            state: Arc::new(IndexState::new(triples.into_iter().collect())),
            requests: AtomicUsize::new(0),
        }
    }

    /// Loads a [MemSource] from an RDF document. Quads are projected to their triples.
    pub fn from_reader(
        name: impl Into<String>,
        parser: impl Into<RdfParser>,
        reader: impl Read,
    ) -> FedResult<Self> {
        let triples = parser
            .into()
            .rename_blank_nodes()
            .for_reader(reader)
            .map(|quad| quad.map(Triple::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| FederationError::Other(Box::new(error)))?;
        Ok(Self::new(name, triples))
    }

    #[must_use]
    pub fn with_options(mut self, options: MemSourceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &MemSourceOptions {
        &self.options
    }

    /// Returns the number of requests [Endpoint::query] has received.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.index.get().is_some()
    }

    /// Registers this source with both boundaries and, if enabled, as a sub-plan endpoint.
    pub fn into_source(self: Arc<Self>) -> Source {
        let sub_plans = self.options.sub_plans();
        let source = Source::from_backend(Arc::clone(&self));
        if sub_plans {
            source.with_sub_plan_endpoint(self)
        } else {
            source
        }
    }

    fn index(&self) -> &TripleIndex {
        self.state.get_or_build(self.options.index_delay())
    }

    fn verdict(&self, index: &TripleIndex, query: &ConjunctiveQuery) -> SourceVerdict {
        let relevant = query
            .triples()
            .iter()
            .filter(|triple| index.count(triple) > 0)
            .cloned()
            .collect::<Vec<_>>();
        let groups = if self.options.exclusive_groups() {
            connected_groups(relevant)
        } else {
            relevant.into_iter().map(|triple| vec![triple]).collect()
        };

        groups
            .into_iter()
            .fold(SourceVerdict::new(), |verdict, group| {
                let exclusive = group.len() > 1;
                let fragment = self.fragment(group);
                if exclusive {
                    verdict.with_exclusive_group(fragment)
                } else {
                    verdict.with_relevant(fragment)
                }
            })
    }

    fn fragment(&self, triples: Vec<TriplePattern>) -> Fragment {
        if !self.options.required_subjects() {
            return Fragment::new(triples);
        }
        let produced = triples
            .iter()
            .flat_map(non_subject_variables)
            .collect::<FxHashSet<_>>();
        let required = triples
            .iter()
            .filter_map(|triple| match &triple.subject {
                TermPattern::Variable(variable) if !produced.contains(variable) => {
                    Some(variable.clone())
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        Fragment::new(triples).with_required_inputs(required)
    }

    /// Returns whether `op` only consists of inner joins and cartesian products over fragments
    /// of this source. Only the root may carry solution modifiers or be optional.
    fn is_local(&self, op: &Op, root: bool) -> bool {
        let modifiers = op.modifiers();
        let plain = modifiers.projection().is_none()
            && !modifiers.is_distinct()
            && modifiers.limit().is_none()
            && !modifiers.is_optional();
        if !root && !plain {
            return false;
        }
        match op.kind() {
            OpKind::Endpoint { source, .. } => source.name() == self.name,
            OpKind::Join { left, right } => {
                op.join_type() == Some(JoinType::Inner)
                    && self.is_local(left, false)
                    && self.is_local(right, false)
            }
            OpKind::Cartesian(children) => children.iter().all(|child| self.is_local(child, false)),
            OpKind::Query { .. } | OpKind::Empty | OpKind::Union(_) | OpKind::Pipe(_) => false,
        }
    }
}

fn non_subject_variables(triple: &TriplePattern) -> impl Iterator<Item = Variable> + '_ {
    let predicate = match &triple.predicate {
        NamedNodePattern::Variable(variable) => Some(variable.clone()),
        NamedNodePattern::NamedNode(_) => None,
    };
    let object = match &triple.object {
        TermPattern::Variable(variable) => Some(variable.clone()),
        _ => None,
    };
    predicate.into_iter().chain(object)
}

/// Groups `triples` into the connected components of the "shares a variable" relation.
fn connected_groups(triples: Vec<TriplePattern>) -> Vec<Vec<TriplePattern>> {
    let mut groups: Vec<(FxHashSet<Variable>, Vec<TriplePattern>)> = Vec::new();
    for triple in triples {
        let variables = triple_variables(&triple).cloned().collect::<FxHashSet<_>>();
        let (connected, mut rest): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .partition(|(group_variables, _)| !group_variables.is_disjoint(&variables));
        let (mut merged_variables, mut merged) = connected.into_iter().fold(
            (FxHashSet::default(), Vec::new()),
            |(mut merged_variables, mut merged), (group_variables, group)| {
                merged_variables.extend(group_variables);
                merged.extend(group);
                (merged_variables, merged)
            },
        );
        merged_variables.extend(variables);
        merged.push(triple);
        rest.push((merged_variables, merged));
        groups = rest;
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

fn collect_sub_plan(op: &Op, triples: &mut Vec<TriplePattern>, filters: &mut Vec<Filter>) {
    filters.extend(op.filters().iter().cloned());
    if let OpKind::Endpoint { query, .. } = op.kind() {
        triples.extend(query.triples().iter().cloned());
    }
    for child in op.children() {
        collect_sub_plan(child, triples, filters);
    }
}

impl SourceMatcher for MemSource {
    fn match_query(
        &self,
        query: &ConjunctiveQuery,
        reasoning: ReasoningMode,
    ) -> FedResult<SourceVerdict> {
        if !self.supports(reasoning) {
            tracing::debug!("Source {} does not support {reasoning:?}", self.name);
            return Ok(SourceVerdict::new());
        }
        Ok(self.verdict(self.index(), query))
    }

    fn cached_match(
        &self,
        query: &ConjunctiveQuery,
        reasoning: ReasoningMode,
    ) -> Option<SourceVerdict> {
        if !self.supports(reasoning) {
            return None;
        }
        let index = self.state.index.get()?;
        Some(self.verdict(index, query))
    }

    fn init(&self) {
        if self.is_initialized() || self.state.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let state = Arc::clone(&self.state);
        let delay = self.options.index_delay();
        let spawned = thread::Builder::new()
            .name(format!("index-{}", self.name))
            .spawn(move || {
                state.get_or_build(delay);
            });
        if let Err(error) = spawned {
            tracing::warn!(
                "Could not index source {} in the background, indexing on first use: {error}",
                self.name
            );
            self.state.started.store(false, Ordering::Release);
        }
    }

    fn wait_for_init(&self, timeout: Duration) -> bool {
        self.init();
        self.state.wait(timeout)
    }

    fn update_sync(&self, timeout: Duration) -> bool {
        self.wait_for_init(timeout)
    }
}

impl Endpoint for MemSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capability(&self, capability: Capability) -> bool {
        self.options.has_capability(capability)
    }

    fn has_remote_capability(&self, capability: Capability) -> bool {
        self.options.has_remote_capability(capability)
    }

    fn query(&self, query: &ConjunctiveQuery) -> FedResult<BoxedResults> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Source {} answers {query}", self.name);
        if self.options.fault() == Fault::FailRequests {
            return Err(FederationError::source_failure(
                &self.name,
                "injected request failure",
            ));
        }

        let solutions = self.index().evaluate(query.triples());
        let results = CollectionResults::new(query.variables(), solutions).boxed();
        let results = apply_modifiers(results, query.modifiers(), &Solution::new());
        Ok(match self.options.fault() {
            Fault::FailAfter(remaining) => Box::new(FaultyResults {
                inner: results,
                remaining,
                source_name: self.name.clone(),
            }),
            Fault::None | Fault::FailRequests => results,
        })
    }

    fn estimate(&self, query: &ConjunctiveQuery) -> Option<Cardinality> {
        let index = self.state.index.get()?;
        let count = |triple: &TriplePattern| u64::try_from(index.count(triple)).unwrap_or(u64::MAX);
        match query.triples() {
            [] => None,
            [triple] => Some(Cardinality::exact(count(triple))),
            triples => triples.iter().map(count).min().map(Cardinality::guess),
        }
    }
}

impl SubPlanEndpoint for MemSource {
    fn accepts(&self, plan: &Op) -> bool {
        self.options.sub_plans() && !plan.needs_bindings() && self.is_local(plan, true)
    }

    fn execute_plan(&self, plan: &Op) -> FedResult<BoxedResults> {
        let mut triples = Vec::new();
        let mut filters = Vec::new();
        collect_sub_plan(plan, &mut triples, &mut filters);
        let modifiers = plan.modifiers().solution_modifiers().with_filters(filters);
        self.query(&ConjunctiveQuery::new(triples).with_modifiers(modifiers))
    }
}

/// Fails after producing a fixed number of solutions.
struct FaultyResults {
    inner: BoxedResults,
    remaining: usize,
    source_name: String,
}

impl FaultyResults {
    fn failure(&self) -> FederationError {
        FederationError::source_failure(&self.source_name, "injected stream failure")
    }
}

impl Results for FaultyResults {
    fn var_names(&self) -> &[Variable] {
        self.inner.var_names()
    }

    fn cardinality(&self) -> Cardinality {
        self.inner.cardinality()
    }

    fn is_optional(&self) -> bool {
        self.inner.is_optional()
    }

    fn set_optional(&mut self, optional: bool) {
        self.inner.set_optional(optional);
    }

    fn has_next(&mut self) -> FedResult<bool> {
        if self.remaining == 0 {
            return Err(self.failure());
        }
        self.inner.has_next()
    }

    fn next(&mut self) -> FedResult<Solution> {
        if self.remaining == 0 {
            return Err(self.failure());
        }
        let solution = self.inner.next()?;
        self.remaining -= 1;
        Ok(solution)
    }

    fn close(&mut self) -> FedResult<()> {
        self.inner.close()
    }
}
