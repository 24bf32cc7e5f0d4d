use fedfusion_common::{
    BoxedResults, Capability, CollectionResults, Endpoint, FedResult, FederationError, Fragment,
    ReasoningMode, Results, SourceMatcher, SourceVerdict,
};
use fedfusion_model::{
    Cardinality, ConjunctiveQuery, Expression, Filter, Literal, NamedNode, NamedNodePattern,
    Solution, Term, TermPattern, TriplePattern, Variable,
};
use itertools::Itertools;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

/// Numbers become integer literals, everything else an IRI below `http://example.com/`.
pub fn term(value: &str) -> Term {
    match value.parse::<i64>() {
        Ok(number) => Literal::from(number).into(),
        Err(_) => iri(value).into(),
    }
}

pub fn iri(value: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{value}"))
}

pub fn row(bindings: &[(&str, &str)]) -> Solution {
    bindings
        .iter()
        .map(|(name, value)| (var(name), term(value)))
        .collect()
}

pub fn results(vars: &[&str], rows: Vec<Solution>) -> BoxedResults {
    CollectionResults::new(vars.iter().map(|name| var(name)).collect(), rows).boxed()
}

/// Renders solutions one per line in a stable order.
pub fn render(solutions: Vec<Solution>) -> String {
    solutions
        .into_iter()
        .map(|solution| solution.to_string())
        .sorted()
        .join("\n")
}

pub fn less(lhs: &str, rhs: &str) -> Filter {
    Filter::new(Expression::Less(
        Box::new(Expression::Variable(var(lhs))),
        Box::new(Expression::Variable(var(rhs))),
    ))
}

/// Parses `?name` as a variable and anything else like [term].
pub fn pattern(value: &str) -> TermPattern {
    match value.strip_prefix('?') {
        Some(name) => var(name).into(),
        None => match value.parse::<i64>() {
            Ok(number) => Literal::from(number).into(),
            Err(_) => iri(value).into(),
        },
    }
}

pub fn triple(subject: &str, predicate: &str, object: &str) -> TriplePattern {
    let predicate = match predicate.strip_prefix('?') {
        Some(name) => NamedNodePattern::Variable(var(name)),
        None => NamedNodePattern::NamedNode(iri(predicate)),
    };
    TriplePattern {
        subject: pattern(subject),
        predicate,
        object: pattern(object),
    }
}

/// Counts how a stream is used.
#[derive(Debug, Default, Clone)]
pub struct Tracker {
    pulls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl Tracker {
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Wraps `inner` in a stream that reports to this tracker.
    pub fn wrap(&self, inner: BoxedResults) -> BoxedResults {
        Box::new(TrackedResults {
            inner,
            tracker: self.clone(),
        })
    }
}

struct TrackedResults {
    inner: BoxedResults,
    tracker: Tracker,
}

impl Results for TrackedResults {
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
        self.tracker.pulls.fetch_add(1, Ordering::SeqCst);
        self.inner.has_next()
    }

    fn next(&mut self) -> FedResult<Solution> {
        self.tracker.pulls.fetch_add(1, Ordering::SeqCst);
        self.inner.next()
    }

    fn close(&mut self) -> FedResult<()> {
        self.tracker.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

/// Produces `solutions` and then fails.
pub struct FailingResults {
    var_names: Vec<Variable>,
    solutions: Vec<Solution>,
    optional: bool,
}

impl FailingResults {
    pub fn boxed(vars: &[&str], solutions: Vec<Solution>) -> BoxedResults {
        Box::new(Self {
            var_names: vars.iter().map(|name| var(name)).collect(),
            solutions,
            optional: false,
        })
    }
}

impl Results for FailingResults {
    fn var_names(&self) -> &[Variable] {
        &self.var_names
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::UNSUPPORTED
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    fn has_next(&mut self) -> FedResult<bool> {
        if self.solutions.is_empty() {
            return Err(FederationError::source_failure("failing", "connection reset"));
        }
        Ok(true)
    }

    fn next(&mut self) -> FedResult<Solution> {
        self.has_next()?;
        Ok(self.solutions.remove(0))
    }

    fn close(&mut self) -> FedResult<()> {
        Ok(())
    }
}

/// An in-memory source over a list of ground triples.
///
/// Every triple pattern whose predicate occurs in the data is relevant. The endpoint evaluates
/// the triples by nested loops and leaves all modifiers to the executor unless `remote` lists
/// them.
#[derive(Debug)]
pub struct TableSource {
    name: String,
    data: Vec<[Term; 3]>,
    remote: Vec<Capability>,
    fail: bool,
    requests: Mutex<Vec<String>>,
}

impl TableSource {
    pub fn new(name: &str, data: &[(&str, &str, &str)]) -> Self {
        Self {
            name: name.to_owned(),
            data: data
                .iter()
                .map(|(s, p, o)| [term(s), term(p), term(o)])
                .collect(),
            remote: Vec::new(),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_remote(mut self, capabilities: &[Capability]) -> Self {
        self.remote = capabilities.to_vec();
        self
    }

    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Returns the rendering of every query the endpoint received.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn matches(&self, triple: &TriplePattern, solution: &Solution) -> Vec<Solution> {
        let patterns = [
            triple.subject.clone(),
            match &triple.predicate {
                NamedNodePattern::NamedNode(node) => node.clone().into(),
                NamedNodePattern::Variable(variable) => variable.clone().into(),
            },
            triple.object.clone(),
        ];
        self.data
            .iter()
            .filter_map(|row| {
                let mut result = solution.clone();
                for (pattern, value) in patterns.iter().zip(row) {
                    match pattern {
                        TermPattern::Variable(variable) => match result.get(variable) {
                            Some(bound) if bound != value => return None,
                            Some(_) => {}
                            None => {
                                result.insert(variable.clone(), value.clone());
                            }
                        },
                        TermPattern::NamedNode(node) if value != &Term::from(node.clone()) => {
                            return None
                        }
                        TermPattern::Literal(literal) if value != &Term::from(literal.clone()) => {
                            return None
                        }
                        _ => {}
                    }
                }
                Some(result)
            })
            .collect()
    }
}

impl SourceMatcher for TableSource {
    fn match_query(
        &self,
        query: &ConjunctiveQuery,
        _reasoning: ReasoningMode,
    ) -> FedResult<SourceVerdict> {
        Ok(query
            .triples()
            .iter()
            .filter(|triple| match &triple.predicate {
                NamedNodePattern::NamedNode(node) => {
                    let predicate = Term::from(node.clone());
                    self.data.iter().any(|[_, p, _]| *p == predicate)
                }
                NamedNodePattern::Variable(_) => true,
            })
            .fold(SourceVerdict::new(), |verdict, triple| {
                verdict.with_relevant(Fragment::single(triple.clone()))
            }))
    }
}

impl Endpoint for TableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capability(&self, _capability: Capability) -> bool {
        true
    }

    fn has_remote_capability(&self, capability: Capability) -> bool {
        self.remote.contains(&capability)
    }

    fn query(&self, query: &ConjunctiveQuery) -> FedResult<BoxedResults> {
        self.requests.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(FederationError::source_failure(&self.name, "unavailable"));
        }
        let mut solutions = vec![Solution::new()];
        for triple in query.triples() {
            solutions = solutions
                .iter()
                .flat_map(|solution| self.matches(triple, solution))
                .collect();
        }
        let results = CollectionResults::new(query.variables(), solutions).boxed();
        Ok(crate::results::apply_modifiers(
            results,
            &query.modifiers().clone().with_optional(false),
            &Solution::new(),
        ))
    }
}
