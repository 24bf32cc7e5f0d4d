use fedfusion_common::{
    BoxedResults, Capability, EmptyResults, Endpoint, FedResult, Fragment, ReasoningMode,
    SourceMatcher, SourceVerdict,
};
use fedfusion_logical::agglutinator::StandardAgglutinator;
use fedfusion_logical::{FederationPlanner, Source};
use fedfusion_model::{
    ConjunctiveQuery, NamedNode, NamedNodePattern, TermPattern, TriplePattern, Variable,
};
use std::sync::Arc;

pub fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

pub fn triple(subject: &str, predicate: &str, object: &str) -> TriplePattern {
    let term = |value: &str| -> TermPattern {
        match value.strip_prefix('?') {
            Some(name) => var(name).into(),
            None => NamedNode::new_unchecked(format!("http://example.com/{value}")).into(),
        }
    };
    TriplePattern {
        subject: term(subject),
        predicate: NamedNodePattern::NamedNode(NamedNode::new_unchecked(format!(
            "http://example.com/{predicate}"
        ))),
        object: term(object),
    }
}

/// A source that answers every triple whose predicate it knows.
#[derive(Debug)]
pub struct PredicateSource {
    name: String,
    predicates: Vec<String>,
    groups: bool,
    remote_filter: bool,
}

impl PredicateSource {
    pub fn new(name: &str, predicates: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            predicates: predicates
                .iter()
                .map(|p| format!("http://example.com/{p}"))
                .collect(),
            groups: false,
            remote_filter: false,
        }
    }

    /// Reports all matched triples as one exclusive group.
    pub fn grouped(mut self) -> Self {
        self.groups = true;
        self
    }

    pub fn with_remote_filter(mut self) -> Self {
        self.remote_filter = true;
        self
    }

    pub fn into_source(self) -> Source {
        Source::from_backend(Arc::new(self))
    }

    fn answers(&self, triple: &TriplePattern) -> bool {
        match &triple.predicate {
            NamedNodePattern::NamedNode(node) => self.predicates.iter().any(|p| p == node.as_str()),
            NamedNodePattern::Variable(_) => true,
        }
    }
}

impl SourceMatcher for PredicateSource {
    fn match_query(
        &self,
        query: &ConjunctiveQuery,
        _reasoning: ReasoningMode,
    ) -> FedResult<SourceVerdict> {
        let matched = query
            .triples()
            .iter()
            .filter(|triple| self.answers(triple))
            .cloned()
            .collect::<Vec<_>>();
        if self.groups && !matched.is_empty() {
            return Ok(SourceVerdict::new().with_exclusive_group(Fragment::new(matched)));
        }
        Ok(matched.into_iter().fold(SourceVerdict::new(), |verdict, triple| {
            verdict.with_relevant(Fragment::single(triple))
        }))
    }
}

impl Endpoint for PredicateSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capability(&self, _capability: Capability) -> bool {
        true
    }

    fn has_remote_capability(&self, capability: Capability) -> bool {
        capability == Capability::Filter && self.remote_filter
    }

    fn query(&self, query: &ConjunctiveQuery) -> FedResult<BoxedResults> {
        Ok(EmptyResults::new(query.variables()).boxed())
    }
}

pub fn create_planner() -> FederationPlanner {
    FederationPlanner::with_agglutinator(Arc::new(StandardAgglutinator), Default::default())
}
