use crate::{Op, PlanContext, Source};
use fedfusion_common::{
    BoxedResults, Capability, Endpoint, EmptyResults, FedResult, ReasoningMode, SourceMatcher,
    SourceVerdict,
};
use fedfusion_model::{
    Cardinality, ConjunctiveQuery, Literal, NamedNode, NamedNodePattern, TermPattern,
    TriplePattern, Variable,
};
use std::sync::Arc;

pub fn iri(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{name}"))
}

pub fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

/// Parses `?x` as a variable, `"v"` as a simple literal, and anything else as an example IRI.
pub fn term(value: &str) -> TermPattern {
    if let Some(name) = value.strip_prefix('?') {
        var(name).into()
    } else if let Some(literal) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Literal::new_simple_literal(literal).into()
    } else {
        iri(value).into()
    }
}

pub fn triple(subject: &str, predicate: &str, object: &str) -> TriplePattern {
    let predicate = match predicate.strip_prefix('?') {
        Some(name) => NamedNodePattern::Variable(var(name)),
        None => NamedNodePattern::NamedNode(iri(predicate)),
    };
    TriplePattern {
        subject: term(subject),
        predicate,
        object: term(object),
    }
}

/// A source that returns a fixed verdict and answers every query with no solutions.
#[derive(Debug, Default)]
pub struct StubBackend {
    name: String,
    verdict: SourceVerdict,
    remote_filter: bool,
}

impl SourceMatcher for StubBackend {
    fn match_query(
        &self,
        _query: &ConjunctiveQuery,
        _reasoning: ReasoningMode,
    ) -> FedResult<SourceVerdict> {
        Ok(self.verdict.clone())
    }
}

impl Endpoint for StubBackend {
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

    fn estimate(&self, _query: &ConjunctiveQuery) -> Option<Cardinality> {
        None
    }
}

pub fn source(name: &str) -> Source {
    source_with_verdict(name, SourceVerdict::new())
}

pub fn source_with_verdict(name: &str, verdict: SourceVerdict) -> Source {
    Source::from_backend(Arc::new(StubBackend {
        name: name.to_owned(),
        verdict,
        remote_filter: false,
    }))
}

pub fn filtering_source(name: &str) -> Source {
    Source::from_backend(Arc::new(StubBackend {
        name: name.to_owned(),
        verdict: SourceVerdict::new(),
        remote_filter: true,
    }))
}

/// Creates an endpoint leaf for `triples` with the given required inputs.
pub fn leaf(
    ctx: &PlanContext,
    source: &Source,
    triples: &[TriplePattern],
    required: &[&str],
) -> Arc<Op> {
    let required = required.iter().map(|name| var(name)).collect::<Vec<_>>();
    Arc::new(Op::endpoint(
        ctx,
        source.clone(),
        ConjunctiveQuery::new(triples.to_vec()),
        &required,
        &[],
    ))
}
