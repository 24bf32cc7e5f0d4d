use fedfusion_model::{
    triple_variables, ConjunctiveQuery, TriplePattern, TripleSet, Universe, UniverseBuilder,
    VarSet, Variable,
};
use std::sync::Arc;

/// The query-scoped state shared by all planning steps.
///
/// The context owns the variable and triple universes. They are built from the query (and the
/// optional blocks planned together with it) before planning starts and are frozen afterward, so
/// every plan node of one planning pass describes its sets over the same universes.
#[derive(Debug)]
pub struct PlanContext {
    query: ConjunctiveQuery,
    variables: Arc<Universe<Variable>>,
    triples: Arc<Universe<TriplePattern>>,
}

impl PlanContext {
    /// Creates a context for `query`.
    pub fn new(query: &ConjunctiveQuery) -> Arc<Self> {
        Self::with_optionals(query, &[])
    }

    /// Creates a context whose universes also cover the `optionals` blocks.
    pub fn with_optionals(query: &ConjunctiveQuery, optionals: &[ConjunctiveQuery]) -> Arc<Self> {
        let mut variables = UniverseBuilder::new();
        let mut triples = UniverseBuilder::new();
        for query in std::iter::once(query).chain(optionals) {
            for triple in query.triples() {
                variables.extend(triple_variables(triple).cloned());
                triples.intern(triple.clone());
            }
            for filter in query.modifiers().filters() {
                variables.extend(filter.variables().iter().cloned());
            }
            if let Some(projection) = query.modifiers().projection() {
                variables.extend(projection.iter().cloned());
            }
        }
        Arc::new(Self {
            query: query.clone(),
            variables: variables.build(),
            triples: triples.build(),
        })
    }

    /// Creates a context for another query that shares the universes of this context.
    ///
    /// Triples of `query` that are not part of the universes are ignored by all set operations.
    pub fn for_query(&self, query: ConjunctiveQuery) -> Arc<Self> {
        Arc::new(Self {
            query,
            variables: Arc::clone(&self.variables),
            triples: Arc::clone(&self.triples),
        })
    }

    pub fn query(&self) -> &ConjunctiveQuery {
        &self.query
    }

    pub fn variables(&self) -> &Arc<Universe<Variable>> {
        &self.variables
    }

    pub fn triples(&self) -> &Arc<Universe<TriplePattern>> {
        &self.triples
    }

    /// Returns the triples of the query as a subset.
    pub fn query_triples(&self) -> TripleSet {
        self.triples.subset(self.query.triples())
    }

    pub fn var_set<'a>(&self, variables: impl IntoIterator<Item = &'a Variable>) -> VarSet {
        self.variables.subset(variables)
    }

    pub fn triple_set<'a>(&self, triples: impl IntoIterator<Item = &'a TriplePattern>) -> TripleSet {
        self.triples.subset(triples)
    }

    /// Returns the variables of the given triples.
    pub fn vars_of_triples<'a>(
        &self,
        triples: impl IntoIterator<Item = &'a TriplePattern>,
    ) -> VarSet {
        let mut result = self.variables.empty_subset();
        for triple in triples {
            for variable in triple_variables(triple) {
                result.insert(variable);
            }
        }
        result
    }
}
