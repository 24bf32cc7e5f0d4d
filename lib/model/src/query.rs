use crate::{Filter, Modifiers, Solution};
use oxrdf::{Term, Variable};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// An ordered, duplicate-free set of triple patterns together with its [Modifiers].
///
/// Queries are immutable values. All rewrites return a new query that shares the triple storage
/// where possible.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConjunctiveQuery {
    triples: Arc<[TriplePattern]>,
    modifiers: Modifiers,
}

impl ConjunctiveQuery {
    /// Creates a new query. Duplicate triple patterns are removed, keeping the first occurrence.
    pub fn new(triples: impl IntoIterator<Item = TriplePattern>) -> Self {
        let mut unique: Vec<TriplePattern> = Vec::new();
        for triple in triples {
            if !unique.contains(&triple) {
                unique.push(triple);
            }
        }
        Self {
            triples: unique.into(),
            modifiers: Modifiers::default(),
        }
    }

    #[must_use]
    pub fn with_modifiers(&self, modifiers: Modifiers) -> Self {
        Self {
            triples: Arc::clone(&self.triples),
            modifiers,
        }
    }

    #[must_use]
    pub fn with_filter(&self, filter: Filter) -> Self {
        self.with_modifiers(self.modifiers.clone().with_filter(filter))
    }

    pub fn triples(&self) -> &[TriplePattern] {
        &self.triples
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Returns the variables of the triple patterns in order of their first appearance.
    pub fn variables(&self) -> Vec<Variable> {
        let mut result = Vec::new();
        for variable in self.triples.iter().flat_map(triple_variables) {
            if !result.contains(variable) {
                result.push(variable.clone());
            }
        }
        result
    }

    /// Substitutes the variables bound in `solution` into the triples and filters.
    ///
    /// A predicate variable is only replaced by an IRI. A projection keeps only the variables
    /// that are still free.
    #[must_use]
    pub fn bind(&self, solution: &Solution) -> Self {
        if solution.is_empty() {
            return self.clone();
        }
        let triples = self
            .triples
            .iter()
            .map(|triple| bind_triple(triple, solution))
            .collect::<Vec<_>>();
        let filters = self
            .modifiers
            .filters()
            .iter()
            .map(|filter| filter.bind(solution))
            .filter(|filter| !filter.variables().is_empty() || !is_trivially_true(filter))
            .collect::<Vec<_>>();
        let projection = self.modifiers.projection().map(|projection| {
            projection
                .iter()
                .filter(|v| solution.get(v).is_none())
                .cloned()
                .collect()
        });
        let modifiers = self
            .modifiers
            .clone()
            .with_replaced_filters(filters)
            .with_projection(projection);
        Self::new(triples).with_modifiers(modifiers)
    }
}

fn is_trivially_true(filter: &Filter) -> bool {
    filter.evaluate(&Solution::new())
}

/// Iterates the variables of a triple pattern (subject, predicate, object).
pub fn triple_variables(triple: &TriplePattern) -> impl Iterator<Item = &Variable> {
    let subject = match &triple.subject {
        TermPattern::Variable(variable) => Some(variable),
        _ => None,
    };
    let predicate = match &triple.predicate {
        NamedNodePattern::Variable(variable) => Some(variable),
        NamedNodePattern::NamedNode(_) => None,
    };
    let object = match &triple.object {
        TermPattern::Variable(variable) => Some(variable),
        _ => None,
    };
    subject.into_iter().chain(predicate).chain(object)
}

fn bind_triple(triple: &TriplePattern, solution: &Solution) -> TriplePattern {
    let bind_term = |pattern: &TermPattern| match pattern {
        TermPattern::Variable(variable) => solution
            .get(variable)
            .map_or_else(|| pattern.clone(), |term| TermPattern::from(term.clone())),
        _ => pattern.clone(),
    };
    let predicate = match &triple.predicate {
        NamedNodePattern::Variable(variable) => match solution.get(variable) {
            Some(Term::NamedNode(node)) => NamedNodePattern::NamedNode(node.clone()),
            _ => triple.predicate.clone(),
        },
        NamedNodePattern::NamedNode(_) => triple.predicate.clone(),
    };
    TriplePattern {
        subject: bind_term(&triple.subject),
        predicate,
        object: bind_term(&triple.object),
    }
}

/// Renders a triple pattern in Turtle-like syntax without the trailing dot.
pub struct DisplayTriple<'t>(pub &'t TriplePattern);

impl Display for DisplayTriple<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let triple = self.0;
        fmt_term_pattern(f, &triple.subject)?;
        match &triple.predicate {
            NamedNodePattern::NamedNode(node) => write!(f, " {node} ")?,
            NamedNodePattern::Variable(variable) => write!(f, " {variable} ")?,
        }
        fmt_term_pattern(f, &triple.object)
    }
}

fn fmt_term_pattern(f: &mut Formatter<'_>, pattern: &TermPattern) -> std::fmt::Result {
    match pattern {
        TermPattern::NamedNode(node) => write!(f, "{node}"),
        TermPattern::BlankNode(node) => write!(f, "{node}"),
        TermPattern::Literal(literal) => write!(f, "{literal}"),
        TermPattern::Variable(variable) => write!(f, "{variable}"),
        #[allow(
            unreachable_patterns,
            reason = "Nested triple patterns only exist with rdf-star enabled"
        )]
        other => write!(f, "{other}"),
    }
}

impl Display for ConjunctiveQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("{ ")?;
        for triple in self.triples.iter() {
            write!(f, "{} . ", DisplayTriple(triple))?;
        }
        f.write_str("}")?;
        if self.modifiers.has_solution_modifiers() {
            write!(f, " {}", self.modifiers.solution_modifiers())?;
        }
        Ok(())
    }
}
