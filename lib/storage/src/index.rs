//! An in-memory index over triples.
//!
//! The index keeps one posting list per term and [IndexComponent]. A scan picks the shortest
//! posting list among the bound components of a pattern and checks the remaining components on
//! the candidates.

use fedfusion_model::{
    triple_variables, NamedNodePattern, Solution, Term, TermPattern, Triple, TriplePattern,
    Variable,
};
use itertools::Either;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;

/// A component of a triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexComponent {
    Subject,
    Predicate,
    Object,
}

impl IndexComponent {
    fn position(self) -> usize {
        match self {
            IndexComponent::Subject => 0,
            IndexComponent::Predicate => 1,
            IndexComponent::Object => 2,
        }
    }
}

/// A component of a triple pattern after substituting the bindings of a solution.
#[derive(Debug)]
enum Slot {
    Bound(Term),
    Free(Variable),
}

impl Slot {
    fn of_term(pattern: &TermPattern, solution: &Solution) -> Self {
        match pattern {
            TermPattern::Variable(variable) => Self::of_variable(variable, solution),
            TermPattern::NamedNode(node) => Slot::Bound(node.clone().into()),
            TermPattern::BlankNode(node) => Slot::Bound(node.clone().into()),
            TermPattern::Literal(literal) => Slot::Bound(literal.clone().into()),
        }
    }

    fn of_predicate(pattern: &NamedNodePattern, solution: &Solution) -> Self {
        match pattern {
            NamedNodePattern::Variable(variable) => Self::of_variable(variable, solution),
            NamedNodePattern::NamedNode(node) => Slot::Bound(node.clone().into()),
        }
    }

    fn of_variable(variable: &Variable, solution: &Solution) -> Self {
        solution.get(variable).map_or_else(
            || Slot::Free(variable.clone()),
            |term| Slot::Bound(term.clone()),
        )
    }

    fn of_triple(triple: &TriplePattern, solution: &Solution) -> [Slot; 3] {
        [
            Self::of_term(&triple.subject, solution),
            Self::of_predicate(&triple.predicate, solution),
            Self::of_term(&triple.object, solution),
        ]
    }
}

/// An immutable set of triples with one posting list per term and component.
#[derive(Debug, Default)]
pub struct TripleIndex {
    triples: Vec<[Term; 3]>,
    postings: [FxHashMap<Term, Vec<usize>>; 3],
}

impl TripleIndex {
    /// Builds an index over `triples`. Duplicates are stored once.
    pub fn new(triples: impl IntoIterator<Item = Triple>) -> Self {
        let mut seen = FxHashSet::default();
        let mut index = Self::default();
        for triple in triples {
            let row = [triple.subject.into(), triple.predicate.into(), triple.object];
            if !seen.insert(row.clone()) {
                continue;
            }
            let id = index.triples.len();
            for (postings, term) in index.postings.iter_mut().zip(&row) {
                postings.entry(term.clone()).or_default().push(id);
            }
            index.triples.push(row);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Returns the number of distinct terms in `component`.
    pub fn distinct(&self, component: IndexComponent) -> usize {
        self.postings
            .get(component.position())
            .map_or(0, FxHashMap::len)
    }

    /// Returns the number of triples matching `triple`.
    pub fn count(&self, triple: &TriplePattern) -> usize {
        self.matches(triple, &Solution::new()).len()
    }

    /// Returns every extension of `solution` that matches `triple`.
    pub fn matches(&self, triple: &TriplePattern, solution: &Solution) -> Vec<Solution> {
        let slots = Slot::of_triple(triple, solution);
        self.candidates(&slots)
            .filter_map(|row| bind_row(&slots, row, solution))
            .collect()
    }

    /// Evaluates the basic graph pattern `triples` by nested loops.
    ///
    /// The triples are evaluated in an order that prefers triples with many bound components.
    pub fn evaluate(&self, triples: &[TriplePattern]) -> Vec<Solution> {
        let mut solutions = vec![Solution::new()];
        let mut bound = FxHashSet::default();
        let mut pending = triples.iter().collect::<Vec<_>>();
        while !pending.is_empty() && !solutions.is_empty() {
            let next = pending
                .iter()
                .enumerate()
                .max_by_key(|(i, triple)| (bound_components(triple, &bound), Reverse(*i)))
                .map_or(0, |(i, _)| i);
            let triple = pending.remove(next);
            bound.extend(triple_variables(triple).cloned());
            solutions = solutions
                .iter()
                .flat_map(|solution| self.matches(triple, solution))
                .collect();
        }
        solutions
    }

    fn candidates<'a>(&'a self, slots: &[Slot; 3]) -> impl Iterator<Item = &'a [Term; 3]> + 'a {
        let shortest = slots
            .iter()
            .zip(&self.postings)
            .filter_map(|(slot, postings)| match slot {
                Slot::Bound(term) => Some(postings.get(term).map_or(&[][..], Vec::as_slice)),
                Slot::Free(_) => None,
            })
            .min_by_key(|ids| ids.len());
        match shortest {
            Some(ids) => Either::Left(ids.iter().filter_map(|id| self.triples.get(*id))),
            None => Either::Right(self.triples.iter()),
        }
    }
}

fn bound_components(triple: &TriplePattern, bound: &FxHashSet<Variable>) -> usize {
    let free = triple_variables(triple)
        .filter(|variable| !bound.contains(*variable))
        .count();
    3 - free
}

fn bind_row(slots: &[Slot; 3], row: &[Term; 3], solution: &Solution) -> Option<Solution> {
    let mut result = solution.clone();
    for (slot, value) in slots.iter().zip(row) {
        match slot {
            Slot::Bound(term) if term != value => return None,
            Slot::Bound(_) => {}
            Slot::Free(variable) => match result.get(variable) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    result.insert(variable.clone(), value.clone());
                }
            },
        }
    }
    Some(result)
}
