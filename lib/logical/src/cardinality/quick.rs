use crate::cardinality::CardinalityHeuristic;
use crate::Source;
use fedfusion_model::vocab::rdf;
use fedfusion_model::{
    triple_variables, Cardinality, ConjunctiveQuery, NamedNodePattern, TermPattern,
    TriplePattern, Variable,
};
use rustc_hash::FxHashSet;

const BASE_COST: f64 = 1_000_000.0;
const SUBJECT_BOUND: f64 = 0.0001;
const OBJECT_BOUND: f64 = 0.01;
const PREDICATE_BOUND: f64 = 0.1;
/// Replaces [OBJECT_BOUND] for `rdf:type` with a bound class. Classes tend to be large.
const TYPE_CLASS_BOUND: f64 = 0.5;
const IDENTITY_LINK: f64 = 0.1;
const STAR_DISCOUNT: f64 = 0.5;
const PATH_DISCOUNT: f64 = 0.0001;
const GROUP_PENALTY: f64 = 1_000_000.0;
const FILTER_DISCOUNT: f64 = 0.5;

const IDENTITY_PREDICATES: [&str; 2] = [
    "http://www.w3.org/2002/07/owl#sameAs",
    "http://www.w3.org/2004/02/skos/core#exactMatch",
];

/// A cheap heuristic that only looks at the shape of a query.
///
/// Every triple starts at a fixed base cost that is discounted for each bound position. Triples
/// sharing a subject form a star whose cost is its cheapest leg, discounted per additional leg.
/// Stars connected through variables form a path, which costs the product of its stars with a
/// discount per join. Disconnected groups are summed with a penalty for each additional group.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuickSelectivityHeuristic;

impl QuickSelectivityHeuristic {
    /// Returns the cost of a single triple.
    pub fn triple_cost(triple: &TriplePattern) -> f64 {
        let mut cost = BASE_COST;
        if !matches!(triple.subject, TermPattern::Variable(_)) {
            cost *= SUBJECT_BOUND;
        }
        let object_bound = !matches!(triple.object, TermPattern::Variable(_));
        match &triple.predicate {
            NamedNodePattern::NamedNode(predicate) => {
                cost *= PREDICATE_BOUND;
                if predicate.as_ref() == rdf::TYPE && object_bound {
                    cost *= TYPE_CLASS_BOUND;
                } else if object_bound {
                    cost *= OBJECT_BOUND;
                }
                if IDENTITY_PREDICATES.contains(&predicate.as_str()) {
                    cost *= IDENTITY_LINK;
                }
            }
            NamedNodePattern::Variable(_) => {
                if object_bound {
                    cost *= OBJECT_BOUND;
                }
            }
        }
        cost
    }

    /// Returns the cost of a whole query.
    pub fn query_cost(query: &ConjunctiveQuery) -> f64 {
        let stars = stars(query.triples());
        let groups = connected_groups(&stars);

        let mut cost = 0.0;
        for group in &groups {
            let product = group.iter().map(|star| star.cost).product::<f64>();
            cost += product * discount(PATH_DISCOUNT, group.len() - 1);
        }
        cost += GROUP_PENALTY * f64::from(saturating_i32(groups.len().saturating_sub(1)));

        let conjuncts = query
            .modifiers()
            .filters()
            .iter()
            .map(|filter| filter.conjuncts().len())
            .sum::<usize>();
        cost * discount(FILTER_DISCOUNT, conjuncts)
    }
}

impl CardinalityHeuristic for QuickSelectivityHeuristic {
    fn estimate(&self, query: &ConjunctiveQuery, _source: Option<&Source>) -> Cardinality {
        if query.is_empty() {
            return Cardinality::exact(1);
        }
        guess(Self::query_cost(query))
    }
}

#[derive(Debug)]
struct Star<'a> {
    variables: FxHashSet<&'a Variable>,
    cost: f64,
}

/// Groups the triples by subject.
fn stars(triples: &[TriplePattern]) -> Vec<Star<'_>> {
    let mut subjects: Vec<&TermPattern> = Vec::new();
    let mut legs: Vec<Vec<&TriplePattern>> = Vec::new();
    for triple in triples {
        match subjects.iter().position(|s| **s == triple.subject) {
            Some(idx) => legs[idx].push(triple),
            None => {
                subjects.push(&triple.subject);
                legs.push(vec![triple]);
            }
        }
    }

    legs.into_iter()
        .map(|legs| {
            let cheapest = legs
                .iter()
                .map(|triple| QuickSelectivityHeuristic::triple_cost(triple))
                .fold(f64::INFINITY, f64::min);
            Star {
                variables: legs.iter().copied().flat_map(triple_variables).collect(),
                cost: cheapest * discount(STAR_DISCOUNT, legs.len() - 1),
            }
        })
        .collect()
}

/// Partitions the stars into groups connected by shared variables.
fn connected_groups<'s, 'a>(stars: &'s [Star<'a>]) -> Vec<Vec<&'s Star<'a>>> {
    let mut groups: Vec<Vec<&Star<'a>>> = Vec::new();
    for star in stars {
        let (connected, rest): (Vec<_>, Vec<_>) = groups.into_iter().partition(|group| {
            group
                .iter()
                .any(|other| !other.variables.is_disjoint(&star.variables))
        });
        groups = rest;
        let mut merged = connected.into_iter().flatten().collect::<Vec<_>>();
        merged.push(star);
        groups.push(merged);
    }
    groups
}

/// Applies `factor` `count` times.
fn discount(factor: f64, count: usize) -> f64 {
    factor.powi(saturating_i32(count))
}

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "Estimates are rough and saturate at the bounds"
)]
fn guess(cost: f64) -> Cardinality {
    Cardinality::guess(cost.clamp(1.0, u64::MAX as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::triple;

    fn estimate(triples: &[TriplePattern]) -> u64 {
        QuickSelectivityHeuristic
            .estimate(&ConjunctiveQuery::new(triples.to_vec()), None)
            .value()
    }

    #[test]
    fn bound_subject_beats_bound_object_beats_open_triple() {
        let subject = estimate(&[triple("alice", "knows", "?y")]);
        let object = estimate(&[triple("?x", "knows", "bob")]);
        let open = estimate(&[triple("?x", "knows", "?y")]);

        assert!(subject < object, "{subject} < {object}");
        assert!(object < open, "{object} < {open}");
    }

    #[test]
    fn type_triples_are_not_very_selective() {
        let typed = TriplePattern {
            predicate: rdf::TYPE.into_owned().into(),
            ..triple("?x", "a", "person")
        };

        let typed = estimate(&[typed]);
        let knows = estimate(&[triple("?x", "knows", "bob")]);

        assert!(typed > knows, "{typed} > {knows}");
    }

    #[test]
    fn star_is_cheaper_than_its_cheapest_leg() {
        let star = estimate(&[triple("?x", "knows", "bob"), triple("?x", "name", "?n")]);
        let leg = estimate(&[triple("?x", "knows", "bob")]);

        assert_eq!(star, leg / 2);
    }

    #[test]
    fn disconnected_groups_are_penalized() {
        let connected = estimate(&[triple("?x", "knows", "?y"), triple("?y", "name", "?n")]);
        let disconnected = estimate(&[triple("?x", "knows", "?y"), triple("?z", "name", "?n")]);

        assert!(connected < disconnected, "{connected} < {disconnected}");
    }

    #[test]
    fn empty_query_has_a_single_solution() {
        assert_eq!(
            QuickSelectivityHeuristic.estimate(&ConjunctiveQuery::new([]), None),
            Cardinality::exact(1)
        );
    }
}
