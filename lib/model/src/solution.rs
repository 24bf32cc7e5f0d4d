use oxrdf::{Term, Variable};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// A single row of a result stream: a set of variable bindings.
///
/// The bindings are kept sorted by variable name, which makes equality, hashing, and the
/// compatibility check of two solutions linear in their size.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Solution {
    bindings: Vec<(Variable, Term)>,
}

impl Solution {
    /// Creates an empty [Solution].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Returns the term bound to `variable`.
    pub fn get(&self, variable: &Variable) -> Option<&Term> {
        self.get_str(variable.as_str())
    }

    /// Returns the term bound to the variable called `name`.
    pub fn get_str(&self, name: &str) -> Option<&Term> {
        self.bindings
            .binary_search_by(|(v, _)| v.as_str().cmp(name))
            .ok()
            .map(|idx| &self.bindings[idx].1)
    }

    /// Binds `variable` to `term` and returns the previous binding.
    pub fn insert(&mut self, variable: Variable, term: Term) -> Option<Term> {
        match self
            .bindings
            .binary_search_by(|(v, _)| v.as_str().cmp(variable.as_str()))
        {
            Ok(idx) => Some(std::mem::replace(&mut self.bindings[idx].1, term)),
            Err(idx) => {
                self.bindings.insert(idx, (variable, term));
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.bindings.iter().map(|(v, t)| (v, t))
    }

    /// Iterates the bound variables.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.bindings.iter().map(|(v, _)| v)
    }

    /// Two solutions are compatible if every variable bound in both is bound to the same term.
    pub fn is_compatible(&self, other: &Solution) -> bool {
        let mut lhs = self.bindings.iter().peekable();
        let mut rhs = other.bindings.iter().peekable();
        while let (Some((lv, lt)), Some((rv, rt))) = (lhs.peek(), rhs.peek()) {
            match lv.as_str().cmp(rv.as_str()) {
                Ordering::Less => {
                    lhs.next();
                }
                Ordering::Greater => {
                    rhs.next();
                }
                Ordering::Equal => {
                    if lt != rt {
                        return false;
                    }
                    lhs.next();
                    rhs.next();
                }
            }
        }
        true
    }

    /// Merges two compatible solutions. Returns [None] if they disagree on a shared variable.
    pub fn merge(&self, other: &Solution) -> Option<Solution> {
        let mut bindings = Vec::with_capacity(self.len() + other.len());
        let mut lhs = self.bindings.iter().peekable();
        let mut rhs = other.bindings.iter().peekable();
        loop {
            match (lhs.peek(), rhs.peek()) {
                (Some((lv, lt)), Some((rv, rt))) => match lv.as_str().cmp(rv.as_str()) {
                    Ordering::Less => bindings.extend(lhs.next().cloned()),
                    Ordering::Greater => bindings.extend(rhs.next().cloned()),
                    Ordering::Equal => {
                        if lt != rt {
                            return None;
                        }
                        bindings.extend(lhs.next().cloned());
                        rhs.next();
                    }
                },
                (Some(_), None) => bindings.extend(lhs.next().cloned()),
                (None, Some(_)) => bindings.extend(rhs.next().cloned()),
                (None, None) => break,
            }
        }
        Some(Solution { bindings })
    }

    /// Keeps only the bindings of the given `variables`.
    #[must_use]
    pub fn project(&self, variables: &[Variable]) -> Solution {
        Solution {
            bindings: self
                .bindings
                .iter()
                .filter(|(v, _)| variables.contains(v))
                .cloned()
                .collect(),
        }
    }

    /// Returns the terms bound to `variables` (in the given order), or [None] if one of them is
    /// unbound.
    pub fn key(&self, variables: &[Variable]) -> Option<Vec<Term>> {
        variables.iter().map(|v| self.get(v).cloned()).collect()
    }
}

impl FromIterator<(Variable, Term)> for Solution {
    fn from_iter<T: IntoIterator<Item = (Variable, Term)>>(iter: T) -> Self {
        let mut result = Solution::new();
        for (variable, term) in iter {
            result.insert(variable, term);
        }
        result
    }
}

impl Display for Solution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (variable, term)) in self.bindings.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{variable}={term}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Literal, NamedNode};

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn iri(value: &str) -> Term {
        NamedNode::new_unchecked(format!("http://example.com/{value}")).into()
    }

    #[test]
    fn bindings_stay_sorted() {
        let solution: Solution = [(var("z"), iri("1")), (var("a"), iri("2"))]
            .into_iter()
            .collect();
        let names = solution.variables().map(Variable::as_str).collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "z"]);
        assert_eq!(solution.get(&var("z")), Some(&iri("1")));
        assert_eq!(solution.get_str("missing"), None);
    }

    #[test]
    fn merge_compatible_solutions() {
        let lhs: Solution = [(var("x"), iri("alice")), (var("y"), iri("bob"))]
            .into_iter()
            .collect();
        let rhs: Solution = [(var("y"), iri("bob")), (var("z"), Literal::from(3).into())]
            .into_iter()
            .collect();

        let merged = lhs.merge(&rhs).unwrap();
        assert_eq!(merged.len(), 3);
        assert!(lhs.is_compatible(&rhs));
        insta::assert_snapshot!(merged, @r#"{?x=<http://example.com/alice>, ?y=<http://example.com/bob>, ?z="3"^^<http://www.w3.org/2001/XMLSchema#integer>}"#);
    }

    #[test]
    fn merge_incompatible_solutions() {
        let lhs: Solution = [(var("x"), iri("alice"))].into_iter().collect();
        let rhs: Solution = [(var("x"), iri("dave"))].into_iter().collect();

        assert!(!lhs.is_compatible(&rhs));
        assert_eq!(lhs.merge(&rhs), None);
    }

    #[test]
    fn key_requires_all_variables() {
        let solution: Solution = [(var("x"), iri("alice"))].into_iter().collect();
        assert_eq!(solution.key(&[var("x")]), Some(vec![iri("alice")]));
        assert_eq!(solution.key(&[var("x"), var("y")]), None);
        assert_eq!(solution.project(&[var("y")]), Solution::new());
    }
}
