use crate::results::merge_var_names;
use fedfusion_common::{close_all, BoxedResults, FedResult, FederationError, Results};
use fedfusion_model::{Cardinality, Solution, Variable};

/// Produces the solutions of its children one child after another.
///
/// A child is closed as soon as it is exhausted. Closing the stream closes the children that are
/// not exhausted yet.
pub struct ConcatResults {
    children: Vec<BoxedResults>,
    current: usize,
    var_names: Vec<Variable>,
    optional: bool,
}

impl ConcatResults {
    pub fn new(children: Vec<BoxedResults>) -> Self {
        let var_names = children
            .iter()
            .fold(Vec::new(), |vars, child| merge_var_names(&vars, child.var_names()));
        Self {
            children,
            current: 0,
            var_names,
            optional: false,
        }
    }
}

impl Results for ConcatResults {
    fn var_names(&self) -> &[Variable] {
        &self.var_names
    }

    fn cardinality(&self) -> Cardinality {
        self.children
            .iter()
            .skip(self.current)
            .map(|child| child.cardinality())
            .fold(Cardinality::EMPTY, Cardinality::add)
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    fn has_next(&mut self) -> FedResult<bool> {
        while let Some(child) = self.children.get_mut(self.current) {
            if child.has_next()? {
                return Ok(true);
            }
            child.close()?;
            self.current += 1;
        }
        Ok(false)
    }

    fn next(&mut self) -> FedResult<Solution> {
        if !self.has_next()? {
            return Err(FederationError::NoSuchElement);
        }
        self.children
            .get_mut(self.current)
            .ok_or(FederationError::NoSuchElement)?
            .next()
    }

    fn close(&mut self) -> FedResult<()> {
        let remaining = self.children.get_mut(self.current..).unwrap_or_default();
        let closed = close_all(remaining);
        self.current = self.children.len();
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{results, row, var, Tracker};
    use fedfusion_common::drain;

    #[test]
    fn concatenates_in_order() {
        let first = results(&["x"], vec![row(&[("x", "alice")])]);
        let second = results(&["y"], vec![row(&[("y", "bob")]), row(&[("y", "carol")])]);

        let concat = ConcatResults::new(vec![first, second]);

        assert_eq!(concat.var_names(), [var("x"), var("y")]);
        assert_eq!(concat.cardinality(), Cardinality::exact(3));
        assert_eq!(
            drain(Box::new(concat)).unwrap(),
            vec![
                row(&[("x", "alice")]),
                row(&[("y", "bob")]),
                row(&[("y", "carol")])
            ]
        );
    }

    #[test]
    fn close_closes_every_child_once() {
        let tracker = Tracker::default();
        let children = (0..3)
            .map(|_| tracker.wrap(results(&["x"], vec![row(&[("x", "alice")])])))
            .collect();
        let mut concat = ConcatResults::new(children);

        assert!(concat.has_next().unwrap());
        concat.close().unwrap();
        concat.close().unwrap();

        assert_eq!(tracker.closes(), 3);
        assert!(!concat.has_next().unwrap());
    }

    #[test]
    fn exhausted_children_are_not_closed_again() {
        let first = Tracker::default();
        let second = Tracker::default();
        let mut concat = ConcatResults::new(vec![
            first.wrap(results(&["x"], Vec::new())),
            second.wrap(results(&["x"], vec![row(&[("x", "bob")])])),
        ]);

        assert_eq!(concat.next().unwrap(), row(&[("x", "bob")]));
        assert_eq!(first.closes(), 1);
        concat.close().unwrap();

        assert_eq!(first.closes(), 1);
        assert_eq!(second.closes(), 1);
    }
}
