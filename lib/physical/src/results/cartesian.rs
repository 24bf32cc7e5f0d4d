use crate::results::merge_var_names;
use fedfusion_common::{close_all, BoxedResults, FedResult, FederationError, Results};
use fedfusion_model::{Cardinality, Solution, Variable};
use std::collections::VecDeque;

enum CartesianState {
    /// The inner operands have not been materialized yet.
    Initial,
    /// The next solution of the outer operand must be pulled.
    PullOuter,
    /// Combines `outer` with the inner solutions at `positions`.
    Producing {
        outer: Solution,
        positions: Vec<usize>,
    },
    Done,
}

/// The cartesian product of its operands.
///
/// The outer operand is consumed one solution at a time. The inner operands are materialized on
/// the first call to [Results::has_next], one after another, once the outer operand is known to
/// have a solution. Materialization stops at the first empty inner operand, in which case the
/// product is empty and the remaining operands are closed without being pulled.
pub struct CartesianResults {
    outer: BoxedResults,
    pending: VecDeque<BoxedResults>,
    inners: Vec<Vec<Solution>>,
    var_names: Vec<Variable>,
    state: CartesianState,
    lookahead: Option<Solution>,
    optional: bool,
}

impl CartesianResults {
    /// Creates a new [CartesianResults]. The `inners` are materialized in the given order.
    pub fn new(outer: BoxedResults, inners: Vec<BoxedResults>) -> Self {
        let var_names = inners.iter().fold(outer.var_names().to_vec(), |vars, inner| {
            merge_var_names(&vars, inner.var_names())
        });
        Self {
            outer,
            pending: inners.into(),
            inners: Vec::new(),
            var_names,
            state: CartesianState::Initial,
            lookahead: None,
            optional: false,
        }
    }

    /// Materializes the pending inner operands. Returns false if one of them is empty.
    fn materialize(&mut self) -> FedResult<bool> {
        while let Some(mut inner) = self.pending.pop_front() {
            let mut solutions = Vec::new();
            let pulled = pull_into(inner.as_mut(), &mut solutions);
            let closed = inner.close();
            pulled.and(closed)?;
            if solutions.is_empty() {
                return Ok(false);
            }
            self.inners.push(solutions);
        }
        Ok(true)
    }

    /// Returns the combination at the current position and advances the positions.
    fn combine_and_advance(&mut self) -> Option<Solution> {
        let CartesianState::Producing { outer, positions } = &mut self.state else {
            return None;
        };
        let mut combined = Some(outer.clone());
        for (inner, position) in self.inners.iter().zip(positions.iter()) {
            combined = combined
                .and_then(|combined| inner.get(*position).and_then(|next| combined.merge(next)));
        }

        let mut carry = true;
        for (inner, position) in self.inners.iter().zip(positions.iter_mut()).rev() {
            *position += 1;
            if *position < inner.len() {
                carry = false;
                break;
            }
            *position = 0;
        }
        if carry {
            self.state = CartesianState::PullOuter;
        }
        combined
    }

    fn finish(&mut self) -> FedResult<()> {
        self.state = CartesianState::Done;
        self.lookahead = None;
        self.inners.clear();
        let mut pending = std::mem::take(&mut self.pending);
        let outer = self.outer.close();
        let pending = close_all(&mut pending);
        outer.and(pending)
    }
}

fn pull_into(results: &mut dyn Results, solutions: &mut Vec<Solution>) -> FedResult<()> {
    while results.has_next()? {
        solutions.push(results.next()?);
    }
    Ok(())
}

impl Results for CartesianResults {
    fn var_names(&self) -> &[Variable] {
        &self.var_names
    }

    fn cardinality(&self) -> Cardinality {
        if matches!(self.state, CartesianState::Done) {
            return Cardinality::EMPTY;
        }
        let inners = self
            .inners
            .iter()
            .map(|inner| Cardinality::exact(inner.len() as u64))
            .chain(self.pending.iter().map(|pending| pending.cardinality()))
            .fold(Cardinality::exact(1), Cardinality::multiply);
        self.outer.cardinality().multiply(inners)
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    fn has_next(&mut self) -> FedResult<bool> {
        if self.lookahead.is_some() {
            return Ok(true);
        }
        loop {
            match self.state {
                CartesianState::Initial => {
                    if self.outer.has_next()? && self.materialize()? {
                        self.state = CartesianState::PullOuter;
                    } else {
                        self.finish()?;
                        return Ok(false);
                    }
                }
                CartesianState::PullOuter => {
                    if self.outer.has_next()? {
                        self.state = CartesianState::Producing {
                            outer: self.outer.next()?,
                            positions: vec![0; self.inners.len()],
                        };
                    } else {
                        self.finish()?;
                        return Ok(false);
                    }
                }
                CartesianState::Producing { .. } => {
                    if let Some(solution) = self.combine_and_advance() {
                        self.lookahead = Some(solution);
                        return Ok(true);
                    }
                }
                CartesianState::Done => return Ok(false),
            }
        }
    }

    fn next(&mut self) -> FedResult<Solution> {
        self.has_next()?;
        self.lookahead.take().ok_or(FederationError::NoSuchElement)
    }

    fn close(&mut self) -> FedResult<()> {
        if matches!(self.state, CartesianState::Done) {
            return Ok(());
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{render, results, row, Tracker};
    use fedfusion_common::{drain, EmptyResults};
    use insta::assert_snapshot;

    fn values(name: &str, items: &[&str]) -> BoxedResults {
        results(
            &[name],
            items.iter().map(|item| row(&[(name, item)])).collect(),
        )
    }

    #[test]
    fn yields_the_product_of_all_operands() {
        let product = CartesianResults::new(
            values("x", &["alice", "bob"]),
            vec![values("y", &["1", "2", "3"]), values("z", &["carol", "dave"])],
        );

        assert_eq!(product.cardinality(), Cardinality::exact(12));
        assert_eq!(drain(Box::new(product)).unwrap().len(), 12);
    }

    #[test]
    fn combines_every_outer_solution_with_every_inner_one() {
        let product = CartesianResults::new(
            values("x", &["alice", "bob"]),
            vec![values("y", &["carol", "dave"])],
        );

        assert_snapshot!(render(drain(Box::new(product)).unwrap()), @r"
        {?x=<http://example.com/alice>, ?y=<http://example.com/carol>}
        {?x=<http://example.com/alice>, ?y=<http://example.com/dave>}
        {?x=<http://example.com/bob>, ?y=<http://example.com/carol>}
        {?x=<http://example.com/bob>, ?y=<http://example.com/dave>}
        ");
    }

    #[test]
    fn empty_operand_short_circuits() {
        let outer = Tracker::default();
        let later = Tracker::default();
        let mut product = CartesianResults::new(
            outer.wrap(values("x", &["alice"])),
            vec![
                EmptyResults::new(Vec::new()).boxed(),
                later.wrap(values("y", &["bob"])),
            ],
        );

        assert!(!product.has_next().unwrap());
        assert!(!product.has_next().unwrap());
        assert_eq!(outer.pulls(), 1);
        assert_eq!(later.pulls(), 0);
        assert_eq!(later.closes(), 1);
        assert_eq!(outer.closes(), 1);
        assert_eq!(product.cardinality(), Cardinality::EMPTY);
    }

    #[test]
    fn empty_outer_operand_leaves_the_inners_untouched() {
        let inner = Tracker::default();
        let items = (0..1000).map(|i| i.to_string()).collect::<Vec<_>>();
        let items = items.iter().map(String::as_str).collect::<Vec<_>>();
        let mut product = CartesianResults::new(
            values("x", &[]),
            vec![inner.wrap(values("y", &items))],
        );

        assert!(!product.has_next().unwrap());
        assert_eq!(inner.pulls(), 0);
        assert_eq!(inner.closes(), 1);
        product.close().unwrap();
        assert_eq!(inner.closes(), 1);
    }

    #[test]
    fn close_twice_never_fails() {
        let outer = Tracker::default();
        let mut product =
            CartesianResults::new(outer.wrap(values("x", &["alice"])), vec![values("y", &["bob"])]);

        assert!(product.has_next().unwrap());
        product.close().unwrap();
        product.close().unwrap();

        assert_eq!(outer.closes(), 1);
        assert!(!product.has_next().unwrap());
    }

    #[test]
    fn single_operand_is_passed_through() {
        let product = CartesianResults::new(values("x", &["alice", "bob"]), Vec::new());

        assert_eq!(drain(Box::new(product)).unwrap().len(), 2);
    }
}
