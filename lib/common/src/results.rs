//! Pull-based result streams.
//!
//! A [Results] stream is a lazy, single-pass sequence of [Solution]s. Consumers call
//! [Results::has_next] and [Results::next] until the stream is exhausted and must call
//! [Results::close] afterward (or use [ResultsIter], which does so automatically). Closing is
//! idempotent and closes every child stream the stream owns.

use crate::{FedResult, FederationError};
use fedfusion_model::{Cardinality, Solution, Variable};
use std::collections::VecDeque;

/// A closeable stream of solutions.
pub trait Results: Send {
    /// Returns the variables this stream may bind.
    fn var_names(&self) -> &[Variable];

    /// Returns an estimate of the remaining number of solutions.
    fn cardinality(&self) -> Cardinality;

    /// Returns whether this stream is the optional side of a left join.
    fn is_optional(&self) -> bool;

    fn set_optional(&mut self, optional: bool);

    /// Returns whether [Results::next] will produce another solution. Calling this repeatedly
    /// without calling [Results::next] has no further effect.
    fn has_next(&mut self) -> FedResult<bool>;

    /// Returns the next solution or [FederationError::NoSuchElement] if the stream is exhausted.
    fn next(&mut self) -> FedResult<Solution>;

    /// Releases all resources held by this stream and its children. Calling close more than once
    /// is a no-op.
    fn close(&mut self) -> FedResult<()>;
}

pub type BoxedResults = Box<dyn Results>;

/// Closes every stream in `results`, even if some of them fail, and returns a representative
/// error.
pub fn close_all<'a>(results: impl IntoIterator<Item = &'a mut BoxedResults>) -> FedResult<()> {
    let errors = results
        .into_iter()
        .filter_map(|results| results.close().err())
        .collect::<Vec<_>>();
    match FederationError::collect(errors) {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

/// Pulls all remaining solutions of `results` and closes it.
pub fn drain(mut results: BoxedResults) -> FedResult<Vec<Solution>> {
    let mut solutions = Vec::new();
    let outcome = pull_all(results.as_mut(), &mut solutions);
    let closed = results.close();
    outcome.and(closed).map(|()| solutions)
}

fn pull_all(results: &mut dyn Results, solutions: &mut Vec<Solution>) -> FedResult<()> {
    while results.has_next()? {
        solutions.push(results.next()?);
    }
    Ok(())
}

/// A stream over an in-memory collection of solutions.
#[derive(Debug)]
pub struct CollectionResults {
    var_names: Vec<Variable>,
    solutions: VecDeque<Solution>,
    optional: bool,
}

impl CollectionResults {
    pub fn new(var_names: Vec<Variable>, solutions: impl IntoIterator<Item = Solution>) -> Self {
        Self {
            var_names,
            solutions: solutions.into_iter().collect(),
            optional: false,
        }
    }

    /// Creates a stream with a single solution that binds nothing.
    pub fn unit() -> Self {
        Self::new(Vec::new(), [Solution::new()])
    }

    pub fn boxed(self) -> BoxedResults {
        Box::new(self)
    }
}

impl Results for CollectionResults {
    fn var_names(&self) -> &[Variable] {
        &self.var_names
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::exact(self.solutions.len() as u64)
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    fn has_next(&mut self) -> FedResult<bool> {
        Ok(!self.solutions.is_empty())
    }

    fn next(&mut self) -> FedResult<Solution> {
        self.solutions
            .pop_front()
            .ok_or(FederationError::NoSuchElement)
    }

    fn close(&mut self) -> FedResult<()> {
        self.solutions.clear();
        Ok(())
    }
}

/// A stream without solutions. The declared variables are preserved.
#[derive(Debug)]
pub struct EmptyResults {
    var_names: Vec<Variable>,
    optional: bool,
}

impl EmptyResults {
    pub fn new(var_names: Vec<Variable>) -> Self {
        Self {
            var_names,
            optional: false,
        }
    }

    pub fn boxed(self) -> BoxedResults {
        Box::new(self)
    }
}

impl Results for EmptyResults {
    fn var_names(&self) -> &[Variable] {
        &self.var_names
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::EMPTY
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    fn has_next(&mut self) -> FedResult<bool> {
        Ok(false)
    }

    fn next(&mut self) -> FedResult<Solution> {
        Err(FederationError::NoSuchElement)
    }

    fn close(&mut self) -> FedResult<()> {
        Ok(())
    }
}

/// Exposes a [Results] stream as an [Iterator].
///
/// The stream is closed once it is exhausted, after the first error, or when the iterator is
/// dropped.
pub struct ResultsIter {
    results: BoxedResults,
    closed: bool,
}

impl ResultsIter {
    pub fn new(results: BoxedResults) -> Self {
        Self {
            results,
            closed: false,
        }
    }

    pub fn var_names(&self) -> &[Variable] {
        self.results.var_names()
    }

    /// Closes the underlying stream.
    pub fn close(&mut self) -> FedResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.results.close()
    }

    fn pull(&mut self) -> FedResult<Option<Solution>> {
        if self.results.has_next()? {
            self.results.next().map(Some)
        } else {
            Ok(None)
        }
    }
}

impl Iterator for ResultsIter {
    type Item = FedResult<Solution>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        match self.pull() {
            Ok(Some(solution)) => Some(Ok(solution)),
            Ok(None) => self.close().err().map(Err),
            Err(error) => {
                if let Err(close_error) = self.close() {
                    tracing::warn!("Failed to close result stream after error: {close_error}");
                }
                Some(Err(error))
            }
        }
    }
}

impl Drop for ResultsIter {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::warn!("Failed to close dropped result stream: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedfusion_model::{Literal, Term};

    fn solution(value: i32) -> Solution {
        [(Variable::new_unchecked("x"), Term::from(Literal::from(value)))]
            .into_iter()
            .collect()
    }

    #[test]
    fn collection_results_report_remaining() {
        let mut results =
            CollectionResults::new(vec![Variable::new_unchecked("x")], [solution(1), solution(2)]);

        assert_eq!(results.cardinality(), Cardinality::exact(2));
        assert!(results.has_next().unwrap());
        assert!(results.has_next().unwrap());
        assert_eq!(results.next().unwrap(), solution(1));
        assert_eq!(results.cardinality(), Cardinality::exact(1));
        assert_eq!(results.next().unwrap(), solution(2));
        assert!(!results.has_next().unwrap());
        assert!(matches!(
            results.next(),
            Err(FederationError::NoSuchElement)
        ));
        results.close().unwrap();
        results.close().unwrap();
    }

    #[test]
    fn results_iter_closes_on_exhaustion() {
        let results = CollectionResults::new(Vec::new(), [solution(1)]).boxed();
        let mut iter = ResultsIter::new(results);

        assert_eq!(iter.next().unwrap().unwrap(), solution(1));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
        iter.close().unwrap();
    }

    #[test]
    fn drain_collects_everything() {
        let results = CollectionResults::new(Vec::new(), [solution(1), solution(2)]).boxed();
        assert_eq!(drain(results).unwrap(), vec![solution(1), solution(2)]);
        assert!(drain(EmptyResults::new(Vec::new()).boxed())
            .unwrap()
            .is_empty());
    }
}
