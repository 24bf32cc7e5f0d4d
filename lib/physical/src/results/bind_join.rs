use crate::results::merge_var_names;
use crate::PlanExecutor;
use fedfusion_common::{BoxedResults, FedResult, FederationError, Results};
use fedfusion_logical::Op;
use fedfusion_model::{Cardinality, Solution, Variable};
use std::sync::Arc;

/// A left solution together with the right stream evaluated under its bindings.
struct BoundRight {
    left: Solution,
    right: BoxedResults,
    matched: bool,
}

/// Joins by evaluating the right plan once per left solution, with the left solution as
/// additional bindings.
///
/// This is the only way to join a right side that needs inputs from the left side. For a
/// left-outer join, left solutions for which the right plan produces nothing are produced
/// unchanged.
pub struct BindJoinResults {
    left: BoxedResults,
    right: Arc<Op>,
    executor: PlanExecutor,
    bindings: Solution,
    current: Option<BoundRight>,
    left_outer: bool,
    lookahead: Option<Solution>,
    var_names: Vec<Variable>,
    optional: bool,
    closed: bool,
}

impl BindJoinResults {
    /// Creates a new [BindJoinResults]. The right plan is evaluated with `bindings` merged with
    /// each left solution.
    pub fn new(
        left: BoxedResults,
        right: Arc<Op>,
        executor: PlanExecutor,
        bindings: Solution,
        left_outer: bool,
    ) -> Self {
        let var_names = merge_var_names(left.var_names(), &right.result_vars().to_vec());
        Self {
            left,
            right,
            executor,
            bindings,
            current: None,
            left_outer,
            lookahead: None,
            var_names,
            optional: false,
            closed: false,
        }
    }

    /// Starts evaluating the right plan for the next left solution. Returns false once the left
    /// side is exhausted.
    fn start_next(&mut self) -> FedResult<bool> {
        while self.left.has_next()? {
            let left = self.left.next()?;
            let Some(bindings) = self.bindings.merge(&left) else {
                continue;
            };
            let right = self.executor.execute_bound(&self.right, &bindings)?;
            self.current = Some(BoundRight {
                left,
                right,
                matched: false,
            });
            return Ok(true);
        }
        Ok(false)
    }
}

impl Results for BindJoinResults {
    fn var_names(&self) -> &[Variable] {
        &self.var_names
    }

    fn cardinality(&self) -> Cardinality {
        let right = self
            .right
            .cached_cardinality()
            .unwrap_or(Cardinality::UNSUPPORTED);
        self.left.cardinality().multiply(right).at_most()
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
        if self.closed {
            return Ok(false);
        }
        loop {
            let Some(current) = self.current.as_mut() else {
                if self.start_next()? {
                    continue;
                }
                return Ok(false);
            };
            if current.right.has_next()? {
                let right = current.right.next()?;
                if let Some(merged) = current.left.merge(&right) {
                    current.matched = true;
                    self.lookahead = Some(merged);
                    return Ok(true);
                }
                continue;
            }

            if let Some(mut finished) = self.current.take() {
                finished.right.close()?;
                if self.left_outer && !finished.matched {
                    self.lookahead = Some(finished.left);
                    return Ok(true);
                }
            }
        }
    }

    fn next(&mut self) -> FedResult<Solution> {
        self.has_next()?;
        self.lookahead.take().ok_or(FederationError::NoSuchElement)
    }

    fn close(&mut self) -> FedResult<()> {
        self.lookahead = None;
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let right = match self.current.take() {
            Some(mut current) => current.right.close(),
            None => Ok(()),
        };
        let left = self.left.close();
        left.and(right)
    }
}
