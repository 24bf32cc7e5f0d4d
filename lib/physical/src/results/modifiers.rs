use fedfusion_common::{BoxedResults, FedResult, FederationError, Results};
use fedfusion_model::{Cardinality, Filter, Modifiers, Solution, Variable};
use rustc_hash::FxHashSet;

/// Wraps `results` in the streams that evaluate `modifiers` in the order filters, projection,
/// distinct, and limit.
///
/// Filters are evaluated over the solutions merged with `bindings`. The optional flag of
/// `modifiers` is ignored.
pub fn apply_modifiers(
    results: BoxedResults,
    modifiers: &Modifiers,
    bindings: &Solution,
) -> BoxedResults {
    let mut results = results;
    if !modifiers.filters().is_empty() {
        results = Box::new(FilterResults::new(
            results,
            modifiers.filters().to_vec(),
            bindings.clone(),
        ));
    }
    if let Some(projection) = modifiers.projection() {
        results = Box::new(ProjectResults::new(results, projection.to_vec()));
    }
    if modifiers.is_distinct() {
        results = Box::new(DistinctResults::new(results));
    }
    if let Some(limit) = modifiers.limit() {
        results = Box::new(LimitResults::new(results, limit));
    }
    results
}

/// Drops the solutions that do not satisfy all filters.
pub struct FilterResults {
    inner: BoxedResults,
    filters: Vec<Filter>,
    bindings: Solution,
    lookahead: Option<Solution>,
    closed: bool,
}

impl FilterResults {
    /// Creates a new [FilterResults]. The filters see the variables of `bindings` in addition to
    /// those of each solution.
    pub fn new(inner: BoxedResults, filters: Vec<Filter>, bindings: Solution) -> Self {
        Self {
            inner,
            filters,
            bindings,
            lookahead: None,
            closed: false,
        }
    }

    fn accepts(&self, solution: &Solution) -> bool {
        if self.bindings.is_empty() {
            return self.filters.iter().all(|filter| filter.evaluate(solution));
        }
        match self.bindings.merge(solution) {
            Some(merged) => self.filters.iter().all(|filter| filter.evaluate(&merged)),
            None => false,
        }
    }
}

impl Results for FilterResults {
    fn var_names(&self) -> &[Variable] {
        self.inner.var_names()
    }

    fn cardinality(&self) -> Cardinality {
        self.inner.cardinality().at_most()
    }

    fn is_optional(&self) -> bool {
        self.inner.is_optional()
    }

    fn set_optional(&mut self, optional: bool) {
        self.inner.set_optional(optional);
    }

    fn has_next(&mut self) -> FedResult<bool> {
        if self.lookahead.is_some() {
            return Ok(true);
        }
        if self.closed {
            return Ok(false);
        }
        while self.inner.has_next()? {
            let solution = self.inner.next()?;
            if self.accepts(&solution) {
                self.lookahead = Some(solution);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn next(&mut self) -> FedResult<Solution> {
        self.has_next()?;
        self.lookahead.take().ok_or(FederationError::NoSuchElement)
    }

    fn close(&mut self) -> FedResult<()> {
        self.lookahead = None;
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.inner.close()
    }
}

/// Keeps only the bindings of the projected variables.
pub struct ProjectResults {
    inner: BoxedResults,
    variables: Vec<Variable>,
    closed: bool,
}

impl ProjectResults {
    pub fn new(inner: BoxedResults, variables: Vec<Variable>) -> Self {
        Self {
            inner,
            variables,
            closed: false,
        }
    }
}

impl Results for ProjectResults {
    fn var_names(&self) -> &[Variable] {
        &self.variables
    }

    fn cardinality(&self) -> Cardinality {
        self.inner.cardinality()
    }

    fn is_optional(&self) -> bool {
        self.inner.is_optional()
    }

    fn set_optional(&mut self, optional: bool) {
        self.inner.set_optional(optional);
    }

    fn has_next(&mut self) -> FedResult<bool> {
        if self.closed {
            return Ok(false);
        }
        self.inner.has_next()
    }

    fn next(&mut self) -> FedResult<Solution> {
        if self.closed {
            return Err(FederationError::NoSuchElement);
        }
        Ok(self.inner.next()?.project(&self.variables))
    }

    fn close(&mut self) -> FedResult<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.inner.close()
    }
}

/// Removes duplicate solutions. Remembers every solution it has produced.
pub struct DistinctResults {
    inner: BoxedResults,
    seen: FxHashSet<Solution>,
    lookahead: Option<Solution>,
    closed: bool,
}

impl DistinctResults {
    pub fn new(inner: BoxedResults) -> Self {
        Self {
            inner,
            seen: FxHashSet::default(),
            lookahead: None,
            closed: false,
        }
    }
}

impl Results for DistinctResults {
    fn var_names(&self) -> &[Variable] {
        self.inner.var_names()
    }

    fn cardinality(&self) -> Cardinality {
        self.inner.cardinality().at_most()
    }

    fn is_optional(&self) -> bool {
        self.inner.is_optional()
    }

    fn set_optional(&mut self, optional: bool) {
        self.inner.set_optional(optional);
    }

    fn has_next(&mut self) -> FedResult<bool> {
        if self.lookahead.is_some() {
            return Ok(true);
        }
        if self.closed {
            return Ok(false);
        }
        while self.inner.has_next()? {
            let solution = self.inner.next()?;
            if self.seen.insert(solution.clone()) {
                self.lookahead = Some(solution);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn next(&mut self) -> FedResult<Solution> {
        self.has_next()?;
        self.lookahead.take().ok_or(FederationError::NoSuchElement)
    }

    fn close(&mut self) -> FedResult<()> {
        self.lookahead = None;
        self.seen.clear();
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.inner.close()
    }
}

/// Produces at most `limit` solutions of its input.
pub struct LimitResults {
    inner: BoxedResults,
    remaining: usize,
    closed: bool,
}

impl LimitResults {
    pub fn new(inner: BoxedResults, limit: usize) -> Self {
        Self {
            inner,
            remaining: limit,
            closed: false,
        }
    }
}

impl Results for LimitResults {
    fn var_names(&self) -> &[Variable] {
        self.inner.var_names()
    }

    fn cardinality(&self) -> Cardinality {
        self.inner
            .cardinality()
            .limit(u64::try_from(self.remaining).unwrap_or(u64::MAX))
    }

    fn is_optional(&self) -> bool {
        self.inner.is_optional()
    }

    fn set_optional(&mut self, optional: bool) {
        self.inner.set_optional(optional);
    }

    fn has_next(&mut self) -> FedResult<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        self.inner.has_next()
    }

    fn next(&mut self) -> FedResult<Solution> {
        if self.remaining == 0 {
            return Err(FederationError::NoSuchElement);
        }
        let solution = self.inner.next()?;
        self.remaining -= 1;
        Ok(solution)
    }

    fn close(&mut self) -> FedResult<()> {
        self.remaining = 0;
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.inner.close()
    }
}
