use fedfusion_common::{BoxedResults, FedResult, FederationError, Results};
use fedfusion_model::{Cardinality, Solution, Variable};

/// Ends the stream instead of propagating an error of the wrapped stream.
///
/// Used for the streams of endpoints. A failing source then contributes the solutions it produced
/// before the failure, and the rest of the plan keeps running.
pub struct FailSafeResults {
    inner: BoxedResults,
    source_name: String,
    failed: bool,
    closed: bool,
}

impl FailSafeResults {
    pub fn new(inner: BoxedResults, source_name: impl Into<String>) -> Self {
        Self {
            inner,
            source_name: source_name.into(),
            failed: false,
            closed: false,
        }
    }

    fn give_up(&mut self, error: &FederationError) {
        tracing::warn!(
            "Stream of source {} failed, ignoring its remaining results: {error}",
            self.source_name
        );
        self.failed = true;
    }
}

impl Results for FailSafeResults {
    fn var_names(&self) -> &[Variable] {
        self.inner.var_names()
    }

    fn cardinality(&self) -> Cardinality {
        if self.failed {
            return Cardinality::EMPTY;
        }
        self.inner.cardinality()
    }

    fn is_optional(&self) -> bool {
        self.inner.is_optional()
    }

    fn set_optional(&mut self, optional: bool) {
        self.inner.set_optional(optional);
    }

    fn has_next(&mut self) -> FedResult<bool> {
        if self.failed || self.closed {
            return Ok(false);
        }
        match self.inner.has_next() {
            Ok(has_next) => Ok(has_next),
            Err(error) => {
                self.give_up(&error);
                Ok(false)
            }
        }
    }

    fn next(&mut self) -> FedResult<Solution> {
        if self.failed || self.closed {
            return Err(FederationError::NoSuchElement);
        }
        match self.inner.next() {
            Ok(solution) => Ok(solution),
            Err(FederationError::NoSuchElement) => Err(FederationError::NoSuchElement),
            Err(error) => {
                self.give_up(&error);
                Err(FederationError::NoSuchElement)
            }
        }
    }

    fn close(&mut self) -> FedResult<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.inner.close()
    }
}
