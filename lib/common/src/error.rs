use fedfusion_model::UniverseMismatchError;
use std::error::Error;
use std::io;

/// An error raised while planning or executing a federated query.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FederationError {
    /// A source failed to answer a request.
    #[error("Source {source_name} failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },
    /// `next()` was called on an exhausted result stream.
    #[error("The result stream has no more solutions")]
    NoSuchElement,
    /// Subsets of different planning universes were combined.
    #[error(transparent)]
    UniverseMismatch(#[from] UniverseMismatchError),
    /// The result stream or component has already been closed.
    #[error("The result stream has already been closed")]
    Closed,
    /// An operation did not finish in time.
    #[error("Timed out while {0}")]
    Timeout(String),
    /// The worker pool could not be created or a task failed.
    #[error("Worker pool failure: {0}")]
    Pool(String),
    /// Several errors were collected (e.g., while closing multiple children). The first one is
    /// kept.
    #[error("{first} (and {} more errors)", .count - 1)]
    Multiple {
        first: Box<FederationError>,
        count: usize,
    },
    /// A source with the same name is already registered.
    #[error("A source named {0} is already registered")]
    DuplicateSource(String),
    /// The agglutination state has already been finalized.
    #[error("The agglutination state has already been taken")]
    StateTaken,
    /// Error from the OS I/O layer.
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Other(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl FederationError {
    /// Builds a [FederationError::Source].
    pub fn source_failure(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Combines the collected `errors` into a single error. Returns [None] if there is no error.
    pub fn collect(errors: Vec<FederationError>) -> Option<FederationError> {
        let count = errors.len();
        let mut errors = errors.into_iter();
        let first = errors.next()?;
        if count == 1 {
            return Some(first);
        }
        Some(Self::Multiple {
            first: Box::new(first),
            count,
        })
    }
}

pub type FedResult<T> = Result<T, FederationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_keeps_first_error() {
        assert!(FederationError::collect(Vec::new()).is_none());

        let single = FederationError::collect(vec![FederationError::Closed]);
        assert!(matches!(single, Some(FederationError::Closed)));

        let multiple = FederationError::collect(vec![
            FederationError::source_failure("a", "boom"),
            FederationError::Closed,
            FederationError::NoSuchElement,
        ]);
        insta::assert_snapshot!(multiple.unwrap(), @"Source a failed: boom (and 2 more errors)");
    }
}
