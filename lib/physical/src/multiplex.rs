use crate::results::{BufferedResults, ConcatResults};
use fedfusion_common::{BoxedResults, FedResult, WorkerPool};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Combines the streams of the children of a union into one stream.
///
/// The combined stream produces every solution of every child. Implementations decide the order
/// and how many children are pulled at once.
pub trait ResultsExecutor: Debug + Send + Sync {
    fn multiplex(&self, children: Vec<BoxedResults>) -> FedResult<BoxedResults>;
}

/// Pulls the children one after another on the consumer's thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialResultsExecutor;

impl ResultsExecutor for SequentialResultsExecutor {
    fn multiplex(&self, mut children: Vec<BoxedResults>) -> FedResult<BoxedResults> {
        if children.len() == 1 {
            return Ok(children.remove(0));
        }
        Ok(Box::new(ConcatResults::new(children)))
    }
}

/// Pulls all children concurrently on the blocking threads of a [WorkerPool].
#[derive(Debug, Clone)]
pub struct BufferedResultsExecutor {
    pool: Arc<WorkerPool>,
    capacity: usize,
    close_timeout: Duration,
}

impl BufferedResultsExecutor {
    /// Creates a new [BufferedResultsExecutor].
    ///
    /// `capacity` bounds the number of solutions buffered per union and `close_timeout` bounds
    /// how long closing a union waits for its workers.
    pub fn new(pool: Arc<WorkerPool>, capacity: usize, close_timeout: Duration) -> Self {
        Self {
            pool,
            capacity,
            close_timeout,
        }
    }
}

impl ResultsExecutor for BufferedResultsExecutor {
    fn multiplex(&self, mut children: Vec<BoxedResults>) -> FedResult<BoxedResults> {
        if children.len() == 1 {
            return Ok(children.remove(0));
        }
        Ok(Box::new(BufferedResults::spawn(
            self.pool.handle()?,
            children,
            self.capacity,
            self.close_timeout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{render, results, row, FailingResults, Tracker};
    use fedfusion_common::{drain, FederationError, Results};
    use insta::assert_snapshot;

    fn buffered(capacity: usize) -> BufferedResultsExecutor {
        let pool = WorkerPool::with_blocking_limit(2, 64, Duration::from_secs(1)).unwrap();
        BufferedResultsExecutor::new(Arc::new(pool), capacity, Duration::from_secs(1))
    }

    fn children(tracker: &Tracker) -> Vec<BoxedResults> {
        vec![
            tracker.wrap(results(&["x"], vec![row(&[("x", "alice")])])),
            tracker.wrap(results(
                &["x"],
                vec![row(&[("x", "alice")]), row(&[("x", "dave")])],
            )),
        ]
    }

    #[test]
    fn both_strategies_produce_every_solution() {
        let executor = buffered(1);
        let sequential = SequentialResultsExecutor
            .multiplex(children(&Tracker::default()))
            .unwrap();
        let buffered = executor.multiplex(children(&Tracker::default())).unwrap();

        let sequential = render(drain(sequential).unwrap());
        assert_eq!(sequential, render(drain(buffered).unwrap()));
        assert_snapshot!(sequential, @r"
        {?x=<http://example.com/alice>}
        {?x=<http://example.com/alice>}
        {?x=<http://example.com/dave>}
        ");
    }

    #[test]
    fn buffered_close_closes_every_child() {
        let executor = buffered(1);
        let tracker = Tracker::default();
        let mut multiplexed = executor.multiplex(children(&tracker)).unwrap();

        assert!(multiplexed.has_next().unwrap());
        multiplexed.close().unwrap();
        multiplexed.close().unwrap();

        assert_eq!(tracker.closes(), 2);
        assert!(!multiplexed.has_next().unwrap());
    }

    #[test]
    fn buffered_forwards_child_errors() {
        let failing = FailingResults::boxed(&["x"], Vec::new());
        let healthy = results(&["x"], vec![row(&[("x", "alice")])]);
        let executor = buffered(4);
        let multiplexed = executor.multiplex(vec![failing, healthy]).unwrap();

        assert!(matches!(
            drain(multiplexed),
            Err(FederationError::Source { .. })
        ));
    }

    #[test]
    fn nested_buffered_unions_do_not_starve() {
        let executor = buffered(1);
        let inner = (0..8)
            .map(|_| {
                executor
                    .multiplex(children(&Tracker::default()))
                    .unwrap()
            })
            .collect();

        let outer = executor.multiplex(inner).unwrap();

        assert_eq!(drain(outer).unwrap().len(), 24);
    }
}
