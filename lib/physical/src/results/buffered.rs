use crate::results::merge_var_names;
use fedfusion_common::{BoxedResults, FedResult, FederationError, Results};
use fedfusion_model::{Cardinality, Solution, Variable};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Pulls all children concurrently and produces their solutions in arrival order.
///
/// Every child is pulled on a blocking worker of a tokio runtime. The workers send the solutions
/// through a bounded channel, hence a slow consumer stalls the workers instead of buffering
/// everything. An error of a child is forwarded to the consumer. Errors raised while closing the
/// children are reported by [Results::close].
pub struct BufferedResults {
    receiver: Option<mpsc::Receiver<FedResult<Solution>>>,
    workers: Vec<JoinHandle<FedResult<()>>>,
    stop: Arc<AtomicBool>,
    handle: Handle,
    close_timeout: Duration,
    lookahead: Option<Solution>,
    var_names: Vec<Variable>,
    cardinality: Cardinality,
    consumed: u64,
    optional: bool,
}

impl BufferedResults {
    /// Starts one worker per child on the runtime of `handle`. At most `capacity` solutions are
    /// buffered. Closing waits at most `close_timeout` for the workers.
    pub fn spawn(
        handle: Handle,
        children: Vec<BoxedResults>,
        capacity: usize,
        close_timeout: Duration,
    ) -> Self {
        let var_names = children
            .iter()
            .fold(Vec::new(), |vars, child| merge_var_names(&vars, child.var_names()));
        let cardinality = children
            .iter()
            .map(|child| child.cardinality())
            .fold(Cardinality::EMPTY, Cardinality::add);

        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let workers = children
            .into_iter()
            .map(|child| {
                let sender = sender.clone();
                let stop = Arc::clone(&stop);
                handle.spawn_blocking(move || pump(child, &sender, &stop))
            })
            .collect();

        Self {
            receiver: Some(receiver),
            workers,
            stop,
            handle,
            close_timeout,
            lookahead: None,
            var_names,
            cardinality,
            consumed: 0,
            optional: false,
        }
    }

    fn join_workers(&mut self) -> FedResult<()> {
        let workers = std::mem::take(&mut self.workers);
        if workers.is_empty() {
            return Ok(());
        }
        let timeout = self.close_timeout;
        let joined = self
            .handle
            .block_on(async move { tokio::time::timeout(timeout, join_all(workers)).await })
            .map_err(|_| FederationError::Timeout("closing multiplexed streams".to_owned()))?;
        let errors = joined
            .into_iter()
            .filter_map(|result| match result {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(error),
                Err(error) => Some(FederationError::Pool(error.to_string())),
            })
            .collect();
        match FederationError::collect(errors) {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

/// Forwards the solutions of `child` until it is exhausted, the consumer is gone, or `stop` is
/// set. Closes `child` afterward.
fn pump(
    mut child: BoxedResults,
    sender: &mpsc::Sender<FedResult<Solution>>,
    stop: &AtomicBool,
) -> FedResult<()> {
    if let Err(error) = forward(child.as_mut(), sender, stop) {
        if sender.blocking_send(Err(error)).is_err() {
            tracing::debug!("Dropping an error of a multiplexed stream after its consumer left");
        }
    }
    child.close()
}

fn forward(
    child: &mut dyn Results,
    sender: &mpsc::Sender<FedResult<Solution>>,
    stop: &AtomicBool,
) -> FedResult<()> {
    while !stop.load(Ordering::Acquire) && child.has_next()? {
        let solution = child.next()?;
        if sender.blocking_send(Ok(solution)).is_err() {
            break;
        }
    }
    Ok(())
}

impl Results for BufferedResults {
    fn var_names(&self) -> &[Variable] {
        &self.var_names
    }

    fn cardinality(&self) -> Cardinality {
        self.cardinality.remaining(self.consumed)
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
        let Some(receiver) = self.receiver.as_mut() else {
            return Ok(false);
        };
        match receiver.blocking_recv() {
            Some(Ok(solution)) => {
                self.lookahead = Some(solution);
                Ok(true)
            }
            Some(Err(error)) => Err(error),
            None => Ok(false),
        }
    }

    fn next(&mut self) -> FedResult<Solution> {
        self.has_next()?;
        let solution = self
            .lookahead
            .take()
            .ok_or(FederationError::NoSuchElement)?;
        self.consumed += 1;
        Ok(solution)
    }

    fn close(&mut self) -> FedResult<()> {
        self.stop.store(true, Ordering::Release);
        self.lookahead = None;
        // Unblocks workers waiting for free capacity.
        drop(self.receiver.take());
        self.join_workers()
    }
}

impl Drop for BufferedResults {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
