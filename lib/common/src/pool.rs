use crate::{FedResult, FederationError};
use futures::future::join_all;
use std::fmt::{Debug, Formatter};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};

/// A bounded pool of worker threads for blocking tasks.
///
/// The pool owns a dedicated tokio runtime. Tasks run on its blocking threads, hence they may
/// perform synchronous I/O. The pool is shut down with a timeout when it is dropped.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    threads: usize,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Creates a pool with at most `threads` concurrently running tasks.
    pub fn new(threads: usize, shutdown_timeout: Duration) -> FedResult<Self> {
        Self::with_blocking_limit(threads, threads, shutdown_timeout)
    }

    /// Creates a pool whose runtime has `threads` worker threads but runs up to
    /// `max_blocking_threads` blocking tasks at once.
    ///
    /// Multiplexed streams keep one blocking task per child alive until the child is exhausted,
    /// and nested unions wait on each other. Such a pool needs more blocking threads than
    /// workers, otherwise queued children never start.
    pub fn with_blocking_limit(
        threads: usize,
        max_blocking_threads: usize,
        shutdown_timeout: Duration,
    ) -> FedResult<Self> {
        let threads = threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .max_blocking_threads(max_blocking_threads.max(threads))
            .thread_name("fedfusion-worker")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
            threads,
            shutdown_timeout,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Returns a handle to the pool's runtime.
    pub fn handle(&self) -> FedResult<Handle> {
        self.runtime
            .as_ref()
            .map(|runtime| runtime.handle().clone())
            .ok_or(FederationError::Closed)
    }

    /// Runs all `tasks` on the pool and waits for their results, which are returned in the order
    /// of the tasks.
    pub fn run_all<T, F>(&self, tasks: impl IntoIterator<Item = F>) -> FedResult<Vec<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.handle()?;
        let tasks = tasks
            .into_iter()
            .map(|task| handle.spawn_blocking(task))
            .collect::<Vec<_>>();
        handle
            .block_on(join_all(tasks))
            .into_iter()
            .map(|result| result.map_err(|error| FederationError::Pool(error.to_string())))
            .collect()
    }

    /// Like [WorkerPool::run_all], but gives up waiting after `timeout`. Tasks that are still
    /// running are not interrupted.
    pub fn run_all_timeout<T, F>(
        &self,
        tasks: impl IntoIterator<Item = F>,
        timeout: Duration,
    ) -> FedResult<Vec<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.handle()?;
        let tasks = tasks
            .into_iter()
            .map(|task| handle.spawn_blocking(task))
            .collect::<Vec<_>>();
        let results = handle
            .block_on(async { tokio::time::timeout(timeout, join_all(tasks)).await })
            .map_err(|_| FederationError::Timeout("waiting for pool tasks".to_owned()))?;
        results
            .into_iter()
            .map(|result| result.map_err(|error| FederationError::Pool(error.to_string())))
            .collect()
    }
}

impl Debug for WorkerPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(self.shutdown_timeout);
        }
    }
}
