//! Blocking call adapter
//!
//! The single suspension point between async callers and the worker pool.
//! Awaiting a result parks only the calling task; the scheduler keeps running
//! every other task while a worker executes the blocking call.

use tracing::trace;

use super::pool::{WorkerPool, WorkerPoolError};
use super::registry::{ClientFactory, WorkerContext};

impl<F: ClientFactory> WorkerPool<F> {
    /// Run a fallible blocking unit of work on the pool and await its result
    ///
    /// The unit's own error is returned unchanged. Pool failures (shut down,
    /// panic, lost worker) are converted through `E: From<WorkerPoolError>`.
    /// No deadline is applied here; callers layer their own.
    pub async fn run_blocking<T, E, W>(&self, work: W) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<WorkerPoolError> + Send + 'static,
        W: FnOnce(&mut WorkerContext<F>) -> Result<T, E> + Send + 'static,
    {
        let reply = self.submit(work)?;
        trace!(queued = self.stats().queued, "Awaiting worker");

        match reply.await {
            Ok(Ok(result)) => result,
            Ok(Err(pool_error)) => Err(pool_error.into()),
            Err(_) => Err(WorkerPoolError::WorkerLost.into()),
        }
    }

    /// Run an infallible blocking unit of work on the pool
    pub async fn run<T, W>(&self, work: W) -> Result<T, WorkerPoolError>
    where
        T: Send + 'static,
        W: FnOnce(&mut WorkerContext<F>) -> T + Send + 'static,
    {
        self.run_blocking(move |ctx| Ok::<T, WorkerPoolError>(work(ctx)))
            .await
    }
}
