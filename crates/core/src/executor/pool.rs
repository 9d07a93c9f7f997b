//! Worker pool for blocking remote calls
//!
//! A fixed set of OS threads pulls units of work from one FIFO queue. Each
//! thread owns a [`WorkerContext`] holding its lazily created client, so a
//! client is only ever touched by the thread that built it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::registry::{ClientFactory, ClientRegistry, WorkerContext, WorkerId};

/// Upper bound of the platform default pool size
const DEFAULT_MAX_WORKERS: usize = 32;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of worker threads (None = platform default)
    pub size: Option<usize>,

    /// Thread name prefix; threads are named `{prefix}-{n}`
    pub thread_name_prefix: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            size: None,
            thread_name_prefix: "ngsiem-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with the platform default size
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size.max(1));
        self
    }

    /// Set the thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Resolved pool size: the configured size or `min(32, cpus + 4)`
    pub fn resolved_size(&self) -> usize {
        self.size.unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            (cpus + 4).min(DEFAULT_MAX_WORKERS)
        })
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Accepting work
    Running,
    /// Queue closed, workers finishing queued work
    Draining,
    /// All workers joined
    Stopped,
}

/// Worker pool errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerPoolError {
    /// The pool no longer accepts work
    #[error("worker pool is shut down")]
    ShutDown,

    /// A worker thread could not be spawned
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    /// The unit of work panicked
    #[error("unit of work panicked on {worker}: {message}")]
    WorkerPanicked { worker: WorkerId, message: String },

    /// The worker dropped the unit of work without replying
    #[error("worker exited before replying")]
    WorkerLost,
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerPoolStats {
    pub size: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub panicked: usize,
    pub clients_created: usize,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    panicked: AtomicUsize,
}

/// Outcome delivered back to the submitter
pub(crate) type WorkOutcome<T> = Result<T, WorkerPoolError>;

type Job<F> = Box<dyn FnOnce(&mut WorkerContext<F>) + Send + 'static>;
type SharedQueue<F> = Arc<Mutex<mpsc::UnboundedReceiver<Job<F>>>>;

/// Bounded pool of worker threads, each owning one remote client
///
/// # Example
///
/// ```ignore
/// use ngsiem_core::executor::{WorkerPool, WorkerPoolConfig};
///
/// let pool = WorkerPool::new(factory, WorkerPoolConfig::new().with_size(8))?;
///
/// let id = pool
///     .run_blocking(|ctx| {
///         let client = ctx.client()?;
///         ops::start_search(client, &request)
///     })
///     .await?;
///
/// pool.shutdown().await;
/// ```
pub struct WorkerPool<F: ClientFactory> {
    config: WorkerPoolConfig,
    size: usize,
    registry: Arc<ClientRegistry<F>>,
    sender: Mutex<Option<mpsc::UnboundedSender<Job<F>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    status: RwLock<WorkerPoolStatus>,
    counters: Arc<Counters>,
}

impl<F: ClientFactory> WorkerPool<F> {
    /// Create the pool and spawn all worker threads
    pub fn new(factory: F, config: WorkerPoolConfig) -> Result<Self, WorkerPoolError> {
        let size = config.resolved_size();
        let registry = Arc::new(ClientRegistry::new(factory));
        let (sender, receiver) = mpsc::unbounded_channel::<Job<F>>();
        let queue: SharedQueue<F> = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let id = WorkerId::new(index);
            let registry = Arc::clone(&registry);
            let queue = Arc::clone(&queue);
            let counters = Arc::clone(&counters);

            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, index))
                .spawn(move || worker_loop(WorkerContext::new(id, registry), queue, counters))
                .map_err(|e| WorkerPoolError::Spawn(e.to_string()))?;
            handles.push(handle);
        }

        info!(size, prefix = %config.thread_name_prefix, "Created worker pool");

        Ok(Self {
            config,
            size,
            registry,
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            status: RwLock::new(WorkerPoolStatus::Running),
            counters,
        })
    }

    /// Queue a unit of work; the receiver resolves once a worker has run it
    ///
    /// Panics inside `work` are caught on the worker and reported as
    /// [`WorkerPoolError::WorkerPanicked`]; the worker keeps serving.
    pub(crate) fn submit<T, W>(
        &self,
        work: W,
    ) -> Result<oneshot::Receiver<WorkOutcome<T>>, WorkerPoolError>
    where
        T: Send + 'static,
        W: FnOnce(&mut WorkerContext<F>) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let counters = Arc::clone(&self.counters);

        let job: Job<F> = Box::new(move |ctx: &mut WorkerContext<F>| {
            counters.queued.fetch_sub(1, Ordering::SeqCst);
            counters.in_flight.fetch_add(1, Ordering::SeqCst);

            let worker = ctx.worker_id();
            let outcome = match catch_unwind(AssertUnwindSafe(|| work(ctx))) {
                Ok(value) => Ok(value),
                Err(payload) => {
                    counters.panicked.fetch_add(1, Ordering::SeqCst);
                    let message = panic_message(payload.as_ref());
                    error!(%worker, %message, "Unit of work panicked");
                    Err(WorkerPoolError::WorkerPanicked { worker, message })
                }
            };

            counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            counters.completed.fetch_add(1, Ordering::SeqCst);

            // The submitter may have stopped waiting; the work has still run
            if reply_tx.send(outcome).is_err() {
                debug!(%worker, "Submitter went away before the reply");
            }
        });

        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(WorkerPoolError::ShutDown)?;
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if sender.send(job).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(WorkerPoolError::ShutDown);
        }

        Ok(reply_rx)
    }

    /// Close the queue, let workers drain queued work, and join them
    ///
    /// Joining happens on the blocking thread pool so the calling scheduler
    /// keeps running other tasks meanwhile.
    pub async fn shutdown(&self) {
        if self.close() {
            info!("Draining worker pool");
        }

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return;
        }

        let joined = tokio::task::spawn_blocking(move || {
            for handle in handles {
                if handle.join().is_err() {
                    warn!("Worker thread terminated abnormally");
                }
            }
        })
        .await;

        if let Err(e) = joined {
            error!(error = %e, "Failed to join worker threads");
        }

        *self.status.write() = WorkerPoolStatus::Stopped;
        info!(
            completed = self.counters.completed.load(Ordering::SeqCst),
            "Worker pool stopped"
        );
    }

    /// Stop accepting work. Returns true if this call closed the queue.
    fn close(&self) -> bool {
        let closed = self.sender.lock().take().is_some();
        if closed {
            *self.status.write() = WorkerPoolStatus::Draining;
        }
        closed
    }

    /// Current status
    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.size
    }

    /// Pool configuration
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Client registry shared by the workers
    pub fn registry(&self) -> &ClientRegistry<F> {
        &self.registry
    }

    /// Current counters
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            size: self.size,
            queued: self.counters.queued.load(Ordering::SeqCst),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            panicked: self.counters.panicked.load(Ordering::SeqCst),
            clients_created: self.registry.clients_created(),
        }
    }
}

impl<F: ClientFactory> Drop for WorkerPool<F> {
    fn drop(&mut self) {
        // Workers exit on their own once the queue is drained; nothing to join here
        self.close();
    }
}

/// Serve units of work until the queue is closed and empty
fn worker_loop<F: ClientFactory>(
    mut ctx: WorkerContext<F>,
    queue: SharedQueue<F>,
    counters: Arc<Counters>,
) {
    debug!(worker = %ctx.worker_id(), "Worker started");

    loop {
        // Only one idle worker waits on the channel at a time; the rest wait on the lock
        let job = queue.lock().blocking_recv();
        match job {
            Some(job) => job(&mut ctx),
            None => break,
        }
    }

    debug!(
        worker = %ctx.worker_id(),
        had_client = ctx.has_client(),
        completed = counters.completed.load(Ordering::SeqCst),
        "Worker exiting"
    );
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ClientInitError;

    struct UnitFactory;

    impl ClientFactory for UnitFactory {
        type Client = ();

        fn create(&self, _worker: &WorkerId) -> Result<(), ClientInitError> {
            Ok(())
        }
    }

    #[test]
    fn test_default_config() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.size, None);
        assert_eq!(config.thread_name_prefix, "ngsiem-worker");
        let resolved = config.resolved_size();
        assert!(resolved >= 5 && resolved <= DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerPoolConfig::new()
            .with_size(0)
            .with_thread_name_prefix("search");
        assert_eq!(config.size, Some(1));
        assert_eq!(config.resolved_size(), 1);
        assert_eq!(config.thread_name_prefix, "search");
    }

    #[tokio::test]
    async fn test_submit_runs_on_named_worker_thread() {
        let pool = WorkerPool::new(
            UnitFactory,
            WorkerPoolConfig::new()
                .with_size(2)
                .with_thread_name_prefix("unit"),
        )
        .unwrap();

        let name = pool
            .submit(|_ctx| std::thread::current().name().unwrap_or_default().to_string())
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert!(name.starts_with("unit-"));

        pool.shutdown().await;
        assert_eq!(pool.status(), WorkerPoolStatus::Stopped);
        assert_eq!(pool.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_worker_survives() {
        let pool = WorkerPool::new(UnitFactory, WorkerPoolConfig::new().with_size(1)).unwrap();

        let outcome = pool
            .submit(|_ctx| -> u32 { panic!("boom") })
            .unwrap()
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Err(WorkerPoolError::WorkerPanicked { ref message, .. }) if message == "boom"
        ));

        let value = pool.submit(|_ctx| 7u32).unwrap().await.unwrap().unwrap();
        assert_eq!(value, 7);
        assert_eq!(pool.stats().panicked, 1);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let pool = WorkerPool::new(UnitFactory, WorkerPoolConfig::new().with_size(1)).unwrap();
        pool.shutdown().await;

        let err = pool.submit(|_ctx| ()).unwrap_err();
        assert!(matches!(err, WorkerPoolError::ShutDown));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_work() {
        let pool = WorkerPool::new(UnitFactory, WorkerPoolConfig::new().with_size(1)).unwrap();

        let receivers: Vec<_> = (0..5)
            .map(|i| {
                pool.submit(move |_ctx| {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    i
                })
                .unwrap()
            })
            .collect();

        pool.shutdown().await;

        let mut results = Vec::new();
        for rx in receivers {
            results.push(rx.await.unwrap().unwrap());
        }
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(pool.stats().completed, 5);
        assert_eq!(pool.stats().queued, 0);
    }
}
