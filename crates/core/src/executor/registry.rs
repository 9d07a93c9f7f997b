//! Per-worker client registry
//!
//! A worker's client is created lazily on the first unit of work that asks for
//! it and then reused for the worker's whole lifetime. The instance lives in the
//! worker's own [`WorkerContext`]; the registry only holds the factory and the
//! bookkeeping of which workers have constructed one.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

/// Identity of one pool worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Worker number `index`
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Worker number
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ngsiem-worker-{}", self.0)
    }
}

/// Failure to construct a worker's client
#[derive(Debug, Clone, Error)]
#[error("failed to construct client for {worker}: {message}")]
pub struct ClientInitError {
    worker: WorkerId,
    message: String,
}

impl ClientInitError {
    /// Create an error for `worker`
    pub fn new(worker: &WorkerId, message: impl Into<String>) -> Self {
        Self {
            worker: *worker,
            message: message.into(),
        }
    }

    /// Worker whose construction failed
    pub fn worker(&self) -> WorkerId {
        self.worker
    }
}

/// Builds remote clients for workers
///
/// The factory is shared across all worker threads; the clients it builds are
/// not, which is why `Client` carries no `Send` bound.
pub trait ClientFactory: Send + Sync + 'static {
    /// Client type owned by a worker
    type Client: 'static;

    /// Construct a client for `worker`
    fn create(&self, worker: &WorkerId) -> Result<Self::Client, ClientInitError>;
}

/// Registry entry for a worker that has constructed its client
#[derive(Debug, Clone, Copy)]
pub struct ClientRecord {
    pub created_at: DateTime<Utc>,
}

/// Factory plus bookkeeping of per-worker clients
pub struct ClientRegistry<F: ClientFactory> {
    factory: F,
    records: DashMap<WorkerId, ClientRecord>,
}

impl<F: ClientFactory> ClientRegistry<F> {
    /// Create a registry around `factory`
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            records: DashMap::new(),
        }
    }

    /// Number of workers that have constructed a client
    pub fn clients_created(&self) -> usize {
        self.records.len()
    }

    /// Whether `worker` has constructed its client
    pub fn has_client(&self, worker: &WorkerId) -> bool {
        self.records.contains_key(worker)
    }

    /// Construction record of `worker`
    pub fn record(&self, worker: &WorkerId) -> Option<ClientRecord> {
        self.records.get(worker).map(|r| *r)
    }

    fn construct(&self, worker: &WorkerId) -> Result<F::Client, ClientInitError> {
        debug!(%worker, "Creating remote client for worker");
        let client = self.factory.create(worker)?;
        self.records.insert(
            *worker,
            ClientRecord {
                created_at: Utc::now(),
            },
        );
        Ok(client)
    }
}

/// State owned by one worker thread and lent to every unit of work it runs
pub struct WorkerContext<F: ClientFactory> {
    id: WorkerId,
    registry: Arc<ClientRegistry<F>>,
    client: Option<F::Client>,
}

impl<F: ClientFactory> WorkerContext<F> {
    pub(crate) fn new(id: WorkerId, registry: Arc<ClientRegistry<F>>) -> Self {
        Self {
            id,
            registry,
            client: None,
        }
    }

    /// Identity of the worker running the current unit of work
    pub fn worker_id(&self) -> WorkerId {
        self.id
    }

    /// This worker's client, constructed on first use
    ///
    /// A construction failure is returned to the current unit of work; the next
    /// unit on this worker tries again.
    pub fn client(&mut self) -> Result<&mut F::Client, ClientInitError> {
        let client = match self.client.take() {
            Some(client) => client,
            None => self.registry.construct(&self.id)?,
        };
        Ok(self.client.insert(client))
    }

    /// Whether the client has been constructed
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        built: AtomicUsize,
    }

    impl ClientFactory for CountingFactory {
        type Client = usize;

        fn create(&self, _worker: &WorkerId) -> Result<usize, ClientInitError> {
            Ok(self.built.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[test]
    fn test_client_is_constructed_once_per_worker() {
        let registry = Arc::new(ClientRegistry::new(CountingFactory {
            built: AtomicUsize::new(0),
        }));
        let mut first = WorkerContext::new(WorkerId::new(0), Arc::clone(&registry));
        let mut second = WorkerContext::new(WorkerId::new(1), Arc::clone(&registry));

        assert!(!first.has_client());
        assert_eq!(*first.client().unwrap(), 0);
        assert_eq!(*first.client().unwrap(), 0);
        assert_eq!(*second.client().unwrap(), 1);

        assert_eq!(registry.clients_created(), 2);
        assert!(registry.has_client(&WorkerId::new(0)));
        assert!(registry.record(&WorkerId::new(1)).is_some());
        assert!(!registry.has_client(&WorkerId::new(2)));
    }

    #[test]
    fn test_failed_construction_is_retried() {
        struct FlakyFactory {
            attempts: AtomicUsize,
        }

        impl ClientFactory for FlakyFactory {
            type Client = ();

            fn create(&self, worker: &WorkerId) -> Result<(), ClientInitError> {
                if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(ClientInitError::new(worker, "transient"));
                }
                Ok(())
            }
        }

        let registry = Arc::new(ClientRegistry::new(FlakyFactory {
            attempts: AtomicUsize::new(0),
        }));
        let mut ctx = WorkerContext::new(WorkerId::new(7), Arc::clone(&registry));

        let err = ctx.client().unwrap_err();
        assert_eq!(err.worker(), WorkerId::new(7));
        assert!(!ctx.has_client());
        assert!(ctx.client().is_ok());
        assert_eq!(registry.clients_created(), 1);
    }

    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId::new(4).to_string(), "ngsiem-worker-4");
    }
}
