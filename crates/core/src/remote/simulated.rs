// Simulated search service
//
// In-memory stand-in for the remote query-job API. Jobs complete after a
// configurable number of polls with a fixed event set. Every client instance
// records which thread created it so tests can prove no client is ever used
// from a second thread or by two calls at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{CommandParams, CommandResponse, Operation, RemoteCommand, TransportError};
use crate::executor::{ClientFactory, ClientInitError, WorkerId};

#[derive(Debug, Clone)]
struct Behavior {
    /// Polls answered with done=false before the job completes (None = never)
    polls_until_done: Option<u32>,
    events: Vec<Value>,
    metadata: Value,
    start_status: u16,
    poll_status: u16,
    stop_status: u16,
    omit_job_id: bool,
    call_latency: Duration,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            polls_until_done: Some(0),
            events: Vec::new(),
            metadata: json!({"isAggregate": false}),
            start_status: 200,
            poll_status: 200,
            stop_status: 204,
            omit_job_id: false,
            call_latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedJob {
    polls: u32,
    query: String,
}

/// Counters describing traffic seen by the simulated service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationStats {
    pub calls: usize,
    pub starts: usize,
    pub polls: usize,
    pub stops: usize,
    pub clients_created: usize,
    pub overlapping_calls: usize,
    pub foreign_thread_calls: usize,
    pub max_concurrent_calls: usize,
}

/// In-memory query-job service shared by all simulated clients
#[derive(Debug, Default)]
pub struct SimulatedSearchService {
    behavior: Behavior,
    jobs: Mutex<HashMap<String, SimulatedJob>>,
    calls: AtomicUsize,
    starts: AtomicUsize,
    polls: AtomicUsize,
    stops: AtomicUsize,
    clients_created: AtomicUsize,
    overlapping_calls: AtomicUsize,
    foreign_thread_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_concurrent_calls: AtomicUsize,
}

impl SimulatedSearchService {
    /// Service whose jobs complete on the first poll with no events
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `polls` status checks with done=false before completing
    pub fn completing_after(mut self, polls: u32) -> Self {
        self.behavior.polls_until_done = Some(polls);
        self
    }

    /// Jobs never complete
    pub fn never_completing(mut self) -> Self {
        self.behavior.polls_until_done = None;
        self
    }

    /// Events returned once a job completes
    pub fn with_events(mut self, events: Vec<Value>) -> Self {
        self.behavior.events = events;
        self
    }

    /// Metadata returned with every status response
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.behavior.metadata = metadata;
        self
    }

    /// HTTP status returned by start calls
    pub fn with_start_status(mut self, status: u16) -> Self {
        self.behavior.start_status = status;
        self
    }

    /// HTTP status returned by status calls
    pub fn with_poll_status(mut self, status: u16) -> Self {
        self.behavior.poll_status = status;
        self
    }

    /// HTTP status returned by stop calls
    pub fn with_stop_status(mut self, status: u16) -> Self {
        self.behavior.stop_status = status;
        self
    }

    /// Start responses succeed but carry no job id
    pub fn without_job_id(mut self) -> Self {
        self.behavior.omit_job_id = true;
        self
    }

    /// Block every call for this long, like a slow network
    pub fn with_call_latency(mut self, latency: Duration) -> Self {
        self.behavior.call_latency = latency;
        self
    }

    /// Current counters
    pub fn stats(&self) -> SimulationStats {
        SimulationStats {
            calls: self.calls.load(Ordering::SeqCst),
            starts: self.starts.load(Ordering::SeqCst),
            polls: self.polls.load(Ordering::SeqCst),
            stops: self.stops.load(Ordering::SeqCst),
            clients_created: self.clients_created.load(Ordering::SeqCst),
            overlapping_calls: self.overlapping_calls.load(Ordering::SeqCst),
            foreign_thread_calls: self.foreign_thread_calls.load(Ordering::SeqCst),
            max_concurrent_calls: self.max_concurrent_calls.load(Ordering::SeqCst),
        }
    }

    /// Query text of a started job
    pub fn job_query(&self, job_id: &str) -> Option<String> {
        self.jobs.lock().get(job_id).map(|job| job.query.clone())
    }

    fn handle(&self, operation: Operation, params: &CommandParams) -> CommandResponse {
        match operation {
            Operation::StartSearchV1 => self.start(params),
            Operation::GetSearchStatusV1 => self.poll(params),
            Operation::StopSearchV1 => self.stop(params),
        }
    }

    fn start(&self, params: &CommandParams) -> CommandResponse {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let status = self.behavior.start_status;
        if status != 200 {
            return error_response(status, "start rejected");
        }

        let job_id = Uuid::now_v7().to_string();
        let query = params
            .body
            .as_ref()
            .and_then(|b| b.get("queryString"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.jobs.lock().insert(
            job_id.clone(),
            SimulatedJob {
                polls: 0,
                query,
            },
        );

        if self.behavior.omit_job_id {
            return CommandResponse::new(200, json!({"hashedQueryOnView": "x"}));
        }
        CommandResponse::new(200, json!({ "id": job_id }))
    }

    fn poll(&self, params: &CommandParams) -> CommandResponse {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let status = self.behavior.poll_status;
        if status != 200 {
            return error_response(status, "status check rejected");
        }

        let search_id = params.search_id.clone().unwrap_or_default();
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(&search_id) else {
            return error_response(404, "query job not found");
        };

        job.polls += 1;
        let done = self
            .behavior
            .polls_until_done
            .is_some_and(|threshold| job.polls > threshold);

        let events = if done {
            Value::Array(self.behavior.events.clone())
        } else {
            Value::Array(Vec::new())
        };

        CommandResponse::new(
            200,
            json!({
                "done": done,
                "cancelled": false,
                "events": events,
                "metaData": self.behavior.metadata,
            }),
        )
    }

    fn stop(&self, params: &CommandParams) -> CommandResponse {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let status = self.behavior.stop_status;
        if status != 200 && status != 204 {
            return error_response(status, "stop rejected");
        }

        let search_id = params.search_id.clone().unwrap_or_default();
        match self.jobs.lock().remove(&search_id) {
            Some(_) => CommandResponse::new(status, json!({})),
            None => error_response(404, "query job not found"),
        }
    }
}

fn error_response(status: u16, message: &str) -> CommandResponse {
    CommandResponse::new(
        status,
        json!({"errors": [{"code": status, "message": message}]}),
    )
}

/// Client bound to the thread that created it
#[derive(Debug)]
pub struct SimulatedClient {
    service: Arc<SimulatedSearchService>,
    worker: WorkerId,
    owner: ThreadId,
    busy: AtomicBool,
}

impl SimulatedClient {
    /// Worker the client was created for
    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }
}

impl RemoteCommand for SimulatedClient {
    fn command(
        &mut self,
        operation: Operation,
        params: &CommandParams,
    ) -> Result<CommandResponse, TransportError> {
        let service = &self.service;
        service.calls.fetch_add(1, Ordering::SeqCst);

        if std::thread::current().id() != self.owner {
            service.foreign_thread_calls.fetch_add(1, Ordering::SeqCst);
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            service.overlapping_calls.fetch_add(1, Ordering::SeqCst);
        }
        let concurrent = service.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        service
            .max_concurrent_calls
            .fetch_max(concurrent, Ordering::SeqCst);

        if !service.behavior.call_latency.is_zero() {
            std::thread::sleep(service.behavior.call_latency);
        }
        let response = service.handle(operation, params);

        service.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
        Ok(response)
    }
}

/// Creates simulated clients against one shared service
#[derive(Debug, Clone)]
pub struct SimulatedClientFactory {
    service: Arc<SimulatedSearchService>,
    fail_construction: bool,
}

impl SimulatedClientFactory {
    /// Factory for the given service
    pub fn new(service: Arc<SimulatedSearchService>) -> Self {
        Self {
            service,
            fail_construction: false,
        }
    }

    /// Every construction fails, as with missing credentials
    pub fn failing(service: Arc<SimulatedSearchService>) -> Self {
        Self {
            service,
            fail_construction: true,
        }
    }
}

impl ClientFactory for SimulatedClientFactory {
    type Client = SimulatedClient;

    fn create(&self, worker: &WorkerId) -> Result<SimulatedClient, ClientInitError> {
        if self.fail_construction {
            return Err(ClientInitError::new(worker, "credentials rejected"));
        }

        self.service.clients_created.fetch_add(1, Ordering::SeqCst);
        Ok(SimulatedClient {
            service: Arc::clone(&self.service),
            worker: *worker,
            owner: std::thread::current().id(),
            busy: AtomicBool::new(false),
        })
    }
}
