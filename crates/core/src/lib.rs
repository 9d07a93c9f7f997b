// NGSIEM Search Bridge
//
// This crate runs NGSIEM log searches from async code on top of a blocking,
// non-thread-safe remote client.
//
// Key design decisions:
// - Blocking remote calls run on a fixed pool of OS threads (executor::WorkerPool)
// - Each worker thread lazily builds and exclusively owns one client (ClientRegistry)
// - Async callers await a oneshot reply; the scheduler thread never blocks
// - The search job state machine lives with the caller; workers only execute single remote steps
// - The remote API sits behind the RemoteCommand trait (Falcon over HTTP, or in-memory simulation)
// - One error enum (SearchError) covers every failure a caller can see

// Configuration and observability
pub mod config;
pub mod telemetry;

pub mod error;
pub mod executor;
pub mod remote;
pub mod schema;
pub mod search;
pub mod tools;
pub mod validator;

// Re-exports for convenience
pub use config::{ConfigError, Credentials, NgsiemConfig};
pub use error::{RemoteErrorKind, Result, SearchError};
pub use executor::{
    ClientFactory, WorkerContext, WorkerId, WorkerPool, WorkerPoolConfig, WorkerPoolError,
    WorkerPoolStats,
};
pub use remote::{
    FalconClient, FalconClientFactory, RemoteCommand, SimulatedClientFactory,
    SimulatedSearchService,
};
pub use schema::{discover_fields, SchemaResult};
pub use search::{
    CompletedSearch, JobStatus, PollResult, PollSchedule, SearchController, SearchJob,
    SearchRequest, StartedSearch, StopOutcome, StoppedSearch,
};
pub use tools::{list_tools, ToolDefinition, ToolDispatcher, ToolError};
pub use validator::{IssueSeverity, QueryValidator, ValidationIssue, ValidationReport};
