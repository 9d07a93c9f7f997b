//! Search jobs
//!
//! - [`ops`] - One remote call each: start, status, stop
//! - [`SearchController`] - Async orchestration on the worker pool
//! - [`SearchJob`] / [`JobStatus`] - Caller-side job state machine

mod controller;
mod job;
pub mod ops;
mod types;

pub use controller::SearchController;
pub use job::{JobStatus, SearchJob};
pub use types::{
    CompletedSearch, PollResult, PollSchedule, SearchRequest, StartedSearch, StopOutcome,
    StoppedSearch, DEFAULT_MAX_WAIT_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_START,
};
