// Search job state machine
//
// CREATED → RUNNING → DONE, with TIMEOUT, CANCELLED and ERROR as the other
// terminal states. Once terminal, a job never changes status again.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::SearchRequest;
use crate::error::{Result, SearchError};

/// Lifecycle status of a search job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Running,
    Done,
    Timeout,
    Cancelled,
    Error,
}

impl JobStatus {
    /// Whether no further transitions can occur
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Timeout | JobStatus::Cancelled | JobStatus::Error
        )
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Created => matches!(next, JobStatus::Running | JobStatus::Error),
            JobStatus::Running => matches!(
                next,
                JobStatus::Done | JobStatus::Timeout | JobStatus::Cancelled | JobStatus::Error
            ),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Timeout => "TIMEOUT",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote search tracked on the caller side
#[derive(Debug, Clone)]
pub struct SearchJob {
    job_id: Option<String>,
    request: SearchRequest,
    status: JobStatus,
    created_at: DateTime<Utc>,
    started: Instant,
    poll_count: u32,
    last_error: Option<String>,
}

impl SearchJob {
    /// A job in CREATED state; the monotonic clock starts now
    pub fn new(request: SearchRequest) -> Self {
        Self {
            job_id: None,
            request,
            status: JobStatus::Created,
            created_at: Utc::now(),
            started: Instant::now(),
            poll_count: 0,
            last_error: None,
        }
    }

    /// Remote identifier, assigned by a successful start call
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Identifier or a validation error if the job was never started
    pub fn require_job_id(&self) -> Result<&str> {
        self.job_id
            .as_deref()
            .ok_or_else(|| SearchError::validation("search job has not been started"))
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    pub fn repository(&self) -> &str {
        &self.request.repository
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    /// Time since the job was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Message of the failure that moved the job to ERROR
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record the identifier from a successful start and move to RUNNING
    pub(crate) fn mark_running(&mut self, job_id: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.job_id = Some(job_id.into());
        Ok(())
    }

    pub(crate) fn record_poll(&mut self) {
        self.poll_count += 1;
    }

    /// Move to ERROR unless already terminal
    pub(crate) fn mark_failed(&mut self, error: &SearchError) {
        if self.status.can_transition_to(JobStatus::Error) {
            self.status = JobStatus::Error;
            self.last_error = Some(error.to_string());
        }
    }

    /// Apply a transition, rejecting illegal ones
    pub(crate) fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SearchError::unexpected(
                format!("illegal job transition {} → {}", self.status, next),
                format!("job_id={}", self.job_id.as_deref().unwrap_or("<none>")),
            ));
        }
        self.status = next;
        Ok(())
    }
}
