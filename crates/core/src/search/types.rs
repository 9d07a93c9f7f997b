// Search request and result types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::job::JobStatus;
use crate::error::{Result, SearchError};

/// Default relative time range
pub const DEFAULT_START: &str = "1d";
/// Default overall polling deadline, in seconds
pub const DEFAULT_MAX_WAIT_SECS: u64 = 300;
/// Default pause between polls, in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

const MAX_WAIT_RANGE: std::ops::RangeInclusive<u64> = 1..=3600;
const POLL_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 1..=60;
const QUERY_PREFIX_CHARS: usize = 100;

/// Parameters of a new search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub repository: String,
    pub query: String,
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default)]
    pub is_live: bool,
}

fn default_start() -> String {
    DEFAULT_START.to_string()
}

impl SearchRequest {
    /// A non-live search over the default time range
    pub fn new(repository: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            query: query.into(),
            start: default_start(),
            is_live: false,
        }
    }

    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = start.into();
        self
    }

    pub fn with_live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        self
    }

    /// Reject blank fields before anything is sent
    pub fn validate(&self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(SearchError::validation("repository must not be empty"));
        }
        if self.query.trim().is_empty() {
            return Err(SearchError::validation("query must not be empty"));
        }
        if self.start.trim().is_empty() {
            return Err(SearchError::validation("start must not be empty"));
        }
        Ok(())
    }

    /// First characters of the query, for logs and error context
    pub fn query_prefix(&self) -> String {
        query_prefix(&self.query)
    }
}

fn query_prefix(query: &str) -> String {
    query.chars().take(QUERY_PREFIX_CHARS).collect()
}

/// Deadline and cadence of a blocking search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    max_wait: Duration,
    poll_interval: Duration,
}

impl PollSchedule {
    /// Schedule in whole seconds, range-checked
    ///
    /// `max_wait_seconds` must be within 1..=3600 and `poll_interval` within 1..=60.
    pub fn from_secs(max_wait_seconds: u64, poll_interval: u64) -> Result<Self> {
        if !MAX_WAIT_RANGE.contains(&max_wait_seconds) {
            return Err(SearchError::validation(format!(
                "max_wait_seconds must be between {} and {}, got {}",
                MAX_WAIT_RANGE.start(),
                MAX_WAIT_RANGE.end(),
                max_wait_seconds
            )));
        }
        if !POLL_INTERVAL_RANGE.contains(&poll_interval) {
            return Err(SearchError::validation(format!(
                "poll_interval must be between {} and {}, got {}",
                POLL_INTERVAL_RANGE.start(),
                POLL_INTERVAL_RANGE.end(),
                poll_interval
            )));
        }
        Ok(Self {
            max_wait: Duration::from_secs(max_wait_seconds),
            poll_interval: Duration::from_secs(poll_interval),
        })
    }

    /// Schedule with arbitrary non-zero durations, for sub-second cadences
    pub fn from_durations(max_wait: Duration, poll_interval: Duration) -> Result<Self> {
        if max_wait.is_zero() || poll_interval.is_zero() {
            return Err(SearchError::validation(
                "max_wait and poll_interval must be greater than zero",
            ));
        }
        Ok(Self {
            max_wait,
            poll_interval,
        })
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

/// A search the remote service accepted
#[derive(Debug, Clone, Serialize)]
pub struct StartedSearch {
    pub job_id: String,
    pub repository: String,
    pub query: String,
    pub start: String,
    pub is_live: bool,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a remote job
#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    pub job_id: String,
    pub repository: String,
    pub status: JobStatus,
    pub done: bool,
    pub event_count: usize,
    /// Only populated once the job is done
    pub events: Vec<Value>,
    pub metadata: Map<String, Value>,
    pub checked_at: DateTime<Utc>,
}

/// Acknowledgement of a cancelled search
#[derive(Debug, Clone, Serialize)]
pub struct StoppedSearch {
    pub job_id: String,
    pub repository: String,
    pub status: JobStatus,
    pub stopped_at: DateTime<Utc>,
}

/// Outcome of stopping a tracked job
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// The remote service acknowledged the stop
    Stopped(StoppedSearch),
    /// The job had already finished; nothing was sent
    AlreadyTerminal { job_id: String, status: JobStatus },
}

/// Final result of a blocking search
#[derive(Debug, Clone, Serialize)]
pub struct CompletedSearch {
    pub job_id: String,
    pub repository: String,
    pub query: String,
    pub status: JobStatus,
    pub event_count: usize,
    pub events: Vec<Value>,
    pub metadata: Map<String, Value>,
    #[serde(rename = "elapsed_time", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub poll_count: u32,
    pub completed_at: DateTime<Utc>,
}

fn serialize_secs<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let rounded = (duration.as_secs_f64() * 100.0).round() / 100.0;
    serializer.serialize_f64(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = SearchRequest::new("main", "#event_simpleName=ProcessRollup2");
        assert_eq!(request.start, "1d");
        assert!(!request.is_live);
        assert!(request.validate().is_ok());

        let parsed: SearchRequest =
            serde_json::from_value(serde_json::json!({"repository": "r", "query": "q"})).unwrap();
        assert_eq!(parsed.start, "1d");
    }

    #[test]
    fn test_request_rejects_blank_fields() {
        assert!(SearchRequest::new("", "q").validate().is_err());
        assert!(SearchRequest::new("r", "   ").validate().is_err());
        assert!(SearchRequest::new("r", "q").with_start("").validate().is_err());
    }

    #[test]
    fn test_query_prefix_is_char_safe() {
        let query = "é".repeat(150);
        let prefix = query_prefix(&query);
        assert_eq!(prefix.chars().count(), 100);
    }

    #[test]
    fn test_schedule_bounds() {
        assert!(PollSchedule::from_secs(1, 1).is_ok());
        assert!(PollSchedule::from_secs(3600, 60).is_ok());

        for (max_wait, interval) in [(0, 2), (3601, 2), (300, 0), (300, 61)] {
            let err = PollSchedule::from_secs(max_wait, interval).unwrap_err();
            assert!(matches!(err, SearchError::Validation(_)), "{max_wait}/{interval}");
        }
    }

    #[test]
    fn test_schedule_from_durations() {
        let schedule =
            PollSchedule::from_durations(Duration::from_millis(500), Duration::from_millis(20))
                .unwrap();
        assert_eq!(schedule.poll_interval(), Duration::from_millis(20));
        assert!(PollSchedule::from_durations(Duration::ZERO, Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_default_schedule() {
        let schedule = PollSchedule::default();
        assert_eq!(schedule.max_wait(), Duration::from_secs(300));
        assert_eq!(schedule.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_completed_search_serializes_elapsed_seconds() {
        let completed = CompletedSearch {
            job_id: "j".into(),
            repository: "r".into(),
            query: "q".into(),
            status: JobStatus::Done,
            event_count: 0,
            events: vec![],
            metadata: Map::new(),
            elapsed: Duration::from_millis(1234),
            poll_count: 2,
            completed_at: Utc::now(),
        };
        let value = serde_json::to_value(&completed).unwrap();
        assert_eq!(value["elapsed_time"], serde_json::json!(1.23));
        assert_eq!(value["status"], "DONE");
    }
}
