// Error taxonomy for search operations
//
// Every failure a caller can observe is one variant of `SearchError`. Worker
// failures travel through the pool unchanged; the controller only adds job
// context (job id, elapsed time, poll count) on the way out.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::executor::{ClientInitError, WorkerPoolError};
use crate::remote::TransportError;

/// Result type for search operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Category of a non-success response from the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// HTTP 401
    Unauthorized,
    /// HTTP 403
    Forbidden,
    /// HTTP 404
    NotFound,
    /// Any other non-success status
    Other,
}

impl RemoteErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => RemoteErrorKind::Unauthorized,
            403 => RemoteErrorKind::Forbidden,
            404 => RemoteErrorKind::NotFound,
            _ => RemoteErrorKind::Other,
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RemoteErrorKind::Unauthorized => "unauthorized",
            RemoteErrorKind::Forbidden => "forbidden",
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::Other => "remote error",
        };
        f.write_str(label)
    }
}

/// Errors surfaced by the search bridge
#[derive(Debug, Error)]
pub enum SearchError {
    /// Malformed caller input, raised before any remote call
    #[error("validation error: {0}")]
    Validation(String),

    /// Non-success response from the remote service
    #[error("{kind} (HTTP {status}) for repository '{repository}': {message}")]
    Remote {
        kind: RemoteErrorKind,
        status: u16,
        repository: String,
        job_id: Option<String>,
        message: String,
    },

    /// Polling deadline elapsed while the remote job was still running
    #[error(
        "search {job_id} did not complete within {}s ({poll_count} polls); it is still running remotely and can be polled or stopped later",
        max_wait.as_secs_f64()
    )]
    Timeout {
        job_id: String,
        max_wait: Duration,
        elapsed: Duration,
        poll_count: u32,
    },

    /// The worker client could not be constructed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Anything else, with enough context to diagnose
    #[error("unexpected error: {message} [{context}]")]
    Unexpected { message: String, context: String },
}

impl SearchError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        SearchError::Validation(message.into())
    }

    /// Create an unexpected error with diagnostic context
    pub fn unexpected(message: impl Into<String>, context: impl Into<String>) -> Self {
        SearchError::Unexpected {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Build a remote error from a response status
    pub fn remote(
        status: u16,
        repository: impl Into<String>,
        job_id: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        SearchError::Remote {
            kind: RemoteErrorKind::from_status(status),
            status,
            repository: repository.into(),
            job_id: job_id.map(str::to_string),
            message: message.into(),
        }
    }

    /// Attach job context without changing the variant
    pub fn with_job_context(self, job_id: &str, elapsed: Duration, poll_count: u32) -> Self {
        match self {
            SearchError::Remote {
                kind,
                status,
                repository,
                job_id: None,
                message,
            } => SearchError::Remote {
                kind,
                status,
                repository,
                job_id: Some(job_id.to_string()),
                message,
            },
            SearchError::Unexpected { message, context } => SearchError::Unexpected {
                message,
                context: format!(
                    "{}; job_id={}, elapsed={:.1}s, poll_count={}",
                    context,
                    job_id,
                    elapsed.as_secs_f64(),
                    poll_count
                ),
            },
            other => other,
        }
    }

    /// Short discriminant name, used in logs and tool responses
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::Validation(_) => "validation_error",
            SearchError::Remote { .. } => "remote_service_error",
            SearchError::Timeout { .. } => "timeout_error",
            SearchError::Configuration(_) => "configuration_error",
            SearchError::Unexpected { .. } => "unexpected_error",
        }
    }

    /// Whether a caller-level retry could succeed. The core never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Timeout { .. } => true,
            SearchError::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Job id carried by the error, if any
    pub fn job_id(&self) -> Option<&str> {
        match self {
            SearchError::Timeout { job_id, .. } => Some(job_id),
            SearchError::Remote { job_id, .. } => job_id.as_deref(),
            _ => None,
        }
    }
}

impl From<WorkerPoolError> for SearchError {
    fn from(err: WorkerPoolError) -> Self {
        SearchError::unexpected(err.to_string(), "worker pool")
    }
}

impl From<ClientInitError> for SearchError {
    fn from(err: ClientInitError) -> Self {
        SearchError::Configuration(err.to_string())
    }
}

impl From<TransportError> for SearchError {
    fn from(err: TransportError) -> Self {
        SearchError::unexpected(err.to_string(), "transport")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_kind_from_status() {
        assert_eq!(
            RemoteErrorKind::from_status(401),
            RemoteErrorKind::Unauthorized
        );
        assert_eq!(RemoteErrorKind::from_status(403), RemoteErrorKind::Forbidden);
        assert_eq!(RemoteErrorKind::from_status(404), RemoteErrorKind::NotFound);
        assert_eq!(RemoteErrorKind::from_status(500), RemoteErrorKind::Other);
    }

    #[test]
    fn test_with_job_context_keeps_variant() {
        let err = SearchError::remote(500, "main", None, "boom");
        let err = err.with_job_context("job-1", Duration::from_secs(3), 2);
        assert!(matches!(&err, SearchError::Remote { job_id: Some(id), .. } if id == "job-1"));
        assert!(err.is_retryable());

        let err = SearchError::unexpected("missing field", "repository=main");
        let err = err.with_job_context("job-2", Duration::from_millis(1500), 4);
        let text = err.to_string();
        assert!(text.contains("job_id=job-2"));
        assert!(text.contains("poll_count=4"));

        let err = SearchError::validation("bad").with_job_context("job-3", Duration::ZERO, 0);
        assert!(matches!(err, SearchError::Validation(_)));
    }

    #[test]
    fn test_timeout_message_names_job() {
        let err = SearchError::Timeout {
            job_id: "abc123".to_string(),
            max_wait: Duration::from_secs(5),
            elapsed: Duration::from_secs(6),
            poll_count: 3,
        };
        assert!(err.to_string().contains("abc123"));
        assert_eq!(err.job_id(), Some("abc123"));
        assert_eq!(err.kind(), "timeout_error");
    }

    #[test]
    fn test_forbidden_is_not_retryable() {
        let err = SearchError::remote(403, "secret-repo", Some("j"), "denied");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("forbidden"));
    }
}
