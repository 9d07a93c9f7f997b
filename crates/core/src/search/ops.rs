// Single remote search operations
//
// Each function performs exactly one remote command on a worker's client and
// maps the response to a typed result or a categorized SearchError. They run
// on worker threads and never touch the async scheduler.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::job::JobStatus;
use super::types::{PollResult, SearchRequest, StartedSearch, StoppedSearch};
use crate::error::{Result, SearchError};
use crate::remote::{CommandParams, CommandResponse, Operation, RemoteCommand};

/// Submit a new search and return its job id
pub fn start_search<C: RemoteCommand + ?Sized>(
    client: &mut C,
    request: &SearchRequest,
) -> Result<StartedSearch> {
    request.validate()?;
    info!(
        repository = %request.repository,
        query = %request.query_prefix(),
        start = %request.start,
        "Starting search"
    );

    let params = CommandParams::repository(&request.repository).with_body(json!({
        "isLive": request.is_live,
        "start": request.start,
        "queryString": request.query,
    }));
    let response = client.command(Operation::StartSearchV1, &params)?;
    if response.status_code != 200 {
        return Err(remote_failure(&response, &request.repository, None));
    }

    let body = response.body_object();
    let job_id = match body.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let keys: Vec<&str> = body.keys().map(String::as_str).collect();
            return Err(SearchError::unexpected(
                "start response did not include a search job id",
                format!(
                    "repository={}, query_prefix={}, response_keys={:?}",
                    request.repository,
                    request.query_prefix(),
                    keys
                ),
            ));
        }
    };

    info!(repository = %request.repository, job_id = %job_id, "Search started");
    Ok(StartedSearch {
        job_id,
        repository: request.repository.clone(),
        query: request.query.clone(),
        start: request.start.clone(),
        is_live: request.is_live,
        status: JobStatus::Running,
        created_at: Utc::now(),
    })
}

/// Fetch the current state of a search job
///
/// Events are only returned once the job reports `done`.
pub fn get_search_status<C: RemoteCommand + ?Sized>(
    client: &mut C,
    repository: &str,
    job_id: &str,
) -> Result<PollResult> {
    require("repository", repository)?;
    require("job_id", job_id)?;

    let params = CommandParams::repository(repository).with_search_id(job_id);
    let response = client.command(Operation::GetSearchStatusV1, &params)?;
    if response.status_code != 200 {
        return Err(remote_failure(&response, repository, Some(job_id)));
    }

    let Value::Object(mut body) = response.body else {
        return Err(SearchError::unexpected(
            "status response body is not an object",
            format!("repository={}, job_id={}", repository, job_id),
        ));
    };

    let done = body.get("done").and_then(Value::as_bool).unwrap_or(false);
    let events = match body.remove("events") {
        Some(Value::Array(events)) => events,
        _ => Vec::new(),
    };
    let metadata = match body.remove("metaData") {
        Some(Value::Object(metadata)) => metadata,
        _ => Default::default(),
    };
    let event_count = events.len();

    debug!(repository, job_id, done, event_count, "Search status");
    Ok(PollResult {
        job_id: job_id.to_string(),
        repository: repository.to_string(),
        status: if done { JobStatus::Done } else { JobStatus::Running },
        done,
        event_count,
        events: if done { events } else { Vec::new() },
        metadata,
        checked_at: Utc::now(),
    })
}

/// Ask the remote service to cancel a search job
pub fn stop_search<C: RemoteCommand + ?Sized>(
    client: &mut C,
    repository: &str,
    job_id: &str,
) -> Result<StoppedSearch> {
    require("repository", repository)?;
    require("job_id", job_id)?;
    info!(repository, job_id, "Stopping search");

    let params = CommandParams::repository(repository).with_search_id(job_id);
    let response = client.command(Operation::StopSearchV1, &params)?;
    if !matches!(response.status_code, 200 | 204) {
        return Err(remote_failure(&response, repository, Some(job_id)));
    }

    Ok(StoppedSearch {
        job_id: job_id.to_string(),
        repository: repository.to_string(),
        status: JobStatus::Cancelled,
        stopped_at: Utc::now(),
    })
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SearchError::validation(format!("{} must not be empty", name)));
    }
    Ok(())
}

fn remote_failure(
    response: &CommandResponse,
    repository: &str,
    job_id: Option<&str>,
) -> SearchError {
    let status = response.status_code;
    let message = match (status, job_id) {
        (401, _) => "Authentication failed. Verify the CrowdStrike API credentials.".to_string(),
        (403, _) => format!(
            "Access denied to repository '{}'. Verify the API client has NGSIEM permissions and the repository name is correct.",
            repository
        ),
        (404, None) => format!(
            "Repository '{}' not found. Check the repository name.",
            repository
        ),
        (404, Some(id)) => format!(
            "Search job '{}' not found in repository '{}'. It may have expired or been stopped.",
            id, repository
        ),
        _ => format!("API error: {}", response.error_detail()),
    };

    warn!(repository, job_id, status, "Remote call failed");
    SearchError::remote(status, repository, job_id, message)
}
