// Repository schema discovery
//
// Runs a fixed introspection query through the controller and reduces the
// returned records to the sorted set of field names they contain.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Result, SearchError};
use crate::executor::ClientFactory;
use crate::remote::RemoteCommand;
use crate::search::{PollSchedule, SearchController, SearchRequest};

/// Default discovery deadline, in seconds
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 60;

const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=120;
const INTROSPECTION_RANGE: &str = "1h";
const INTROSPECTION_LIMIT: u32 = 200;
const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Record keys whose string values name additional fields
const FIELD_HINT_KEYS: [&str; 2] = ["field", "fieldName"];

/// Field names observed in a repository
#[derive(Debug, Clone, Serialize)]
pub struct SchemaResult {
    pub repository: String,
    pub field_count: usize,
    pub fields: Vec<String>,
    pub retrieved_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Accept only `[A-Za-z0-9_-]+`, since the name is interpolated into a query
pub fn validate_repository_name(repository: &str) -> Result<()> {
    if repository.is_empty() {
        return Err(SearchError::validation("repository must not be empty"));
    }
    if let Some(bad) = repository
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(SearchError::validation(format!(
            "repository '{}' contains invalid character '{}'; only letters, digits, '_' and '-' are allowed",
            repository, bad
        )));
    }
    Ok(())
}

/// Query used to sample recent records of a repository
pub fn introspection_query(repository: &str) -> String {
    format!(
        "#repo={} | head(limit={})",
        repository, INTROSPECTION_LIMIT
    )
}

/// Discover the field names present in recent records of `repository`
///
/// `timeout_seconds` must be within 1..=120. An empty result is not an error;
/// it yields zero fields with an advisory warning.
pub async fn discover_fields<F>(
    controller: &SearchController<F>,
    repository: &str,
    timeout_seconds: u64,
) -> Result<SchemaResult>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    validate_repository_name(repository)?;
    if !TIMEOUT_RANGE.contains(&timeout_seconds) {
        return Err(SearchError::validation(format!(
            "timeout_seconds must be between {} and {}, got {}",
            TIMEOUT_RANGE.start(),
            TIMEOUT_RANGE.end(),
            timeout_seconds
        )));
    }

    let max_wait = Duration::from_secs(timeout_seconds);
    let schedule = PollSchedule::from_durations(max_wait, DISCOVERY_POLL_INTERVAL.min(max_wait))?;
    let request = SearchRequest::new(repository, introspection_query(repository))
        .with_start(INTROSPECTION_RANGE);

    info!(repository, timeout_seconds, "Discovering repository fields");
    let completed = controller.search_and_wait(request, schedule).await?;

    let fields = collect_field_names(&completed.events);
    let warning = if fields.is_empty() {
        warn!(repository, "Introspection query returned no fields");
        Some(format!(
            "No events found in repository '{}' over the last {}; the field list may be incomplete",
            repository, INTROSPECTION_RANGE
        ))
    } else {
        None
    };

    info!(repository, field_count = fields.len(), "Field discovery complete");
    Ok(SchemaResult {
        repository: repository.to_string(),
        field_count: fields.len(),
        fields,
        retrieved_at: Utc::now(),
        warning,
    })
}

/// Union of record keys plus field-name hints, sorted and de-duplicated
pub fn collect_field_names(events: &[Value]) -> Vec<String> {
    let mut fields = BTreeSet::new();
    for record in events.iter().filter_map(Value::as_object) {
        for (key, value) in record {
            fields.insert(key.clone());
            if FIELD_HINT_KEYS.contains(&key.as_str()) {
                if let Some(hint) = value.as_str().filter(|h| !h.is_empty()) {
                    fields.insert(hint.to_string());
                }
            }
        }
    }
    fields.into_iter().collect()
}
