// Tool dispatcher
//
// Routes named tool calls with JSON arguments to the search operations and
// returns JSON results. Argument defaults mirror the operation defaults; an
// omitted repository falls back to the configured default.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::SearchError;
use crate::executor::ClientFactory;
use crate::remote::RemoteCommand;
use crate::schema::{self, DEFAULT_DISCOVERY_TIMEOUT_SECS};
use crate::search::{
    PollSchedule, SearchController, SearchRequest, DEFAULT_MAX_WAIT_SECS,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_START,
};
use crate::validator::QueryValidator;

/// Name and description of a callable tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
}

const TOOLS: &[ToolDefinition] = &[
    ToolDefinition {
        name: "start_search",
        description: "Start a search and return its job id without waiting for results.",
    },
    ToolDefinition {
        name: "get_search_status",
        description: "Check a running search; returns events once it is done. Safe to call repeatedly.",
    },
    ToolDefinition {
        name: "stop_search",
        description: "Cancel a running search.",
    },
    ToolDefinition {
        name: "search_and_wait",
        description: "Start a search and poll until it completes or max_wait_seconds elapses. On timeout the search keeps running and its job id is returned.",
    },
    ToolDefinition {
        name: "get_repo_fieldset",
        description: "List the field names present in recent records of a repository.",
    },
    ToolDefinition {
        name: "validate_query",
        description: "Check query syntax without running it.",
    },
];

/// Every tool [`ToolDispatcher::call`] accepts
pub fn list_tools() -> &'static [ToolDefinition] {
    TOOLS
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl ToolError {
    /// Short discriminant name for structured responses
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidArguments { .. } => "validation_error",
            ToolError::Search(err) => err.kind(),
        }
    }
}

fn default_start() -> String {
    DEFAULT_START.to_string()
}

fn default_max_wait() -> u64 {
    DEFAULT_MAX_WAIT_SECS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_discovery_timeout() -> u64 {
    DEFAULT_DISCOVERY_TIMEOUT_SECS
}

#[derive(Debug, Deserialize)]
struct StartSearchArgs {
    repository: Option<String>,
    query_string: String,
    #[serde(default = "default_start")]
    start: String,
    #[serde(default)]
    is_live: bool,
}

#[derive(Debug, Deserialize)]
struct JobArgs {
    repository: Option<String>,
    search_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchAndWaitArgs {
    repository: Option<String>,
    query_string: String,
    #[serde(default = "default_start")]
    start: String,
    #[serde(default)]
    is_live: bool,
    #[serde(default = "default_max_wait")]
    max_wait_seconds: u64,
    #[serde(default = "default_poll_interval")]
    poll_interval: u64,
}

#[derive(Debug, Deserialize)]
struct FieldsetArgs {
    repository: Option<String>,
    #[serde(default = "default_discovery_timeout")]
    timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct ValidateQueryArgs {
    query: String,
    #[serde(default)]
    strict: bool,
}

/// Dispatches tool calls onto a [`SearchController`]
pub struct ToolDispatcher<F: ClientFactory> {
    controller: SearchController<F>,
    validator: QueryValidator,
    default_repository: Option<String>,
}

impl<F> ToolDispatcher<F>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    pub fn new(controller: SearchController<F>) -> Self {
        Self {
            controller,
            validator: QueryValidator::new(),
            default_repository: None,
        }
    }

    /// Repository used when a call omits one
    pub fn with_default_repository(mut self, repository: Option<String>) -> Self {
        self.default_repository = repository.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn controller(&self) -> &SearchController<F> {
        &self.controller
    }

    /// Run the named tool with JSON arguments
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        info!(tool = name, "Tool call");
        let result = match name {
            "start_search" => {
                let args: StartSearchArgs = parse_args(name, arguments)?;
                let repository = self.repository(args.repository)?;
                let request = SearchRequest::new(repository, args.query_string)
                    .with_start(args.start)
                    .with_live(args.is_live);
                to_value(&self.controller.start_search(request).await?)?
            }
            "get_search_status" => {
                let args: JobArgs = parse_args(name, arguments)?;
                let repository = self.repository(args.repository)?;
                to_value(&self.controller.poll_search(&repository, &args.search_id).await?)?
            }
            "stop_search" => {
                let args: JobArgs = parse_args(name, arguments)?;
                let repository = self.repository(args.repository)?;
                to_value(&self.controller.stop_search(&repository, &args.search_id).await?)?
            }
            "search_and_wait" => {
                let args: SearchAndWaitArgs = parse_args(name, arguments)?;
                let schedule = PollSchedule::from_secs(args.max_wait_seconds, args.poll_interval)?;
                let repository = self.repository(args.repository)?;
                let request = SearchRequest::new(repository, args.query_string)
                    .with_start(args.start)
                    .with_live(args.is_live);
                match self.controller.search_and_wait(request, schedule).await {
                    Ok(completed) => to_value(&completed)?,
                    Err(SearchError::Timeout {
                        job_id,
                        max_wait,
                        elapsed,
                        poll_count,
                    }) => json!({
                        "job_id": job_id,
                        "status": "TIMEOUT",
                        "max_wait_seconds": max_wait.as_secs(),
                        "elapsed_time": (elapsed.as_secs_f64() * 100.0).round() / 100.0,
                        "poll_count": poll_count,
                        "message": "Search is still running remotely; use get_search_status or stop_search with this job id.",
                    }),
                    Err(err) => return Err(err.into()),
                }
            }
            "get_repo_fieldset" => {
                let args: FieldsetArgs = parse_args(name, arguments)?;
                let repository = self.repository(args.repository)?;
                to_value(
                    &schema::discover_fields(&self.controller, &repository, args.timeout_seconds)
                        .await?,
                )?
            }
            "validate_query" => {
                let args: ValidateQueryArgs = parse_args(name, arguments)?;
                to_value(&self.validator.validate(&args.query, args.strict))?
            }
            other => {
                warn!(tool = other, "Unknown tool");
                return Err(ToolError::UnknownTool(other.to_string()));
            }
        };
        Ok(result)
    }

    fn repository(&self, explicit: Option<String>) -> Result<String, SearchError> {
        explicit
            .filter(|r| !r.trim().is_empty())
            .or_else(|| self.default_repository.clone())
            .ok_or_else(|| {
                SearchError::validation(
                    "no repository specified and no default repository configured (NGSIEM_DEFAULT_REPOSITORY)",
                )
            })
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|err| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value)
        .map_err(|err| SearchError::unexpected(err.to_string(), "serializing tool result").into())
}
