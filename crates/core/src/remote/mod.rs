// Remote command interface
//
// The search API is reached through a synchronous, blocking `command` call.
// Implementations take `&mut self` and need not be `Send` or `Sync`: a client
// is created on a worker thread and never leaves it.

mod falcon;
mod simulated;

pub use falcon::{FalconClient, FalconClientFactory};
pub use simulated::{
    SimulatedClient, SimulatedClientFactory, SimulatedSearchService, SimulationStats,
};

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Remote operations used by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Start a query job
    StartSearchV1,
    /// Fetch the status (and results, once done) of a query job
    GetSearchStatusV1,
    /// Stop a query job
    StopSearchV1,
}

impl Operation {
    /// Operation name as used by the remote API
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::StartSearchV1 => "StartSearchV1",
            Operation::GetSearchStatusV1 => "GetSearchStatusV1",
            Operation::StopSearchV1 => "StopSearchV1",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one remote command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandParams {
    pub repository: String,
    pub search_id: Option<String>,
    pub body: Option<Value>,
}

impl CommandParams {
    /// Parameters addressing a repository
    pub fn repository(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Default::default()
        }
    }

    /// Address a specific search job
    pub fn with_search_id(mut self, search_id: impl Into<String>) -> Self {
        self.search_id = Some(search_id.into());
        self
    }

    /// Attach a JSON request body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response of one remote command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub status_code: u16,
    pub body: Value,
}

impl CommandResponse {
    /// Create a response
    pub fn new(status_code: u16, body: Value) -> Self {
        Self { status_code, body }
    }

    /// Body as a JSON object, empty when the body is not an object
    pub fn body_object(&self) -> Map<String, Value> {
        self.body.as_object().cloned().unwrap_or_default()
    }

    /// Error list reported by the remote service, or the whole body
    pub fn error_detail(&self) -> String {
        match self.body.get("errors") {
            Some(errors) if !errors.is_null() && errors != &Value::Array(vec![]) => {
                errors.to_string()
            }
            _ => self.body.to_string(),
        }
    }
}

/// Failure to obtain any response at all
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP layer failure (connect, TLS, timeout)
    #[error("{operation} request failed: {message}")]
    Http {
        operation: Operation,
        message: String,
    },

    /// Response body was not valid JSON
    #[error("{operation} returned an unreadable body: {message}")]
    Decode {
        operation: Operation,
        message: String,
    },

    /// The command is missing a parameter it requires
    #[error("{operation} requires parameter '{parameter}'")]
    MissingParameter {
        operation: Operation,
        parameter: &'static str,
    },
}

/// Blocking remote command invocation
pub trait RemoteCommand {
    /// Invoke one remote operation and return its status code and body
    fn command(
        &mut self,
        operation: Operation,
        params: &CommandParams,
    ) -> Result<CommandResponse, TransportError>;
}
