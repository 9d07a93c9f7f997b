// CrowdStrike Falcon API client
//
// Blocking HTTP implementation of `RemoteCommand`. Authenticates with OAuth2
// client credentials and caches the bearer token until shortly before expiry.
// Only ever constructed and used on a pool worker thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{CommandParams, CommandResponse, Operation, RemoteCommand, TransportError};
use crate::config::Credentials;
use crate::executor::{ClientFactory, ClientInitError, WorkerId};

const USER_AGENT: &str = concat!("ngsiem-core/", env!("CARGO_PKG_VERSION"));

/// Refresh tokens this long before the server-side expiry
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    1800
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

/// Outcome of a token request: a usable token, or the service's refusal
enum TokenOutcome {
    Ready(String),
    Rejected(CommandResponse),
}

/// Blocking NGSIEM API client
pub struct FalconClient {
    http: Client,
    credentials: Arc<Credentials>,
    token: Option<AccessToken>,
}

impl FalconClient {
    /// Create a client; no network traffic happens until the first command
    pub fn new(
        credentials: Arc<Credentials>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            credentials,
            token: None,
        })
    }

    fn access_token(&mut self, operation: Operation) -> Result<TokenOutcome, TransportError> {
        if let Some(token) = &self.token {
            if token.is_fresh(Instant::now()) {
                return Ok(TokenOutcome::Ready(token.value.clone()));
            }
        }

        let url = format!("{}/oauth2/token", self.credentials.base_url);
        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()
            .map_err(|e| TransportError::Http {
                operation,
                message: format!("token request: {}", e),
            })?;

        let status = response.status();
        let text = response.text().map_err(|e| TransportError::Decode {
            operation,
            message: e.to_string(),
        })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "OAuth2 token request rejected");
            return Ok(TokenOutcome::Rejected(CommandResponse::new(
                status.as_u16(),
                parse_body(&text),
            )));
        }

        let token: TokenResponse =
            serde_json::from_str(&text).map_err(|e| TransportError::Decode {
                operation,
                message: format!("token response: {}", e),
            })?;

        debug!(expires_in = token.expires_in, "Obtained OAuth2 token");
        let value = token.access_token.clone();
        self.token = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(TokenOutcome::Ready(value))
    }

    fn send(
        &self,
        operation: Operation,
        params: &CommandParams,
        token: &str,
    ) -> Result<CommandResponse, TransportError> {
        let url = endpoint_url(&self.credentials.base_url, operation, params)?;

        let request = match operation {
            Operation::StartSearchV1 => self
                .http
                .post(url)
                .json(params.body.as_ref().unwrap_or(&json!({}))),
            Operation::GetSearchStatusV1 => self.http.get(url),
            Operation::StopSearchV1 => self.http.delete(url),
        };

        let response = request
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| TransportError::Http {
                operation,
                message: e.to_string(),
            })?;

        let status_code = response.status().as_u16();
        let text = response.text().map_err(|e| TransportError::Decode {
            operation,
            message: e.to_string(),
        })?;

        Ok(CommandResponse::new(status_code, parse_body(&text)))
    }
}

impl RemoteCommand for FalconClient {
    fn command(
        &mut self,
        operation: Operation,
        params: &CommandParams,
    ) -> Result<CommandResponse, TransportError> {
        let token = match self.access_token(operation)? {
            TokenOutcome::Ready(token) => token,
            TokenOutcome::Rejected(response) => return Ok(response),
        };

        let response = self.send(operation, params, &token)?;
        if response.status_code != 401 {
            return Ok(response);
        }

        // Token revoked server-side before its expiry: refresh once
        debug!(%operation, "Bearer token rejected, refreshing");
        self.token = None;
        match self.access_token(operation)? {
            TokenOutcome::Ready(token) => self.send(operation, params, &token),
            TokenOutcome::Rejected(response) => Ok(response),
        }
    }
}

/// Build the query-job URL for an operation
fn endpoint_url(
    base_url: &str,
    operation: Operation,
    params: &CommandParams,
) -> Result<Url, TransportError> {
    let invalid = |message: String| TransportError::Http { operation, message };

    let mut url =
        Url::parse(base_url).map_err(|e| invalid(format!("invalid base URL: {}", e)))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| invalid("base URL cannot carry a path".to_string()))?;
        segments.pop_if_empty().extend([
            "humio",
            "api",
            "v1",
            "repositories",
            params.repository.as_str(),
            "queryjobs",
        ]);

        match operation {
            Operation::StartSearchV1 => {}
            Operation::GetSearchStatusV1 | Operation::StopSearchV1 => {
                let search_id =
                    params
                        .search_id
                        .as_deref()
                        .ok_or(TransportError::MissingParameter {
                            operation,
                            parameter: "search_id",
                        })?;
                segments.push(search_id);
            }
        }
    }

    Ok(url)
}

/// Parse a response body; non-JSON bodies are kept verbatim under `raw`
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

/// Constructs one `FalconClient` per worker from shared credentials
#[derive(Debug, Clone)]
pub struct FalconClientFactory {
    credentials: Arc<Credentials>,
    request_timeout: Duration,
}

impl FalconClientFactory {
    /// Create a factory
    pub fn new(credentials: Credentials, request_timeout: Duration) -> Self {
        Self {
            credentials: Arc::new(credentials),
            request_timeout,
        }
    }
}

impl ClientFactory for FalconClientFactory {
    type Client = FalconClient;

    fn create(&self, worker: &WorkerId) -> Result<FalconClient, ClientInitError> {
        FalconClient::new(Arc::clone(&self.credentials), self.request_timeout)
            .map_err(|e| ClientInitError::new(worker, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_start() {
        let params = CommandParams::repository("search-all");
        let url = endpoint_url(
            "https://api.crowdstrike.com",
            Operation::StartSearchV1,
            &params,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.crowdstrike.com/humio/api/v1/repositories/search-all/queryjobs"
        );
    }

    #[test]
    fn test_endpoint_url_encodes_segments() {
        let params = CommandParams::repository("a/b").with_search_id("P1-xyz");
        let url = endpoint_url(
            "https://api.crowdstrike.com",
            Operation::GetSearchStatusV1,
            &params,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.crowdstrike.com/humio/api/v1/repositories/a%2Fb/queryjobs/P1-xyz"
        );
    }

    #[test]
    fn test_endpoint_url_requires_search_id() {
        let params = CommandParams::repository("search-all");
        let err = endpoint_url(
            "https://api.crowdstrike.com",
            Operation::StopSearchV1,
            &params,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransportError::MissingParameter {
                parameter: "search_id",
                ..
            }
        ));
    }

    #[test]
    fn test_token_freshness() {
        let now = Instant::now();
        let token = AccessToken {
            value: "t".to_string(),
            expires_at: now + Duration::from_secs(20),
        };
        assert!(!token.is_fresh(now));

        let token = AccessToken {
            value: "t".to_string(),
            expires_at: now + Duration::from_secs(600),
        };
        assert!(token.is_fresh(now));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), json!({}));
        assert_eq!(parse_body("{\"id\":\"x\"}"), json!({"id": "x"}));
        assert_eq!(parse_body("<html>"), json!({"raw": "<html>"}));
    }
}
