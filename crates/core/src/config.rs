// Configuration loading
//
// Credentials and pool sizing come from the environment (optionally seeded from
// a `.env` file). The loaded values are immutable and shared read-only by every
// worker that constructs a client.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://api.crowdstrike.com";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is missing or empty
    #[error("{0} is not set; copy .env.example to .env and configure your CrowdStrike credentials")]
    Missing(&'static str),

    /// A variable still holds a template placeholder
    #[error("{0} still holds a placeholder value")]
    Placeholder(&'static str),

    /// A variable could not be parsed
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// API credential triple used to construct worker clients
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
}

impl Credentials {
    /// Create credentials, rejecting empty and placeholder values
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let client_id = check_credential("CROWDSTRIKE_CLIENT_ID", client_id.into())?;
        let client_secret = check_credential("CROWDSTRIKE_CLIENT_SECRET", client_secret.into())?;
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::Missing("CROWDSTRIKE_BASE_URL"));
        }

        Ok(Self {
            client_id,
            client_secret,
            base_url,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn check_credential(name: &'static str, value: String) -> Result<String, ConfigError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ConfigError::Missing(name));
    }
    if value.starts_with("your_") {
        return Err(ConfigError::Placeholder(name));
    }
    Ok(value)
}

/// Process-wide configuration
#[derive(Debug, Clone)]
pub struct NgsiemConfig {
    /// Credential triple for worker clients
    pub credentials: Credentials,
    /// Repository used when a caller omits one
    pub default_repository: Option<String>,
    /// Worker pool size (None = platform default)
    pub thread_pool_size: Option<usize>,
    /// Per-request timeout applied by the HTTP client
    pub request_timeout: Duration,
}

impl NgsiemConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `CROWDSTRIKE_CLIENT_ID`, `CROWDSTRIKE_CLIENT_SECRET`: required
    /// - `CROWDSTRIKE_BASE_URL`: API base URL (default: "https://api.crowdstrike.com")
    /// - `NGSIEM_DEFAULT_REPOSITORY`: repository used when a call omits one
    /// - `NGSIEM_THREAD_POOL_SIZE`: worker pool size (default: platform default)
    /// - `NGSIEM_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 60)
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; the variables may come from the process environment
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let credentials = Credentials::new(
            lookup("CROWDSTRIKE_CLIENT_ID").unwrap_or_default(),
            lookup("CROWDSTRIKE_CLIENT_SECRET").unwrap_or_default(),
            lookup("CROWDSTRIKE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )?;

        let default_repository = lookup("NGSIEM_DEFAULT_REPOSITORY")
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let thread_pool_size = match lookup("NGSIEM_THREAD_POOL_SIZE") {
            None => None,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => Some(size),
                _ => {
                    warn!(value = %raw, "Invalid NGSIEM_THREAD_POOL_SIZE, using default");
                    None
                }
            },
        };

        let request_timeout = match lookup("NGSIEM_REQUEST_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "NGSIEM_REQUEST_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
        };

        Ok(Self {
            credentials,
            default_repository,
            thread_pool_size,
            request_timeout,
        })
    }
}
