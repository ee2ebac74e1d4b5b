//! Client configuration.
//!
//! Provides the environment selector and configuration options for the
//! HTTP client.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::ClientError;
use super::retry::RetryPolicy;

/// Production REST base URL.
pub const PRODUCTION_BASE_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";

/// Demo REST base URL.
pub const DEMO_BASE_URL: &str = "https://demo-api.kalshi.co/trade-api/v2";

/// Production WebSocket URL.
pub const PRODUCTION_WS_URL: &str = "wss://api.elections.kalshi.com/trade-api/ws/v2";

/// Demo WebSocket URL.
pub const DEMO_WS_URL: &str = "wss://demo-api.kalshi.co/trade-api/ws/v2";

/// Environment variable selecting the environment.
pub const ENV_ENVIRONMENT: &str = "KALSHI_ENV";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Exchange environment. Changes only the endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    /// Real-money exchange.
    #[default]
    Production,
    /// Demo exchange.
    Demo,
}

impl Environment {
    /// Returns the REST base URL.
    #[must_use]
    pub const fn rest_url(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_BASE_URL,
            Self::Demo => DEMO_BASE_URL,
        }
    }

    /// Returns the WebSocket URL.
    #[must_use]
    pub const fn ws_url(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_WS_URL,
            Self::Demo => DEMO_WS_URL,
        }
    }

    /// Reads `KALSHI_ENV`, defaulting to production when unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable holds an unknown value.
    pub fn from_env() -> Result<Self, ClientError> {
        match std::env::var(ENV_ENVIRONMENT) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::Production),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Demo => write!(f, "demo"),
        }
    }
}

impl FromStr for Environment {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Self::Production),
            "demo" => Ok(Self::Demo),
            other => Err(ClientError::InvalidConfig(format!(
                "unknown environment: {}",
                other
            ))),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for the API, including the `/trade-api/v2` prefix.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Retry policy for retryable failures.
    pub retry: RetryPolicy,

    /// User agent string.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

impl ClientConfig {
    /// Creates a new configuration with the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            user_agent: format!("kalshi-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Creates a configuration pointing at an environment.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        Self::new(environment.rest_url())
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.is_empty() {
            return Err(ClientError::InvalidConfig(
                "base_url cannot be empty".to_string(),
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ClientError::InvalidConfig(
                "base_url must start with http:// or https://".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "timeout must be non-zero".to_string(),
            ));
        }

        if self.retry.max_attempts == Some(0) {
            return Err(ClientError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
