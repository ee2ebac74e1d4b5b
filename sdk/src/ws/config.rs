//! WebSocket configuration.
//!
//! Provides configuration options for the streaming feed.

use std::time::Duration;

use crate::client::config::{Environment, PRODUCTION_WS_URL};
use crate::client::retry::RetryPolicy;

use super::error::WsError;

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 10;

/// Default liveness window in seconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default reconnect base delay in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;

/// Maximum reconnect delay in seconds.
pub const MAX_RECONNECT_DELAY_SECS: u64 = 30;

/// Default per-subscription queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// WebSocket configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL.
    pub url: String,

    /// Interval between client pings.
    pub heartbeat_interval: Duration,

    /// Connection is considered lost when nothing arrives for this long.
    pub heartbeat_timeout: Duration,

    /// Bound on the TCP + TLS + upgrade handshake.
    pub connect_timeout: Duration,

    /// Reconnect backoff, independent of the REST retry policy.
    pub reconnect: RetryPolicy,

    /// Capacity of each subscription's event queue.
    pub queue_capacity: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self::new(PRODUCTION_WS_URL)
    }
}

impl WsConfig {
    /// Creates a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            reconnect: RetryPolicy::new(
                None,
                Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
                Duration::from_secs(MAX_RECONNECT_DELAY_SECS),
                0.2,
            ),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Creates a configuration pointing at an environment.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        Self::new(environment.ws_url())
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the liveness window.
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the maximum reconnection attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = Some(attempts);
        self
    }

    /// Sets the per-subscription queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), WsError> {
        if self.url.is_empty() {
            return Err(WsError::InvalidConfig("url cannot be empty".to_string()));
        }

        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(WsError::InvalidConfig(
                "url must start with ws:// or wss://".to_string(),
            ));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(WsError::InvalidConfig(
                "heartbeat_interval must be non-zero".to_string(),
            ));
        }

        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(WsError::InvalidConfig(
                "heartbeat_timeout must exceed heartbeat_interval".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(WsError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
