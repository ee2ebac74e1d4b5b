//! Client error types.
//!
//! Provides the error taxonomy for REST requests and the classification of
//! raw HTTP responses into it.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

/// Details of an HTTP error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    /// HTTP status code.
    pub status: u16,

    /// Exchange error code, verbatim.
    pub code: String,

    /// Human readable message.
    pub message: String,

    /// Whether retrying the same request may succeed.
    pub retryable: bool,
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]: {}", self.status, self.code, self.message)
    }
}

/// Client errors.
#[derive(Debug)]
pub enum ClientError {
    /// Credentials or signature rejected (401/403).
    Authentication(ErrorEnvelope),

    /// No such market, order or resource (404).
    NotFound(ErrorEnvelope),

    /// Balance insufficient for the order.
    InsufficientFunds(ErrorEnvelope),

    /// Exchange-side order rejection; the code is kept verbatim.
    OrderRejected(ErrorEnvelope),

    /// Request quota exceeded (429).
    RateLimited {
        /// Response details.
        envelope: ErrorEnvelope,
        /// Server-supplied wait before retrying.
        retry_after: Option<Duration>,
    },

    /// Any other API error response.
    Api(ErrorEnvelope),

    /// HTTP request failed before a response arrived.
    Request(reqwest::Error),

    /// Request timeout.
    Timeout,

    /// Failed to deserialize response.
    Deserialization(String),

    /// Invalid configuration.
    InvalidConfig(String),

    /// Unreadable or malformed key material.
    InvalidCredentials(String),

    /// The client was shut down while the request was pending.
    Cancelled,
}

impl ClientError {
    /// Returns true if the request may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout => true,
            Self::Api(envelope) => envelope.retryable,
            Self::Request(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Returns the server-supplied retry delay, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the response details for errors produced from a response.
    #[must_use]
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            Self::Authentication(e)
            | Self::NotFound(e)
            | Self::InsufficientFunds(e)
            | Self::OrderRejected(e)
            | Self::Api(e)
            | Self::RateLimited { envelope: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Returns the HTTP status, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.envelope().map(|e| e.status)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication(e) => write!(f, "authentication failed {}", e),
            Self::NotFound(e) => write!(f, "not found {}", e),
            Self::InsufficientFunds(e) => write!(f, "insufficient funds {}", e),
            Self::OrderRejected(e) => write!(f, "order rejected {}", e),
            Self::RateLimited { retry_after, .. } => {
                if let Some(delay) = retry_after {
                    write!(f, "rate limited, retry after {:.1} seconds", delay.as_secs_f64())
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::Api(e) => write!(f, "API error {}", e),
            Self::Request(e) => write!(f, "HTTP request failed: {}", e),
            Self::Timeout => write!(f, "request timeout"),
            Self::Deserialization(msg) => write!(f, "deserialization failed: {}", msg),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::InvalidCredentials(msg) => write!(f, "invalid credentials: {}", msg),
            Self::Cancelled => write!(f, "request cancelled"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}

/// Nested error body: `{"error": {"code": .., "message": ..}}`.
#[derive(Debug, Deserialize)]
struct NestedErrorBody {
    error: FlatErrorBody,
}

/// Flat error body: `{"code": .., "message": ..}`.
#[derive(Debug, Deserialize)]
struct FlatErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Longest server-requested wait honoured before a retry.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Parses a `Retry-After` header value given in seconds.
///
/// Values above [`MAX_RETRY_AFTER`] are clamped to it.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let delay = Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_AFTER);
    Some(delay.min(MAX_RETRY_AFTER))
}

/// Classifies an error response.
///
/// `order_write` marks requests that create or cancel orders, where a
/// generic 4xx is an exchange-side rejection.
#[must_use]
pub fn classify(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
    order_write: bool,
) -> ClientError {
    let (code, message) = match serde_json::from_str::<NestedErrorBody>(body) {
        Ok(nested) => (nested.error.code, nested.error.message),
        Err(_) => match serde_json::from_str::<FlatErrorBody>(body) {
            Ok(flat) => (flat.code, flat.message),
            Err(_) => (None, None),
        },
    };

    let envelope = ErrorEnvelope {
        status: status.as_u16(),
        code: code.unwrap_or_else(|| status.as_str().to_string()),
        message: message.unwrap_or_else(|| body.to_string()),
        retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Authentication(envelope),
        StatusCode::NOT_FOUND => ClientError::NotFound(envelope),
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited {
            envelope,
            retry_after,
        },
        s if s.is_client_error() && envelope.code.to_ascii_lowercase().contains("insufficient") => {
            ClientError::InsufficientFunds(envelope)
        }
        s if s.is_client_error() && order_write => ClientError::OrderRejected(envelope),
        _ => ClientError::Api(envelope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_authentication() {
        let err = classify(StatusCode::UNAUTHORIZED, r#"{"message":"Unauthorized"}"#, None, false);
        assert!(matches!(err, ClientError::Authentication(_)));
        assert!(!err.is_retryable());
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify(StatusCode::NOT_FOUND, r#"{"message":"Not found"}"#, None, false);
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[test]
    fn test_classify_insufficient_funds() {
        let body = r#"{"error":{"code":"insufficient_balance","message":"not enough cash"}}"#;
        let err = classify(StatusCode::BAD_REQUEST, body, None, true);
        match &err {
            ClientError::InsufficientFunds(e) => {
                assert_eq!(e.code, "insufficient_balance");
                assert_eq!(e.message, "not enough cash");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_order_rejected_keeps_code() {
        let body = r#"{"error":{"code":"market_closed","message":"market is closed"}}"#;
        let err = classify(StatusCode::CONFLICT, body, None, true);
        match err {
            ClientError::OrderRejected(e) => assert_eq!(e.code, "market_closed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_classify_generic_client_error_on_read() {
        let body = r#"{"error":{"code":"bad_request","message":"bad cursor"}}"#;
        let err = classify(StatusCode::BAD_REQUEST, body, None, false);
        match &err {
            ClientError::Api(e) => {
                assert_eq!(e.code, "bad_request");
                assert!(!e.retryable);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_classify_server_error_is_retryable() {
        let err = classify(StatusCode::BAD_GATEWAY, "upstream down", None, false);
        assert!(err.is_retryable());
        let envelope = err.envelope().expect("envelope");
        assert_eq!(envelope.code, "502");
        assert_eq!(envelope.message, "upstream down");
    }

    #[test]
    fn test_classify_rate_limited() {
        let err = classify(
            StatusCode::TOO_MANY_REQUESTS,
            "",
            Some(Duration::from_secs(2)),
            true,
        );
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(err.to_string(), "rate limited, retry after 2.0 seconds");
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 0.5 "), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_clamps_huge_values() {
        assert_eq!(parse_retry_after("1e30"), Some(MAX_RETRY_AFTER));
        assert_eq!(parse_retry_after("86400"), Some(MAX_RETRY_AFTER));
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("NaN"), None);
    }

    #[test]
    fn test_classify_with_huge_retry_after() {
        let retry_after = parse_retry_after("1e30");
        let err = classify(StatusCode::TOO_MANY_REQUESTS, "", retry_after, false);
        assert!(matches!(err, ClientError::RateLimited { .. }));
        assert_eq!(err.retry_after(), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_client_error_display() {
        assert_eq!(ClientError::Timeout.to_string(), "request timeout");
        assert_eq!(ClientError::Cancelled.to_string(), "request cancelled");
        let err = ClientError::InvalidCredentials("bad pem".to_string());
        assert_eq!(err.to_string(), "invalid credentials: bad pem");
    }
}
