//! WebSocket error types.
//!
//! `Closed` and `InvalidConfig` are returned to callers. The remaining
//! variants describe feed failures that the connection task recovers from by
//! resnapshotting or reconnecting.

use std::fmt;

/// WebSocket errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsError {
    /// Connection attempt failed.
    Connection(String),

    /// Established connection dropped or went silent.
    ConnectionLost(String),

    /// Handshake rejected the credentials.
    Authentication(String),

    /// A delta skipped ahead of the expected sequence.
    SequenceGap {
        /// Sequence that would have been accepted.
        expected: u64,
        /// Sequence that arrived.
        received: u64,
    },

    /// Feed and local book disagree.
    ProtocolViolation(String),

    /// Failed to serialize message.
    Serialization(String),

    /// Failed to deserialize message.
    Deserialization(String),

    /// Server returned an error.
    Server {
        /// Error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// Feed shut down.
    Closed,

    /// Invalid configuration.
    InvalidConfig(String),
}

impl WsError {
    /// Returns true if the error is handled by reconnecting.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionLost(_) | Self::Authentication(_)
        )
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "connection failed: {}", msg),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::Authentication(msg) => write!(f, "authentication failed: {}", msg),
            Self::SequenceGap { expected, received } => {
                write!(f, "sequence gap: expected {}, received {}", expected, received)
            }
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            Self::Serialization(msg) => write!(f, "serialization failed: {}", msg),
            Self::Deserialization(msg) => write!(f, "deserialization failed: {}", msg),
            Self::Server { code, message } => write!(f, "server error [{}]: {}", code, message),
            Self::Closed => write!(f, "connection closed"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for WsError {}

impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsProtoError;

        match err {
            WsProtoError::Http(resp)
                if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 =>
            {
                Self::Authentication(format!("handshake rejected with {}", resp.status()))
            }
            closed @ (WsProtoError::ConnectionClosed | WsProtoError::AlreadyClosed) => {
                Self::ConnectionLost(closed.to_string())
            }
            other => Self::Connection(other.to_string()),
        }
    }
}
