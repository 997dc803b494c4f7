//! Transport Error Types
//!
//! Failures a transport reports back to the runtime for a single send. The
//! runtime maps `UnknownEndpoint` and `Closed` to an unreachable peer; the
//! rest reach the caller as transport errors.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No node is registered under the endpoint
    #[error("Unknown endpoint: {endpoint}")]
    UnknownEndpoint { endpoint: String },

    /// The link to the peer failed mid-send
    #[error("Connection error: {message} (remote: {endpoint:?})")]
    Connection {
        message: String,
        endpoint: Option<String>,
    },

    /// Peer or local transport has shut down
    #[error("Transport closed: {endpoint}")]
    Closed { endpoint: String },

    /// Transport or node settings are unusable
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// The send did not complete within its budget
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    pub fn unknown_endpoint(endpoint: impl ToString) -> Self {
        Self::UnknownEndpoint {
            endpoint: endpoint.to_string(),
        }
    }

    pub fn connection(message: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self::Connection {
            message: message.into(),
            endpoint: endpoint.map(str::to_string),
        }
    }

    pub fn closed(endpoint: impl ToString) -> Self {
        Self::Closed {
            endpoint: endpoint.to_string(),
        }
    }

    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Whether sending the same frame again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Whether the peer should be treated as gone
    pub fn is_peer_gone(&self) -> bool {
        matches!(self, Self::UnknownEndpoint { .. } | Self::Closed { .. })
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownEndpoint { .. } => "unknown_endpoint",
            Self::Connection { .. } => "connection",
            Self::Closed { .. } => "closed",
            Self::Configuration { .. } => "configuration",
            Self::Timeout { .. } => "timeout",
        }
    }
}
