//! Actor runtime errors
//!
//! Errors that concern one call are returned as that call's result. Errors
//! that concern no caller in particular (duplicate replies, malformed frames
//! from unrelated peers) are logged and counted where they happen; the
//! [`ActorError::DuplicateReply`] variant exists so the dispatcher can report
//! them to its own logging path.

use codec::{CodecError, FailureKind, RemoteFailure};
use network::TransportError;
use thiserror::Error;
use types::{ActorIdentity, CorrelationToken, Endpoint, IdentityError};

/// Main actor runtime error type
#[derive(Error, Debug, Clone)]
pub enum ActorError {
    /// No live instance and no factory willing to create one
    #[error("Unresolvable identity: {identity}")]
    UnresolvableIdentity { identity: String },

    /// Argument or result not representable, or not of the expected type
    #[error("Serialization error ({context}): {message}")]
    Serialization { context: String, message: String },

    /// Call deadline elapsed before a reply arrived
    #[error("Call to {identity} timed out after {timeout_ms}ms")]
    Timeout { identity: String, timeout_ms: u64 },

    /// Endpoint is marked unreachable or has gone away
    #[error("Peer unreachable: {endpoint}")]
    PeerUnreachable { endpoint: String },

    /// Reply for a correlation token that was already resolved
    #[error("Duplicate reply for {correlation}")]
    DuplicateReply { correlation: CorrelationToken },

    /// Frame from a peer speaking another protocol version
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch { expected: u8, actual: u8 },

    /// Structurally malformed identity
    #[error("Invalid identity {identity}: {reason}")]
    InvalidIdentity { identity: String, reason: String },

    /// The target's handler returned an error
    #[error("Handler error: {message}")]
    Handler { message: String },

    /// Instance stopped before the invocation completed
    #[error("Actor {identity} stopped")]
    ActorStopped { identity: String },

    /// Transport refused the frame
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Runtime is shutting down
    #[error("Actor system shutting down")]
    Shutdown,
}

/// Result type alias for actor operations
pub type ActorResult<T> = std::result::Result<T, ActorError>;

impl ActorError {
    pub fn unresolvable(identity: &ActorIdentity) -> Self {
        Self::UnresolvableIdentity {
            identity: identity.to_string(),
        }
    }

    pub fn timeout(identity: &ActorIdentity, timeout_ms: u64) -> Self {
        Self::Timeout {
            identity: identity.to_string(),
            timeout_ms,
        }
    }

    pub fn peer_unreachable(endpoint: &Endpoint) -> Self {
        Self::PeerUnreachable {
            endpoint: endpoint.to_string(),
        }
    }

    pub fn stopped(identity: &ActorIdentity) -> Self {
        Self::ActorStopped {
            identity: identity.to_string(),
        }
    }

    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Convert a send failure, treating a vanished peer as unreachable
    pub fn from_send(error: TransportError, endpoint: &Endpoint) -> Self {
        if error.is_peer_gone() {
            Self::peer_unreachable(endpoint)
        } else {
            Self::Transport(error)
        }
    }

    /// Form sent back to a remote caller
    pub fn to_remote_failure(&self) -> RemoteFailure {
        let kind = match self {
            ActorError::UnresolvableIdentity { .. } | ActorError::InvalidIdentity { .. } => {
                FailureKind::UnresolvableIdentity
            }
            ActorError::Serialization { .. } => FailureKind::Serialization,
            ActorError::Timeout { .. } => FailureKind::Timeout,
            ActorError::PeerUnreachable { .. } | ActorError::Transport(_) => {
                FailureKind::PeerUnreachable
            }
            ActorError::ProtocolVersionMismatch { .. } => FailureKind::ProtocolVersionMismatch,
            ActorError::Handler { .. } | ActorError::DuplicateReply { .. } => FailureKind::Handler,
            ActorError::ActorStopped { .. } => FailureKind::ActorStopped,
            ActorError::Shutdown => FailureKind::Shutdown,
        };
        RemoteFailure::new(kind, self.to_string())
    }

    /// Rebuild the error a remote node reported for a call to `target` at `endpoint`.
    ///
    /// Timeouts and unreachable peers seen by the remote handler are failures
    /// of that handler, not of this call, so they surface as `Handler`.
    pub fn from_remote(failure: RemoteFailure, target: &ActorIdentity, endpoint: &Endpoint) -> Self {
        match failure.kind {
            FailureKind::UnresolvableIdentity => Self::unresolvable(target),
            FailureKind::Serialization => Self::Serialization {
                context: format!("remote {}", endpoint),
                message: failure.message,
            },
            FailureKind::ActorStopped => Self::stopped(target),
            FailureKind::Shutdown => Self::peer_unreachable(endpoint),
            FailureKind::Timeout
            | FailureKind::PeerUnreachable
            | FailureKind::ProtocolVersionMismatch
            | FailureKind::Handler => Self::Handler {
                message: failure.message,
            },
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            ActorError::Timeout { .. } => true,
            ActorError::PeerUnreachable { .. } => true,
            ActorError::Transport(e) => e.is_retryable(),
            ActorError::ActorStopped { .. } => true,
            _ => false,
        }
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ActorError::UnresolvableIdentity { .. } => "unresolvable_identity",
            ActorError::Serialization { .. } => "serialization",
            ActorError::Timeout { .. } => "timeout",
            ActorError::PeerUnreachable { .. } => "peer_unreachable",
            ActorError::DuplicateReply { .. } => "duplicate_reply",
            ActorError::ProtocolVersionMismatch { .. } => "version_mismatch",
            ActorError::InvalidIdentity { .. } => "invalid_identity",
            ActorError::Handler { .. } => "handler",
            ActorError::ActorStopped { .. } => "actor_stopped",
            ActorError::Transport(_) => "transport",
            ActorError::Shutdown => "shutdown",
        }
    }
}

impl From<CodecError> for ActorError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Serialization { context, message } => {
                ActorError::Serialization { context, message }
            }
            CodecError::ProtocolVersionMismatch { expected, actual } => {
                ActorError::ProtocolVersionMismatch { expected, actual }
            }
            other => ActorError::Serialization {
                context: other.category().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<IdentityError> for ActorError {
    fn from(error: IdentityError) -> Self {
        let identity = match &error {
            IdentityError::InvalidTag { tag, .. } => tag.clone(),
            IdentityError::InvalidEndpoint { endpoint, .. } => endpoint.clone(),
            IdentityError::InvalidToken { token } => token.clone(),
        };
        ActorError::InvalidIdentity {
            identity,
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn target() -> ActorIdentity {
        ActorIdentity::from_parts(Uuid::from_u128(7), None, None)
    }

    #[test]
    fn test_error_categorization() {
        assert_eq!(ActorError::unresolvable(&target()).category(), "unresolvable_identity");
        assert_eq!(ActorError::timeout(&target(), 100).category(), "timeout");
        assert!(ActorError::timeout(&target(), 100).is_retryable());
        assert!(!ActorError::handler("boom").is_retryable());
        assert!(!ActorError::Shutdown.is_retryable());
    }

    #[test]
    fn test_remote_failure_roundtrip() {
        let endpoint = Endpoint::new("node-b").unwrap();

        let failure = ActorError::unresolvable(&target()).to_remote_failure();
        assert_eq!(failure.kind, FailureKind::UnresolvableIdentity);
        assert!(matches!(
            ActorError::from_remote(failure, &target(), &endpoint),
            ActorError::UnresolvableIdentity { .. }
        ));

        // A remote handler's own timeout is not this caller's timeout
        let failure = ActorError::timeout(&target(), 5).to_remote_failure();
        assert!(matches!(
            ActorError::from_remote(failure, &target(), &endpoint),
            ActorError::Handler { .. }
        ));
    }

    #[test]
    fn test_send_failure_mapping() {
        let endpoint = Endpoint::new("node-b").unwrap();
        assert!(matches!(
            ActorError::from_send(TransportError::closed("node-b"), &endpoint),
            ActorError::PeerUnreachable { .. }
        ));
        assert!(matches!(
            ActorError::from_send(TransportError::timeout("send", 10), &endpoint),
            ActorError::Transport(_)
        ));
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: ActorError = CodecError::serialization("argument 0", "bad").into();
        assert_eq!(err.category(), "serialization");

        let err: ActorError = CodecError::ProtocolVersionMismatch { expected: 1, actual: 2 }.into();
        assert!(matches!(err, ActorError::ProtocolVersionMismatch { expected: 1, actual: 2 }));
    }
}
