//! Codec errors for frame processing
//!
//! Every variant carries enough context to log a dropped frame without
//! re-reading it. Two families matter to callers: serialization failures,
//! which are surfaced as the result of the call that produced them, and
//! framing failures (magic, checksum, truncation), which the runtime absorbs
//! and logs because they usually come from unrelated or broken peers.

use thiserror::Error;

/// Frame and payload encoding errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Value cannot be represented on the wire, or a payload does not match
    /// the type the receiver asked for
    #[error("Serialization error ({context}): {message}")]
    Serialization { context: String, message: String },

    /// Frame does not start with the protocol magic bytes
    #[error("Invalid magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// Frame was produced by an unsupported protocol version
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch { expected: u8, actual: u8 },

    /// Kind byte does not name a known message kind
    #[error("Unknown message kind {kind}")]
    UnknownKind { kind: u8 },

    /// Buffer shorter than the header or the declared body
    #[error("Truncated frame: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    /// Frame integrity check failed
    #[error("Checksum mismatch: expected {expected:#010x}, calculated {calculated:#010x}")]
    ChecksumMismatch { expected: u32, calculated: u32 },

    /// Body exceeds the protocol limit
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Body lacks a field the frame kind requires
    #[error("Malformed {kind} frame: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

impl CodecError {
    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Serialization {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a malformed-frame error
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            reason: reason.into(),
        }
    }

    /// Whether the failure concerns payload representability rather than framing
    pub fn is_serialization(&self) -> bool {
        matches!(self, CodecError::Serialization { .. } | CodecError::FrameTooLarge { .. })
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            CodecError::Serialization { .. } => "serialization",
            CodecError::InvalidMagic { .. } => "invalid_magic",
            CodecError::ProtocolVersionMismatch { .. } => "version_mismatch",
            CodecError::UnknownKind { .. } => "unknown_kind",
            CodecError::Truncated { .. } => "truncated",
            CodecError::ChecksumMismatch { .. } => "checksum",
            CodecError::FrameTooLarge { .. } => "frame_too_large",
            CodecError::Malformed { .. } => "malformed",
        }
    }
}
