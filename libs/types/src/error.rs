//! Identity parsing and validation errors

use thiserror::Error;

/// Errors raised while constructing or parsing addressing values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Tag is empty, too long, or contains characters outside `[A-Za-z0-9_.-]`
    #[error("Invalid tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: &'static str },

    /// Endpoint is empty, too long, or contains whitespace/control characters
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        endpoint: String,
        reason: &'static str,
    },

    /// Token portion is not a 128-bit hex value, or is the nil token
    #[error("Invalid identity token '{token}'")]
    InvalidToken { token: String },
}

/// Result alias for identity operations
pub type Result<T> = std::result::Result<T, IdentityError>;

impl IdentityError {
    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            IdentityError::InvalidTag { .. } => "invalid_tag",
            IdentityError::InvalidEndpoint { .. } => "invalid_endpoint",
            IdentityError::InvalidToken { .. } => "invalid_token",
        }
    }
}
