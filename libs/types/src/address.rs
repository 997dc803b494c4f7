//! Endpoints, tags and correlation tokens

use crate::error::{IdentityError, Result};
use crate::{MAX_ENDPOINT_LENGTH, MAX_TAG_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport address of a process hosting actors.
///
/// The runtime treats endpoints as opaque routing keys; only the transport
/// knows how to turn one into a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create a validated endpoint
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let endpoint = Self(address.into());
        endpoint.check()?;
        Ok(endpoint)
    }

    /// Endpoint of a node that has not been given an address
    pub fn local() -> Self {
        Self(crate::LOCAL_ENDPOINT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Structural check, used on values that arrived through deserialization
    pub fn check(&self) -> Result<()> {
        let reason = if self.0.is_empty() {
            Some("empty")
        } else if self.0.len() > MAX_ENDPOINT_LENGTH {
            Some("too long")
        } else if self.0.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("contains whitespace or control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(IdentityError::InvalidEndpoint {
                endpoint: self.0.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_tag(tag: &str) -> Result<()> {
    let reason = if tag.is_empty() {
        Some("empty")
    } else if tag.len() > MAX_TAG_LENGTH {
        Some("too long")
    } else if !tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        Some("only [A-Za-z0-9_.-] allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(IdentityError::InvalidTag {
            tag: tag.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Actor kind embedded in an identity; activation factories key on it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = Self(tag.into());
        tag.check()?;
        Ok(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn check(&self) -> Result<()> {
        check_tag(&self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discovery key actors check in under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceptionTag(String);

impl ReceptionTag {
    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = Self(tag.into());
        tag.check()?;
        Ok(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn check(&self) -> Result<()> {
        check_tag(&self.0)
    }
}

impl fmt::Display for ReceptionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-call marker echoed verbatim in the reply.
///
/// Tokens are only unique on the sending side; two nodes may use the same
/// value concurrently without conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(u64);

impl CorrelationToken {
    /// Token carried by frames that are not part of a call (heartbeats, check-ins)
    pub const NONE: CorrelationToken = CorrelationToken(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corr-{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_validation() {
        assert!(Endpoint::new("node-a").is_ok());
        assert!(Endpoint::new("tcp://10.0.0.1:9000").is_ok());
        assert!(Endpoint::new("").is_err());
        assert!(Endpoint::new("node a").is_err());
        assert!(Endpoint::new("x".repeat(MAX_ENDPOINT_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_tag_validation() {
        assert!(TypeTag::new("counter").is_ok());
        assert!(TypeTag::new("game.player-2_v1").is_ok());
        assert!(TypeTag::new("").is_err());
        assert!(TypeTag::new("has:colon").is_err());
        assert!(ReceptionTag::new("has@at").is_err());

        let err = TypeTag::new("a b").unwrap_err();
        assert_eq!(err.category(), "invalid_tag");
    }

    #[test]
    fn test_correlation_token_display() {
        let token = CorrelationToken::new(42);
        assert_eq!(token.to_string(), "corr-000000000000002a");
        assert!(CorrelationToken::NONE.is_none());
        assert!(!token.is_none());
    }

    #[test]
    fn test_transparent_serialization() {
        let endpoint = Endpoint::new("node-b").unwrap();
        let json = serde_json::to_string(&endpoint).unwrap();
        assert_eq!(json, "\"node-b\"");

        let token: CorrelationToken = serde_json::from_str("7").unwrap();
        assert_eq!(token.value(), 7);
    }
}
