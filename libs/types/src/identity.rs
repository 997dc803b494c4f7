//! Actor Identity
//!
//! An [`ActorIdentity`] names one logical actor for its whole life, whether
//! or not an instance of it currently exists anywhere. The token is a random
//! 128-bit value; the optional type tag tells activation factories what kind
//! of actor to build, and the optional origin hint tells resolvers where the
//! actor is expected to live.
//!
//! Identities are immutable values. Random allocation happens in the
//! runtime's identity registry; this type only carries and checks structure.
//! Equality, ordering and hashing look at the token alone: the tag and the
//! origin are routing metadata about the same logical actor.

use crate::address::{Endpoint, TypeTag};
use crate::error::{IdentityError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique, comparable, serializable actor name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorIdentity {
    token: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_tag: Option<TypeTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<Endpoint>,
}

impl ActorIdentity {
    /// Assemble an identity from already-generated parts
    pub fn from_parts(token: Uuid, type_tag: Option<TypeTag>, origin: Option<Endpoint>) -> Self {
        Self {
            token,
            type_tag,
            origin,
        }
    }

    /// Same logical token, different origin hint
    pub fn with_origin(mut self, origin: Endpoint) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn type_tag(&self) -> Option<&TypeTag> {
        self.type_tag.as_ref()
    }

    pub fn origin(&self) -> Option<&Endpoint> {
        self.origin.as_ref()
    }

    /// Structural check of every component.
    ///
    /// Says nothing about whether an instance exists.
    pub fn check(&self) -> Result<()> {
        if self.token.is_nil() {
            return Err(IdentityError::InvalidToken {
                token: self.token.simple().to_string(),
            });
        }
        if let Some(tag) = &self.type_tag {
            tag.check()?;
        }
        if let Some(origin) = &self.origin {
            origin.check()?;
        }
        Ok(())
    }

    pub fn is_well_formed(&self) -> bool {
        self.check().is_ok()
    }
}

impl PartialEq for ActorIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for ActorIdentity {}

impl Hash for ActorIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
    }
}

impl PartialOrd for ActorIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ActorIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.token.cmp(&other.token)
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.type_tag {
            write!(f, "{}:", tag)?;
        }
        write!(f, "{}", self.token.simple())?;
        if let Some(origin) = &self.origin {
            write!(f, "@{}", origin)?;
        }
        Ok(())
    }
}

impl FromStr for ActorIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        // Tags and tokens never contain '@', so the first one starts the origin
        let (head, origin) = match s.split_once('@') {
            Some((head, origin)) => (head, Some(Endpoint::new(origin)?)),
            None => (s, None),
        };

        let (type_tag, token) = match head.split_once(':') {
            Some((tag, token)) => (Some(TypeTag::new(tag)?), token),
            None => (None, head),
        };

        if token.len() != 32 {
            return Err(IdentityError::InvalidToken {
                token: token.to_string(),
            });
        }
        let token = Uuid::parse_str(token).map_err(|_| IdentityError::InvalidToken {
            token: token.to_string(),
        })?;

        let identity = Self::from_parts(token, type_tag, origin);
        identity.check()?;
        Ok(identity)
    }
}
