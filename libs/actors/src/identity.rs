//! Identity Registry
//!
//! Allocates identities for actors created on this node and checks the
//! structure of identities that arrive from elsewhere.

use crate::error::{ActorError, ActorResult};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use types::{ActorIdentity, Endpoint, TypeTag};
use uuid::Uuid;

/// Allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityStats {
    pub allocated: u64,
    pub validated: u64,
    pub rejected: u64,
}

#[derive(Debug)]
pub struct IdentityRegistry {
    local_endpoint: Endpoint,
    allocated: AtomicU64,
    validated: AtomicU64,
    rejected: AtomicU64,
}

impl IdentityRegistry {
    pub fn new(local_endpoint: Endpoint) -> Self {
        Self {
            local_endpoint,
            allocated: AtomicU64::new(0),
            validated: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Allocate a fresh identity whose origin hint is this node.
    ///
    /// The token is a version 4 UUID drawn from the OS random source, so
    /// identities are never reused in practice.
    pub fn allocate(&self, type_tag: Option<TypeTag>) -> ActorIdentity {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        let identity = ActorIdentity::from_parts(
            Uuid::new_v4(),
            type_tag,
            Some(self.local_endpoint.clone()),
        );
        debug!(actor_id = %identity, "Identity allocated");
        identity
    }

    /// Structural check only; says nothing about liveness
    pub fn validate(&self, identity: &ActorIdentity) -> bool {
        self.validated.fetch_add(1, Ordering::Relaxed);
        let ok = identity.is_well_formed();
        if !ok {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        ok
    }

    /// Like [`validate`](Self::validate) but with the reason
    pub fn check(&self, identity: &ActorIdentity) -> ActorResult<()> {
        self.validated.fetch_add(1, Ordering::Relaxed);
        identity.check().map_err(|e| {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            ActorError::InvalidIdentity {
                identity: identity.to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Parse the text form `[tag:]<hex>[@endpoint]`
    pub fn parse(&self, text: &str) -> ActorResult<ActorIdentity> {
        text.parse::<ActorIdentity>().map_err(|e| {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            ActorError::InvalidIdentity {
                identity: text.to_string(),
                reason: e.to_string(),
            }
        })
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local_endpoint
    }

    pub fn stats(&self) -> IdentityStats {
        IdentityStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            validated: self.validated.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
