//! Actor references
//!
//! A reference says how to reach an identity right now: through a local
//! mailbox or through the transport towards one endpoint. Callers never
//! need to care which; [`crate::ActorSystem::invoke`] accepts either.

use crate::actor::LocalRef;
use std::fmt;
use types::{ActorIdentity, Endpoint};

/// Identity bound to the endpoint expected to host it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    identity: ActorIdentity,
    endpoint: Endpoint,
}

impl RemoteRef {
    pub fn new(identity: ActorIdentity, endpoint: Endpoint) -> Self {
        Self { identity, endpoint }
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActorReference {
    Local(LocalRef),
    Remote(RemoteRef),
}

impl ActorReference {
    pub fn identity(&self) -> &ActorIdentity {
        match self {
            ActorReference::Local(local) => local.identity(),
            ActorReference::Remote(remote) => remote.identity(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ActorReference::Local(_))
    }

    /// Hosting endpoint for remote references
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match self {
            ActorReference::Local(_) => None,
            ActorReference::Remote(remote) => Some(remote.endpoint()),
        }
    }
}

impl From<LocalRef> for ActorReference {
    fn from(local: LocalRef) -> Self {
        ActorReference::Local(local)
    }
}

impl From<RemoteRef> for ActorReference {
    fn from(remote: RemoteRef) -> Self {
        ActorReference::Remote(remote)
    }
}

impl fmt::Display for ActorReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorReference::Local(local) => write!(f, "local({})", local.identity()),
            ActorReference::Remote(remote) => {
                write!(f, "remote({} via {})", remote.identity(), remote.endpoint())
            }
        }
    }
}
