//! Resolver
//!
//! Turns an identity into a reference without touching the network. A live
//! local instance always wins; otherwise the identity is routed to its
//! origin hint, then to the configured default endpoint, then to this node
//! (where on-demand activation gets a chance).

use crate::error::{ActorError, ActorResult};
use crate::instances::InstanceTable;
use crate::reference::{ActorReference, RemoteRef};
use std::sync::Arc;
use tracing::trace;
use types::{ActorIdentity, Endpoint};

pub struct Resolver {
    local_endpoint: Endpoint,
    default_endpoint: Option<Endpoint>,
    instances: Arc<InstanceTable>,
}

impl Resolver {
    pub(crate) fn new(
        local_endpoint: Endpoint,
        default_endpoint: Option<Endpoint>,
        instances: Arc<InstanceTable>,
    ) -> Self {
        Self {
            local_endpoint,
            default_endpoint,
            instances,
        }
    }

    pub fn resolve(&self, identity: &ActorIdentity) -> ActorResult<ActorReference> {
        identity.check().map_err(|e| ActorError::InvalidIdentity {
            identity: identity.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(local) = self.instances.get(identity) {
            trace!(actor_id = %identity, "Resolved to live local instance");
            return Ok(ActorReference::Local(local));
        }

        let endpoint = self.endpoint_for(identity).clone();
        trace!(actor_id = %identity, endpoint = %endpoint, "Resolved to endpoint");
        Ok(ActorReference::Remote(RemoteRef::new(identity.clone(), endpoint)))
    }

    /// Endpoint an identity with no live local instance is routed to
    pub fn endpoint_for<'a>(&'a self, identity: &'a ActorIdentity) -> &'a Endpoint {
        identity
            .origin()
            .or(self.default_endpoint.as_ref())
            .unwrap_or(&self.local_endpoint)
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local_endpoint
    }

    pub fn is_local(&self, endpoint: &Endpoint) -> bool {
        *endpoint == self.local_endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorBehavior, ActorContext, ActorInstance, Invocation};
    use crate::metrics::SystemMetrics;
    use async_trait::async_trait;
    use codec::Payload;
    use std::sync::Weak;
    use uuid::Uuid;

    struct Noop;

    #[async_trait]
    impl ActorBehavior for Noop {
        async fn handle(&mut self, _invocation: Invocation, _ctx: &ActorContext) -> ActorResult<Payload> {
            Ok(Payload::unit())
        }
    }

    fn endpoint(name: &str) -> Endpoint {
        Endpoint::new(name).unwrap()
    }

    fn resolver(default_endpoint: Option<Endpoint>) -> (Resolver, Arc<InstanceTable>) {
        let instances = Arc::new(InstanceTable::new());
        (
            Resolver::new(endpoint("node-a"), default_endpoint, instances.clone()),
            instances,
        )
    }

    #[test]
    fn test_routing_order() {
        let (resolver, _) = resolver(Some(endpoint("node-c")));

        let hinted = ActorIdentity::from_parts(Uuid::new_v4(), None, Some(endpoint("node-b")));
        let reference = resolver.resolve(&hinted).unwrap();
        assert_eq!(reference.endpoint(), Some(&endpoint("node-b")));

        let bare = ActorIdentity::from_parts(Uuid::new_v4(), None, None);
        let reference = resolver.resolve(&bare).unwrap();
        assert_eq!(reference.endpoint(), Some(&endpoint("node-c")));

        let (resolver, _) = self::resolver(None);
        let reference = resolver.resolve(&bare).unwrap();
        assert_eq!(reference.endpoint(), Some(&endpoint("node-a")));
    }

    #[test]
    fn test_malformed_identity_rejected() {
        let (resolver, _) = resolver(None);
        let nil = ActorIdentity::from_parts(Uuid::nil(), None, None);
        assert!(matches!(
            resolver.resolve(&nil),
            Err(ActorError::InvalidIdentity { .. })
        ));
    }

    #[tokio::test]
    async fn test_live_instance_wins_over_hint() {
        let (resolver, instances) = resolver(None);
        let identity = ActorIdentity::from_parts(Uuid::new_v4(), None, Some(endpoint("node-b")));
        let instance = ActorInstance::spawn(
            Box::new(Noop),
            ActorContext::new(identity.clone(), Weak::new()),
            Arc::new(SystemMetrics::default()),
        );
        instances.insert(identity.clone(), instance);

        let reference = resolver.resolve(&identity).unwrap();
        assert!(reference.is_local());
        assert_eq!(reference.identity(), &identity);
    }
}
