//! On-Demand Activation
//!
//! Factories are consulted in registration order. The first one whose
//! predicate accepts the identity and whose constructor returns a behavior
//! wins; if none does, the identity is unresolvable on this node.

use crate::actor::{ActorBehavior, ActorInstance, LocalRef};
use crate::error::{ActorError, ActorResult};
use crate::instances::{InstanceTable, Lookup};
use parking_lot::RwLock;
use tracing::{debug, info};
use types::{ActorIdentity, TypeTag};

type Predicate = Box<dyn Fn(&ActorIdentity) -> bool + Send + Sync>;
type Constructor = Box<dyn Fn(&ActorIdentity) -> Option<Box<dyn ActorBehavior>> + Send + Sync>;

struct Factory {
    predicate: Predicate,
    constructor: Constructor,
}

#[derive(Default)]
pub struct ActivationHandler {
    factories: RwLock<Vec<Factory>>,
}

impl ActivationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for identities matching `predicate`.
    ///
    /// Both closures run while the instance table is locked: keep them
    /// cheap and do not call back into the actor system from them.
    pub fn register_factory<P, C>(&self, predicate: P, constructor: C)
    where
        P: Fn(&ActorIdentity) -> bool + Send + Sync + 'static,
        C: Fn(&ActorIdentity) -> Option<Box<dyn ActorBehavior>> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write();
        factories.push(Factory {
            predicate: Box::new(predicate),
            constructor: Box::new(constructor),
        });
        debug!(factories = factories.len(), "Activation factory registered");
    }

    /// Register a factory for every identity carrying `type_tag`
    pub fn register_type<C>(&self, type_tag: TypeTag, constructor: C)
    where
        C: Fn(&ActorIdentity) -> Box<dyn ActorBehavior> + Send + Sync + 'static,
    {
        self.register_factory(
            move |identity| identity.type_tag() == Some(&type_tag),
            move |identity| Some(constructor(identity)),
        );
    }

    /// Build a behavior for `identity` from the first willing factory
    pub fn construct(&self, identity: &ActorIdentity) -> Option<Box<dyn ActorBehavior>> {
        self.factories
            .read()
            .iter()
            .filter(|factory| (factory.predicate)(identity))
            .find_map(|factory| (factory.constructor)(identity))
    }

    pub fn factory_count(&self) -> usize {
        self.factories.read().len()
    }

    /// Return the live instance for `identity`, creating it if a factory
    /// accepts the identity.
    pub(crate) fn activate<S>(
        &self,
        table: &InstanceTable,
        identity: &ActorIdentity,
        spawn: S,
    ) -> ActorResult<(LocalRef, Lookup)>
    where
        S: FnOnce(Box<dyn ActorBehavior>) -> ActorInstance,
    {
        let result = table.get_or_insert_with(identity, || {
            let behavior = self
                .construct(identity)
                .ok_or_else(|| ActorError::unresolvable(identity))?;
            Ok(spawn(behavior))
        });

        match &result {
            Ok((_, Lookup::Created)) => info!(actor_id = %identity, "Actor activated on demand"),
            Ok((_, Lookup::Existing)) => {}
            Err(e) => debug!(actor_id = %identity, error = %e, "Activation declined"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorContext, Invocation};
    use crate::metrics::SystemMetrics;
    use async_trait::async_trait;
    use codec::Payload;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Weak};
    use uuid::Uuid;

    struct Noop;

    #[async_trait]
    impl ActorBehavior for Noop {
        async fn handle(&mut self, _invocation: Invocation, _ctx: &ActorContext) -> ActorResult<Payload> {
            Ok(Payload::unit())
        }
    }

    fn identity(tag: &str) -> ActorIdentity {
        ActorIdentity::from_parts(Uuid::new_v4(), Some(TypeTag::new(tag).unwrap()), None)
    }

    fn spawner(identity: &ActorIdentity) -> impl FnOnce(Box<dyn ActorBehavior>) -> ActorInstance {
        let context = ActorContext::new(identity.clone(), Weak::new());
        move |behavior| ActorInstance::spawn(behavior, context, Arc::new(SystemMetrics::default()))
    }

    #[tokio::test]
    async fn test_no_matching_factory_is_unresolvable() {
        let handler = ActivationHandler::new();
        handler.register_type(TypeTag::new("counter").unwrap(), |_| Box::new(Noop));
        let table = InstanceTable::new();

        let id = identity("player");
        let err = handler.activate(&table, &id, spawner(&id)).unwrap_err();
        assert!(matches!(err, ActorError::UnresolvableIdentity { .. }));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_first_willing_factory_wins() {
        let handler = ActivationHandler::new();
        let declined = Arc::new(AtomicUsize::new(0));
        let counter = declined.clone();
        handler.register_factory(
            |_| true,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            },
        );
        handler.register_type(TypeTag::new("counter").unwrap(), |_| Box::new(Noop));
        assert_eq!(handler.factory_count(), 2);

        let table = InstanceTable::new();
        let id = identity("counter");
        let (_, lookup) = handler.activate(&table, &id, spawner(&id)).unwrap();
        assert_eq!(lookup, Lookup::Created);
        assert_eq!(declined.load(Ordering::SeqCst), 1);

        let (_, lookup) = handler.activate(&table, &id, spawner(&id)).unwrap();
        assert_eq!(lookup, Lookup::Existing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_arrivals_create_one_instance() {
        let handler = Arc::new(ActivationHandler::new());
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = constructed.clone();
        handler.register_type(TypeTag::new("counter").unwrap(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(Noop)
        });

        let table = Arc::new(InstanceTable::new());
        let id = identity("counter");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let handler = handler.clone();
                let table = table.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    handler
                        .activate(&table, &id, spawner(&id))
                        .map(|(reference, _)| reference)
                })
            })
            .collect();

        let mut references = Vec::new();
        for task in tasks {
            references.push(task.await.unwrap().unwrap());
        }

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(references.windows(2).all(|pair| pair[0] == pair[1]));
    }
}
