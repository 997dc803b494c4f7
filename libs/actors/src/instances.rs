//! Live instance table
//!
//! Maps identities to the local instance currently serving them. All
//! mutation happens under one lock, which is what makes first activation
//! atomic: the lookup, the factory call and the insert form a single
//! critical section, so concurrent first arrivals for one identity can
//! never create two instances.

use crate::actor::{ActorInstance, LocalRef};
use crate::error::ActorResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use types::ActorIdentity;

#[derive(Default)]
pub(crate) struct InstanceTable {
    instances: Mutex<HashMap<ActorIdentity, ActorInstance>>,
}

/// How [`InstanceTable::get_or_insert_with`] obtained its reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    Existing,
    Created,
}

impl InstanceTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Live instance for `identity`, if any
    pub(crate) fn get(&self, identity: &ActorIdentity) -> Option<LocalRef> {
        self.instances
            .lock()
            .get(identity)
            .filter(|instance| instance.is_alive())
            .map(|instance| instance.reference().clone())
    }

    /// Return the live instance or build one with `create`.
    ///
    /// `create` runs under the table lock and must not call back into the
    /// table. A dead instance (stopped or failed to start) is replaced.
    pub(crate) fn get_or_insert_with<F>(
        &self,
        identity: &ActorIdentity,
        create: F,
    ) -> ActorResult<(LocalRef, Lookup)>
    where
        F: FnOnce() -> ActorResult<ActorInstance>,
    {
        let mut instances = self.instances.lock();
        if let Some(instance) = instances.get(identity) {
            if instance.is_alive() {
                return Ok((instance.reference().clone(), Lookup::Existing));
            }
        }

        let instance = create()?;
        let reference = instance.reference().clone();
        instances.insert(identity.clone(), instance);
        Ok((reference, Lookup::Created))
    }

    /// Insert a freshly spawned instance under a new identity
    pub(crate) fn insert(&self, identity: ActorIdentity, instance: ActorInstance) -> LocalRef {
        let reference = instance.reference().clone();
        self.instances.lock().insert(identity, instance);
        reference
    }

    pub(crate) fn remove(&self, identity: &ActorIdentity) -> Option<ActorInstance> {
        self.instances.lock().remove(identity)
    }

    pub(crate) fn drain(&self) -> Vec<(ActorIdentity, ActorInstance)> {
        self.instances.lock().drain().collect()
    }

    pub(crate) fn identities(&self) -> Vec<ActorIdentity> {
        self.instances
            .lock()
            .iter()
            .filter(|(_, instance)| instance.is_alive())
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.lock().len()
    }
}
