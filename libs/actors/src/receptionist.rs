//! Receptionist
//!
//! Per-tag registry of discoverable actors with live listings. A new
//! listing first replays every entry already known for its tag, then keeps
//! delivering check-ins as they happen. Replay and subscription happen
//! under the same lock, so no check-in can fall between them.
//!
//! Each listing sees a given identity at most once, even if that identity
//! is removed and checked in again later.

use crate::reference::{ActorReference, RemoteRef};
use futures::Stream;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use types::{ActorIdentity, Endpoint, ReceptionTag};

/// How far a check-in travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckInScope {
    /// Visible to listings on this node only
    Local,
    /// Also announced to every known peer
    #[default]
    Cluster,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceptionistEntry {
    pub identity: ActorIdentity,
    pub tag: ReceptionTag,
    pub reference: ActorReference,
}

impl ReceptionistEntry {
    pub fn new(tag: ReceptionTag, reference: ActorReference) -> Self {
        Self {
            identity: reference.identity().clone(),
            tag,
            reference,
        }
    }

    /// Entry learned from a peer's check-in
    pub fn remote(tag: ReceptionTag, identity: ActorIdentity, endpoint: Endpoint) -> Self {
        Self::new(
            tag,
            ActorReference::Remote(RemoteRef::new(identity, endpoint)),
        )
    }
}

/// An entry removed by deregistration or eviction
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedEntry {
    pub entry: ReceptionistEntry,
    pub scope: CheckInScope,
    /// Peer that announced the entry; `None` for local check-ins
    pub origin: Option<Endpoint>,
}

struct StoredEntry {
    entry: ReceptionistEntry,
    scope: CheckInScope,
    origin: Option<Endpoint>,
}

impl StoredEntry {
    fn into_removed(self) -> RemovedEntry {
        RemovedEntry {
            entry: self.entry,
            scope: self.scope,
            origin: self.origin,
        }
    }
}

struct Subscriber {
    sender: mpsc::UnboundedSender<ReceptionistEntry>,
    delivered: HashSet<ActorIdentity>,
}

impl Subscriber {
    /// False once the listing has been dropped
    fn deliver(&mut self, entry: &ReceptionistEntry) -> bool {
        if !self.delivered.insert(entry.identity.clone()) {
            return !self.sender.is_closed();
        }
        self.sender.send(entry.clone()).is_ok()
    }

    /// The identity left the tag; a later check-in is news to this listing
    fn forget(&mut self, identity: &ActorIdentity) {
        self.delivered.remove(identity);
    }
}

#[derive(Default)]
struct TagState {
    entries: Vec<StoredEntry>,
    subscribers: Vec<Subscriber>,
}

#[derive(Default)]
pub struct Receptionist {
    tags: Mutex<HashMap<ReceptionTag, TagState>>,
}

impl Receptionist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check-in made on this node. Returns false if the identity
    /// was already listed under the tag.
    pub fn check_in(&self, entry: ReceptionistEntry, scope: CheckInScope) -> bool {
        self.insert(StoredEntry {
            entry,
            scope,
            origin: None,
        })
    }

    /// Record a check-in announced by `from`
    pub fn apply_remote(&self, entry: ReceptionistEntry, from: &Endpoint) -> bool {
        self.insert(StoredEntry {
            entry,
            scope: CheckInScope::Cluster,
            origin: Some(from.clone()),
        })
    }

    fn insert(&self, stored: StoredEntry) -> bool {
        let mut tags = self.tags.lock();
        let state = tags.entry(stored.entry.tag.clone()).or_default();
        if state
            .entries
            .iter()
            .any(|existing| existing.entry.identity == stored.entry.identity)
        {
            trace!(tag = %stored.entry.tag, actor_id = %stored.entry.identity, "Duplicate check-in ignored");
            return false;
        }

        let entry = &stored.entry;
        state.subscribers.retain_mut(|subscriber| subscriber.deliver(entry));
        debug!(
            tag = %entry.tag,
            actor_id = %entry.identity,
            origin = ?stored.origin,
            subscribers = state.subscribers.len(),
            "Check-in recorded"
        );
        state.entries.push(stored);
        true
    }

    /// Live listing of every actor checked in under `tag`, past and future
    pub fn listing(&self, tag: &ReceptionTag) -> Listing {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subscriber = Subscriber {
            sender,
            delivered: HashSet::new(),
        };

        let mut tags = self.tags.lock();
        let state = tags.entry(tag.clone()).or_default();
        for stored in &state.entries {
            subscriber.deliver(&stored.entry);
        }
        state.subscribers.push(subscriber);

        Listing {
            tag: tag.clone(),
            receiver,
        }
    }

    /// Remove `identity` from every tag it was checked in under
    pub fn deregister(&self, identity: &ActorIdentity) -> Vec<RemovedEntry> {
        self.remove_where(|stored| stored.entry.identity == *identity)
    }

    /// Remove `identity` only where `from` announced it
    pub fn deregister_remote(&self, identity: &ActorIdentity, from: &Endpoint) -> Vec<RemovedEntry> {
        self.remove_where(|stored| {
            stored.entry.identity == *identity && stored.origin.as_ref() == Some(from)
        })
    }

    /// Drop every entry announced by or hosted at `endpoint`
    pub fn evict_endpoint(&self, endpoint: &Endpoint) -> Vec<RemovedEntry> {
        let removed = self.remove_where(|stored| {
            stored.origin.as_ref() == Some(endpoint)
                || stored.entry.reference.endpoint() == Some(endpoint)
        });
        if !removed.is_empty() {
            debug!(endpoint = %endpoint, evicted = removed.len(), "Evicted receptionist entries");
        }
        removed
    }

    fn remove_where<F>(&self, predicate: F) -> Vec<RemovedEntry>
    where
        F: Fn(&StoredEntry) -> bool,
    {
        let mut removed = Vec::new();
        let mut tags = self.tags.lock();
        for state in tags.values_mut() {
            let (gone, kept): (Vec<_>, Vec<_>) =
                state.entries.drain(..).partition(|stored| predicate(stored));
            state.entries = kept;
            for stored in &gone {
                for subscriber in &mut state.subscribers {
                    subscriber.forget(&stored.entry.identity);
                }
            }
            removed.extend(gone.into_iter().map(StoredEntry::into_removed));
        }
        tags.retain(|_, state| !state.entries.is_empty() || !state.subscribers.is_empty());
        removed
    }

    /// Entries for `tag` as currently known
    pub fn entries(&self, tag: &ReceptionTag) -> Vec<ReceptionistEntry> {
        self.tags
            .lock()
            .get(tag)
            .map(|state| state.entries.iter().map(|stored| stored.entry.clone()).collect())
            .unwrap_or_default()
    }

    /// Cluster-scoped check-ins made on this node, for announcing to peers
    pub fn local_cluster_entries(&self) -> Vec<ReceptionistEntry> {
        self.tags
            .lock()
            .values()
            .flat_map(|state| state.entries.iter())
            .filter(|stored| stored.origin.is_none() && stored.scope == CheckInScope::Cluster)
            .map(|stored| stored.entry.clone())
            .collect()
    }

    pub fn subscriber_count(&self, tag: &ReceptionTag) -> usize {
        self.tags.lock().get_mut(tag).map_or(0, |state| {
            state.subscribers.retain(|subscriber| !subscriber.sender.is_closed());
            state.subscribers.len()
        })
    }

    /// End every open listing
    pub fn close_all(&self) {
        let mut tags = self.tags.lock();
        for state in tags.values_mut() {
            state.subscribers.clear();
        }
    }
}

/// Live sequence of receptionist entries for one tag.
///
/// Never ends on its own; drop it once a suitable entry has been found.
/// Ends only when the hosting system shuts down.
pub struct Listing {
    tag: ReceptionTag,
    receiver: mpsc::UnboundedReceiver<ReceptionistEntry>,
}

impl Listing {
    pub fn tag(&self) -> &ReceptionTag {
        &self.tag
    }

    /// Wait for the next entry
    pub async fn next(&mut self) -> Option<ReceptionistEntry> {
        self.receiver.recv().await
    }

    /// Next entry if one is already available
    pub fn try_next(&mut self) -> Option<ReceptionistEntry> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Listing {
    type Item = ReceptionistEntry;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use uuid::Uuid;

    fn ep(name: &str) -> Endpoint {
        Endpoint::new(name).unwrap()
    }

    fn tag(name: &str) -> ReceptionTag {
        ReceptionTag::new(name).unwrap()
    }

    fn entry(tag_name: &str, host: &str) -> ReceptionistEntry {
        let identity = ActorIdentity::from_parts(Uuid::new_v4(), None, Some(ep(host)));
        ReceptionistEntry::remote(tag(tag_name), identity, ep(host))
    }

    #[test]
    fn test_listing_replays_past_then_delivers_new() {
        let receptionist = Receptionist::new();
        let first = entry("workers", "node-a");
        let second = entry("workers", "node-a");
        assert!(receptionist.check_in(first.clone(), CheckInScope::Local));

        let mut listing = receptionist.listing(&tag("workers"));
        assert_eq!(listing.try_next(), Some(first));
        assert_eq!(listing.try_next(), None);

        assert!(receptionist.check_in(second.clone(), CheckInScope::Local));
        assert_eq!(listing.try_next(), Some(second));
    }

    #[test]
    fn test_listing_is_duplicate_free_while_checked_in() {
        let receptionist = Receptionist::new();
        let worker = entry("workers", "node-b");
        let mut listing = receptionist.listing(&tag("workers"));

        assert!(receptionist.apply_remote(worker.clone(), &ep("node-b")));
        assert!(!receptionist.apply_remote(worker.clone(), &ep("node-b")));
        assert!(!receptionist.check_in(worker.clone(), CheckInScope::Cluster));

        assert_eq!(listing.try_next(), Some(worker));
        assert_eq!(listing.try_next(), None);
    }

    #[test]
    fn test_check_in_after_removal_is_delivered_again() {
        let receptionist = Receptionist::new();
        let worker = entry("workers", "node-b");
        let mut listing = receptionist.listing(&tag("workers"));
        receptionist.apply_remote(worker.clone(), &ep("node-b"));
        assert_eq!(listing.try_next(), Some(worker.clone()));

        receptionist.evict_endpoint(&ep("node-b"));
        assert!(receptionist.apply_remote(worker.clone(), &ep("node-b")));
        assert_eq!(listing.try_next(), Some(worker.clone()));

        receptionist.deregister(&worker.identity);
        assert!(receptionist.apply_remote(worker.clone(), &ep("node-b")));
        assert_eq!(listing.try_next(), Some(worker));
        assert_eq!(listing.try_next(), None);
    }

    #[test]
    fn test_tags_are_independent() {
        let receptionist = Receptionist::new();
        receptionist.check_in(entry("workers", "node-a"), CheckInScope::Local);
        let mut listing = receptionist.listing(&tag("caches"));
        assert_eq!(listing.try_next(), None);
        assert_eq!(receptionist.entries(&tag("workers")).len(), 1);
    }

    #[test]
    fn test_deregister_remote_only_removes_announced_entries() {
        let receptionist = Receptionist::new();
        let worker = entry("workers", "node-b");
        receptionist.apply_remote(worker.clone(), &ep("node-b"));

        assert!(receptionist
            .deregister_remote(&worker.identity, &ep("node-c"))
            .is_empty());
        let removed = receptionist.deregister_remote(&worker.identity, &ep("node-b"));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].origin, Some(ep("node-b")));
        assert!(receptionist.entries(&tag("workers")).is_empty());
    }

    #[test]
    fn test_evict_endpoint() {
        let receptionist = Receptionist::new();
        receptionist.apply_remote(entry("workers", "node-b"), &ep("node-b"));
        receptionist.apply_remote(entry("workers", "node-c"), &ep("node-c"));
        let local = entry("workers", "node-a");
        receptionist.check_in(local.clone(), CheckInScope::Cluster);

        let evicted = receptionist.evict_endpoint(&ep("node-b"));
        assert_eq!(evicted.len(), 1);
        assert_eq!(receptionist.entries(&tag("workers")).len(), 2);
        assert_eq!(receptionist.local_cluster_entries(), vec![local]);
    }

    #[tokio::test]
    async fn test_listing_stream_ends_on_close() {
        let receptionist = Receptionist::new();
        let worker = entry("workers", "node-a");
        receptionist.check_in(worker.clone(), CheckInScope::Local);

        let listing = receptionist.listing(&tag("workers"));
        assert_eq!(receptionist.subscriber_count(&tag("workers")), 1);
        receptionist.close_all();

        let collected: Vec<_> = listing.collect().await;
        assert_eq!(collected, vec![worker]);
    }

    #[test]
    fn test_dropped_listing_is_pruned() {
        let receptionist = Receptionist::new();
        drop(receptionist.listing(&tag("workers")));
        receptionist.check_in(entry("workers", "node-a"), CheckInScope::Local);
        assert_eq!(receptionist.subscriber_count(&tag("workers")), 0);
    }
}
