//! Actor System Core
//!
//! One [`ActorSystem`] per node. It owns the identity registry, the live
//! instance table, activation factories, the dispatcher, the receptionist
//! and the failure detector, and runs two background tasks: the inbound
//! frame loop and the heartbeat/sweep loop. Both hold only a weak handle,
//! so dropping every `ActorSystem` clone lets the runtime wind down.
//!
//! Inbound invocations are enqueued on the target's mailbox from the
//! inbound loop itself, in transport delivery order, before any await.
//! That is what keeps per-target ordering intact across the wire.

use crate::activation::ActivationHandler;
use crate::actor::{ActorBehavior, ActorContext, ActorInstance, Invocation, LocalRef};
use crate::dispatcher::Dispatcher;
use crate::error::{ActorError, ActorResult};
use crate::failure_detector::{FailureDetector, LivenessEvent, PeerStatus};
use crate::identity::{IdentityRegistry, IdentityStats};
use crate::instances::{InstanceTable, Lookup};
use crate::metrics::{SystemMetrics, SystemStats};
use crate::receptionist::{CheckInScope, Listing, Receptionist, ReceptionistEntry};
use crate::reference::{ActorReference, RemoteRef};
use crate::resolver::Resolver;
use codec::{
    check_selector, Arguments, CheckIn, CodecError, Deregister, FailureKind, Frame, Heartbeat,
    InvocationCodec, InvocationEnvelope, InvocationReply, MessageKind, Payload, RemoteFailure,
    WireEnvelope,
};
use network::{InboundFrame, Transport, TransportError, TransportMetrics};
use parking_lot::Mutex;
use runtime_config::RuntimeConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use types::{ActorIdentity, Endpoint, ReceptionTag, TypeTag};
use uuid::Uuid;

/// Handle to a running node. Cheap to clone.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

pub(crate) struct SystemInner {
    system_id: String,
    local_endpoint: Endpoint,
    config: RuntimeConfig,
    codec: InvocationCodec,
    identities: IdentityRegistry,
    instances: Arc<InstanceTable>,
    activation: ActivationHandler,
    resolver: Resolver,
    dispatcher: Dispatcher,
    receptionist: Receptionist,
    failure_detector: FailureDetector,
    transport: Arc<dyn Transport>,
    metrics: Arc<SystemMetrics>,
    background: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
    heartbeat_sequence: AtomicU64,
}

impl ActorSystem {
    /// Start a node on `transport`.
    ///
    /// The transport's endpoint is authoritative; a different
    /// `node.endpoint` in `config` is logged and ignored. Must be called
    /// from within a Tokio runtime.
    pub fn start(config: RuntimeConfig, transport: Arc<dyn Transport>) -> ActorResult<Self> {
        config
            .validate()
            .map_err(|e| TransportError::configuration(format!("{:#}", e), None))?;

        let local_endpoint = transport.local_endpoint().clone();
        if config.node.endpoint != local_endpoint {
            warn!(
                configured = %config.node.endpoint,
                transport = %local_endpoint,
                "Configured endpoint differs from transport endpoint, using transport's"
            );
        }

        let system_id = format!("system-{}", Uuid::new_v4());
        let metrics = Arc::new(SystemMetrics::default());
        let instances = Arc::new(InstanceTable::new());
        let failure_detector = FailureDetector::new(
            config.failure_detector.silence_threshold(),
            config.failure_detector.max_consecutive_timeouts,
        );
        for peer in &config.node.peers {
            failure_detector.track(peer);
        }

        let inner = Arc::new(SystemInner {
            identities: IdentityRegistry::new(local_endpoint.clone()),
            resolver: Resolver::new(
                local_endpoint.clone(),
                config.node.default_endpoint.clone(),
                instances.clone(),
            ),
            dispatcher: Dispatcher::new(
                transport.clone(),
                config.calls.duplicate_history,
                metrics.clone(),
            ),
            activation: ActivationHandler::new(),
            receptionist: Receptionist::new(),
            codec: InvocationCodec::new(),
            background: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
            heartbeat_sequence: AtomicU64::new(0),
            failure_detector,
            instances,
            metrics,
            transport,
            system_id,
            local_endpoint,
            config,
        });

        let (sink, inbound) = mpsc::unbounded_channel();
        inner.transport.on_receive(sink)?;

        let inbound_task = tokio::spawn(inbound_loop(Arc::downgrade(&inner), inbound));
        let heartbeat_task = tokio::spawn(heartbeat_loop(
            Arc::downgrade(&inner),
            inner.config.failure_detector.heartbeat_interval(),
        ));
        inner.background.lock().extend([inbound_task, heartbeat_task]);

        info!(
            system_id = %inner.system_id,
            endpoint = %inner.local_endpoint,
            peers = inner.config.node.peers.len(),
            "Actor system started"
        );
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<SystemInner>) -> Self {
        Self { inner }
    }

    pub fn system_id(&self) -> &str {
        &self.inner.system_id
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.inner.local_endpoint
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    // ---- Identity Registry -------------------------------------------------

    /// Allocate a fresh identity hosted on this node
    pub fn allocate(&self, type_tag: Option<TypeTag>) -> ActorIdentity {
        self.inner.identities.allocate(type_tag)
    }

    pub fn validate(&self, identity: &ActorIdentity) -> bool {
        self.inner.identities.validate(identity)
    }

    /// Parse an identity from its text form
    pub fn parse_identity(&self, text: &str) -> ActorResult<ActorIdentity> {
        self.inner.identities.parse(text)
    }

    pub fn identity_stats(&self) -> IdentityStats {
        self.inner.identities.stats()
    }

    // ---- Activation --------------------------------------------------------

    /// See [`ActivationHandler::register_factory`]
    pub fn register_factory<P, C>(&self, predicate: P, constructor: C)
    where
        P: Fn(&ActorIdentity) -> bool + Send + Sync + 'static,
        C: Fn(&ActorIdentity) -> Option<Box<dyn ActorBehavior>> + Send + Sync + 'static,
    {
        self.inner.activation.register_factory(predicate, constructor);
    }

    /// See [`ActivationHandler::register_type`]
    pub fn register_type<C>(&self, type_tag: TypeTag, constructor: C)
    where
        C: Fn(&ActorIdentity) -> Box<dyn ActorBehavior> + Send + Sync + 'static,
    {
        self.inner.activation.register_type(type_tag, constructor);
    }

    /// Live local instance for `identity`, activating one if needed
    fn activate(&self, identity: &ActorIdentity) -> ActorResult<LocalRef> {
        self.inner.identities.check(identity)?;
        if self.is_shutting_down() {
            return Err(ActorError::Shutdown);
        }

        let system = Arc::downgrade(&self.inner);
        let metrics = self.inner.metrics.clone();
        let (local, lookup) =
            self.inner
                .activation
                .activate(&self.inner.instances, identity, |behavior| {
                    ActorInstance::spawn(behavior, ActorContext::new(identity.clone(), system), metrics)
                })?;
        if lookup == Lookup::Created {
            SystemMetrics::incr(&self.inner.metrics.actors_activated);
        }
        Ok(local)
    }

    /// Start `behavior` under a newly allocated identity on this node
    pub fn spawn<B: ActorBehavior>(
        &self,
        behavior: B,
        type_tag: Option<TypeTag>,
    ) -> ActorResult<ActorReference> {
        if self.is_shutting_down() {
            return Err(ActorError::Shutdown);
        }

        let identity = self.inner.identities.allocate(type_tag);
        let context = ActorContext::new(identity.clone(), Arc::downgrade(&self.inner));
        let instance = ActorInstance::spawn(Box::new(behavior), context, self.inner.metrics.clone());
        let local = self.inner.instances.insert(identity.clone(), instance);
        SystemMetrics::incr(&self.inner.metrics.actors_spawned);

        info!(
            actor_id = %identity,
            system_id = %self.inner.system_id,
            actor_type = std::any::type_name::<B>(),
            "Actor spawned"
        );
        Ok(ActorReference::Local(local))
    }

    /// Stop the local instance serving `identity`.
    ///
    /// The identity stays valid: the next invocation activates a fresh
    /// instance if a factory accepts it.
    pub async fn deactivate(&self, identity: &ActorIdentity) -> ActorResult<()> {
        let instance = self
            .inner
            .instances
            .remove(identity)
            .ok_or_else(|| ActorError::unresolvable(identity))?;
        instance.stop(self.inner.config.calls.default_timeout()).await;
        SystemMetrics::incr(&self.inner.metrics.actors_stopped);
        info!(actor_id = %identity, "Actor deactivated");
        Ok(())
    }

    /// Identities with a live instance on this node
    pub fn live_instances(&self) -> Vec<ActorIdentity> {
        self.inner.instances.identities()
    }

    // ---- Resolver ----------------------------------------------------------

    /// Reference for `identity`; never touches the network
    pub fn resolve(&self, identity: &ActorIdentity) -> ActorResult<ActorReference> {
        self.inner.resolver.resolve(identity)
    }

    // ---- Invocation --------------------------------------------------------

    /// Call `selector` with serializable `args` and decode the result as `R`.
    ///
    /// A tuple is spread into positional arguments; `()` means none.
    pub async fn call<R, A>(&self, reference: &ActorReference, selector: &str, args: &A) -> ActorResult<R>
    where
        R: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        self.call_with_timeout(reference, selector, args, self.inner.config.calls.default_timeout())
            .await
    }

    pub async fn call_with_timeout<R, A>(
        &self,
        reference: &ActorReference,
        selector: &str,
        args: &A,
        timeout: Duration,
    ) -> ActorResult<R>
    where
        R: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        let arguments = Arguments::pack(args)?;
        let payload = self
            .invoke_with_timeout(reference, selector, arguments, timeout)
            .await?;
        Ok(payload.decode()?)
    }

    /// Untyped invocation with the configured default timeout
    pub async fn invoke(
        &self,
        reference: &ActorReference,
        selector: &str,
        arguments: Arguments,
    ) -> ActorResult<Payload> {
        self.invoke_with_timeout(reference, selector, arguments, self.inner.config.calls.default_timeout())
            .await
    }

    pub async fn invoke_with_timeout(
        &self,
        reference: &ActorReference,
        selector: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> ActorResult<Payload> {
        if self.is_shutting_down() {
            return Err(ActorError::Shutdown);
        }
        check_selector(selector)?;

        match reference {
            ActorReference::Local(local) if local.is_alive() => {
                SystemMetrics::incr(&self.inner.metrics.local_calls);
                local.invoke(Invocation::new(selector, arguments), timeout).await
            }
            ActorReference::Local(local) => {
                self.invoke_local(local.identity(), selector, arguments, timeout)
                    .await
            }
            ActorReference::Remote(remote) if self.inner.resolver.is_local(remote.endpoint()) => {
                self.invoke_local(remote.identity(), selector, arguments, timeout)
                    .await
            }
            ActorReference::Remote(remote) => {
                self.invoke_remote(remote, selector, arguments, timeout)
                    .await
            }
        }
    }

    async fn invoke_local(
        &self,
        identity: &ActorIdentity,
        selector: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> ActorResult<Payload> {
        let local = self.activate(identity)?;
        SystemMetrics::incr(&self.inner.metrics.local_calls);
        local.invoke(Invocation::new(selector, arguments), timeout).await
    }

    async fn invoke_remote(
        &self,
        remote: &RemoteRef,
        selector: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> ActorResult<Payload> {
        let endpoint = remote.endpoint();
        if self.inner.config.calls.fail_fast_unreachable
            && self.inner.failure_detector.is_unreachable(endpoint)
        {
            SystemMetrics::incr(&self.inner.metrics.calls_failed_unreachable);
            debug!(actor_id = %remote.identity(), endpoint = %endpoint, "Failing fast, peer unreachable");
            return Err(ActorError::peer_unreachable(endpoint));
        }

        let result = self
            .inner
            .dispatcher
            .call(remote, selector, arguments, timeout)
            .await;
        if let Err(ActorError::Timeout { .. }) = &result {
            if let Some(event) = self.inner.failure_detector.record_timeout(endpoint) {
                self.handle_liveness(event);
            }
        }
        result
    }

    // ---- Receptionist ------------------------------------------------------

    /// Make `reference` discoverable under `tag` across the cluster
    pub async fn check_in(&self, reference: &ActorReference, tag: ReceptionTag) -> ActorResult<bool> {
        self.check_in_with_scope(reference, tag, CheckInScope::Cluster)
            .await
    }

    /// Record locally first, then announce to peers for cluster scope.
    ///
    /// Returns false if the identity was already listed under `tag`.
    pub async fn check_in_with_scope(
        &self,
        reference: &ActorReference,
        tag: ReceptionTag,
        scope: CheckInScope,
    ) -> ActorResult<bool> {
        self.inner.identities.check(reference.identity())?;
        if self.is_shutting_down() {
            return Err(ActorError::Shutdown);
        }

        let entry = ReceptionistEntry::new(tag, reference.clone());
        if !self.inner.receptionist.check_in(entry.clone(), scope) {
            return Ok(false);
        }
        SystemMetrics::incr(&self.inner.metrics.check_ins);

        if scope == CheckInScope::Cluster && self.inner.config.receptionist.propagate {
            let frame = Frame::CheckIn(self.check_in_frame(&entry));
            let reached = self.broadcast(&frame).await;
            debug!(
                actor_id = %entry.identity,
                tag = %entry.tag,
                peers_reached = reached,
                "Check-in propagated"
            );
        }
        Ok(true)
    }

    fn check_in_frame(&self, entry: &ReceptionistEntry) -> CheckIn {
        CheckIn {
            identity: entry.identity.clone(),
            tag: entry.tag.clone(),
            endpoint: entry
                .reference
                .endpoint()
                .unwrap_or(&self.inner.local_endpoint)
                .clone(),
        }
    }

    /// Remove `identity` from every tag; cluster-scope removals reach peers.
    ///
    /// Returns how many entries were removed on this node.
    pub async fn deregister(&self, identity: &ActorIdentity) -> ActorResult<usize> {
        let removed = self.inner.receptionist.deregister(identity);
        let announce = removed
            .iter()
            .any(|r| r.origin.is_none() && r.scope == CheckInScope::Cluster);

        if announce && self.inner.config.receptionist.propagate {
            let frame = Frame::Deregister(Deregister {
                identity: identity.clone(),
            });
            self.broadcast(&frame).await;
        }
        debug!(actor_id = %identity, removed = removed.len(), "Deregistered");
        Ok(removed.len())
    }

    /// Live listing for `tag`: every known entry, then every new check-in
    pub fn listing(&self, tag: &ReceptionTag) -> Listing {
        self.inner.receptionist.listing(tag)
    }

    /// Entries currently known for `tag`
    pub fn entries(&self, tag: &ReceptionTag) -> Vec<ReceptionistEntry> {
        self.inner.receptionist.entries(tag)
    }

    // ---- Failure detection -------------------------------------------------

    /// Declare `endpoint` unreachable now, as the detector would
    pub fn mark_unreachable(&self, endpoint: &Endpoint) {
        if let Some(event) = self.inner.failure_detector.mark_unreachable(endpoint) {
            self.handle_liveness(event);
        }
    }

    pub fn peer_status(&self, endpoint: &Endpoint) -> Option<PeerStatus> {
        self.inner.failure_detector.status(endpoint)
    }

    pub fn peers(&self) -> Vec<(Endpoint, PeerStatus)> {
        self.inner.failure_detector.peers()
    }

    fn handle_liveness(&self, event: LivenessEvent) {
        match event {
            LivenessEvent::Unreachable(endpoint) => {
                SystemMetrics::incr(&self.inner.metrics.peers_marked_unreachable);
                let failed = self.inner.dispatcher.fail_endpoint(&endpoint);
                let evicted = self.inner.receptionist.evict_endpoint(&endpoint);
                SystemMetrics::add(&self.inner.metrics.evicted_entries, evicted.len() as u64);
                info!(
                    endpoint = %endpoint,
                    failed_calls = failed,
                    evicted_entries = evicted.len(),
                    "Peer unreachable"
                );
            }
            LivenessEvent::Reachable(endpoint) => {
                if !self.inner.config.receptionist.sync_on_join
                    || !self.inner.config.receptionist.propagate
                {
                    return;
                }
                let entries = self.inner.receptionist.local_cluster_entries();
                if entries.is_empty() {
                    return;
                }
                let system = self.clone();
                tokio::spawn(async move {
                    system.push_check_ins(&endpoint, entries).await;
                });
            }
        }
    }

    /// Announce local cluster check-ins to one peer
    async fn push_check_ins(&self, endpoint: &Endpoint, entries: Vec<ReceptionistEntry>) {
        let count = entries.len();
        for entry in entries {
            let frame = Frame::CheckIn(self.check_in_frame(&entry));
            if let Err(e) = self.inner.dispatcher.send_frame(endpoint, &frame).await {
                debug!(endpoint = %endpoint, error = %e, "Check-in sync interrupted");
                return;
            }
        }
        debug!(endpoint = %endpoint, entries = count, "Check-ins synced to peer");
    }

    /// Configured peers plus every endpoint the transport knows
    fn peer_endpoints(&self) -> Vec<Endpoint> {
        let mut peers: BTreeSet<Endpoint> = self.inner.config.node.peers.iter().cloned().collect();
        peers.extend(self.inner.transport.peers());
        peers.remove(&self.inner.local_endpoint);
        peers.into_iter().collect()
    }

    /// Best-effort send to every reachable peer; returns how many accepted
    async fn broadcast(&self, frame: &Frame) -> usize {
        let bytes = match self.inner.dispatcher.encode(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(kind = %frame.kind(), error = %e, "Could not encode broadcast frame");
                return 0;
            }
        };

        let mut reached = 0;
        for peer in self.peer_endpoints() {
            if self.inner.failure_detector.is_unreachable(&peer) {
                trace!(endpoint = %peer, "Skipping unreachable peer");
                continue;
            }
            match self.inner.transport.send(&peer, bytes.clone()).await {
                Ok(()) => reached += 1,
                Err(e) => debug!(endpoint = %peer, error = %e, "Broadcast send failed"),
            }
        }
        reached
    }

    /// One heartbeat round plus a liveness sweep
    async fn heartbeat_round(&self) {
        let sequence = self.inner.heartbeat_sequence.fetch_add(1, Ordering::Relaxed);
        match self.inner.dispatcher.encode(&Frame::Heartbeat(Heartbeat { sequence })) {
            Ok(bytes) => {
                let transport_peers: BTreeSet<Endpoint> =
                    self.inner.transport.peers().into_iter().collect();
                let mut sent = self.inner.transport.heartbeat(bytes.clone()).await;
                for peer in &self.inner.config.node.peers {
                    if !transport_peers.contains(peer)
                        && self.inner.transport.send(peer, bytes.clone()).await.is_ok()
                    {
                        sent += 1;
                    }
                }
                for peer in &transport_peers {
                    self.inner.failure_detector.track(peer);
                }
                trace!(sequence, peers = sent, "Heartbeat sent");
            }
            Err(e) => warn!(error = %e, "Could not encode heartbeat"),
        }

        let now = Instant::now();
        for event in self.inner.failure_detector.sweep(now) {
            self.handle_liveness(event);
        }
        let expired = self.inner.dispatcher.expire_overdue(now);
        if expired > 0 {
            debug!(expired, "Expired abandoned calls");
        }
    }

    // ---- Inbound -----------------------------------------------------------

    fn handle_inbound(&self, inbound: InboundFrame) {
        let InboundFrame { from, frame: bytes } = inbound;
        let frame = match self.inner.codec.decode(&bytes) {
            Ok(frame) => frame,
            Err(CodecError::ProtocolVersionMismatch { expected, actual }) => {
                SystemMetrics::incr(&self.inner.metrics.version_mismatches);
                warn!(
                    endpoint = %from,
                    expected,
                    actual,
                    "Dropping frame with unsupported protocol version"
                );
                return;
            }
            Err(e) => {
                SystemMetrics::incr(&self.inner.metrics.malformed_frames);
                warn!(
                    endpoint = %from,
                    error = %e,
                    error_category = e.category(),
                    "Dropping malformed frame"
                );
                self.reject_invocation(&from, &bytes, &e);
                return;
            }
        };

        if let Some(event) = self.inner.failure_detector.observe(&from) {
            self.handle_liveness(event);
        }

        match frame {
            Frame::Invoke(envelope) => self.handle_invoke(from, envelope),
            Frame::Reply(reply) => self.inner.dispatcher.handle_reply(&from, reply),
            Frame::CheckIn(check_in) => self.handle_remote_check_in(&from, check_in),
            Frame::Deregister(deregister) => {
                let removed = self
                    .inner
                    .receptionist
                    .deregister_remote(&deregister.identity, &from);
                debug!(actor_id = %deregister.identity, endpoint = %from, removed = removed.len(), "Remote deregistration");
            }
            Frame::Heartbeat(heartbeat) => {
                trace!(endpoint = %from, sequence = heartbeat.sequence, "Heartbeat received");
            }
            Frame::Forget(forget) => {
                SystemMetrics::incr(&self.inner.metrics.forgets_received);
                debug!(endpoint = %from, correlation = %forget.correlation, "Caller abandoned call");
            }
        }
    }

    /// Answer an intact invoke frame whose body does not describe a call, so
    /// the caller gets a serialization failure instead of its deadline
    fn reject_invocation(&self, from: &Endpoint, bytes: &[u8], error: &CodecError) {
        let header = match WireEnvelope::verify_header(bytes) {
            Ok(header) if header.kind == MessageKind::Invoke && !header.correlation.is_none() => {
                header
            }
            _ => return,
        };
        let failure = RemoteFailure::new(FailureKind::Serialization, error.to_string());
        let reply = InvocationReply::failure(header.correlation, failure);

        let inner = self.inner.clone();
        let from = from.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.dispatcher.send_frame(&from, &Frame::Reply(reply)).await {
                debug!(endpoint = %from, correlation = %header.correlation, error = %e, "Rejection not delivered");
            }
        });
    }

    fn handle_invoke(&self, from: Endpoint, envelope: InvocationEnvelope) {
        let InvocationEnvelope {
            target,
            selector,
            arguments,
            correlation,
        } = envelope;
        trace!(actor_id = %target, endpoint = %from, correlation = %correlation, selector = %selector, "Inbound invocation");

        // Enqueue now so delivery order is mailbox order
        let invocation = Invocation::from_remote(selector, arguments, from.clone());
        let queued = self
            .activate(&target)
            .and_then(|local| local.enqueue(invocation));

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = match queued {
                Ok(receiver) => receiver
                    .await
                    .unwrap_or_else(|_| Err(ActorError::stopped(&target))),
                Err(e) => Err(e),
            };
            let reply = match result {
                Ok(payload) => InvocationReply::success(correlation, payload),
                Err(e) => InvocationReply::failure(correlation, e.to_remote_failure()),
            };

            match inner.dispatcher.send_frame(&from, &Frame::Reply(reply)).await {
                Ok(()) => {}
                Err(e @ ActorError::Serialization { .. }) => {
                    // Result too large or otherwise unencodable: report that instead
                    let reply = InvocationReply::failure(correlation, e.to_remote_failure());
                    if let Err(e) = inner.dispatcher.send_frame(&from, &Frame::Reply(reply)).await {
                        debug!(endpoint = %from, correlation = %correlation, error = %e, "Reply not delivered");
                    }
                }
                Err(e) => {
                    debug!(endpoint = %from, correlation = %correlation, error = %e, "Reply not delivered");
                }
            }
        });
    }

    fn handle_remote_check_in(&self, from: &Endpoint, check_in: CheckIn) {
        let CheckIn {
            identity,
            tag,
            endpoint,
        } = check_in;

        let reference = if endpoint == self.inner.local_endpoint {
            match self.inner.instances.get(&identity) {
                Some(local) => ActorReference::Local(local),
                None => ActorReference::Remote(RemoteRef::new(identity.clone(), endpoint)),
            }
        } else {
            ActorReference::Remote(RemoteRef::new(identity.clone(), endpoint))
        };

        let entry = ReceptionistEntry::new(tag, reference);
        if self.inner.receptionist.apply_remote(entry, from) {
            SystemMetrics::incr(&self.inner.metrics.check_ins);
        }
    }

    // ---- Monitoring --------------------------------------------------------

    pub fn metrics(&self) -> Arc<SystemMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn stats(&self) -> SystemStats {
        self.inner.metrics.snapshot()
    }

    pub fn transport_metrics(&self) -> TransportMetrics {
        self.inner.transport.metrics()
    }

    /// Remote calls still waiting for a reply
    pub fn pending_calls(&self) -> usize {
        self.inner.dispatcher.pending_count()
    }

    // ---- Shutdown ----------------------------------------------------------

    /// Stop background tasks, fail pending calls with `Shutdown`, withdraw
    /// cluster check-ins from peers and stop every local instance.
    pub async fn shutdown(&self) -> ActorResult<()> {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(system_id = %self.inner.system_id, "Shutting down actor system");

        let background: Vec<_> = self.inner.background.lock().drain(..).collect();
        for task in background {
            task.abort();
        }

        let failed = self.inner.dispatcher.fail_all(ActorError::Shutdown);

        if self.inner.config.receptionist.propagate {
            let announced: BTreeSet<ActorIdentity> = self
                .inner
                .receptionist
                .local_cluster_entries()
                .into_iter()
                .map(|entry| entry.identity)
                .collect();
            for identity in announced {
                self.broadcast(&Frame::Deregister(Deregister { identity })).await;
            }
        }
        self.inner.receptionist.close_all();

        let grace = self.inner.config.calls.default_timeout();
        let instances = self.inner.instances.drain();
        let stopped = instances.len();
        futures::future::join_all(
            instances
                .into_iter()
                .map(|(_, instance)| instance.stop(grace)),
        )
        .await;
        SystemMetrics::add(&self.inner.metrics.actors_stopped, stopped as u64);

        info!(
            system_id = %self.inner.system_id,
            failed_calls = failed,
            stopped_actors = stopped,
            "Actor system shutdown complete"
        );
        Ok(())
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("system_id", &self.inner.system_id)
            .field("endpoint", &self.inner.local_endpoint.to_string())
            .field("instances", &self.inner.instances.len())
            .finish()
    }
}

async fn inbound_loop(system: Weak<SystemInner>, mut inbound: mpsc::UnboundedReceiver<InboundFrame>) {
    while let Some(frame) = inbound.recv().await {
        let Some(inner) = system.upgrade() else {
            break;
        };
        ActorSystem::from_inner(inner).handle_inbound(frame);
    }
    debug!("Inbound loop finished");
}

async fn heartbeat_loop(system: Weak<SystemInner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = system.upgrade() else {
            break;
        };
        ActorSystem::from_inner(inner).heartbeat_round().await;
    }
    debug!("Heartbeat loop finished");
}
