//! Remote Call Dispatcher
//!
//! Outbound calls get a correlation token and a pending entry holding a
//! single-assignment reply slot. Whoever wins the slot's compare-and-set
//! (the reply, the deadline, the failure detector or a cancelled caller)
//! decides the call's outcome; everyone else is told they lost and the
//! caller sees exactly one result.
//!
//! Tokens are remembered for a while after they resolve so that a late or
//! duplicated reply can be told apart from a reply nobody asked for.

use crate::error::{ActorError, ActorResult};
use crate::metrics::SystemMetrics;
use crate::reference::RemoteRef;
use bytes::Bytes;
use codec::{
    Arguments, Forget, Frame, InvocationCodec, InvocationEnvelope, InvocationReply, Payload,
};
use dashmap::DashMap;
use network::Transport;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use types::{ActorIdentity, CorrelationToken, Endpoint};

type ReplyResult = ActorResult<Payload>;

/// Single-assignment result cell shared by a pending call and its caller
struct ReplySlot {
    resolved: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<ReplyResult>>>,
}

impl ReplySlot {
    fn new(sender: oneshot::Sender<ReplyResult>) -> Self {
        Self {
            resolved: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Take ownership of the outcome without delivering anything
    fn claim(&self) -> bool {
        self.resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Deliver `result` if nobody resolved the slot first
    fn complete(&self, result: ReplyResult) -> bool {
        if !self.claim() {
            return false;
        }
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(result);
        }
        true
    }
}

struct PendingCall {
    endpoint: Endpoint,
    target: ActorIdentity,
    slot: Arc<ReplySlot>,
    deadline: Instant,
    timeout: Duration,
}

/// Bounded memory of recently resolved tokens
struct CompletedHistory {
    order: VecDeque<CorrelationToken>,
    members: HashSet<CorrelationToken>,
    capacity: usize,
}

impl CompletedHistory {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    fn remember(&mut self, token: CorrelationToken) {
        if self.capacity == 0 || !self.members.insert(token) {
            return;
        }
        self.order.push_back(token);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn contains(&self, token: &CorrelationToken) -> bool {
        self.members.contains(token)
    }
}

pub(crate) struct Dispatcher {
    codec: InvocationCodec,
    transport: Arc<dyn Transport>,
    pending: DashMap<CorrelationToken, PendingCall>,
    next_token: AtomicU64,
    completed: Mutex<CompletedHistory>,
    metrics: Arc<SystemMetrics>,
}

impl Dispatcher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        duplicate_history: usize,
        metrics: Arc<SystemMetrics>,
    ) -> Self {
        Self {
            codec: InvocationCodec::new(),
            transport,
            pending: DashMap::new(),
            next_token: AtomicU64::new(1),
            completed: Mutex::new(CompletedHistory::new(duplicate_history)),
            metrics,
        }
    }

    fn next_correlation(&self) -> CorrelationToken {
        CorrelationToken::new(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Invoke `selector` on a remote actor and wait for its reply.
    ///
    /// Dropping the returned future before it completes cancels the call:
    /// the pending entry is released and the peer is sent a `Forget`.
    pub(crate) async fn call(
        &self,
        remote: &RemoteRef,
        selector: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> ActorResult<Payload> {
        let correlation = self.next_correlation();
        let endpoint = remote.endpoint();
        let target = remote.identity();

        // Unrepresentable arguments fail here, before anything is registered
        let frame = self.codec.encode(&Frame::Invoke(InvocationEnvelope {
            target: target.clone(),
            selector: selector.to_string(),
            arguments,
            correlation,
        }))?;

        let deadline = Instant::now() + timeout;
        let (sender, mut receiver) = oneshot::channel();
        let slot = Arc::new(ReplySlot::new(sender));
        self.pending.insert(
            correlation,
            PendingCall {
                endpoint: endpoint.clone(),
                target: target.clone(),
                slot: slot.clone(),
                deadline,
                timeout,
            },
        );
        SystemMetrics::incr(&self.metrics.remote_calls);

        let mut guard = PendingGuard {
            dispatcher: self,
            correlation,
            endpoint: endpoint.clone(),
            slot: slot.clone(),
            armed: true,
        };

        trace!(
            correlation = %correlation,
            actor_id = %target,
            endpoint = %endpoint,
            selector = selector,
            "Sending invocation"
        );

        if let Err(e) = self.transport.send(endpoint, frame).await {
            guard.disarm();
            self.pending.remove(&correlation);
            if slot.claim() {
                return Err(ActorError::from_send(e, endpoint));
            }
            // Resolved concurrently (failure detector or shutdown)
            return receiver.await.unwrap_or(Err(ActorError::Shutdown));
        }

        let outcome = match tokio::time::timeout_at(deadline, &mut receiver).await {
            Ok(result) => result.unwrap_or(Err(ActorError::Shutdown)),
            Err(_) => {
                if slot.claim() {
                    self.pending.remove(&correlation);
                    self.remember(correlation);
                    SystemMetrics::incr(&self.metrics.call_timeouts);
                    self.send_forget(endpoint, correlation);
                    debug!(
                        correlation = %correlation,
                        actor_id = %target,
                        endpoint = %endpoint,
                        timeout_ms = timeout.as_millis() as u64,
                        "Call timed out"
                    );
                    Err(ActorError::timeout(target, timeout.as_millis() as u64))
                } else {
                    // The reply won the race; it is already in the channel
                    receiver.await.unwrap_or(Err(ActorError::Shutdown))
                }
            }
        };
        guard.disarm();
        outcome
    }

    /// Route an inbound reply to the call waiting for it
    pub(crate) fn handle_reply(&self, from: &Endpoint, reply: InvocationReply) {
        let correlation = reply.correlation;
        let removed = self
            .pending
            .remove_if(&correlation, |_, call| call.endpoint == *from);

        let Some((_, call)) = removed else {
            self.absorb_unmatched(from, correlation);
            return;
        };

        self.remember(correlation);
        let result = reply
            .outcome
            .map_err(|failure| ActorError::from_remote(failure, &call.target, &call.endpoint));
        if !call.slot.complete(result) {
            // Caller gave up between our removal and its own
            SystemMetrics::incr(&self.metrics.duplicate_replies);
            debug!(correlation = %correlation, endpoint = %from, "Reply arrived for an abandoned call");
        }
    }

    fn absorb_unmatched(&self, from: &Endpoint, correlation: CorrelationToken) {
        if self.completed.lock().contains(&correlation) {
            SystemMetrics::incr(&self.metrics.duplicate_replies);
            let error = ActorError::DuplicateReply { correlation };
            warn!(endpoint = %from, error = %error, "Dropping reply for resolved call");
        } else if self.pending.contains_key(&correlation) {
            SystemMetrics::incr(&self.metrics.unmatched_replies);
            warn!(
                correlation = %correlation,
                endpoint = %from,
                "Dropping reply from an endpoint the call was not sent to"
            );
        } else {
            SystemMetrics::incr(&self.metrics.unmatched_replies);
            debug!(correlation = %correlation, endpoint = %from, "Dropping unmatched reply");
        }
    }

    /// Fail every call waiting on `endpoint` with `PeerUnreachable`
    pub(crate) fn fail_endpoint(&self, endpoint: &Endpoint) -> usize {
        let tokens: Vec<CorrelationToken> = self
            .pending
            .iter()
            .filter(|entry| entry.endpoint == *endpoint)
            .map(|entry| *entry.key())
            .collect();

        let mut failed = 0;
        for token in tokens {
            if let Some((_, call)) = self.pending.remove(&token) {
                self.remember(token);
                if call.slot.complete(Err(ActorError::peer_unreachable(endpoint))) {
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            SystemMetrics::add(&self.metrics.calls_failed_unreachable, failed as u64);
            debug!(endpoint = %endpoint, failed, "Failed pending calls to unreachable peer");
        }
        failed
    }

    /// Fail every pending call with `error`
    pub(crate) fn fail_all(&self, error: ActorError) -> usize {
        let tokens: Vec<CorrelationToken> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for token in tokens {
            if let Some((_, call)) = self.pending.remove(&token) {
                self.remember(token);
                if call.slot.complete(Err(error.clone())) {
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Time out calls whose caller is no longer polling them
    pub(crate) fn expire_overdue(&self, now: Instant) -> usize {
        let tokens: Vec<CorrelationToken> = self
            .pending
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut expired = 0;
        for token in tokens {
            let Some((_, call)) = self.pending.remove(&token) else {
                continue;
            };
            self.remember(token);
            let timeout_ms = call.timeout.as_millis() as u64;
            if call.slot.complete(Err(ActorError::timeout(&call.target, timeout_ms))) {
                expired += 1;
            }
        }
        if expired > 0 {
            SystemMetrics::add(&self.metrics.call_timeouts, expired as u64);
        }
        expired
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Encode and send a frame that is not a call
    pub(crate) async fn send_frame(&self, to: &Endpoint, frame: &Frame) -> ActorResult<()> {
        let bytes = self.codec.encode(frame)?;
        self.transport
            .send(to, bytes)
            .await
            .map_err(|e| ActorError::from_send(e, to))
    }

    pub(crate) fn encode(&self, frame: &Frame) -> ActorResult<Bytes> {
        Ok(self.codec.encode(frame)?)
    }

    fn remember(&self, token: CorrelationToken) {
        self.completed.lock().remember(token);
    }

    /// Fire-and-forget notice that `correlation` was abandoned
    fn send_forget(&self, endpoint: &Endpoint, correlation: CorrelationToken) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let bytes = match self.codec.encode(&Frame::Forget(Forget { correlation })) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(correlation = %correlation, error = %e, "Could not encode forget");
                return;
            }
        };
        let transport = self.transport.clone();
        let endpoint = endpoint.clone();
        handle.spawn(async move {
            if let Err(e) = transport.send(&endpoint, bytes).await {
                trace!(correlation = %correlation, endpoint = %endpoint, error = %e, "Forget not delivered");
            }
        });
    }
}

/// Releases a call's pending entry if its future is dropped mid-flight
struct PendingGuard<'a> {
    dispatcher: &'a Dispatcher,
    correlation: CorrelationToken,
    endpoint: Endpoint,
    slot: Arc<ReplySlot>,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || !self.slot.claim() {
            return;
        }
        let dispatcher = self.dispatcher;
        dispatcher.pending.remove(&self.correlation);
        dispatcher.remember(self.correlation);
        SystemMetrics::incr(&dispatcher.metrics.calls_cancelled);
        dispatcher.send_forget(&self.endpoint, self.correlation);
        debug!(correlation = %self.correlation, endpoint = %self.endpoint, "Call cancelled by caller");
    }
}
