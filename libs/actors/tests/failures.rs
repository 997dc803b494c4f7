//! Timeouts, unreachable peers, duplicated and malformed frames, shutdown

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use codec::{FailureKind, InvocationCodec, MessageKind, WireEnvelope};
use common::*;
use distributed_actors::{
    ActorBehavior, ActorContext, ActorError, ActorResult, Invocation, Payload, PeerStatus,
};
use network::{MemoryNetwork, Transport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use types::CorrelationToken;

#[tokio::test(start_paused = true)]
async fn test_call_to_silent_endpoint_times_out_and_releases_slot() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = start_node(&network, "node-a");
    let b = start_node(&network, "node-b");
    let reference = a.resolve(&b.allocate(None)).unwrap();

    network.blackhole(&ep("node-b"));
    let started = Instant::now();
    let err = a
        .call_with_timeout::<u64, _>(&reference, "get", &(), Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(matches!(err, ActorError::Timeout { timeout_ms: 100, .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_millis(110));
    assert_eq!(a.pending_calls(), 0);
    assert_eq!(a.stats().call_timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_timeouts_mark_peer_unreachable() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = start_node(&network, "node-a");
    let b = start_node(&network, "node-b");
    let reference = a.resolve(&b.allocate(None)).unwrap();
    settle().await;
    assert_eq!(a.peer_status(&ep("node-b")), Some(PeerStatus::Reachable));

    network.blackhole(&ep("node-b"));
    for _ in 0..3 {
        let err = a
            .call_with_timeout::<u64, _>(&reference, "get", &(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::Timeout { .. }), "{err:?}");
    }
    assert_eq!(a.peer_status(&ep("node-b")), Some(PeerStatus::Unreachable));

    // Fails fast now, without waiting for a deadline
    let started = Instant::now();
    let err = a.call::<u64, _>(&reference, "get", &()).await.unwrap_err();
    assert!(matches!(err, ActorError::PeerUnreachable { .. }), "{err:?}");
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(a.stats().peers_marked_unreachable, 1);
}

#[tokio::test(start_paused = true)]
async fn test_silence_fails_outstanding_calls_and_recovery_restores_calls() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = start_node(&network, "node-a");
    let b = start_node(&network, "node-b");
    let spawned = b.spawn(Counter::new(0), None).unwrap();
    let reference = a.resolve(spawned.identity()).unwrap();
    let _: u64 = a.call(&reference, "add", &(1u64,)).await.unwrap();

    network.partition(&ep("node-a"), &ep("node-b"));
    let started = Instant::now();
    let waiting = {
        let a = a.clone();
        let reference = reference.clone();
        tokio::spawn(async move {
            a.call_with_timeout::<u64, _>(&reference, "get", &(), Duration::from_secs(30))
                .await
        })
    };

    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, ActorError::PeerUnreachable { .. }), "{err:?}");
    assert!(started.elapsed() <= Duration::from_millis(SILENCE_MS + 2 * HEARTBEAT_MS));
    assert_eq!(a.pending_calls(), 0);
    assert_eq!(a.stats().calls_failed_unreachable, 1);

    network.heal(&ep("node-a"), &ep("node-b"));
    tokio::time::sleep(Duration::from_millis(3 * HEARTBEAT_MS)).await;
    assert_eq!(a.peer_status(&ep("node-b")), Some(PeerStatus::Reachable));

    let total: u64 = a.call(&reference, "get", &()).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_duplicated_replies_are_delivered_once() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = start_node(&network, "node-a");
    let b = start_node(&network, "node-b");
    let spawned = b.spawn(Counter::new(0), None).unwrap();
    let reference = a.resolve(spawned.identity()).unwrap();

    network.duplicate_to(&ep("node-a"));
    for expected in 1..=3u64 {
        let total: u64 = a.call(&reference, "add", &(1u64,)).await.unwrap();
        assert_eq!(total, expected);
    }
    settle().await;

    let stats = a.stats();
    assert_eq!(stats.remote_calls, 3);
    assert_eq!(stats.duplicate_replies, 3);
    assert_eq!(a.pending_calls(), 0);
}

#[tokio::test]
async fn test_malformed_and_foreign_version_frames_are_absorbed() {
    init_tracing();
    let network = MemoryNetwork::new();
    let b = start_node(&network, "node-b");
    let rogue = network.transport(ep("rogue")).unwrap();

    rogue
        .send(&ep("node-b"), Bytes::from_static(b"definitely not a frame"))
        .await
        .unwrap();

    let mut foreign = WireEnvelope::new(MessageKind::Heartbeat, CorrelationToken::NONE);
    foreign.version = 9;
    rogue.send(&ep("node-b"), foreign.to_bytes().unwrap()).await.unwrap();

    let valid = WireEnvelope::new(MessageKind::Heartbeat, CorrelationToken::NONE)
        .to_bytes()
        .unwrap();
    let mut corrupted = valid.to_vec();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xff;
    rogue.send(&ep("node-b"), Bytes::from(corrupted)).await.unwrap();
    settle().await;

    let stats = b.stats();
    assert_eq!(stats.malformed_frames, 2);
    assert_eq!(stats.version_mismatches, 1);

    // Still serving
    let counter = b.spawn(Counter::new(0), None).unwrap();
    let total: u64 = b.call(&counter, "add", &(2u64,)).await.unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn test_intact_invoke_with_unusable_body_is_answered() {
    init_tracing();
    let network = MemoryNetwork::new();
    let b = start_node(&network, "node-b");
    let rogue = network.transport(ep("rogue")).unwrap();
    let (tx, mut replies) = tokio::sync::mpsc::unbounded_channel();
    rogue.on_receive(tx).unwrap();

    let target = b.allocate(None);
    let no_selector = WireEnvelope::new(MessageKind::Invoke, CorrelationToken::new(77))
        .with_target(target.clone());
    let scalar_arguments = WireEnvelope::new(MessageKind::Invoke, CorrelationToken::new(78))
        .with_target(target)
        .with_selector("add")
        .with_payload(Payload::encode(&"five").unwrap().into_value());
    for envelope in [no_selector, scalar_arguments] {
        rogue.send(&ep("node-b"), envelope.to_bytes().unwrap()).await.unwrap();
    }

    let codec = InvocationCodec::new();
    for expected in [77, 78] {
        let inbound = tokio::time::timeout(Duration::from_millis(CALL_TIMEOUT_MS), replies.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.from, ep("node-b"));
        let reply = codec.decode_reply(&inbound.frame).unwrap();
        assert_eq!(reply.correlation, CorrelationToken::new(expected));
        let failure = reply.outcome.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Serialization);
    }

    assert_eq!(b.stats().malformed_frames, 2);
    assert!(b.live_instances().is_empty());
}

#[tokio::test]
async fn test_cancelled_call_is_forgotten() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = start_node(&network, "node-a");
    let b = start_node(&network, "node-b");
    let spawned = b.spawn(Counter::new(0), None).unwrap();
    let reference = a.resolve(spawned.identity()).unwrap();

    let caller = {
        let a = a.clone();
        tokio::spawn(async move {
            a.call_with_timeout::<(), _>(&reference, "sleep", &(60_000u64,), Duration::from_secs(120))
                .await
        })
    };
    settle().await;
    assert_eq!(a.pending_calls(), 1);

    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());
    assert_eq!(a.pending_calls(), 0);
    assert_eq!(a.stats().calls_cancelled, 1);

    settle().await;
    assert_eq!(b.stats().forgets_received, 1);
}

struct Lifecycle {
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

#[async_trait]
impl ActorBehavior for Lifecycle {
    async fn handle(&mut self, invocation: Invocation, _ctx: &ActorContext) -> ActorResult<Payload> {
        match invocation.selector() {
            "sleep" => {
                tokio::time::sleep(Duration::from_millis(invocation.arg(0)?)).await;
                Ok(Payload::unit())
            }
            _ => Err(invocation.unknown_selector()),
        }
    }

    async fn on_start(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ActorContext) -> ActorResult<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_shutdown_fails_pending_calls_and_stops_instances() {
    init_tracing();
    let network = MemoryNetwork::new();
    let a = start_node(&network, "node-a");
    let b = start_node(&network, "node-b");

    let started = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));
    let local = a
        .spawn(
            Lifecycle {
                started: started.clone(),
                stopped: stopped.clone(),
            },
            None,
        )
        .unwrap();
    let slow = b.spawn(Counter::new(0), None).unwrap();
    let remote = a.resolve(slow.identity()).unwrap();

    let waiting = {
        let a = a.clone();
        tokio::spawn(async move {
            a.call_with_timeout::<(), _>(&remote, "sleep", &(60_000u64,), Duration::from_secs(120))
                .await
        })
    };
    settle().await;
    assert_eq!(started.load(Ordering::SeqCst), 1);

    a.shutdown().await.unwrap();
    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, ActorError::Shutdown), "{err:?}");
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert!(a.live_instances().is_empty());

    let err = a.call::<(), _>(&local, "sleep", &(1u64,)).await.unwrap_err();
    assert!(matches!(err, ActorError::Shutdown), "{err:?}");
    assert!(matches!(
        a.spawn(Counter::new(0), None),
        Err(ActorError::Shutdown)
    ));

    // Peers calling into the stopped node see it as gone
    settle().await;
    let on_a = b.resolve(local.identity()).unwrap();
    let err = b.call::<(), _>(&on_a, "sleep", &(1u64,)).await.unwrap_err();
    assert!(matches!(err, ActorError::PeerUnreachable { .. }), "{err:?}");

    // Idempotent
    a.shutdown().await.unwrap();
}
