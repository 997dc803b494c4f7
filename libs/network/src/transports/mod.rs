//! Transport Layer
//!
//! The contract every transport satisfies, and the in-process implementation.

use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use types::Endpoint;

pub mod memory;

pub use memory::{MemoryNetwork, MemoryTransport};

/// One frame as delivered by a transport
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Endpoint that sent the frame
    pub from: Endpoint,
    pub frame: Bytes,
}

/// Where a transport pushes inbound frames, in delivery order
pub type InboundSink = mpsc::UnboundedSender<InboundFrame>;

/// Unified Transport trait for all transport implementations
///
/// Frames are opaque. A successful `send` means the transport accepted the
/// frame, not that the peer processed it; loss is detected above this layer
/// through timeouts and heartbeats.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Endpoint peers use to reach this node
    fn local_endpoint(&self) -> &Endpoint;

    /// Send a frame to `to`
    async fn send(&self, to: &Endpoint, frame: Bytes) -> Result<()>;

    /// Send with timeout
    async fn send_timeout(&self, to: &Endpoint, frame: Bytes, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.send(to, frame))
            .await
            .map_err(|_| TransportError::timeout("send", timeout.as_millis() as u64))?
    }

    /// Install the handler for inbound frames, replacing any previous one
    fn on_receive(&self, sink: InboundSink) -> Result<()>;

    /// Endpoints this transport currently knows how to reach
    fn peers(&self) -> Vec<Endpoint>;

    /// Send a liveness frame to every known peer.
    ///
    /// Returns how many peers accepted it. Individual failures are not
    /// errors here; silence is for the failure detector to judge.
    async fn heartbeat(&self, frame: Bytes) -> usize {
        let mut accepted = 0;
        for peer in self.peers() {
            if self.send(&peer, frame.clone()).await.is_ok() {
                accepted += 1;
            }
        }
        accepted
    }

    /// Check if transport is healthy
    fn is_healthy(&self) -> bool;

    /// Get performance metrics
    fn metrics(&self) -> TransportMetrics;
}

/// Transport performance metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMetrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Frames accepted by `send` but lost to an injected fault
    pub frames_dropped: u64,
    pub errors: u64,
}

/// Lock-free counters behind [`TransportMetrics`]
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    frames_dropped: AtomicU64,
    errors: AtomicU64,
}

impl MetricsTracker {
    #[inline]
    pub(crate) fn record_send(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_receive(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TransportMetrics {
        TransportMetrics {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
