//! In-process transport
//!
//! Every node registered on a [`MemoryNetwork`] gets a [`MemoryTransport`].
//! Delivery is an unbounded channel push, so frames between two nodes arrive
//! in send order. Faults are injected on the network, not the transports:
//! a partition or black hole makes `send` succeed while the frame vanishes,
//! which is how a real lossy link looks to the sender.

use super::{InboundFrame, InboundSink, MetricsTracker, Transport, TransportMetrics};
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};
use types::Endpoint;

struct NodeSlot {
    sink: Option<InboundSink>,
    metrics: Arc<MetricsTracker>,
    open: bool,
}

#[derive(Default)]
struct Faults {
    /// Unordered pairs, stored with the smaller endpoint first
    partitions: HashSet<(Endpoint, Endpoint)>,
    blackholed: HashSet<Endpoint>,
    duplicated: HashSet<Endpoint>,
}

impl Faults {
    fn blocks(&self, from: &Endpoint, to: &Endpoint) -> bool {
        self.blackholed.contains(from)
            || self.blackholed.contains(to)
            || self.partitions.contains(&pair(from, to))
    }
}

fn pair(a: &Endpoint, b: &Endpoint) -> (Endpoint, Endpoint) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Default)]
struct NetworkState {
    nodes: RwLock<HashMap<Endpoint, NodeSlot>>,
    faults: RwLock<Faults>,
}

/// Shared hub connecting in-process nodes
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<NetworkState>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and return its transport.
    ///
    /// An endpoint can be registered again once its previous transport has
    /// been closed.
    pub fn transport(&self, endpoint: Endpoint) -> Result<Arc<MemoryTransport>> {
        let metrics = Arc::new(MetricsTracker::default());
        let mut nodes = self.state.nodes.write();
        if nodes.get(&endpoint).is_some_and(|slot| slot.open) {
            return Err(TransportError::configuration(
                format!("endpoint {} already registered", endpoint),
                Some("endpoint"),
            ));
        }
        nodes.insert(
            endpoint.clone(),
            NodeSlot {
                sink: None,
                metrics: metrics.clone(),
                open: true,
            },
        );
        debug!(endpoint = %endpoint, "Memory transport registered");

        Ok(Arc::new(MemoryTransport {
            endpoint,
            network: self.clone(),
            metrics,
        }))
    }

    /// Endpoints with an open transport
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self
            .state
            .nodes
            .read()
            .iter()
            .filter(|(_, slot)| slot.open)
            .map(|(endpoint, _)| endpoint.clone())
            .collect();
        endpoints.sort();
        endpoints
    }

    /// Drop all traffic between `a` and `b`, in both directions
    pub fn partition(&self, a: &Endpoint, b: &Endpoint) {
        self.state.faults.write().partitions.insert(pair(a, b));
        debug!(a = %a, b = %b, "Partition injected");
    }

    pub fn heal(&self, a: &Endpoint, b: &Endpoint) {
        self.state.faults.write().partitions.remove(&pair(a, b));
        debug!(a = %a, b = %b, "Partition healed");
    }

    /// Drop all traffic to and from `endpoint`
    pub fn blackhole(&self, endpoint: &Endpoint) {
        self.state.faults.write().blackholed.insert(endpoint.clone());
        debug!(endpoint = %endpoint, "Endpoint black-holed");
    }

    pub fn restore(&self, endpoint: &Endpoint) {
        self.state.faults.write().blackholed.remove(endpoint);
        debug!(endpoint = %endpoint, "Endpoint restored");
    }

    /// Deliver every frame sent to `endpoint` twice
    pub fn duplicate_to(&self, endpoint: &Endpoint) {
        self.state.faults.write().duplicated.insert(endpoint.clone());
    }

    pub fn stop_duplicating(&self, endpoint: &Endpoint) {
        self.state.faults.write().duplicated.remove(endpoint);
    }

    /// Remove every injected fault
    pub fn heal_all(&self) {
        *self.state.faults.write() = Faults::default();
    }

    fn deliver(&self, from: &Endpoint, to: &Endpoint, frame: Bytes) -> Result<bool> {
        let (blocked, copies) = {
            let faults = self.state.faults.read();
            let copies = if faults.duplicated.contains(to) { 2 } else { 1 };
            (faults.blocks(from, to), copies)
        };

        let nodes = self.state.nodes.read();
        let slot = nodes
            .get(to)
            .ok_or_else(|| TransportError::unknown_endpoint(to))?;
        if !slot.open {
            return Err(TransportError::closed(to));
        }
        if blocked {
            trace!(from = %from, to = %to, "Frame dropped by injected fault");
            return Ok(false);
        }

        let Some(sink) = &slot.sink else {
            debug!(from = %from, to = %to, "No receive handler installed, frame dropped");
            return Ok(false);
        };
        for _ in 0..copies {
            sink.send(InboundFrame {
                from: from.clone(),
                frame: frame.clone(),
            })
            .map_err(|_| TransportError::closed(to))?;
            slot.metrics.record_receive(frame.len());
        }
        Ok(true)
    }
}

/// One node's view of a [`MemoryNetwork`]
pub struct MemoryTransport {
    endpoint: Endpoint,
    network: MemoryNetwork,
    metrics: Arc<MetricsTracker>,
}

impl MemoryTransport {
    /// Unregister from the network; peers sending here get `Closed`
    pub fn close(&self) {
        let mut nodes = self.network.state.nodes.write();
        if let Some(slot) = nodes.get_mut(&self.endpoint) {
            if Arc::ptr_eq(&slot.metrics, &self.metrics) {
                slot.open = false;
                slot.sink = None;
            }
        }
        debug!(endpoint = %self.endpoint, "Memory transport closed");
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    fn with_own_slot<R>(&self, f: impl FnOnce(&mut NodeSlot) -> R) -> Result<R> {
        let mut nodes = self.network.state.nodes.write();
        match nodes.get_mut(&self.endpoint) {
            Some(slot) if slot.open && Arc::ptr_eq(&slot.metrics, &self.metrics) => Ok(f(slot)),
            _ => Err(TransportError::closed(&self.endpoint)),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn send(&self, to: &Endpoint, frame: Bytes) -> Result<()> {
        if !self.is_healthy() {
            self.metrics.record_error();
            return Err(TransportError::closed(&self.endpoint));
        }

        let len = frame.len();
        match self.network.deliver(&self.endpoint, to, frame) {
            Ok(delivered) => {
                self.metrics.record_send(len);
                if !delivered {
                    self.metrics.record_drop();
                }
                Ok(())
            }
            Err(e) => {
                self.metrics.record_error();
                Err(e)
            }
        }
    }

    fn on_receive(&self, sink: InboundSink) -> Result<()> {
        self.with_own_slot(|slot| slot.sink = Some(sink))
    }

    fn peers(&self) -> Vec<Endpoint> {
        self.network
            .endpoints()
            .into_iter()
            .filter(|endpoint| *endpoint != self.endpoint)
            .collect()
    }

    fn is_healthy(&self) -> bool {
        self.network
            .state
            .nodes
            .read()
            .get(&self.endpoint)
            .is_some_and(|slot| slot.open && Arc::ptr_eq(&slot.metrics, &self.metrics))
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }
}
