//! Failure Detector
//!
//! Tracks when each peer was last heard from. A peer becomes unreachable
//! after `silence_threshold` without any inbound frame, after
//! `max_consecutive_timeouts` calls to it time out in a row, or when told
//! so explicitly. Any inbound frame makes it reachable again.
//!
//! The detector only reports transitions; the actor system decides what
//! they mean for pending calls and receptionist entries.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use types::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Reachable,
    Unreachable,
}

/// A change in a peer's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessEvent {
    /// First contact, or recovery after being unreachable
    Reachable(Endpoint),
    Unreachable(Endpoint),
}

#[derive(Debug)]
struct PeerState {
    last_seen: Instant,
    status: PeerStatus,
    consecutive_timeouts: u32,
    heard_from: bool,
}

impl PeerState {
    fn new(now: Instant) -> Self {
        Self {
            last_seen: now,
            status: PeerStatus::Reachable,
            consecutive_timeouts: 0,
            heard_from: false,
        }
    }

    fn trip(&mut self, endpoint: &Endpoint, reason: &'static str) -> Option<LivenessEvent> {
        if self.status == PeerStatus::Unreachable {
            return None;
        }
        self.status = PeerStatus::Unreachable;
        warn!(endpoint = %endpoint, reason, "Peer marked unreachable");
        Some(LivenessEvent::Unreachable(endpoint.clone()))
    }
}

#[derive(Debug)]
pub struct FailureDetector {
    silence_threshold: Duration,
    max_consecutive_timeouts: u32,
    peers: Mutex<HashMap<Endpoint, PeerState>>,
}

impl FailureDetector {
    pub fn new(silence_threshold: Duration, max_consecutive_timeouts: u32) -> Self {
        Self {
            silence_threshold,
            max_consecutive_timeouts,
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching `endpoint`; its silence clock starts now
    pub fn track(&self, endpoint: &Endpoint) {
        self.peers
            .lock()
            .entry(endpoint.clone())
            .or_insert_with(|| PeerState::new(Instant::now()));
    }

    /// Record an inbound frame from `endpoint`
    pub fn observe(&self, endpoint: &Endpoint) -> Option<LivenessEvent> {
        let now = Instant::now();
        let mut peers = self.peers.lock();
        let state = peers
            .entry(endpoint.clone())
            .or_insert_with(|| PeerState::new(now));

        state.last_seen = now;
        state.consecutive_timeouts = 0;

        if state.status == PeerStatus::Unreachable {
            state.status = PeerStatus::Reachable;
            state.heard_from = true;
            info!(endpoint = %endpoint, "Peer reachable again");
            return Some(LivenessEvent::Reachable(endpoint.clone()));
        }
        if !state.heard_from {
            state.heard_from = true;
            info!(endpoint = %endpoint, "First contact with peer");
            return Some(LivenessEvent::Reachable(endpoint.clone()));
        }
        None
    }

    /// Record a call to `endpoint` that timed out
    pub fn record_timeout(&self, endpoint: &Endpoint) -> Option<LivenessEvent> {
        let mut peers = self.peers.lock();
        let state = peers
            .entry(endpoint.clone())
            .or_insert_with(|| PeerState::new(Instant::now()));
        state.consecutive_timeouts = state.consecutive_timeouts.saturating_add(1);
        if state.consecutive_timeouts >= self.max_consecutive_timeouts {
            return state.trip(endpoint, "consecutive call timeouts");
        }
        None
    }

    /// Mark every peer silent for longer than the threshold as unreachable
    pub fn sweep(&self, now: Instant) -> Vec<LivenessEvent> {
        let mut peers = self.peers.lock();
        peers
            .iter_mut()
            .filter(|(_, state)| {
                state.status == PeerStatus::Reachable
                    && now.saturating_duration_since(state.last_seen) > self.silence_threshold
            })
            .filter_map(|(endpoint, state)| state.trip(endpoint, "heartbeat silence"))
            .collect()
    }

    pub fn mark_unreachable(&self, endpoint: &Endpoint) -> Option<LivenessEvent> {
        let mut peers = self.peers.lock();
        let state = peers
            .entry(endpoint.clone())
            .or_insert_with(|| PeerState::new(Instant::now()));
        state.trip(endpoint, "marked explicitly")
    }

    pub fn status(&self, endpoint: &Endpoint) -> Option<PeerStatus> {
        self.peers.lock().get(endpoint).map(|state| state.status)
    }

    pub fn is_unreachable(&self, endpoint: &Endpoint) -> bool {
        self.status(endpoint) == Some(PeerStatus::Unreachable)
    }

    /// Every tracked peer with its status, sorted by endpoint
    pub fn peers(&self) -> Vec<(Endpoint, PeerStatus)> {
        let mut peers: Vec<_> = self
            .peers
            .lock()
            .iter()
            .map(|(endpoint, state)| (endpoint.clone(), state.status))
            .collect();
        peers.sort_by(|a, b| a.0.cmp(&b.0));
        peers
    }
}
