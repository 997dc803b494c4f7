//! System-wide counters
//!
//! Plain relaxed atomics: every counter is independent and only read for
//! monitoring snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// System-wide metrics
#[derive(Debug, Default)]
pub struct SystemMetrics {
    pub actors_spawned: AtomicU64,
    pub actors_activated: AtomicU64,
    pub actors_stopped: AtomicU64,
    pub invocations_processed: AtomicU64,
    pub invocations_failed: AtomicU64,
    pub total_processing_time_ns: AtomicU64,

    // Calls issued by this node
    pub local_calls: AtomicU64,
    pub remote_calls: AtomicU64,
    pub call_timeouts: AtomicU64,
    pub calls_failed_unreachable: AtomicU64,
    pub calls_cancelled: AtomicU64,

    // Absorbed errors
    pub duplicate_replies: AtomicU64,
    pub unmatched_replies: AtomicU64,
    pub malformed_frames: AtomicU64,
    pub version_mismatches: AtomicU64,

    pub forgets_received: AtomicU64,
    pub check_ins: AtomicU64,
    pub evicted_entries: AtomicU64,
    pub peers_marked_unreachable: AtomicU64,
}

impl SystemMetrics {
    pub fn record_invocation_handled(&self, duration: Duration, success: bool) {
        self.invocations_processed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.invocations_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_processing_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn avg_processing_time_ns(&self) -> f64 {
        let count = self.invocations_processed.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_processing_time_ns.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> SystemStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SystemStats {
            actors_spawned: load(&self.actors_spawned),
            actors_activated: load(&self.actors_activated),
            actors_stopped: load(&self.actors_stopped),
            invocations_processed: load(&self.invocations_processed),
            invocations_failed: load(&self.invocations_failed),
            avg_processing_time_ns: self.avg_processing_time_ns(),
            local_calls: load(&self.local_calls),
            remote_calls: load(&self.remote_calls),
            call_timeouts: load(&self.call_timeouts),
            calls_failed_unreachable: load(&self.calls_failed_unreachable),
            calls_cancelled: load(&self.calls_cancelled),
            duplicate_replies: load(&self.duplicate_replies),
            unmatched_replies: load(&self.unmatched_replies),
            malformed_frames: load(&self.malformed_frames),
            version_mismatches: load(&self.version_mismatches),
            forgets_received: load(&self.forgets_received),
            check_ins: load(&self.check_ins),
            evicted_entries: load(&self.evicted_entries),
            peers_marked_unreachable: load(&self.peers_marked_unreachable),
        }
    }
}

/// Point-in-time copy of [`SystemMetrics`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemStats {
    pub actors_spawned: u64,
    pub actors_activated: u64,
    pub actors_stopped: u64,
    pub invocations_processed: u64,
    pub invocations_failed: u64,
    pub avg_processing_time_ns: f64,
    pub local_calls: u64,
    pub remote_calls: u64,
    pub call_timeouts: u64,
    pub calls_failed_unreachable: u64,
    pub calls_cancelled: u64,
    pub duplicate_replies: u64,
    pub unmatched_replies: u64,
    pub malformed_frames: u64,
    pub version_mismatches: u64,
    pub forgets_received: u64,
    pub check_ins: u64,
    pub evicted_entries: u64,
    pub peers_marked_unreachable: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_processing_time() {
        let metrics = SystemMetrics::default();
        assert_eq!(metrics.avg_processing_time_ns(), 0.0);

        metrics.record_invocation_handled(Duration::from_nanos(100), true);
        metrics.record_invocation_handled(Duration::from_nanos(300), false);

        let stats = metrics.snapshot();
        assert_eq!(stats.invocations_processed, 2);
        assert_eq!(stats.invocations_failed, 1);
        assert_eq!(stats.avg_processing_time_ns, 200.0);
    }
}
