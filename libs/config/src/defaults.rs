//! Default configuration values

/// Deadline applied to calls that do not set their own (milliseconds)
pub const CALL_TIMEOUT_MS: u64 = 5_000;

/// Completed correlation tokens remembered to classify late replies
pub const DUPLICATE_HISTORY: usize = 1_024;

/// Interval between heartbeats to every peer (milliseconds)
pub const HEARTBEAT_INTERVAL_MS: u64 = 1_000;

/// Silence after which a peer is marked unreachable (milliseconds)
pub const SILENCE_THRESHOLD_MS: u64 = 5_000;

/// Consecutive call timeouts after which a peer is marked unreachable
pub const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;

pub const LOG_LEVEL: &str = "info";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "ACTORS";
