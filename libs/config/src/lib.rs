//! # Runtime Configuration
//!
//! Settings for one actor runtime node: where it lives, who its peers are,
//! how long calls may take and how quickly silent peers are declared
//! unreachable.
//!
//! ## Usage
//!
//! ```rust
//! use runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str(r#"
//! [node]
//! endpoint = "node-a"
//! peers = ["node-b"]
//!
//! [calls]
//! default_timeout_ms = 250
//! "#).unwrap();
//!
//! assert_eq!(config.node.endpoint.as_str(), "node-a");
//! assert_eq!(config.calls.default_timeout().as_millis(), 250);
//! assert_eq!(config.failure_detector.silence_threshold_ms, 5_000);
//! ```
//!
//! Files are layered under `ACTORS__`-prefixed environment variables, with
//! `__` separating sections: `ACTORS__CALLS__DEFAULT_TIMEOUT_MS=100`.

pub mod defaults;
pub mod runtime_config;

// Re-export commonly used types
pub use runtime_config::{
    CallConfig, FailureDetectorConfig, NodeConfig, ReceptionistConfig, RuntimeConfig,
};
