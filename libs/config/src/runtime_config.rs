//! Runtime Configuration Module
//!
//! Loads node settings from a TOML file with environment overrides.

use crate::defaults;
use anyhow::{bail, ensure, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use types::Endpoint;

/// Main runtime configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub node: NodeConfig,
    pub calls: CallConfig,
    pub failure_detector: FailureDetectorConfig,
    pub receptionist: ReceptionistConfig,
    pub log_level: String,
}

/// Where this node lives and which peers it talks to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Endpoint peers use to reach this node
    pub endpoint: Endpoint,
    /// Routing target for identities that carry no origin hint
    pub default_endpoint: Option<Endpoint>,
    /// Nodes that receive cluster-scope check-ins
    pub peers: Vec<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub default_timeout_ms: u64,
    pub duplicate_history: usize,
    /// Fail calls to unreachable peers without sending
    pub fail_fast_unreachable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureDetectorConfig {
    pub heartbeat_interval_ms: u64,
    pub silence_threshold_ms: u64,
    pub max_consecutive_timeouts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceptionistConfig {
    /// Push cluster-scope check-ins and deregistrations to peers
    pub propagate: bool,
    /// Replay local check-ins to a peer when it becomes reachable
    pub sync_on_join: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            calls: CallConfig::default(),
            failure_detector: FailureDetectorConfig::default(),
            receptionist: ReceptionistConfig::default(),
            log_level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::local(),
            default_endpoint: None,
            peers: Vec::new(),
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: defaults::CALL_TIMEOUT_MS,
            duplicate_history: defaults::DUPLICATE_HISTORY,
            fail_fast_unreachable: true,
        }
    }
}

impl Default for FailureDetectorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: defaults::HEARTBEAT_INTERVAL_MS,
            silence_threshold_ms: defaults::SILENCE_THRESHOLD_MS,
            max_consecutive_timeouts: defaults::MAX_CONSECUTIVE_TIMEOUTS,
        }
    }
}

impl Default for ReceptionistConfig {
    fn default() -> Self {
        Self {
            propagate: true,
            sync_on_join: true,
        }
    }
}

impl CallConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl FailureDetectorConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_threshold_ms)
    }
}

impl RuntimeConfig {
    /// Load configuration from a file with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading runtime config: {:?}", path);
        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(env_source())
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    /// Parse TOML text, still honoring environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .add_source(env_source())
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    /// Defaults plus environment overrides, for nodes started without a file
    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(env_source())
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let runtime: RuntimeConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        runtime.validate()?;
        debug!(endpoint = %runtime.node.endpoint, peers = runtime.node.peers.len(), "Runtime config loaded");
        Ok(runtime)
    }

    /// Reject settings the runtime cannot operate with
    pub fn validate(&self) -> Result<()> {
        self.node
            .endpoint
            .check()
            .context("Invalid node.endpoint")?;
        if let Some(default) = &self.node.default_endpoint {
            default.check().context("Invalid node.default_endpoint")?;
        }
        for peer in &self.node.peers {
            peer.check().context("Invalid entry in node.peers")?;
            if *peer == self.node.endpoint {
                bail!("node.peers must not contain the node's own endpoint {}", peer);
            }
        }

        ensure!(
            self.calls.default_timeout_ms > 0,
            "calls.default_timeout_ms must be greater than zero"
        );
        ensure!(
            self.failure_detector.heartbeat_interval_ms > 0,
            "failure_detector.heartbeat_interval_ms must be greater than zero"
        );
        ensure!(
            self.failure_detector.silence_threshold_ms > self.failure_detector.heartbeat_interval_ms,
            "failure_detector.silence_threshold_ms ({}) must exceed heartbeat_interval_ms ({})",
            self.failure_detector.silence_threshold_ms,
            self.failure_detector.heartbeat_interval_ms
        );
        ensure!(
            self.failure_detector.max_consecutive_timeouts > 0,
            "failure_detector.max_consecutive_timeouts must be greater than zero"
        );
        Ok(())
    }

    /// Render as TOML, e.g. to print the effective configuration
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(defaults::ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("node.peers")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.node.endpoint.as_str(), "local");
        assert_eq!(config.calls.default_timeout(), Duration::from_secs(5));
        assert_eq!(config.calls.duplicate_history, 1024);
        assert_eq!(config.failure_detector.max_consecutive_timeouts, 3);
        assert!(config.receptionist.propagate);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("node.toml");

        let config_content = r#"
[node]
endpoint = "node-a"
default_endpoint = "node-b"
peers = ["node-b", "node-c"]

[calls]
default_timeout_ms = 100
fail_fast_unreachable = false

[failure_detector]
heartbeat_interval_ms = 50
silence_threshold_ms = 200
"#;

        fs::write(&config_path, config_content).unwrap();

        let config = RuntimeConfig::load(&config_path).unwrap();
        assert_eq!(config.node.endpoint.as_str(), "node-a");
        assert_eq!(config.node.default_endpoint.unwrap().as_str(), "node-b");
        assert_eq!(config.node.peers.len(), 2);
        assert_eq!(config.calls.default_timeout_ms, 100);
        assert!(!config.calls.fail_fast_unreachable);
        assert_eq!(config.calls.duplicate_history, 1024);
        assert_eq!(config.failure_detector.silence_threshold(), Duration::from_millis(200));
        assert!(config.receptionist.sync_on_join);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(RuntimeConfig::load(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_environment_override() {
        // Injected map instead of the process environment so parallel tests stay isolated
        let vars = [
            ("ACTORS__RECEPTIONIST__SYNC_ON_JOIN", "false"),
            ("ACTORS__CALLS__DEFAULT_TIMEOUT_MS", "750"),
            ("ACTORS__NODE__PEERS", "node-b,node-c"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::builder()
            .add_source(File::from_str("[node]\nendpoint = \"node-env\"\n", FileFormat::Toml))
            .add_source(env_source().source(Some(vars)))
            .build()
            .unwrap();
        let config = RuntimeConfig::finish(config).unwrap();

        assert_eq!(config.node.endpoint.as_str(), "node-env");
        assert!(!config.receptionist.sync_on_join);
        assert_eq!(config.calls.default_timeout_ms, 750);
        assert_eq!(
            config.node.peers,
            vec![Endpoint::new("node-b").unwrap(), Endpoint::new("node-c").unwrap()]
        );
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let mut config = RuntimeConfig::default();
        config.calls.default_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.failure_detector.silence_threshold_ms = config.failure_detector.heartbeat_interval_ms;
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.node.peers.push(config.node.endpoint.clone());
        assert!(config.validate().is_err());

        assert!(RuntimeConfig::from_toml_str("[node]\nendpoint = \"has space\"\n").is_err());
    }

    #[test]
    fn test_toml_rendering_parses_back() {
        let mut config = RuntimeConfig::default();
        config.node.peers.push(Endpoint::new("node-z").unwrap());
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(RuntimeConfig::from_toml_str(&rendered).unwrap(), config);
    }
}
