//! Shared fixtures for the multi-node tests

#![allow(dead_code)]

use async_trait::async_trait;
use distributed_actors::{
    ActorBehavior, ActorContext, ActorResult, ActorSystem, Invocation, Payload, TypeTag,
};
use network::MemoryNetwork;
use runtime_config::RuntimeConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use types::Endpoint;

pub const HEARTBEAT_MS: u64 = 100;
pub const SILENCE_MS: u64 = 500;
pub const CALL_TIMEOUT_MS: u64 = 1_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn ep(name: &str) -> Endpoint {
    Endpoint::new(name).unwrap()
}

pub fn counter_tag() -> TypeTag {
    TypeTag::new("counter").unwrap()
}

pub fn config(endpoint: &str) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.node.endpoint = ep(endpoint);
    config.calls.default_timeout_ms = CALL_TIMEOUT_MS;
    config.failure_detector.heartbeat_interval_ms = HEARTBEAT_MS;
    config.failure_detector.silence_threshold_ms = SILENCE_MS;
    config
}

pub fn start_node(network: &MemoryNetwork, name: &str) -> ActorSystem {
    start_node_with(network, config(name))
}

pub fn start_node_with(network: &MemoryNetwork, config: RuntimeConfig) -> ActorSystem {
    let transport = network.transport(config.node.endpoint.clone()).unwrap();
    ActorSystem::start(config, transport).unwrap()
}

/// Let in-flight frames be delivered and processed
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Counter actor used throughout the suite.
///
/// `instance` is the construction order, so tests can tell whether two
/// calls reached the same instance.
pub struct Counter {
    pub instance: usize,
    pub total: u64,
    pub history: Vec<u64>,
}

impl Counter {
    pub fn new(instance: usize) -> Self {
        Self {
            instance,
            total: 0,
            history: Vec::new(),
        }
    }
}

#[async_trait]
impl ActorBehavior for Counter {
    async fn handle(&mut self, invocation: Invocation, ctx: &ActorContext) -> ActorResult<Payload> {
        match invocation.selector() {
            "add" => {
                let amount: u64 = invocation.arg(0)?;
                self.total += amount;
                self.history.push(amount);
                Ok(Payload::encode(&self.total)?)
            }
            "get" => Ok(Payload::encode(&self.total)?),
            "history" => Ok(Payload::encode(&self.history)?),
            "instance" => Ok(Payload::encode(&self.instance)?),
            "whoami" => Ok(Payload::encode(&ctx.identity().to_string())?),
            "caller" => Ok(Payload::encode(
                &invocation.caller().map(|endpoint| endpoint.to_string()),
            )?),
            "sleep" => {
                let millis: u64 = invocation.arg(0)?;
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(Payload::unit())
            }
            _ => Err(invocation.unknown_selector()),
        }
    }
}

/// Register a `counter` factory on `system`; returns the construction count
pub fn register_counters(system: &ActorSystem) -> Arc<AtomicUsize> {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    system.register_type(counter_tag(), move |_| {
        let instance = counter.fetch_add(1, Ordering::SeqCst);
        Box::new(Counter::new(instance))
    });
    constructed
}
