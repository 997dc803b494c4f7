//! Node Demo
//!
//! Starts two actor runtime nodes on an in-process network and walks through
//! the runtime's behavior end to end:
//!
//! 1. A call from one node activates a greeter on the other on demand
//! 2. A check-in on one node shows up in the other node's listing
//! 3. A partition fails calls, healing it restores them
//!
//! Node settings come from a TOML file when `--config` is given, otherwise
//! from defaults layered under `ACTORS__` environment variables.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use distributed_actors::{
    ActorBehavior, ActorContext, ActorError, ActorResult, ActorSystem, Invocation, Payload,
    ReceptionTag, TypeTag,
};
use network::MemoryNetwork;
use runtime_config::RuntimeConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use types::Endpoint;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "node_demo")]
#[command(about = "Two-node walkthrough of the distributed actor runtime")]
struct Args {
    /// Configuration file for the first node
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint of the second node
    #[arg(short, long, default_value = "node-b")]
    peer: String,

    /// Log filter, overrides the configured level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Skip the partition walkthrough
    #[arg(long)]
    no_faults: bool,
}

/// Greets callers and remembers how many it has greeted
struct Greeter {
    name: String,
    greeted: u64,
}

#[async_trait]
impl ActorBehavior for Greeter {
    async fn handle(&mut self, invocation: Invocation, ctx: &ActorContext) -> ActorResult<Payload> {
        match invocation.selector() {
            "greet" => {
                let who: String = invocation.arg(0)?;
                self.greeted += 1;
                let caller = invocation
                    .caller()
                    .map(|endpoint| endpoint.to_string())
                    .unwrap_or_else(|| "local".to_string());
                Ok(Payload::encode(&format!(
                    "{} says hello to {who} (from {caller}, greeting #{}, actor {})",
                    self.name,
                    self.greeted,
                    ctx.identity()
                ))?)
            }
            "greeted" => Ok(Payload::encode(&self.greeted)?),
            _ => Err(invocation.unknown_selector()),
        }
    }
}

fn load_config(args: &Args) -> Result<RuntimeConfig> {
    match &args.config {
        Some(path) => RuntimeConfig::load(path),
        None => RuntimeConfig::from_env(),
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let first = load_config(&args).context("Failed to load node configuration")?;
    init_tracing(args.log_level.as_deref().unwrap_or(&first.log_level));

    let peer = Endpoint::new(args.peer.as_str()).context("Invalid peer endpoint")?;
    let mut second = first.clone();
    second.node.endpoint = peer.clone();
    second.node.peers = vec![first.node.endpoint.clone()];

    let network = MemoryNetwork::new();
    let a = ActorSystem::start(first.clone(), network.transport(first.node.endpoint.clone())?)?;
    let b = ActorSystem::start(second, network.transport(peer.clone())?)?;
    info!(node_a = %a.local_endpoint(), node_b = %b.local_endpoint(), "Nodes started");

    let greeter = TypeTag::new("greeter")?;
    b.register_type(greeter.clone(), |identity| {
        Box::new(Greeter {
            name: format!("greeter-{}", identity.token().simple()),
            greeted: 0,
        })
    });

    activation_walkthrough(&a, &b, greeter).await?;
    discovery_walkthrough(&a, &b).await?;
    if !args.no_faults {
        fault_walkthrough(&network, &a, &b).await?;
    }

    for (name, system) in [("a", &a), ("b", &b)] {
        let stats = system.stats();
        info!(
            node = name,
            activated = stats.actors_activated,
            remote_calls = stats.remote_calls,
            timeouts = stats.call_timeouts,
            unreachable = stats.calls_failed_unreachable,
            evicted = stats.evicted_entries,
            "Final stats"
        );
    }

    a.shutdown().await?;
    b.shutdown().await?;
    info!("Demo finished");
    Ok(())
}

/// Identity minted on B, handed to A as text, activated by A's first call
async fn activation_walkthrough(a: &ActorSystem, b: &ActorSystem, greeter: TypeTag) -> Result<()> {
    let minted = b.allocate(Some(greeter));
    let identity = a.parse_identity(&minted.to_string())?;
    let reference = a.resolve(&identity)?;
    info!(actor_id = %identity, local = reference.is_local(), "Resolved without contacting the peer");

    for who in ["alice", "bob"] {
        let reply: String = a.call(&reference, "greet", &(who,)).await?;
        info!(%reply, "Greeting");
    }
    info!(live_on_b = b.live_instances().len(), "Activation complete");
    Ok(())
}

/// A check-in on B becomes a usable reference in A's listing
async fn discovery_walkthrough(a: &ActorSystem, b: &ActorSystem) -> Result<()> {
    let tag = ReceptionTag::new("greeters")?;
    let mut listing = a.listing(&tag);

    let spawned = b.spawn(
        Greeter {
            name: "front-desk".to_string(),
            greeted: 0,
        },
        None,
    )?;
    b.check_in(&spawned, tag.clone()).await?;

    let entry = tokio::time::timeout(a.config().calls.default_timeout(), listing.next())
        .await
        .context("Check-in never reached the peer")?
        .context("Listing closed")?;
    info!(actor_id = %entry.identity, tag = %entry.tag, "Discovered");

    let reply: String = a.call(&entry.reference, "greet", &("carol",)).await?;
    info!(%reply, "Greeting through discovered reference");
    Ok(())
}

/// Partition the nodes until the detector notices, then heal
async fn fault_walkthrough(network: &MemoryNetwork, a: &ActorSystem, b: &ActorSystem) -> Result<()> {
    let tag = ReceptionTag::new("greeters")?;
    let known = a.entries(&tag);
    let Some(entry) = known.first() else {
        warn!("Nothing discovered, skipping fault walkthrough");
        return Ok(());
    };

    network.partition(a.local_endpoint(), b.local_endpoint());
    info!("Partitioned");

    let quick = Duration::from_millis(200);
    match a
        .call_with_timeout::<String, _>(&entry.reference, "greet", &("dave",), quick)
        .await
    {
        Err(ActorError::Timeout { timeout_ms, .. }) => info!(timeout_ms, "Call timed out"),
        other => warn!(result = ?other, "Expected a timeout"),
    }

    let config = a.config();
    let detector = &config.failure_detector;
    tokio::time::sleep(detector.silence_threshold() + 2 * detector.heartbeat_interval()).await;
    info!(
        status = ?a.peer_status(b.local_endpoint()),
        remaining_entries = a.entries(&tag).len(),
        "After silence threshold"
    );
    match a.call::<String, _>(&entry.reference, "greet", &("erin",)).await {
        Err(e @ ActorError::PeerUnreachable { .. }) => info!(error = %e, "Failed fast"),
        other => warn!(result = ?other, "Expected a fast failure"),
    }

    network.heal(a.local_endpoint(), b.local_endpoint());
    tokio::time::sleep(3 * detector.heartbeat_interval()).await;
    info!(
        status = ?a.peer_status(b.local_endpoint()),
        restored_entries = a.entries(&tag).len(),
        "Healed"
    );

    let reply: String = a.call(&entry.reference, "greet", &("frank",)).await?;
    info!(%reply, "Calls flow again");
    Ok(())
}
