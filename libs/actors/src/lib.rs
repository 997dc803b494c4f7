//! Location-Transparent Distributed Actors
//!
//! Actors are isolated units of state reached only through asynchronous
//! invocations. A caller holds an [`ActorReference`] and never needs to know
//! whether the target lives in this process or on another node: references
//! are resolved without network I/O, remote instances are activated on
//! first delivery, and discovery goes through a per-node [`Receptionist`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────── ActorSystem ─────────────────────────────┐
//! │                                                                       │
//! │  IdentityRegistry ──▶ Resolver ──▶ Local mailbox ──▶ ActorBehavior    │
//! │                          │                ▲                           │
//! │                          ▼                │ on-demand activation      │
//! │                     Dispatcher ──────┐    │                           │
//! │                     (pending calls)  │  inbound loop ◀─┐              │
//! │                                      ▼                 │              │
//! │  Receptionist ◀──── check-ins ──── Transport ──────────┘              │
//! │  FailureDetector ◀─ heartbeats ───┘                                   │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - At most one reply reaches a caller per correlation token, even when
//!   frames are duplicated on the wire.
//! - Invocations to one target are handled one at a time, in delivery order.
//! - Concurrent first arrivals for an identity activate exactly one instance.
//! - A listing never yields the same identity twice.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use codec::Payload;
//! use distributed_actors::{ActorBehavior, ActorContext, ActorResult, ActorSystem, Invocation};
//! use network::MemoryNetwork;
//! use runtime_config::RuntimeConfig;
//! use types::Endpoint;
//!
//! struct Counter(u64);
//!
//! #[async_trait]
//! impl ActorBehavior for Counter {
//!     async fn handle(&mut self, invocation: Invocation, _ctx: &ActorContext) -> ActorResult<Payload> {
//!         match invocation.selector() {
//!             "add" => {
//!                 self.0 += invocation.arg::<u64>(0)?;
//!                 Ok(Payload::encode(&self.0)?)
//!             }
//!             _ => Err(invocation.unknown_selector()),
//!         }
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let network = MemoryNetwork::new();
//! let transport = network.transport(Endpoint::new("node-a")?)?;
//! let system = ActorSystem::start(RuntimeConfig::default(), transport)?;
//!
//! let counter = system.spawn(Counter(0), None)?;
//! let total: u64 = system.call(&counter, "add", &(5u64,)).await?;
//! assert_eq!(total, 5);
//! system.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod actor;
mod dispatcher;
pub mod error;
pub mod failure_detector;
pub mod identity;
mod instances;
pub mod metrics;
pub mod receptionist;
pub mod reference;
pub mod resolver;
pub mod system;

pub use activation::ActivationHandler;
pub use actor::{ActorBehavior, ActorContext, Invocation, LocalRef};
pub use error::{ActorError, ActorResult};
pub use failure_detector::{FailureDetector, LivenessEvent, PeerStatus};
pub use identity::{IdentityRegistry, IdentityStats};
pub use metrics::{SystemMetrics, SystemStats};
pub use receptionist::{CheckInScope, Listing, Receptionist, ReceptionistEntry, RemovedEntry};
pub use reference::{ActorReference, RemoteRef};
pub use resolver::Resolver;
pub use system::ActorSystem;

// Frequently needed alongside the runtime
pub use codec::{Arguments, Payload};
pub use types::{ActorIdentity, Endpoint, ReceptionTag, TypeTag};
