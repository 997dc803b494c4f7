//! Network Infrastructure
//!
//! The actor runtime never talks to sockets. It talks to a [`Transport`]:
//! something that can push opaque frames at an [`Endpoint`](types::Endpoint),
//! hand inbound frames to a sink, and send heartbeats to the peers it knows.
//! Production transports (TCP, WebSocket, multicast) live outside this crate
//! and only need to satisfy that contract.
//!
//! [`MemoryNetwork`] is the one implementation shipped here. It connects any
//! number of in-process nodes and can partition, black-hole or duplicate
//! traffic, which is what failure-detector and duplicate-reply tests need.

pub mod error;
pub mod transports;

// Re-export commonly used types
pub use error::{Result, TransportError};
pub use transports::{
    InboundFrame, InboundSink, MemoryNetwork, MemoryTransport, Transport, TransportMetrics,
};
