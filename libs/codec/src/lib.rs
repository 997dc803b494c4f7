//! # Invocation Codec
//!
//! ## Purpose
//!
//! The codec is the only place where actor calls touch bytes. It turns
//! invocations, replies and discovery announcements into self-describing
//! transport frames and back, and it is the boundary that enforces payload
//! representability: anything that cannot be expressed as a JSON value is
//! rejected here with [`CodecError::Serialization`].
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/network
//!     ↑           ↓            ↓
//! Identities   Frames       Opaque bytes
//! Endpoints    Payloads     between processes
//! ```
//!
//! ## Frame Layout
//!
//! ```text
//! ┌────────┬─────────┬──────┬───────┬──────────┬─────────────┬──────────┬──────────┬───────┐
//! │ magic  │ version │ kind │ flags │ reserved │ correlation │ body_len │ reserved │ body  │ crc32
//! │ 4 B    │ 1 B     │ 1 B  │ 1 B   │ 1 B      │ 8 B LE      │ 4 B LE   │ 4 B      │ JSON  │ 4 B LE
//! └────────┴─────────┴──────┴───────┴──────────┴─────────────┴──────────┴──────────┴───────┘
//! ```
//!
//! The body is a JSON object `{"target", "selector", "payload"}` whose field
//! meaning depends on the frame kind. JSON objects serialize with sorted keys,
//! so encoding the same message always produces the same bytes.
//!
//! ## What This Crate Does NOT Contain
//! - Transport logic or connection handling (belongs in network/)
//! - Identity allocation (belongs in the actor runtime)

pub mod error;
pub mod frame;
pub mod message;
pub mod payload;
mod scan;

pub use error::{CodecError, Result};
pub use frame::{FrameHeader, MessageKind, WireEnvelope, WireFormat};
pub use message::{
    check_selector, CheckIn, Deregister, FailureKind, Forget, Frame, Heartbeat, InvocationCodec,
    InvocationEnvelope, InvocationReply, RemoteFailure,
};
pub use payload::{describe_shape, Arguments, Payload};
