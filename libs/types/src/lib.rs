//! # Actor Runtime Types
//!
//! Addressing vocabulary shared by every crate of the distributed actor
//! runtime. Nothing in here performs I/O or allocates identities: the
//! values are plain data that can be compared, hashed, cloned and shipped
//! across the wire with `serde`.
//!
//! ## Contents
//!
//! - [`ActorIdentity`]: globally unique actor name (128-bit token, optional
//!   type tag, optional origin hint)
//! - [`Endpoint`]: transport address of a process hosting actors
//! - [`TypeTag`]: actor kind, used to select activation factories
//! - [`ReceptionTag`]: key under which actors check in with the receptionist
//! - [`CorrelationToken`]: links an outbound invocation to its reply
//!
//! ## Text Form
//!
//! Identities print as `[tag:]<32 hex digits>[@endpoint]`:
//!
//! ```rust
//! use types::ActorIdentity;
//!
//! let id: ActorIdentity = "counter:6f1c2d3e4f5a69788796a5b4c3d2e1f0@node-b".parse().unwrap();
//! assert_eq!(id.type_tag().map(|t| t.as_str()), Some("counter"));
//! assert_eq!(id.origin().map(|e| e.as_str()), Some("node-b"));
//! assert_eq!(id.to_string(), "counter:6f1c2d3e4f5a69788796a5b4c3d2e1f0@node-b");
//! ```

pub mod address;
pub mod error;
pub mod identity;

pub use address::{CorrelationToken, Endpoint, ReceptionTag, TypeTag};
pub use error::{IdentityError, Result};
pub use identity::ActorIdentity;

/// Longest accepted type or reception tag, in bytes.
pub const MAX_TAG_LENGTH: usize = 64;

/// Longest accepted endpoint address, in bytes.
pub const MAX_ENDPOINT_LENGTH: usize = 255;

/// Endpoint name used when a node is not given an address.
pub const LOCAL_ENDPOINT: &str = "local";
