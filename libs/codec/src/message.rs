//! Typed frames and the invocation codec
//!
//! [`Frame`] is what the runtime works with; [`WireEnvelope`] is what goes on
//! the wire. Conversion in both directions checks that each kind carries the
//! fields it needs, so the dispatcher never sees a half-formed invocation.

use crate::error::{CodecError, Result};
use crate::frame::{MessageKind, WireEnvelope};
use crate::payload::{Arguments, Payload};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use types::{ActorIdentity, CorrelationToken, Endpoint, ReceptionTag};

/// Method call addressed to one actor
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationEnvelope {
    pub target: ActorIdentity,
    pub selector: String,
    pub arguments: Arguments,
    pub correlation: CorrelationToken,
}

/// Selectors name a handler method and cannot be empty
pub fn check_selector(selector: &str) -> Result<()> {
    if selector.is_empty() {
        return Err(CodecError::serialization("selector", "empty selector"));
    }
    Ok(())
}

/// Failure category reported by the side that ran (or tried to run) a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnresolvableIdentity,
    Serialization,
    Timeout,
    PeerUnreachable,
    ProtocolVersionMismatch,
    Handler,
    ActorStopped,
    Shutdown,
}

/// Error half of a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RemoteFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Result of one invocation, echoing the caller's correlation token
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationReply {
    pub correlation: CorrelationToken,
    pub outcome: std::result::Result<Payload, RemoteFailure>,
}

impl InvocationReply {
    pub fn success(correlation: CorrelationToken, payload: Payload) -> Self {
        Self {
            correlation,
            outcome: Ok(payload),
        }
    }

    pub fn failure(correlation: CorrelationToken, failure: RemoteFailure) -> Self {
        Self {
            correlation,
            outcome: Err(failure),
        }
    }
}

/// Announcement that `identity` is discoverable under `tag` at `endpoint`
#[derive(Debug, Clone, PartialEq)]
pub struct CheckIn {
    pub identity: ActorIdentity,
    pub tag: ReceptionTag,
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deregister {
    pub identity: ActorIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub sequence: u64,
}

/// Caller gave up on `correlation`; any reply can be discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forget {
    pub correlation: CorrelationToken,
}

/// Every message the runtime exchanges with peers
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Invoke(InvocationEnvelope),
    Reply(InvocationReply),
    CheckIn(CheckIn),
    Heartbeat(Heartbeat),
    Deregister(Deregister),
    Forget(Forget),
}

impl Frame {
    pub fn kind(&self) -> MessageKind {
        match self {
            Frame::Invoke(_) => MessageKind::Invoke,
            Frame::Reply(_) => MessageKind::Reply,
            Frame::CheckIn(_) => MessageKind::CheckIn,
            Frame::Heartbeat(_) => MessageKind::Heartbeat,
            Frame::Deregister(_) => MessageKind::Deregister,
            Frame::Forget(_) => MessageKind::Forget,
        }
    }

    /// Correlation token, for the kinds that have one
    pub fn correlation(&self) -> Option<CorrelationToken> {
        match self {
            Frame::Invoke(env) => Some(env.correlation),
            Frame::Reply(reply) => Some(reply.correlation),
            Frame::Forget(forget) => Some(forget.correlation),
            _ => None,
        }
    }

    pub fn to_wire(&self) -> Result<WireEnvelope> {
        let wire = match self {
            Frame::Invoke(env) => {
                check_selector(&env.selector)?;
                WireEnvelope::new(MessageKind::Invoke, env.correlation)
                    .with_target(env.target.clone())
                    .with_selector(env.selector.clone())
                    .with_payload(Value::Array(env.arguments.values().to_vec()))
            }
            Frame::Reply(reply) => {
                let payload = serde_json::to_value(&reply.outcome)
                    .map_err(|e| CodecError::serialization("reply outcome", e))?;
                WireEnvelope::new(MessageKind::Reply, reply.correlation).with_payload(payload)
            }
            Frame::CheckIn(check_in) => WireEnvelope::new(MessageKind::CheckIn, CorrelationToken::NONE)
                .with_target(check_in.identity.clone())
                .with_selector(check_in.tag.as_str())
                .with_payload(json!({ "endpoint": check_in.endpoint })),
            Frame::Heartbeat(hb) => WireEnvelope::new(MessageKind::Heartbeat, CorrelationToken::NONE)
                .with_payload(json!({ "sequence": hb.sequence })),
            Frame::Deregister(dereg) => {
                WireEnvelope::new(MessageKind::Deregister, CorrelationToken::NONE)
                    .with_target(dereg.identity.clone())
            }
            Frame::Forget(forget) => WireEnvelope::new(MessageKind::Forget, forget.correlation),
        };
        Ok(wire)
    }

    pub fn from_wire(wire: WireEnvelope) -> Result<Self> {
        let kind = wire.kind.as_str();
        let frame = match wire.kind {
            MessageKind::Invoke => {
                let target = checked_target(kind, wire.target)?;
                let selector = wire
                    .selector
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| CodecError::malformed(kind, "missing selector"))?;
                let arguments = match wire.payload {
                    Value::Array(items) => Arguments::from_values(items),
                    Value::Null => Arguments::new(),
                    other => {
                        return Err(CodecError::malformed(
                            kind,
                            format!("arguments must be an array, got {}", crate::describe_shape(&other)),
                        ))
                    }
                };
                Frame::Invoke(InvocationEnvelope {
                    target,
                    selector,
                    arguments,
                    correlation: wire.correlation,
                })
            }
            MessageKind::Reply => {
                let outcome = serde_json::from_value(wire.payload)
                    .map_err(|e| CodecError::malformed(kind, e.to_string()))?;
                Frame::Reply(InvocationReply {
                    correlation: wire.correlation,
                    outcome,
                })
            }
            MessageKind::CheckIn => {
                let identity = checked_target(kind, wire.target)?;
                let tag = wire
                    .selector
                    .ok_or_else(|| CodecError::malformed(kind, "missing tag"))
                    .and_then(|tag| {
                        ReceptionTag::new(tag).map_err(|e| CodecError::malformed(kind, e.to_string()))
                    })?;
                let endpoint = wire
                    .payload
                    .get("endpoint")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CodecError::malformed(kind, "missing endpoint"))
                    .and_then(|ep| {
                        Endpoint::new(ep).map_err(|e| CodecError::malformed(kind, e.to_string()))
                    })?;
                Frame::CheckIn(CheckIn {
                    identity,
                    tag,
                    endpoint,
                })
            }
            MessageKind::Heartbeat => {
                let sequence = wire
                    .payload
                    .get("sequence")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| CodecError::malformed(kind, "missing sequence"))?;
                Frame::Heartbeat(Heartbeat { sequence })
            }
            MessageKind::Deregister => Frame::Deregister(Deregister {
                identity: checked_target(kind, wire.target)?,
            }),
            MessageKind::Forget => Frame::Forget(Forget {
                correlation: wire.correlation,
            }),
        };
        Ok(frame)
    }
}

fn checked_target(kind: &'static str, target: Option<ActorIdentity>) -> Result<ActorIdentity> {
    let target = target.ok_or_else(|| CodecError::malformed(kind, "missing target identity"))?;
    target
        .check()
        .map_err(|e| CodecError::malformed(kind, e.to_string()))?;
    Ok(target)
}

/// Encodes frames for the transport and decodes what it delivers
#[derive(Debug, Clone, Copy, Default)]
pub struct InvocationCodec;

impl InvocationCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, frame: &Frame) -> Result<Bytes> {
        frame.to_wire()?.to_bytes()
    }

    pub fn decode(&self, data: &[u8]) -> Result<Frame> {
        Frame::from_wire(WireEnvelope::from_bytes(data)?)
    }

    pub fn encode_invocation(&self, envelope: &InvocationEnvelope) -> Result<Bytes> {
        self.encode(&Frame::Invoke(envelope.clone()))
    }

    pub fn decode_invocation(&self, data: &[u8]) -> Result<InvocationEnvelope> {
        match self.decode(data)? {
            Frame::Invoke(envelope) => Ok(envelope),
            other => Err(CodecError::malformed(
                "invoke",
                format!("expected invoke frame, got {}", other.kind()),
            )),
        }
    }

    pub fn encode_reply(&self, reply: &InvocationReply) -> Result<Bytes> {
        self.encode(&Frame::Reply(reply.clone()))
    }

    pub fn decode_reply(&self, data: &[u8]) -> Result<InvocationReply> {
        match self.decode(data)? {
            Frame::Reply(reply) => Ok(reply),
            other => Err(CodecError::malformed(
                "reply",
                format!("expected reply frame, got {}", other.kind()),
            )),
        }
    }
}
