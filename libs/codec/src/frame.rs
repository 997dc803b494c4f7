//! Wire envelope
//!
//! Fixed little-endian header, JSON body, CRC32 trailer. The header carries
//! everything needed to route or reject a frame without touching the body.

use crate::error::{CodecError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::{Cursor, Read, Write};
use types::{ActorIdentity, CorrelationToken};

/// Wire format constants
pub struct WireFormat;

impl WireFormat {
    /// Protocol version
    pub const VERSION: u8 = 1;
    /// Magic bytes for frame validation
    pub const MAGIC: &'static [u8; 4] = b"ACTR";
    /// Fixed header size in bytes
    pub const HEADER_SIZE: usize = 24;
    /// Checksum trailer size in bytes
    pub const TRAILER_SIZE: usize = 4;
    /// Maximum body size (16MB)
    pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;
}

/// Message kind carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    Invoke = 1,
    Reply = 2,
    CheckIn = 3,
    Heartbeat = 4,
    Deregister = 5,
    Forget = 6,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Invoke => "invoke",
            MessageKind::Reply => "reply",
            MessageKind::CheckIn => "check_in",
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::Deregister => "deregister",
            MessageKind::Forget => "forget",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize)]
struct WireBody {
    #[serde(default)]
    target: Option<ActorIdentity>,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    payload: Value,
}

/// Self-describing record of one transport frame.
///
/// `selector` is the method name for invocations and the tag for check-ins.
/// The meaning of `payload` depends on `kind`; see [`crate::Frame`] for the
/// typed view.
#[derive(Debug, Clone, PartialEq)]
pub struct WireEnvelope {
    pub version: u8,
    pub kind: MessageKind,
    pub correlation: CorrelationToken,
    pub target: Option<ActorIdentity>,
    pub selector: Option<String>,
    pub payload: Value,
}

impl WireEnvelope {
    pub fn new(kind: MessageKind, correlation: CorrelationToken) -> Self {
        Self {
            version: WireFormat::VERSION,
            kind,
            correlation,
            target: None,
            selector: None,
            payload: Value::Null,
        }
    }

    pub fn with_target(mut self, target: ActorIdentity) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Serialize envelope to wire format
    pub fn to_bytes(&self) -> Result<Bytes> {
        let body = serde_json::to_vec(&WireBody {
            target: self.target.clone(),
            selector: self.selector.clone(),
            payload: self.payload.clone(),
        })
        .map_err(|e| CodecError::serialization(format!("{} body", self.kind), e))?;

        if body.len() > WireFormat::MAX_BODY_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: body.len(),
                max: WireFormat::MAX_BODY_SIZE,
            });
        }

        let mut buffer =
            Vec::with_capacity(WireFormat::HEADER_SIZE + body.len() + WireFormat::TRAILER_SIZE);
        write_header(&mut buffer, self, body.len() as u32)
            .map_err(|e| CodecError::serialization("header", e))?;
        buffer.extend_from_slice(&body);

        let checksum = crc32fast::hash(&buffer);
        buffer
            .write_u32::<LittleEndian>(checksum)
            .map_err(|e| CodecError::serialization("checksum", e))?;

        Ok(Bytes::from(buffer))
    }

    /// Deserialize envelope from wire format
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (header, body) = verify(data)?;
        let body: WireBody = serde_json::from_slice(body)
            .map_err(|e| CodecError::malformed(header.kind.as_str(), e.to_string()))?;

        Ok(Self {
            version: WireFormat::VERSION,
            kind: header.kind,
            correlation: header.correlation,
            target: body.target,
            selector: body.selector,
            payload: body.payload,
        })
    }

    /// Check framing and checksum without parsing the body.
    ///
    /// Lets a receiver answer an intact frame whose body it cannot use.
    pub fn verify_header(data: &[u8]) -> Result<FrameHeader> {
        verify(data).map(|(header, _)| header)
    }
}

/// Header fields of a frame whose framing and checksum verified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: MessageKind,
    pub correlation: CorrelationToken,
}

/// Validate magic, version, kind, length and checksum; return the body slice
fn verify(data: &[u8]) -> Result<(FrameHeader, &[u8])> {
    let minimum = WireFormat::HEADER_SIZE + WireFormat::TRAILER_SIZE;
    if data.len() < minimum {
        return Err(CodecError::Truncated {
            need: minimum,
            got: data.len(),
        });
    }

    let mut cursor = Cursor::new(data);
    let header = read_header(&mut cursor).map_err(|_| CodecError::Truncated {
        need: WireFormat::HEADER_SIZE,
        got: data.len(),
    })?;

    if header.magic != *WireFormat::MAGIC {
        return Err(CodecError::InvalidMagic {
            expected: *WireFormat::MAGIC,
            actual: header.magic,
        });
    }
    if header.version != WireFormat::VERSION {
        return Err(CodecError::ProtocolVersionMismatch {
            expected: WireFormat::VERSION,
            actual: header.version,
        });
    }
    let kind = MessageKind::try_from(header.kind)
        .map_err(|_| CodecError::UnknownKind { kind: header.kind })?;

    let body_len = header.body_len as usize;
    if body_len > WireFormat::MAX_BODY_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: body_len,
            max: WireFormat::MAX_BODY_SIZE,
        });
    }
    let total = WireFormat::HEADER_SIZE + body_len + WireFormat::TRAILER_SIZE;
    if data.len() < total {
        return Err(CodecError::Truncated {
            need: total,
            got: data.len(),
        });
    }

    let checksum_pos = WireFormat::HEADER_SIZE + body_len;
    let mut trailer = &data[checksum_pos..total];
    let expected = trailer
        .read_u32::<LittleEndian>()
        .map_err(|_| CodecError::Truncated {
            need: total,
            got: data.len(),
        })?;
    let calculated = crc32fast::hash(&data[..checksum_pos]);
    if expected != calculated {
        return Err(CodecError::ChecksumMismatch {
            expected,
            calculated,
        });
    }

    let header = FrameHeader {
        kind,
        correlation: CorrelationToken::new(header.correlation),
    };
    Ok((header, &data[WireFormat::HEADER_SIZE..checksum_pos]))
}

struct RawHeader {
    magic: [u8; 4],
    version: u8,
    kind: u8,
    correlation: u64,
    body_len: u32,
}

fn write_header(buffer: &mut Vec<u8>, envelope: &WireEnvelope, body_len: u32) -> std::io::Result<()> {
    buffer.write_all(WireFormat::MAGIC)?; // 4 bytes: magic
    buffer.write_u8(envelope.version)?; // 1 byte: version
    buffer.write_u8(envelope.kind.into())?; // 1 byte: kind
    buffer.write_u8(0)?; // 1 byte: flags
    buffer.write_u8(0)?; // 1 byte: reserved
    buffer.write_u64::<LittleEndian>(envelope.correlation.value())?; // 8 bytes: correlation
    buffer.write_u32::<LittleEndian>(body_len)?; // 4 bytes: body_len
    buffer.write_u32::<LittleEndian>(0)?; // 4 bytes: reserved
    Ok(())
}

fn read_header(cursor: &mut Cursor<&[u8]>) -> std::io::Result<RawHeader> {
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    let version = cursor.read_u8()?;
    let kind = cursor.read_u8()?;
    let _flags = cursor.read_u8()?;
    let _reserved = cursor.read_u8()?;
    let correlation = cursor.read_u64::<LittleEndian>()?;
    let body_len = cursor.read_u32::<LittleEndian>()?;
    let _reserved = cursor.read_u32::<LittleEndian>()?;
    Ok(RawHeader {
        magic,
        version,
        kind,
        correlation,
        body_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> WireEnvelope {
        WireEnvelope::new(MessageKind::Invoke, CorrelationToken::new(42))
            .with_target(
                "counter:6f1c2d3e4f5a69788796a5b4c3d2e1f0@node-b"
                    .parse()
                    .unwrap(),
            )
            .with_selector("increment")
            .with_payload(json!([1, "two", {"z": 1, "a": 2}]))
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = sample();
        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(&bytes[..4], WireFormat::MAGIC);

        let decoded = WireEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.target.unwrap().origin().unwrap().as_str(), "node-b");
    }

    #[test]
    fn test_header_verifies_when_body_is_unusable() {
        let mut bytes = sample().to_bytes().unwrap().to_vec();
        let body_end = bytes.len() - WireFormat::TRAILER_SIZE;
        bytes[WireFormat::HEADER_SIZE] = b'[';
        let checksum = crc32fast::hash(&bytes[..body_end]);
        bytes[body_end..].copy_from_slice(&checksum.to_le_bytes());

        assert!(matches!(
            WireEnvelope::from_bytes(&bytes),
            Err(CodecError::Malformed { kind: "invoke", .. })
        ));
        let header = WireEnvelope::verify_header(&bytes).unwrap();
        assert_eq!(header.kind, MessageKind::Invoke);
        assert_eq!(header.correlation, CorrelationToken::new(42));

        bytes[body_end] ^= 0xff;
        assert!(WireEnvelope::verify_header(&bytes).is_err());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(sample().to_bytes().unwrap(), sample().to_bytes().unwrap());
    }

    #[test]
    fn test_rejects_corruption() {
        let mut bytes = sample().to_bytes().unwrap().to_vec();
        let last = WireFormat::HEADER_SIZE + 3;
        bytes[last] ^= 0xff;
        assert!(matches!(
            WireEnvelope::from_bytes(&bytes),
            Err(CodecError::ChecksumMismatch { .. })
        ));

        let mut bytes = sample().to_bytes().unwrap().to_vec();
        bytes[0] = b'X';
        assert!(matches!(
            WireEnvelope::from_bytes(&bytes),
            Err(CodecError::InvalidMagic { .. })
        ));

        let bytes = sample().to_bytes().unwrap();
        assert!(matches!(
            WireEnvelope::from_bytes(&bytes[..bytes.len() - 1]),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(
            WireEnvelope::from_bytes(b"ACTR"),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_rejects_other_protocol_version() {
        let mut envelope = sample();
        envelope.version = WireFormat::VERSION + 1;
        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(
            WireEnvelope::from_bytes(&bytes),
            Err(CodecError::ProtocolVersionMismatch {
                expected: WireFormat::VERSION,
                actual: WireFormat::VERSION + 1,
            })
        );
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let mut bytes = sample().to_bytes().unwrap().to_vec();
        bytes[5] = 0xee;
        // Re-seal so the kind check is what fails
        let end = bytes.len() - WireFormat::TRAILER_SIZE;
        let checksum = crc32fast::hash(&bytes[..end]).to_le_bytes();
        bytes[end..].copy_from_slice(&checksum);
        assert_eq!(
            WireEnvelope::from_bytes(&bytes),
            Err(CodecError::UnknownKind { kind: 0xee })
        );
    }

    #[test]
    fn test_kind_byte_values() {
        assert_eq!(u8::from(MessageKind::Invoke), 1);
        assert_eq!(MessageKind::try_from(6u8).unwrap(), MessageKind::Forget);
        assert!(MessageKind::try_from(0u8).is_err());
    }
}
