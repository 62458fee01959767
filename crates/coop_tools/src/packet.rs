//! Packet inspection.
//!
//! Turns captured hex into readable JSON and back, for debugging traffic
//! between hosts and clients.

use serde::Serialize;

use coop_core::protocol::{decode, encode, Message, MessageKind};
use coop_core::transport::Reliability;

use crate::{Result, ToolError};

/// A decoded packet with its header facts spelled out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedPacket {
    /// Raw kind tag from the header.
    pub tag: u8,
    /// Kind the tag maps to.
    pub kind: MessageKind,
    /// Delivery class the kind travels on.
    pub reliability: &'static str,
    /// Message size in bytes, header included.
    pub size: usize,
    /// Decoded message.
    pub message: Message,
}

/// Parse hex text, ignoring whitespace, `:` separators and a `0x` prefix.
pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    Ok(hex::decode(digits)?)
}

/// Decode one message from hex.
///
/// With `datagram` set, the first byte is treated as a transport control
/// byte and skipped.
pub fn decode_hex(input: &str, datagram: bool) -> Result<DecodedPacket> {
    let bytes = parse_hex(input)?;
    let bytes = if datagram {
        bytes
            .split_first()
            .map(|(_, rest)| rest.to_vec())
            .ok_or(ToolError::EmptyDatagram)?
    } else {
        bytes
    };

    let message = decode(&bytes)?;
    let kind = message.kind();
    Ok(DecodedPacket {
        tag: bytes.first().copied().unwrap_or_default(),
        kind,
        reliability: match kind.reliability() {
            Reliability::Reliable => "reliable",
            Reliability::Unreliable => "unreliable",
        },
        size: bytes.len(),
        message,
    })
}

/// Pretty JSON for a decoded packet.
pub fn to_json(packet: &DecodedPacket) -> Result<String> {
    Ok(serde_json::to_string_pretty(packet)?)
}

/// Encode a JSON message (as printed under `message`) to hex.
pub fn encode_json(json: &str) -> Result<String> {
    let message: Message = serde_json::from_str(json)?;
    Ok(hex::encode(encode(&message)?))
}
