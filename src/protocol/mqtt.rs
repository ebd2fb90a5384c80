//! MQTT fixed-header packet encoding and parsing.
//!
//! A packet is one type/flags byte, the base-128 varint remaining length,
//! then the payload. The parser reports incomplete input as a byte target,
//! like [`crate::protocol::frame`].

use crate::error::{Error, Result};
use crate::protocol::varint::{self, VarintStatus};

/// A parsed MQTT packet locating the payload within the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqttPacket {
    /// The type/flags byte (packet type in the high nibble).
    pub mtype: u8,
    /// Offset of the payload within the parsed buffer.
    pub payload_start: usize,
    /// Payload ("remaining") length in bytes.
    pub payload_len: usize,
    /// Offset one past the end of the packet.
    pub end: usize,
}

/// Outcome of parsing a packet from a possibly-incomplete buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    /// At least this many bytes must be buffered before retrying.
    NeedMore(usize),
    /// A complete packet is available.
    Packet(MqttPacket),
}

/// Append a full MQTT packet (fixed header + payload) to `out`.
pub fn encode_packet(out: &mut Vec<u8>, mtype: u8, payload: &[u8]) {
    out.push(mtype);
    varint::encode(payload.len(), out);
    out.extend_from_slice(payload);
}

/// Total wire size of a packet carrying `len` payload bytes.
#[must_use]
pub const fn packet_size(len: usize) -> usize {
    1 + varint::encoded_size(len) + len
}

/// Parse a packet from the start of `buf`.
///
/// # Errors
///
/// Returns [`Error::ProtocolViolation`] if the remaining-length varint is
/// malformed (continuation bit set beyond 4 bytes).
pub fn parse_packet(buf: &[u8]) -> Result<PacketStatus> {
    if buf.len() < 2 {
        return Ok(PacketStatus::NeedMore(2));
    }
    let mtype = buf[0];
    let (payload_len, varint_size) = match varint::decode(&buf[1..]) {
        VarintStatus::Done { value, size } => (value, size),
        VarintStatus::NeedMore(n) => return Ok(PacketStatus::NeedMore(1 + n)),
        VarintStatus::Malformed => {
            return Err(Error::ProtocolViolation(
                "Malformed MQTT remaining length".into(),
            ));
        }
    };

    let payload_start = 1 + varint_size;
    let end = payload_start + payload_len;
    if buf.len() < end {
        return Ok(PacketStatus::NeedMore(end));
    }

    Ok(PacketStatus::Packet(MqttPacket {
        mtype,
        payload_start,
        payload_len,
        end,
    }))
}
