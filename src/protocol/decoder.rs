//! Wire-mode dispatch for the receive path.
//!
//! The decoder is a pure function over the unread region of the receive
//! buffer. It never touches the socket: under-read is reported as
//! [`DecodeOutcome::NeedMore`] with a byte target, and the connection's
//! receive loop reads until the target is met and retries. Real failures
//! (masked server frames, MQTT/WebSocket length mismatch, oversized
//! payloads) are errors, never control flow.

use crate::config::WireMode;
use crate::error::{Error, Result};
use crate::message::BINARY;
use crate::protocol::frame::{self, FrameStatus};
use crate::protocol::mqtt::{self, PacketStatus};

/// A fully decoded incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// The message type tag: the WebSocket opcode for WS13, the MQTT
    /// control-packet type nibble for the MQTT modes.
    pub mtype: u8,
    /// The frame payload, copied out of the receive buffer.
    pub payload: Vec<u8>,
    /// Bytes consumed from the unread region.
    pub consumed: usize,
}

/// Outcome of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// At least this many unread bytes must be buffered before retrying.
    NeedMore(usize),
    /// A complete frame was decoded.
    Frame(DecodedFrame),
}

/// Attempt to decode one frame from `unread` according to `mode`.
///
/// # Errors
///
/// - [`Error::ProtocolViolation`] for a masked server frame, a malformed
///   MQTT remaining length, or an MQTT packet that does not exactly fill
///   its carrying WebSocket frame.
/// - [`Error::MessageTooLarge`] when a declared payload exceeds `max_frame`.
pub fn decode(mode: WireMode, unread: &[u8], max_frame: usize) -> Result<DecodeOutcome> {
    match mode {
        WireMode::Ws13 => decode_ws13(unread, max_frame),
        WireMode::MqttRaw => decode_mqtt_raw(unread, max_frame),
        WireMode::MqttOverWs => decode_mqtt_over_ws(unread, max_frame),
        WireMode::FramingLess => decode_framing_less(unread),
    }
}

fn decode_ws13(unread: &[u8], max_frame: usize) -> Result<DecodeOutcome> {
    let frame = match frame::parse_frame(unread, max_frame)? {
        FrameStatus::NeedMore(n) => return Ok(DecodeOutcome::NeedMore(n)),
        FrameStatus::Frame(f) => f,
    };
    if frame.mask.is_some() {
        return Err(Error::ProtocolViolation("Mask set from server".into()));
    }
    Ok(DecodeOutcome::Frame(DecodedFrame {
        mtype: frame.mtype,
        payload: unread[frame.payload_start..frame.end].to_vec(),
        consumed: frame.end,
    }))
}

fn decode_mqtt_raw(unread: &[u8], max_frame: usize) -> Result<DecodeOutcome> {
    let pkt = match mqtt::parse_packet(unread)? {
        PacketStatus::NeedMore(n) => return Ok(DecodeOutcome::NeedMore(n)),
        PacketStatus::Packet(p) => p,
    };
    if pkt.payload_len > max_frame {
        return Err(Error::MessageTooLarge {
            size: pkt.payload_len as u64,
            max: max_frame as u64,
        });
    }
    Ok(DecodeOutcome::Frame(DecodedFrame {
        mtype: pkt.mtype >> 4,
        payload: unread[pkt.payload_start..pkt.end].to_vec(),
        consumed: pkt.end,
    }))
}

/// One MQTT packet per WebSocket frame; a packet spanning frames is a
/// violation rather than a reassembly case.
fn decode_mqtt_over_ws(unread: &[u8], max_frame: usize) -> Result<DecodeOutcome> {
    let ws = match frame::parse_frame(unread, max_frame)? {
        FrameStatus::NeedMore(n) => return Ok(DecodeOutcome::NeedMore(n)),
        FrameStatus::Frame(f) => f,
    };
    if ws.mask.is_some() {
        return Err(Error::ProtocolViolation("Mask set from server".into()));
    }

    let carried = &unread[ws.payload_start..ws.end];
    let pkt = match mqtt::parse_packet(carried)? {
        PacketStatus::NeedMore(_) => {
            return Err(Error::ProtocolViolation(
                "MQTT packet truncated within WebSocket frame".into(),
            ));
        }
        PacketStatus::Packet(p) => p,
    };
    if pkt.end != carried.len() {
        return Err(Error::ProtocolViolation(format!(
            "MQTT packet length {} does not match WebSocket payload length {}",
            pkt.end,
            carried.len()
        )));
    }

    Ok(DecodeOutcome::Frame(DecodedFrame {
        mtype: pkt.mtype >> 4,
        payload: carried[pkt.payload_start..pkt.end].to_vec(),
        consumed: ws.end,
    }))
}

/// No framing: whatever is buffered is one message.
fn decode_framing_less(unread: &[u8]) -> Result<DecodeOutcome> {
    if unread.is_empty() {
        return Ok(DecodeOutcome::NeedMore(1));
    }
    Ok(DecodeOutcome::Frame(DecodedFrame {
        mtype: BINARY,
        payload: unread.to_vec(),
        consumed: unread.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MQTT_PUBLISH, TEXT};
    use crate::protocol::varint;

    const MAX: usize = 16 * 1024 * 1024;

    fn server_ws_frame(mtype: u8, payload: &[u8]) -> Vec<u8> {
        // Unmasked, as a server would send.
        let mut out = vec![0x80 | mtype];
        let len = payload.len();
        if len <= 125 {
            out.push(len as u8);
        } else if len <= 65_535 {
            out.push(126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        out.extend_from_slice(payload);
        out
    }

    fn mqtt_packet(mtype: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![mtype];
        varint::encode(payload.len(), &mut out);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_ws13_decode() {
        let wire = server_ws_frame(TEXT, b"hello");
        let DecodeOutcome::Frame(f) = decode(WireMode::Ws13, &wire, MAX).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(f.mtype, TEXT);
        assert_eq!(f.payload, b"hello");
        assert_eq!(f.consumed, wire.len());
    }

    #[test]
    fn test_ws13_rejects_masked_server_frame() {
        let wire = [0x81u8, 0x80 | 0x01, 1, 2, 3, 4, 0x00];
        let result = decode(WireMode::Ws13, &wire, MAX);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_ws13_incremental_feed() {
        let wire = server_ws_frame(TEXT, b"incremental");
        let mut have = 0;
        loop {
            match decode(WireMode::Ws13, &wire[..have], MAX).unwrap() {
                DecodeOutcome::NeedMore(target) => {
                    assert!(target > have, "target must move forward");
                    have = target.min(wire.len());
                }
                DecodeOutcome::Frame(f) => {
                    assert_eq!(f.payload, b"incremental");
                    break;
                }
            }
        }
    }

    #[test]
    fn test_mqtt_raw_decode() {
        let wire = mqtt_packet(MQTT_PUBLISH, b"topic+body");
        let DecodeOutcome::Frame(f) = decode(WireMode::MqttRaw, &wire, MAX).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(f.mtype, 3); // PUBLISH nibble
        assert_eq!(f.payload, b"topic+body");
        assert_eq!(f.consumed, wire.len());
    }

    #[test]
    fn test_mqtt_raw_needs_more() {
        let wire = mqtt_packet(MQTT_PUBLISH, &[0u8; 300]);
        assert_eq!(
            decode(WireMode::MqttRaw, &wire[..1], MAX).unwrap(),
            DecodeOutcome::NeedMore(2)
        );
        assert_eq!(
            decode(WireMode::MqttRaw, &wire[..10], MAX).unwrap(),
            DecodeOutcome::NeedMore(wire.len())
        );
    }

    #[test]
    fn test_mqtt_raw_too_large() {
        let wire = mqtt_packet(MQTT_PUBLISH, &[0u8; 64]);
        let result = decode(WireMode::MqttRaw, &wire, 32);
        assert!(matches!(result, Err(Error::MessageTooLarge { .. })));
    }

    #[test]
    fn test_mqtt_over_ws_decode() {
        let pkt = mqtt_packet(MQTT_PUBLISH, b"payload");
        let wire = server_ws_frame(0x02, &pkt);
        let DecodeOutcome::Frame(f) = decode(WireMode::MqttOverWs, &wire, MAX).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(f.mtype, 3);
        assert_eq!(f.payload, b"payload");
        assert_eq!(f.consumed, wire.len());
    }

    #[test]
    fn test_mqtt_over_ws_length_mismatch() {
        // WebSocket frame carries the MQTT packet plus a stray byte.
        let mut pkt = mqtt_packet(MQTT_PUBLISH, b"payload");
        pkt.push(0xee);
        let wire = server_ws_frame(0x02, &pkt);
        let result = decode(WireMode::MqttOverWs, &wire, MAX);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_mqtt_over_ws_truncated_packet() {
        // MQTT header declares more payload than the frame carries.
        let pkt = mqtt_packet(MQTT_PUBLISH, b"payload");
        let wire = server_ws_frame(0x02, &pkt[..pkt.len() - 2]);
        let result = decode(WireMode::MqttOverWs, &wire, MAX);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_mqtt_over_ws_partial_ws_frame_is_need_more() {
        let pkt = mqtt_packet(MQTT_PUBLISH, b"payload");
        let wire = server_ws_frame(0x02, &pkt);
        // WS frame itself incomplete: still ordinary control flow.
        assert_eq!(
            decode(WireMode::MqttOverWs, &wire[..3], MAX).unwrap(),
            DecodeOutcome::NeedMore(wire.len())
        );
    }

    #[test]
    fn test_framing_less_takes_everything() {
        assert_eq!(
            decode(WireMode::FramingLess, &[], MAX).unwrap(),
            DecodeOutcome::NeedMore(1)
        );
        let DecodeOutcome::Frame(f) =
            decode(WireMode::FramingLess, b"{\"a\":1}", MAX).unwrap()
        else {
            panic!("expected frame");
        };
        assert_eq!(f.mtype, BINARY);
        assert_eq!(f.payload, b"{\"a\":1}");
        assert_eq!(f.consumed, 7);
    }
}
