//! Wire framing: WebSocket v13, raw MQTT, MQTT-over-WebSocket, framing-less.
//!
//! Encode and decode are pure byte-level operations, decoupled from socket
//! I/O so each framing algorithm is testable on its own. The connection
//! layer owns the sockets and buffers and calls in here.

pub mod decoder;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod mqtt;
pub mod varint;

use crate::config::WireMode;
use crate::error::Result;
use crate::message::BINARY;

/// Encode one outgoing message into `out` according to `mode`.
///
/// For [`WireMode::MqttOverWs`] the MQTT packet is assembled first and then
/// sliced into WebSocket binary frames of `chunk_size` bytes each. Zero
/// sends the whole packet in a single frame. A negative value is a test
/// mode: PUBLISH packets are duplicated back to back before chunking by the
/// absolute value, producing deliberately pathological wire traffic.
///
/// # Errors
///
/// Returns [`crate::error::Error::Io`] if the system randomness source
/// fails while drawing frame masks.
pub fn encode_message(
    out: &mut Vec<u8>,
    mode: WireMode,
    mtype: u8,
    payload: &[u8],
    chunk_size: i32,
) -> Result<()> {
    match mode {
        WireMode::FramingLess => {
            out.extend_from_slice(payload);
        }
        WireMode::MqttRaw => {
            mqtt::encode_packet(out, mtype, payload);
        }
        WireMode::Ws13 => {
            frame::encode_frame(out, mtype, mask::random_mask()?, payload);
        }
        WireMode::MqttOverWs => {
            let mut packet = Vec::with_capacity(mqtt::packet_size(payload.len()));
            mqtt::encode_packet(&mut packet, mtype, payload);

            let chunk = if chunk_size < 0 {
                if mtype >> 4 == 3 {
                    // PUBLISH only; control packets are never duplicated.
                    let copy = packet.clone();
                    packet.extend_from_slice(&copy);
                }
                chunk_size.unsigned_abs() as usize
            } else {
                chunk_size as usize
            };

            if chunk == 0 || chunk >= packet.len() {
                frame::encode_frame(out, BINARY, mask::random_mask()?, &packet);
            } else {
                for piece in packet.chunks(chunk) {
                    frame::encode_frame(out, BINARY, mask::random_mask()?, piece);
                }
            }
        }
    }
    Ok(())
}
