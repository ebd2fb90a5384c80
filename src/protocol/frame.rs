//! WebSocket v13 frame encoding and parsing.
//!
//! Only what the wire client needs: single-frame messages (FIN always set on
//! send), client-side masking, and a parser that reports incomplete input as
//! a byte target instead of an error.
//!
//! ```text
//! byte0 = 0x80 | opcode
//! byte1 = MASK | len7          len7 126 -> u16 BE, 127 -> u64 BE
//! [mask: 4 bytes]              client->server only
//! payload XOR mask[i % 4]
//! ```

use crate::error::{Error, Result};
use crate::protocol::mask::{apply_mask, apply_mask_fast};

/// FIN bit, always set on outgoing frames (no fragmentation on send).
const FIN: u8 = 0x80;
/// Mask bit in the length byte.
const MASK_BIT: u8 = 0x80;

/// A parsed frame header locating the payload within the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsFrame {
    /// Opcode from the low nibble of byte 0.
    pub mtype: u8,
    /// Masking key, present when the peer set the mask bit.
    pub mask: Option<[u8; 4]>,
    /// Offset of the payload within the parsed buffer.
    pub payload_start: usize,
    /// Payload length in bytes.
    pub payload_len: usize,
    /// Offset one past the end of the frame (header + payload).
    pub end: usize,
}

/// Outcome of parsing a frame from a possibly-incomplete buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// At least this many bytes must be buffered before retrying.
    NeedMore(usize),
    /// A complete frame is available.
    Frame(WsFrame),
}

/// Size of the frame header (without mask) for a payload of `len` bytes.
#[must_use]
pub const fn header_size(len: usize) -> usize {
    if len <= 125 {
        2
    } else if len <= 65_535 {
        4
    } else {
        10
    }
}

/// Total wire size of a masked client frame carrying `len` payload bytes.
#[must_use]
pub const fn client_frame_size(len: usize) -> usize {
    header_size(len) + 4 + len
}

/// Append a masked client frame to `out`.
///
/// `mtype` is the opcode (low nibble); FIN is always set. The payload is
/// copied and XORed with `mask` cycling every 4 bytes.
pub fn encode_frame(out: &mut Vec<u8>, mtype: u8, mask: [u8; 4], payload: &[u8]) {
    let len = payload.len();
    out.push(FIN | (mtype & 0x0f));
    if len <= 125 {
        out.push(MASK_BIT | len as u8);
    } else if len <= 65_535 {
        out.push(MASK_BIT | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(MASK_BIT | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(&mask);

    let start = out.len();
    out.extend_from_slice(payload);
    apply_mask_fast(&mut out[start..], mask);
}

/// Parse a frame header from the start of `buf`.
///
/// Returns [`FrameStatus::NeedMore`] with the byte offset where the frame
/// would end whenever the buffered region does not yet contain the full
/// header or payload.
///
/// # Errors
///
/// Returns [`Error::MessageTooLarge`] if the declared payload exceeds
/// `max_payload`.
pub fn parse_frame(buf: &[u8], max_payload: usize) -> Result<FrameStatus> {
    if buf.len() < 2 {
        return Ok(FrameStatus::NeedMore(2));
    }
    let mtype = buf[0] & 0x0f;
    let masked = buf[1] & MASK_BIT != 0;
    let len7 = buf[1] & 0x7f;

    let (payload_len, mut header_len) = match len7 {
        126 => {
            if buf.len() < 4 {
                return Ok(FrameStatus::NeedMore(4));
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(FrameStatus::NeedMore(10));
            }
            let len = u64::from_be_bytes([
                buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
            ]);
            (len, 10)
        }
        n => (n as u64, 2),
    };

    if payload_len > max_payload as u64 {
        return Err(Error::MessageTooLarge {
            size: payload_len,
            max: max_payload as u64,
        });
    }
    let payload_len = payload_len as usize;

    let mask = if masked {
        if buf.len() < header_len + 4 {
            return Ok(FrameStatus::NeedMore(header_len + 4 + payload_len));
        }
        let m = [
            buf[header_len],
            buf[header_len + 1],
            buf[header_len + 2],
            buf[header_len + 3],
        ];
        header_len += 4;
        Some(m)
    } else {
        None
    };

    let end = header_len + payload_len;
    if buf.len() < end {
        return Ok(FrameStatus::NeedMore(end));
    }

    Ok(FrameStatus::Frame(WsFrame {
        mtype,
        mask,
        payload_start: header_len,
        payload_len,
        end,
    }))
}

/// Recover the payload of a parsed frame, unmasking if required.
#[must_use]
pub fn frame_payload(buf: &[u8], frame: &WsFrame) -> Vec<u8> {
    let mut payload =
        buf[frame.payload_start..frame.payload_start + frame.payload_len].to_vec();
    if let Some(mask) = frame.mask {
        apply_mask(&mut payload, mask);
    }
    payload
}
