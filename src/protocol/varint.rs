//! MQTT "remaining length" base-128 varint.
//!
//! Each byte carries 7 bits of the length, least-significant digits first,
//! with 0x80 as the continuation bit on all but the final byte. The encoding
//! is 1 to 4 bytes long, for values up to 268,435,455.

/// Maximum value representable in the 4-byte encoding.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Outcome of decoding a varint from a possibly-incomplete buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintStatus {
    /// More bytes are required; at least the given total must be buffered.
    NeedMore(usize),
    /// Decoded value and the number of bytes it occupied.
    Done {
        /// The decoded length.
        value: usize,
        /// Encoded size in bytes (1..=4).
        size: usize,
    },
    /// The continuation bit was still set after 4 bytes.
    Malformed,
}

/// Append the varint encoding of `value` to `out`, returning the encoded
/// size. Values above [`MAX_REMAINING_LENGTH`] are silently truncated by the
/// caller's contract; all send paths cap payload sizes well below it.
pub fn encode(mut value: usize, out: &mut Vec<u8>) -> usize {
    let mut size = 0;
    loop {
        let mut digit = (value & 0x7f) as u8;
        value >>= 7;
        if value > 0 {
            digit |= 0x80;
        }
        out.push(digit);
        size += 1;
        if value == 0 {
            return size;
        }
    }
}

/// Number of bytes `value` occupies when encoded.
#[must_use]
pub const fn encoded_size(value: usize) -> usize {
    if value <= 127 {
        1
    } else if value <= 16_383 {
        2
    } else if value <= 2_097_151 {
        3
    } else {
        4
    }
}

/// Decode a varint from the start of `buf`.
#[must_use]
pub fn decode(buf: &[u8]) -> VarintStatus {
    let mut value = 0usize;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= 4 {
            return VarintStatus::Malformed;
        }
        value |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return VarintStatus::Done {
                value,
                size: i + 1,
            };
        }
    }
    if buf.len() >= 4 {
        VarintStatus::Malformed
    } else {
        VarintStatus::NeedMore(buf.len() + 1)
    }
}
