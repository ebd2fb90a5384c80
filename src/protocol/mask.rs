//! WebSocket payload masking (RFC 6455 client obfuscation).

use crate::error::{Error, Result};

/// Byte-by-byte XOR masking, cycling the 4-byte key.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// XOR masking processing 4 bytes at a time via u32 operations.
///
/// Equivalent to [`apply_mask`]; used on the send path where payloads can be
/// large.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let (chunks, tail) = data.split_at_mut(data.len() / 4 * 4);

    for chunk in chunks.chunks_exact_mut(4) {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }
    for (i, byte) in tail.iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

/// Generate a fresh random 4-byte mask.
///
/// # Errors
///
/// Returns [`Error::Io`] if the system randomness source fails.
pub fn random_mask() -> Result<[u8; 4]> {
    let mut mask = [0u8; 4];
    getrandom::getrandom(&mut mask).map_err(|e| Error::Io(e.to_string()))?;
    Ok(mask)
}
