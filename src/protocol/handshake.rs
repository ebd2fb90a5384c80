//! HTTP Upgrade handshake for the WebSocket wire modes.
//!
//! The client key is deliberately non-cryptographic: a CRC32 of the client
//! identifier salted with coarse wall-clock bytes, rendered as five base-62
//! characters. It only needs to be unique enough to distinguish concurrent
//! test clients, not to resist prediction.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

const B62_DIGITS: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Generate the handshake client key from the client identifier.
#[must_use]
pub fn client_key(client_id: &str) -> String {
    format!("{client_id}-{}", unique_suffix(client_id, now_millis()))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Five base-62 characters from a salted CRC32, least-significant digit
/// first.
fn unique_suffix(client_id: &str, now: u64) -> String {
    let mut crc = crc32fast::Hasher::new();
    crc.update(client_id.as_bytes());
    crc.update(&[((now / 77) & 0xff) as u8]);
    crc.update(&[((now / 79_731) & 0xff) as u8]);
    let mut value = crc.finalize() as u64;

    let mut out = String::with_capacity(5);
    for _ in 0..5 {
        out.push(B62_DIGITS[(value % 62) as usize] as char);
        value /= 62;
    }
    out
}

/// Bracket numeric IPv6 literals for use in the `Host` header.
#[must_use]
pub fn host_header_value(address: &str) -> String {
    let trimmed = address.trim();
    if trimmed.contains(':') && !trimmed.starts_with('[') {
        format!("[{trimmed}]")
    } else {
        trimmed.to_string()
    }
}

/// Build the HTTP/1.1 upgrade request bytes.
#[must_use]
pub fn build_request(path: &str, address: &str, subprotocol: &str, key: &str) -> Vec<u8> {
    let mut req = String::with_capacity(256);
    req.push_str("GET ");
    req.push_str(path);
    req.push_str(" HTTP/1.1\r\n");
    req.push_str("Upgrade: WebSocket\r\nConnection: Upgrade\r\n");
    req.push_str("Host: ");
    req.push_str(&host_header_value(address));
    req.push_str("\r\n");
    req.push_str("Sec-WebSocket-Version: 13\r\n");
    req.push_str("Sec-WebSocket-Protocol: ");
    req.push_str(subprotocol);
    req.push_str("\r\n");
    req.push_str("Sec-WebSocket-Key: ");
    req.push_str(&STANDARD.encode(key.as_bytes()));
    req.push_str("\r\n\r\n");
    req.into_bytes()
}

/// Validate the server's upgrade response and locate any piggybacked bytes.
///
/// Returns the offset just past the blank line terminating the response
/// header block; bytes from there on belong to the first frames and must be
/// handed to the decoder, not discarded. When the blank line has not arrived
/// in the same read the offset equals `response.len()`.
///
/// # Errors
///
/// [`Error::HandshakeRejected`] when the response does not start with
/// `HTTP/` or reports a status other than 101.
pub fn validate_response(response: &[u8]) -> Result<usize> {
    if !response.starts_with(b"HTTP/") {
        return Err(Error::HandshakeRejected(
            "Response is not an HTTP response".into(),
        ));
    }
    let status = parse_status(response).ok_or_else(|| {
        Error::HandshakeRejected("Response has no status code".into())
    })?;
    if status != 101 {
        return Err(Error::HandshakeRejected(format!(
            "Server returned status {status}"
        )));
    }
    Ok(header_block_end(response))
}

/// The status code: digits following the first space of the status line.
fn parse_status(response: &[u8]) -> Option<u32> {
    let space = response.iter().position(|&b| b == b' ')?;
    let digits: Vec<u8> = response[space + 1..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .copied()
        .collect();
    if digits.is_empty() {
        return None;
    }
    std::str::from_utf8(&digits).ok()?.parse().ok()
}

fn header_block_end(response: &[u8]) -> usize {
    response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map_or(response.len(), |i| i + 4)
}
