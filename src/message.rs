//! Message payload container with lazy bytes/text conversion.

use std::sync::OnceLock;

use bytes::Bytes;

use crate::error::{Error, Result};

/// WebSocket text opcode.
pub const TEXT: u8 = 0x01;
/// WebSocket binary opcode.
pub const BINARY: u8 = 0x02;

/// MQTT CONNECT packet type/flags byte.
pub const MQTT_CONNECT: u8 = 0x10;
/// MQTT PUBLISH packet type/flags byte (QoS 0).
pub const MQTT_PUBLISH: u8 = 0x30;
/// MQTT PINGREQ packet type/flags byte.
pub const MQTT_PINGREQ: u8 = 0xC0;

#[derive(Debug, Clone)]
enum Payload {
    Bytes(Bytes),
    Text(String),
}

/// A single wire message.
///
/// The payload is held either as raw bytes or as a string; the cross
/// conversion happens on demand and is memoized. The type tag is the
/// wire-mode-specific code: the WebSocket opcode (1 = text, 2 = binary) or
/// the raw MQTT type/flags byte.
///
/// Messages are immutable once constructed, except for the type tag.
#[derive(Debug)]
pub struct Message {
    payload: Payload,
    mtype: u8,
    // Memoized bytes -> UTF-8 conversion; None records a failed attempt.
    text_cache: OnceLock<Option<String>>,
}

impl Message {
    /// Create a text message (WebSocket text opcode).
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            payload: Payload::Text(s.into()),
            mtype: TEXT,
            text_cache: OnceLock::new(),
        }
    }

    /// Create a binary message (WebSocket binary opcode).
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            payload: Payload::Bytes(data.into()),
            mtype: BINARY,
            text_cache: OnceLock::new(),
        }
    }

    /// Create a message with an explicit type tag.
    #[must_use]
    pub fn with_type(data: impl Into<Bytes>, mtype: u8) -> Self {
        Self {
            payload: Payload::Bytes(data.into()),
            mtype,
            text_cache: OnceLock::new(),
        }
    }

    /// The wire-mode-specific type tag.
    #[must_use]
    pub const fn message_type(&self) -> u8 {
        self.mtype
    }

    /// Replace the type tag.
    pub fn set_message_type(&mut self, mtype: u8) {
        self.mtype = mtype;
    }

    /// The MQTT control-packet type nibble (high 4 bits of the tag).
    #[must_use]
    pub const fn packet_type(&self) -> u8 {
        self.mtype >> 4
    }

    /// The payload as raw bytes. Free in both representations.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.payload {
            Payload::Bytes(b) => b,
            Payload::Text(s) => s.as_bytes(),
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// The payload as UTF-8 text.
    ///
    /// For byte payloads the conversion is performed once and cached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUtf8`] if the bytes are not valid UTF-8.
    pub fn as_text(&self) -> Result<&str> {
        match &self.payload {
            Payload::Text(s) => Ok(s),
            Payload::Bytes(b) => {
                let cached = self
                    .text_cache
                    .get_or_init(|| std::str::from_utf8(b).ok().map(str::to_owned));
                cached.as_deref().ok_or(Error::InvalidUtf8)
            }
        }
    }

    /// Consume the message and return the payload bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self.payload {
            Payload::Bytes(b) => b,
            Payload::Text(s) => Bytes::from(s.into_bytes()),
        }
    }

    /// Whether the tag is the WebSocket text opcode.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        self.mtype == TEXT
    }

    /// Whether the tag is the WebSocket binary opcode.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        self.mtype == BINARY
    }
}

impl Clone for Message {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            mtype: self.mtype,
            text_cache: OnceLock::new(),
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.mtype == other.mtype && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Message {}
