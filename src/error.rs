//! Error types for the wire client.
//!
//! Partial reads are never errors: the receive path models "not enough bytes
//! yet" as ordinary control flow (see [`crate::protocol::decoder`]). The
//! variants here are the conditions a caller can actually observe.

use thiserror::Error;

/// Result type alias for wire-client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while connecting, sending or receiving.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The configured host could not be resolved, or the reconnect list is
    /// exhausted.
    #[error("Address resolution failed: {0}")]
    AddressResolution(String),

    /// TLS material could not be loaded or the TLS handshake failed.
    #[error("TLS setup failed: {0}")]
    TlsSetup(String),

    /// The WebSocket upgrade was answered with something other than a valid
    /// HTTP 101 response.
    #[error("WebSocket handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The peer violated the active framing rules (masked server frame,
    /// MQTT/WebSocket length mismatch).
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// An incoming frame declares a payload beyond the configured cap.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Declared payload size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// The peer closed the connection (a read returned end-of-stream).
    #[error("Disconnect from server")]
    Disconnected,

    /// An operation was invoked in the wrong connection state, e.g. mutating
    /// configuration while connected.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid UTF-8 when converting a byte payload to text.
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    /// I/O error from the underlying socket.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Disconnected
        } else {
            Error::Io(err.to_string())
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl Error {
    /// Whether this error leaves the connection unusable.
    ///
    /// `Disconnected` and `ProtocolViolation` require the caller to
    /// reconnect; configuration errors are local and non-fatal to the socket.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Disconnected | Error::ProtocolViolation(_) | Error::Io(_)
        )
    }
}
