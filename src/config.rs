//! Connection configuration: wire mode, TLS level, buffer limits.

use std::sync::Arc;
use std::time::Duration;

use crate::tls::TlsMaterial;

/// The active framing algorithm for a connection.
///
/// Each variant selects an independent encode/decode strategy in
/// [`crate::protocol`]; the connection itself only dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireMode {
    /// WebSocket version 13 framing (RFC 6455 style, client frames masked).
    #[default]
    Ws13,
    /// Raw MQTT fixed-header framing over TCP.
    MqttRaw,
    /// MQTT packets carried inside WebSocket binary frames.
    MqttOverWs,
    /// No framing: one socket read is one message. Used for plain
    /// JSON-over-TCP polling and by the HTTP mini-client.
    FramingLess,
}

impl WireMode {
    /// Whether this mode performs the HTTP Upgrade handshake at connect time.
    #[must_use]
    pub const fn uses_websocket(&self) -> bool {
        matches!(self, WireMode::Ws13 | WireMode::MqttOverWs)
    }

    /// Default `Sec-WebSocket-Protocol` value for this mode.
    #[must_use]
    pub const fn default_subprotocol(&self) -> &'static str {
        match self {
            WireMode::MqttOverWs => "mqtt",
            _ => "chat",
        }
    }
}

/// TLS protocol level for a connection.
///
/// rustls does not implement TLS 1.0/1.1; those levels negotiate with the
/// TLS 1.2 configuration, which is the floor any current server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsLevel {
    /// Plain TCP, no TLS.
    #[default]
    None,
    /// TLS 1.0 (negotiated as 1.2, see above).
    Tls10,
    /// TLS 1.1 (negotiated as 1.2, see above).
    Tls11,
    /// TLS 1.2.
    Tls12,
    /// TLS 1.3 (with 1.2 fallback suites enabled).
    Tls13,
}

impl TlsLevel {
    /// Whether TLS is enabled at all.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        !matches!(self, TlsLevel::None)
    }
}

/// Buffer sizing and frame limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum accepted WebSocket payload size.
    ///
    /// Default: 16 MiB.
    pub max_frame_size: usize,

    /// Initial receive buffer capacity. The buffer doubles when full and
    /// nothing can be compacted away.
    ///
    /// Default: 16 KiB.
    pub read_buffer_size: usize,

    /// Initial send scratch buffer capacity.
    ///
    /// Default: 16 KiB.
    pub send_buffer_size: usize,

    /// Fixed increment by which the send buffer grows.
    ///
    /// Default: 32 KiB.
    pub send_buffer_increment: usize,

    /// Free-space threshold below which the receive buffer compacts or
    /// grows before the next read.
    ///
    /// Default: 1 KiB.
    pub compact_threshold: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            read_buffer_size: 16 * 1024,
            send_buffer_size: 16 * 1024,
            send_buffer_increment: 32 * 1024,
            compact_threshold: 1024,
        }
    }
}

/// File paths for client-auth TLS material (PEM).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystorePaths {
    /// Certificate chain file.
    pub certs: String,
    /// Private key file.
    pub key: String,
}

/// Wire-client connection configuration.
///
/// Mutable only before `connect()`; the connection's setters enforce this at
/// runtime.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server address (hostname or IP literal).
    pub address: String,
    /// Server port.
    pub port: u16,
    /// Request path for the WebSocket upgrade.
    pub path: String,
    /// `Sec-WebSocket-Protocol` value; `None` selects the wire mode default.
    pub subprotocol: Option<String>,
    /// Active framing algorithm.
    pub wire_mode: WireMode,
    /// TLS protocol level.
    pub tls: TlsLevel,
    /// SNI hostname override, distinct from the dialed address.
    pub sni_host: Option<String>,
    /// Injected TLS material; `None` falls back to the process-wide cache.
    pub tls_material: Option<Arc<TlsMaterial>>,
    /// Client-auth keystore paths, resolved into `tls_material` lazily.
    pub keystore: Option<KeystorePaths>,
    /// Truststore (CA bundle) path, resolved into `tls_material` lazily.
    pub truststore: Option<String>,
    /// MQTT-over-WebSocket chunk size. `0` sends the whole packet in one
    /// frame; a negative value selects the test mode that duplicates PUBLISH
    /// packets before chunking by the absolute value.
    pub chunk_size: i32,
    /// Log payload text on send/receive.
    pub verbose: bool,
    /// Client identifier mixed into the generated handshake key.
    pub client_id: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whether connect() walks the fallback lists instead of dialing the
    /// primary address.
    pub reconnect: bool,
    /// Ordered fallback address list for reconnect mode.
    pub address_list: Vec<String>,
    /// Ordered fallback port list for reconnect mode.
    pub port_list: Vec<u16>,
    /// Buffer and frame limits.
    pub limits: Limits,
}

impl Config {
    /// Create a configuration for the given endpoint.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            path: path.into(),
            subprotocol: None,
            wire_mode: WireMode::default(),
            tls: TlsLevel::None,
            sni_host: None,
            tls_material: None,
            keystore: None,
            truststore: None,
            chunk_size: 0,
            verbose: false,
            client_id: "msgwire-client".to_string(),
            connect_timeout: Duration::from_secs(20),
            reconnect: false,
            address_list: Vec::new(),
            port_list: Vec::new(),
            limits: Limits::default(),
        }
    }

    /// Set the wire mode.
    #[must_use]
    pub const fn with_wire_mode(mut self, mode: WireMode) -> Self {
        self.wire_mode = mode;
        self
    }

    /// Set the TLS level.
    #[must_use]
    pub const fn with_tls(mut self, tls: TlsLevel) -> Self {
        self.tls = tls;
        self
    }

    /// Set the subprotocol offered in the upgrade request.
    #[must_use]
    pub fn with_subprotocol(mut self, proto: impl Into<String>) -> Self {
        self.subprotocol = Some(proto.into());
        self
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// The effective subprotocol for the upgrade request.
    #[must_use]
    pub fn effective_subprotocol(&self) -> &str {
        self.subprotocol
            .as_deref()
            .unwrap_or_else(|| self.wire_mode.default_subprotocol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(limits.read_buffer_size, 16 * 1024);
        assert_eq!(limits.send_buffer_increment, 32 * 1024);
        assert_eq!(limits.compact_threshold, 1024);
    }

    #[test]
    fn test_wire_mode_websocket() {
        assert!(WireMode::Ws13.uses_websocket());
        assert!(WireMode::MqttOverWs.uses_websocket());
        assert!(!WireMode::MqttRaw.uses_websocket());
        assert!(!WireMode::FramingLess.uses_websocket());
    }

    #[test]
    fn test_tls_level() {
        assert!(!TlsLevel::None.is_secure());
        assert!(TlsLevel::Tls12.is_secure());
        assert!(TlsLevel::Tls13.is_secure());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new("127.0.0.1", 1883, "/mqtt")
            .with_wire_mode(WireMode::MqttOverWs)
            .with_tls(TlsLevel::Tls13);
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 1883);
        assert_eq!(config.wire_mode, WireMode::MqttOverWs);
        assert_eq!(config.tls, TlsLevel::Tls13);
        assert_eq!(config.effective_subprotocol(), "mqtt");
    }

    #[test]
    fn test_subprotocol_override() {
        let config = Config::new("localhost", 80, "/ws").with_subprotocol("mqttv3.1");
        assert_eq!(config.effective_subprotocol(), "mqttv3.1");
    }
}
