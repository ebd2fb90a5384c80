//! # msgwire - Multi-protocol blocking wire client
//!
//! `msgwire` speaks four related framings over a single TCP/TLS socket:
//!
//! - **WebSocket v13** (RFC 6455 style, client frames always masked)
//! - **Raw MQTT** fixed-header framing
//! - **MQTT-over-WebSocket** with configurable send-side chunking
//! - **Framing-less** byte streams for plain JSON-over-TCP polling
//!
//! plus a minimal HTTP/1.1 client sharing the same buffer discipline.
//!
//! The client is synchronous and has no internal threads: `send()` and
//! `receive()` block, are guarded by distinct locks, and may be invoked
//! concurrently from different threads on the same connection.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use msgwire::{Config, Connection, WireMode};
//!
//! let config = Config::new("broker.example.com", 80, "/mqtt")
//!     .with_wire_mode(WireMode::MqttOverWs);
//! let mut conn = Connection::new(config);
//! conn.connect()?;
//! conn.send_text("hello")?;
//! let reply = conn.receive()?;
//! ```

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod message;
pub mod protocol;
pub mod tls;
pub mod transport;

pub use config::{Config, KeystorePaths, Limits, TlsLevel, WireMode};
pub use connection::Connection;
pub use error::{Error, Result};
pub use http::{HttpClient, HttpRequest, HttpResponse};
pub use message::{BINARY, MQTT_CONNECT, MQTT_PINGREQ, MQTT_PUBLISH, Message, TEXT};
