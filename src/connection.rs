//! The blocking wire-client connection.
//!
//! One `Connection` owns one socket. `send()` and `receive()` are guarded
//! by distinct locks, so one thread can publish while another blocks in
//! receive on the same connection; `terminate()` may be called from any
//! thread and forces a blocked receive to fail. Configuration is mutable
//! only before connecting.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::buffer::{RecvBuffer, SendBuffer};
use crate::config::{Config, KeystorePaths, TlsLevel, WireMode};
use crate::error::{Error, Result};
use crate::message::{BINARY, Message, TEXT};
use crate::protocol::decoder::{self, DecodeOutcome};
use crate::protocol::{self, frame, handshake, mask};
use crate::tls;
use crate::transport::Transport;

/// WebSocket close opcode.
const CLOSE: u8 = 0x08;

const STATE_INITIAL: u8 = 0;
const STATE_CONNECTED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// A wire-client connection.
///
/// Created disconnected; [`Connection::connect`] establishes the transport
/// and, for the WebSocket wire modes, performs the HTTP upgrade. After a
/// disconnect or [`Connection::terminate`] the connection may be connected
/// again (subject to the reconnect list, if configured).
pub struct Connection {
    config: Config,
    transport: Option<Arc<Transport>>,
    state: AtomicU8,
    send_buf: Mutex<SendBuffer>,
    recv_buf: Mutex<RecvBuffer>,
    read_bytes: AtomicU64,
    sent_bytes: AtomicU64,
    reconnect_pos: usize,
    active_address: String,
    active_port: u16,
}

impl Connection {
    /// Create a disconnected connection from a configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let send_buf = SendBuffer::new(
            config.limits.send_buffer_size,
            config.limits.send_buffer_increment,
        );
        let recv_buf = RecvBuffer::new(config.limits.read_buffer_size);
        let active_address = config.address.clone();
        let active_port = config.port;
        Self {
            config,
            transport: None,
            state: AtomicU8::new(STATE_INITIAL),
            send_buf: Mutex::new(send_buf),
            recv_buf: Mutex::new(recv_buf),
            read_bytes: AtomicU64::new(0),
            sent_bytes: AtomicU64::new(0),
            reconnect_pos: 0,
            active_address,
            active_port,
        }
    }

    /// Establish the transport and perform the upgrade handshake when the
    /// wire mode requires one.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] when already connected.
    /// - [`Error::AddressResolution`] when the target does not resolve or
    ///   the reconnect list is exhausted.
    /// - [`Error::TlsSetup`] / [`Error::Io`] for transport failures.
    /// - [`Error::HandshakeRejected`] when the upgrade is refused; the
    ///   socket is closed and the connection stays disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.state.load(Ordering::SeqCst) == STATE_CONNECTED {
            return Err(Error::InvalidState("Already connected".into()));
        }

        let (address, port) = self.next_target()?;
        info!(%address, port, mode = ?self.config.wire_mode, "connecting");

        let transport = if self.config.tls.is_secure() {
            let material = match &self.config.tls_material {
                Some(material) => Arc::clone(material),
                None => tls::cached_material(
                    self.config.truststore.as_deref(),
                    self.config.keystore.as_ref(),
                )?,
            };
            let tls_config = tls::client_config(self.config.tls, &material)?;
            let sni = self.config.sni_host.as_deref().unwrap_or(&address);
            let name = tls::server_name(sni)?;
            Transport::connect_tls(
                &address,
                port,
                self.config.connect_timeout,
                tls_config,
                name,
            )?
        } else {
            Transport::connect_tcp(&address, port, self.config.connect_timeout)?
        };

        {
            let mut recv = lock(&self.recv_buf)?;
            recv.reset();

            if self.config.wire_mode.uses_websocket() {
                self.upgrade(&transport, &address, &mut recv)?;
            }
        }

        self.transport = Some(Arc::new(transport));
        self.active_address = address;
        self.active_port = port;
        self.state.store(STATE_CONNECTED, Ordering::SeqCst);
        if !self.config.reconnect {
            self.reconnect_pos = 0;
        }
        Ok(())
    }

    /// Pick the dial target: the primary address, or the next reconnect
    /// list entry when reconnect mode is active.
    fn next_target(&mut self) -> Result<(String, u16)> {
        if !self.config.reconnect || self.config.address_list.is_empty() {
            return Ok((self.config.address.clone(), self.config.port));
        }
        let pos = self.reconnect_pos;
        if pos >= self.config.address_list.len() {
            return Err(Error::AddressResolution(
                "Reconnect address list exhausted".into(),
            ));
        }
        self.reconnect_pos += 1;
        let address = self.config.address_list[pos].clone();
        let port = self
            .config
            .port_list
            .get(pos)
            .copied()
            .unwrap_or(self.config.port);
        Ok((address, port))
    }

    /// Send the HTTP upgrade request and validate the 101 response. Bytes
    /// that arrive after the response header block belong to the first
    /// frames and are pushed into the receive buffer.
    fn upgrade(
        &self,
        transport: &Transport,
        address: &str,
        recv: &mut RecvBuffer,
    ) -> Result<()> {
        let key = handshake::client_key(&self.config.client_id);
        let request = handshake::build_request(
            &self.config.path,
            address,
            self.config.effective_subprotocol(),
            &key,
        );
        transport.write_all(&request).inspect_err(|_| transport.shutdown())?;
        self.sent_bytes
            .fetch_add(request.len() as u64, Ordering::Relaxed);

        let mut response = vec![0u8; self.config.limits.read_buffer_size];
        let n = transport.read(&mut response).inspect_err(|_| transport.shutdown())?;
        if n == 0 {
            transport.shutdown();
            return Err(Error::HandshakeRejected(
                "Connection closed during handshake".into(),
            ));
        }
        self.read_bytes.fetch_add(n as u64, Ordering::Relaxed);

        match handshake::validate_response(&response[..n]) {
            Ok(body_start) => {
                if body_start < n {
                    recv.push_unread(&response[body_start..n]);
                }
                debug!(piggybacked = n - body_start, "upgrade accepted");
                Ok(())
            }
            Err(e) => {
                transport.shutdown();
                Err(e)
            }
        }
    }

    /// Send a message according to the active wire mode.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when not connected; [`Error::Io`] when the
    /// socket write fails (the connection is then closed).
    pub fn send(&self, msg: &Message) -> Result<()> {
        self.send_frame(msg.as_bytes(), msg.message_type())
    }

    /// Send a text payload (WebSocket text opcode).
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send_frame(text.as_bytes(), TEXT)
    }

    /// Send a binary payload (WebSocket binary opcode).
    pub fn send_bytes(&self, data: &[u8]) -> Result<()> {
        self.send_frame(data, BINARY)
    }

    /// Send a payload with an explicit type tag: the WebSocket opcode, or
    /// the MQTT type/flags byte for the MQTT modes.
    pub fn send_frame(&self, payload: &[u8], mtype: u8) -> Result<()> {
        let transport = self.active_transport()?;
        let mut send = lock(&self.send_buf)?;

        send.begin(frame::client_frame_size(payload.len()));
        protocol::encode_message(
            send.vec_mut(),
            self.config.wire_mode,
            mtype,
            payload,
            self.config.chunk_size,
        )?;

        if let Err(e) = transport.write_all(send.as_slice()) {
            self.fail(&e);
            return Err(e);
        }
        self.sent_bytes
            .fetch_add(send.len() as u64, Ordering::Relaxed);
        if self.config.verbose {
            debug!(
                mtype,
                payload_len = payload.len(),
                wire_len = send.len(),
                "sent"
            );
        }
        Ok(())
    }

    /// Block until one complete frame arrives and return it as a message.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] when not connected.
    /// - [`Error::Disconnected`] when the peer closes the stream (also the
    ///   result of a concurrent [`Connection::terminate`]).
    /// - [`Error::ProtocolViolation`] / [`Error::MessageTooLarge`] for
    ///   malformed frames; the connection is closed.
    pub fn receive(&self) -> Result<Message> {
        let transport = self.active_transport()?;
        let mut recv = lock(&self.recv_buf)?;

        loop {
            let outcome = decoder::decode(
                self.config.wire_mode,
                recv.unread(),
                self.config.limits.max_frame_size,
            );
            let target = match outcome {
                Ok(DecodeOutcome::Frame(f)) => {
                    recv.advance_pos(f.consumed);
                    recv.reclaim();
                    if self.config.verbose {
                        debug!(mtype = f.mtype, payload_len = f.payload.len(), "received");
                    }
                    return Ok(Message::with_type(f.payload, f.mtype));
                }
                Ok(DecodeOutcome::NeedMore(n)) => n,
                Err(e) => {
                    self.fail(&e);
                    return Err(e);
                }
            };

            while recv.unread_len() < target {
                let shortfall = target - recv.unread_len();
                recv.ensure_space(shortfall.max(self.config.limits.compact_threshold));
                let n = match transport.read(recv.space()) {
                    Ok(n) => n,
                    Err(e) => {
                        self.fail(&e);
                        return Err(e);
                    }
                };
                if n == 0 {
                    let e = Error::Disconnected;
                    self.fail(&e);
                    return Err(e);
                }
                recv.advance_avail(n);
                self.read_bytes.fetch_add(n as u64, Ordering::Relaxed);
            }
        }
    }

    /// Close cleanly with code 1000 and no reason.
    pub fn disconnect(&self) -> Result<()> {
        self.disconnect_with(1000, "")
    }

    /// Close the connection, sending a WebSocket close frame first when the
    /// wire mode has one. The close frame is best effort; the socket is
    /// shut down regardless.
    pub fn disconnect_with(&self, code: u16, reason: &str) -> Result<()> {
        if self.is_connected() && self.config.wire_mode.uses_websocket() {
            if let Some(transport) = &self.transport {
                let mut payload = Vec::with_capacity(2 + reason.len());
                payload.extend_from_slice(&code.to_be_bytes());
                payload.extend_from_slice(reason.as_bytes());

                let mut send = lock(&self.send_buf)?;
                send.begin(frame::client_frame_size(payload.len()));
                frame::encode_frame(send.vec_mut(), CLOSE, mask::random_mask()?, &payload);
                let _ = transport.write_all(send.as_slice());
            }
        }
        self.terminate();
        Ok(())
    }

    /// Force the socket closed. Safe to call from another thread while a
    /// receive is blocked; that receive fails with
    /// [`Error::Disconnected`].
    pub fn terminate(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        if let Some(transport) = &self.transport {
            transport.shutdown();
        }
    }

    /// Whether the connection is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_CONNECTED
    }

    /// The address dialed by the last successful connect.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.active_address
    }

    /// The port dialed by the last successful connect.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.active_port
    }

    /// Cumulative bytes read, including the handshake response.
    #[must_use]
    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    /// Cumulative bytes written, including the handshake request.
    #[must_use]
    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes.load(Ordering::Relaxed)
    }

    /// Log payload details on send and receive.
    pub fn set_verbose(&mut self, verbose: bool) -> Result<()> {
        self.mutate(|config| config.verbose = verbose)
    }

    /// Set the TLS level.
    pub fn set_secure(&mut self, tls: TlsLevel) -> Result<()> {
        self.mutate(|config| config.tls = tls)
    }

    /// Set the SNI hostname, distinct from the dialed address.
    pub fn set_host(&mut self, hostname: impl Into<String>) -> Result<()> {
        let hostname = hostname.into();
        self.mutate(|config| config.sni_host = Some(hostname))
    }

    /// Set the client-auth keystore paths.
    pub fn set_keystore(
        &mut self,
        certs: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<()> {
        let paths = KeystorePaths {
            certs: certs.into(),
            key: key.into(),
        };
        self.mutate(|config| config.keystore = Some(paths))
    }

    /// Set the truststore (CA bundle) path.
    pub fn set_truststore(&mut self, path: impl Into<String>) -> Result<()> {
        let path = path.into();
        self.mutate(|config| config.truststore = Some(path))
    }

    /// Set the wire mode.
    pub fn set_wire_mode(&mut self, mode: WireMode) -> Result<()> {
        self.mutate(|config| config.wire_mode = mode)
    }

    /// Set the reconnect fallback addresses. Resets the cursor and leaves
    /// reconnect mode until [`Connection::set_reconnect`] re-enables it.
    pub fn set_address_list(&mut self, addresses: Vec<String>) -> Result<()> {
        self.check_mutable()?;
        self.config.address_list = addresses;
        self.config.reconnect = false;
        self.reconnect_pos = 0;
        Ok(())
    }

    /// Set the reconnect fallback ports, paired positionally with the
    /// address list. Resets the cursor as [`Connection::set_address_list`].
    pub fn set_port_list(&mut self, ports: Vec<u16>) -> Result<()> {
        self.check_mutable()?;
        self.config.port_list = ports;
        self.config.reconnect = false;
        self.reconnect_pos = 0;
        Ok(())
    }

    /// Enable or disable reconnect mode.
    pub fn set_reconnect(&mut self, reconnect: bool) -> Result<()> {
        self.mutate(|config| config.reconnect = reconnect)
    }

    /// Set the MQTT-over-WebSocket chunk size (see [`Config::chunk_size`]).
    pub fn set_chunk_size(&mut self, chunk_size: i32) -> Result<()> {
        self.mutate(|config| config.chunk_size = chunk_size)
    }

    /// Set the client identifier mixed into the handshake key.
    pub fn set_client_id(&mut self, client_id: impl Into<String>) -> Result<()> {
        let client_id = client_id.into();
        self.mutate(|config| config.client_id = client_id)
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn mutate(&mut self, apply: impl FnOnce(&mut Config)) -> Result<()> {
        self.check_mutable()?;
        apply(&mut self.config);
        Ok(())
    }

    fn check_mutable(&self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::InvalidState(
                "Configuration cannot change while connected".into(),
            ));
        }
        Ok(())
    }

    fn active_transport(&self) -> Result<&Arc<Transport>> {
        if !self.is_connected() {
            return Err(Error::InvalidState("Not connected".into()));
        }
        self.transport
            .as_ref()
            .ok_or_else(|| Error::InvalidState("Not connected".into()))
    }

    /// Close the connection after a fatal send/receive error.
    fn fail(&self, err: &Error) {
        if err.is_fatal() {
            self.state.store(STATE_CLOSED, Ordering::SeqCst);
            if let Some(transport) = &self.transport {
                transport.shutdown();
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.active_address)
            .field("port", &self.active_port)
            .field("wire_mode", &self.config.wire_mode)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.is_connected() {
            self.terminate();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Io("Connection lock poisoned".into()))
}
