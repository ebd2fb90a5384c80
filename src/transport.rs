//! Blocking TCP/TLS transport.
//!
//! The transport is shared by reference between a sending and a receiving
//! thread. Plain TCP needs no coordination: `&TcpStream` is both `Read` and
//! `Write`. TLS shares one rustls session behind a mutex; the lock is held
//! only for the non-blocking record operations, never across the blocking
//! ciphertext read, so a writer is not stalled while the reader waits for
//! the peer.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection};
use tracing::debug;

use crate::error::{Error, Result};

/// One connected socket, plain or TLS.
pub enum Transport {
    /// Plain TCP.
    Plain(TcpStream),
    /// TLS over TCP.
    Tls(TlsDuplex),
}

impl Transport {
    /// Resolve `address:port` and open a plain TCP connection.
    ///
    /// # Errors
    ///
    /// [`Error::AddressResolution`] when the address does not resolve;
    /// [`Error::Io`] when the TCP connect fails or times out.
    pub fn connect_tcp(address: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = resolve(address, port)?;
        let sock = TcpStream::connect_timeout(&addr, timeout)?;
        sock.set_nodelay(true)?;
        debug!(%addr, "tcp connected");
        Ok(Transport::Plain(sock))
    }

    /// Open a TCP connection and complete a TLS handshake over it.
    ///
    /// The handshake runs eagerly; on failure the socket is dropped, never
    /// returned half-open.
    ///
    /// # Errors
    ///
    /// [`Error::AddressResolution`], [`Error::Io`] as for
    /// [`Transport::connect_tcp`], plus [`Error::TlsSetup`] when the
    /// session cannot be created or the handshake fails.
    pub fn connect_tls(
        address: &str,
        port: u16,
        timeout: Duration,
        config: Arc<ClientConfig>,
        name: ServerName<'static>,
    ) -> Result<Self> {
        let addr = resolve(address, port)?;
        let sock = TcpStream::connect_timeout(&addr, timeout)?;
        sock.set_nodelay(true)?;

        let mut session = ClientConnection::new(config, name)
            .map_err(|e| Error::TlsSetup(format!("Cannot create TLS session: {e}")))?;
        while session.is_handshaking() {
            session
                .complete_io(&mut &sock)
                .map_err(|e| Error::TlsSetup(format!("TLS handshake failed: {e}")))?;
        }
        debug!(%addr, "tls session established");

        Ok(Transport::Tls(TlsDuplex {
            sock,
            session: Mutex::new(session),
        }))
    }

    /// Blocking read of available plaintext. Returns 0 at end-of-stream.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Transport::Plain(sock) => Ok((&*sock).read(buf)?),
            Transport::Tls(duplex) => duplex.read(buf),
        }
    }

    /// Write the whole buffer.
    pub fn write_all(&self, buf: &[u8]) -> Result<()> {
        match self {
            Transport::Plain(sock) => {
                (&*sock).write_all(buf)?;
                Ok(())
            }
            Transport::Tls(duplex) => duplex.write_all(buf),
        }
    }

    /// Force the socket closed. Safe to call from another thread while a
    /// read is blocked; that read fails with an I/O error or end-of-stream.
    pub fn shutdown(&self) {
        let sock = match self {
            Transport::Plain(sock) => sock,
            Transport::Tls(duplex) => &duplex.sock,
        };
        // Already-closed sockets are fine here.
        let _ = sock.shutdown(Shutdown::Both);
    }
}

fn resolve(address: &str, port: u16) -> Result<SocketAddr> {
    (address, port)
        .to_socket_addrs()
        .map_err(|e| Error::AddressResolution(format!("{address}:{port}: {e}")))?
        .next()
        .ok_or_else(|| Error::AddressResolution(format!("{address}:{port}: no addresses")))
}

/// A rustls session usable concurrently from a reading and a writing
/// thread.
pub struct TlsDuplex {
    sock: TcpStream,
    session: Mutex<ClientConnection>,
}

impl TlsDuplex {
    fn lock_session(&self) -> Result<MutexGuard<'_, ClientConnection>> {
        self.session
            .lock()
            .map_err(|_| Error::Io("TLS session lock poisoned".into()))
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut ciphertext = [0u8; 16 * 1024];
        loop {
            {
                let mut session = self.lock_session()?;
                flush_pending(&mut session, &self.sock)?;
                match session.reader().read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e.into()),
                }
            }

            // Socket read happens without the session lock.
            let n = (&self.sock).read(&mut ciphertext)?;
            if n == 0 {
                return Ok(0);
            }

            let mut session = self.lock_session()?;
            let mut pending = &ciphertext[..n];
            while !pending.is_empty() {
                session.read_tls(&mut pending)?;
                session
                    .process_new_packets()
                    .map_err(|e| Error::Io(format!("TLS record error: {e}")))?;
            }
        }
    }

    fn write_all(&self, buf: &[u8]) -> Result<()> {
        let mut session = self.lock_session()?;
        session.writer().write_all(buf)?;
        flush_pending(&mut session, &self.sock)
    }
}

fn flush_pending(session: &mut ClientConnection, mut sock: &TcpStream) -> Result<()> {
    while session.wants_write() {
        session.write_tls(&mut sock)?;
    }
    Ok(())
}
