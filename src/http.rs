//! Minimal HTTP/1.1 request/response client.
//!
//! A single-shot unary client over the framing-less wire mode: one write
//! carries the whole serialized request, one blocking read yields the
//! response bytes. Responses spanning multiple TCP segments are not
//! reassembled. The response is parsed lazily on first access.

use std::fmt::Write as _;
use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::config::{Config, WireMode};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::handshake::host_header_value;

/// Bytes percent-encoded in the path component.
const PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Bytes percent-encoded in query keys and values.
const QUERY_SET: &AsciiSet = &PATH_SET.add(b'&').add(b'=').add(b'+');

/// Header names the client owns; callers may not override them. The one
/// exception is `content-type`, which routes into the body content type.
const RESERVED_HEADERS: &[&str] = &["host", "authorization", "connection", "content-length"];

/// A buildable HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    content_type: Option<String>,
}

impl HttpRequest {
    /// Create a request with the given method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            content_type: None,
        }
    }

    /// A GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// A POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    /// Append a query parameter; keys and values are percent-encoded.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] for the reserved names (`host`,
    /// `authorization`, `connection`, `content-length`). `content-type` is
    /// accepted and overrides the auto-detected body content type.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type = Some(value);
            return Ok(self);
        }
        if RESERVED_HEADERS.iter().any(|r| name.eq_ignore_ascii_case(r)) {
            return Err(Error::InvalidState(format!(
                "Header '{name}' is set by the client"
            )));
        }
        self.headers.push((name, value));
        Ok(self)
    }

    /// Set the request body. The content type defaults to JSON when the
    /// body starts with `{`, UTF-8 text otherwise.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn effective_content_type(&self) -> &str {
        if let Some(ct) = &self.content_type {
            return ct;
        }
        match &self.body {
            Some(body) if body.first() == Some(&b'{') => "application/json",
            _ => "text/plain;charset=utf-8",
        }
    }

    /// Serialize the request into wire bytes.
    fn serialize(&self, host: &str, auth: Option<&str>, keep_alive: bool) -> Vec<u8> {
        let mut head = String::with_capacity(256);
        head.push_str(&self.method);
        head.push(' ');
        let _ = write!(head, "{}", utf8_percent_encode(&self.path, PATH_SET));
        for (i, (key, value)) in self.query.iter().enumerate() {
            head.push(if i == 0 { '?' } else { '&' });
            let _ = write!(
                head,
                "{}={}",
                utf8_percent_encode(key, QUERY_SET),
                utf8_percent_encode(value, QUERY_SET)
            );
        }
        head.push_str(" HTTP/1.1\r\n");

        let _ = write!(head, "Host: {}\r\n", host_header_value(host));
        if let Some(auth) = auth {
            let _ = write!(head, "Authorization: Basic {auth}\r\n");
        }
        let _ = write!(
            head,
            "Connection: {}\r\n",
            if keep_alive { "keep-alive" } else { "close" }
        );
        for (name, value) in &self.headers {
            let _ = write!(head, "{name}: {value}\r\n");
        }
        if let Some(body) = &self.body {
            let _ = write!(head, "Content-Type: {}\r\n", self.effective_content_type());
            let _ = write!(head, "Content-Length: {}\r\n", body.len());
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }
        out
    }
}

#[derive(Debug)]
struct ParsedResponse {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body_start: Option<usize>,
}

/// A raw HTTP response, parsed lazily.
#[derive(Debug)]
pub struct HttpResponse {
    raw: Bytes,
    parsed: OnceLock<ParsedResponse>,
}

impl HttpResponse {
    /// Wrap raw response bytes.
    #[must_use]
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self {
            raw: raw.into(),
            parsed: OnceLock::new(),
        }
    }

    /// The unparsed response bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The status code, if a status line could be parsed.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.parsed().status
    }

    /// Look up a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parsed()
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The response body. Empty when the header/body separator is missing.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        match self.parsed().body_start {
            Some(start) => &self.raw[start..],
            None => &[],
        }
    }

    /// The body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUtf8`] when the body is not valid UTF-8.
    pub fn content_text(&self) -> Result<&str> {
        Ok(std::str::from_utf8(self.content())?)
    }

    fn parsed(&self) -> &ParsedResponse {
        self.parsed.get_or_init(|| parse_response(&self.raw))
    }
}

fn parse_response(raw: &[u8]) -> ParsedResponse {
    // Status: digits following the first space of the status line.
    let status = raw
        .iter()
        .position(|&b| b == b' ')
        .and_then(|space| {
            let digits: Vec<u8> = raw[space + 1..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .copied()
                .collect();
            std::str::from_utf8(&digits).ok()?.parse().ok()
        });

    let separator = raw.windows(4).position(|w| w == b"\r\n\r\n");
    let body_start = separator.map(|i| i + 4);

    let mut headers = Vec::new();
    if let Some(sep) = separator {
        let block = &raw[..sep];
        // Skip the status line.
        let header_lines = block
            .split(|&b| b == b'\n')
            .skip(1)
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line));
        for line in header_lines {
            let Some(colon) = line.iter().position(|&b| b == b':') else {
                continue;
            };
            let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
            let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
            if !name.is_empty() {
                headers.push((name, value));
            }
        }
    }

    ParsedResponse {
        status,
        headers,
        body_start,
    }
}

/// Single-shot HTTP client over a framing-less connection.
#[derive(Debug)]
pub struct HttpClient {
    conn: Connection,
    host: String,
    auth: Option<String>,
    keep_alive: bool,
}

impl HttpClient {
    /// Create a client for the given endpoint.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let address = address.into();
        let config = Config::new(address.clone(), port, "/")
            .with_wire_mode(WireMode::FramingLess);
        Self {
            conn: Connection::new(config),
            host: address,
            auth: None,
            keep_alive: true,
        }
    }

    /// Create a client from a full configuration (for TLS endpoints). The
    /// wire mode is forced to framing-less.
    #[must_use]
    pub fn from_config(mut config: Config) -> Self {
        config.wire_mode = WireMode::FramingLess;
        let host = config.address.clone();
        Self {
            conn: Connection::new(config),
            host,
            auth: None,
            keep_alive: true,
        }
    }

    /// Attach basic-auth credentials to every request.
    pub fn set_basic_auth(&mut self, user: &str, password: &str) {
        self.auth = Some(STANDARD.encode(format!("{user}:{password}")));
    }

    /// Choose between `keep-alive` and `close` on the connection header.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    /// Open the underlying connection.
    ///
    /// # Errors
    ///
    /// Propagates [`Connection::connect`] failures.
    pub fn connect(&mut self) -> Result<()> {
        self.conn.connect()
    }

    /// Send one request and block for the response.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when not connected; transport errors as for
    /// [`Connection::send`] and [`Connection::receive`].
    pub fn request(&self, req: &HttpRequest) -> Result<HttpResponse> {
        let wire = req.serialize(&self.host, self.auth.as_deref(), self.keep_alive);
        self.conn.send_bytes(&wire)?;
        let msg = self.conn.receive()?;
        Ok(HttpResponse::new(msg.into_bytes()))
    }

    /// Close the underlying connection.
    pub fn disconnect(&self) {
        self.conn.terminate();
    }

    /// Whether the underlying connection is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }
}
