//! End-to-end tests against in-process TCP servers.
//!
//! Each test spins up a listener on a loopback port and drives one scripted
//! exchange, exercising the connect/handshake/send/receive paths over real
//! sockets.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use msgwire::config::WireMode;
use msgwire::message::{MQTT_PUBLISH, TEXT};
use msgwire::protocol::frame::{FrameStatus, frame_payload, parse_frame};
use msgwire::{Config, Connection, Error, HttpClient, HttpRequest, Message, TlsLevel};

const MAX: usize = 16 * 1024 * 1024;

fn spawn_server<F>(handler: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        handler(stream);
    });
    (port, handle)
}

/// Read until the end of the HTTP header block.
fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "client closed mid-request");
        request.extend_from_slice(&buf[..n]);
    }
    request
}

/// Read one complete (masked) client frame and return its unmasked payload
/// and opcode.
fn read_client_frame(stream: &mut TcpStream, pending: &mut Vec<u8>) -> (u8, Vec<u8>) {
    let mut buf = [0u8; 1024];
    loop {
        if let FrameStatus::Frame(frame) = parse_frame(pending, MAX).unwrap() {
            let payload = frame_payload(pending, &frame);
            let mtype = frame.mtype;
            pending.drain(..frame.end);
            return (mtype, payload);
        }
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "client closed mid-frame");
        pending.extend_from_slice(&buf[..n]);
    }
}

/// An unmasked server frame.
fn server_frame(mtype: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x80 | mtype];
    let len = payload.len();
    if len <= 125 {
        out.push(len as u8);
    } else if len <= 65_535 {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

const UPGRADE_OK: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n";

#[test]
fn test_ws13_handshake_and_echo() {
    let (port, server) = spawn_server(|mut stream| {
        let request = read_request(&mut stream);
        let text = String::from_utf8(request).unwrap();
        assert!(text.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(text.contains("Upgrade: WebSocket\r\n"));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(text.contains("Sec-WebSocket-Protocol: chat\r\n"));
        assert!(text.contains("Sec-WebSocket-Key: "));
        stream.write_all(UPGRADE_OK).unwrap();

        let mut pending = Vec::new();
        let (mtype, payload) = read_client_frame(&mut stream, &mut pending);
        stream.write_all(&server_frame(mtype, &payload)).unwrap();
    });

    let mut conn = Connection::new(Config::new("127.0.0.1", port, "/chat"));
    conn.connect().unwrap();
    assert!(conn.is_connected());
    assert!(conn.sent_bytes() > 0);

    conn.send_text("echo me").unwrap();
    let reply = conn.receive().unwrap();
    assert_eq!(reply.message_type(), TEXT);
    assert_eq!(reply.as_text().unwrap(), "echo me");

    server.join().unwrap();
    conn.terminate();
}

#[test]
fn test_handshake_rejected_on_404() {
    let (port, server) = spawn_server(|mut stream| {
        read_request(&mut stream);
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\n\r\n")
            .unwrap();
    });

    let mut conn = Connection::new(Config::new("127.0.0.1", port, "/chat"));
    let err = conn.connect().unwrap_err();
    assert!(matches!(err, Error::HandshakeRejected(_)));
    assert!(err.to_string().contains("404"));
    assert!(!conn.is_connected());
    server.join().unwrap();
}

#[test]
fn test_handshake_rejected_on_non_http() {
    let (port, server) = spawn_server(|mut stream| {
        read_request(&mut stream);
        stream.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").unwrap();
    });

    let mut conn = Connection::new(Config::new("127.0.0.1", port, "/chat"));
    assert!(matches!(
        conn.connect(),
        Err(Error::HandshakeRejected(_))
    ));
    assert!(!conn.is_connected());
    server.join().unwrap();
}

#[test]
fn test_mqtt_raw_echo() {
    let (port, server) = spawn_server(|mut stream| {
        // Echo raw bytes until the client hangs up.
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap_or(0);
            if n == 0 {
                return;
            }
            stream.write_all(&buf[..n]).unwrap();
        }
    });

    let config =
        Config::new("127.0.0.1", port, "/").with_wire_mode(WireMode::MqttRaw);
    let mut conn = Connection::new(config);
    conn.connect().unwrap();

    conn.send(&Message::with_type(b"mqtt body".to_vec(), MQTT_PUBLISH))
        .unwrap();
    let reply = conn.receive().unwrap();
    assert_eq!(reply.message_type(), MQTT_PUBLISH >> 4);
    assert_eq!(reply.as_bytes(), b"mqtt body");

    conn.terminate();
    server.join().unwrap();
}

#[test]
fn test_mqtt_over_ws_chunked_send_and_single_frame_receive() {
    let (port, server) = spawn_server(|mut stream| {
        let request = read_request(&mut stream);
        let text = String::from_utf8(request).unwrap();
        assert!(text.contains("Sec-WebSocket-Protocol: mqtt\r\n"));
        stream.write_all(UPGRADE_OK).unwrap();

        // Reassemble the chunked MQTT packet, then echo it in one frame.
        let mut pending = Vec::new();
        let mut packet = Vec::new();
        // 9-byte payload + 2-byte header, chunk size 4 -> 3 frames.
        for _ in 0..3 {
            let (_, chunk) = read_client_frame(&mut stream, &mut pending);
            packet.extend_from_slice(&chunk);
        }
        stream.write_all(&server_frame(0x02, &packet)).unwrap();
    });

    let mut config =
        Config::new("127.0.0.1", port, "/mqtt").with_wire_mode(WireMode::MqttOverWs);
    config.chunk_size = 4;
    let mut conn = Connection::new(config);
    conn.connect().unwrap();

    conn.send(&Message::with_type(b"publish!!".to_vec(), MQTT_PUBLISH))
        .unwrap();
    let reply = conn.receive().unwrap();
    assert_eq!(reply.message_type(), MQTT_PUBLISH >> 4);
    assert_eq!(reply.as_bytes(), b"publish!!");

    conn.terminate();
    server.join().unwrap();
}

#[test]
fn test_framing_less_roundtrip() {
    let (port, server) = spawn_server(|mut stream| {
        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"{\"poll\":true}");
        stream.write_all(b"{\"result\":42}").unwrap();
    });

    let config =
        Config::new("127.0.0.1", port, "/").with_wire_mode(WireMode::FramingLess);
    let mut conn = Connection::new(config);
    conn.connect().unwrap();

    conn.send_bytes(b"{\"poll\":true}").unwrap();
    let reply = conn.receive().unwrap();
    assert_eq!(reply.as_text().unwrap(), "{\"result\":42}");

    conn.terminate();
    server.join().unwrap();
}

#[test]
fn test_terminate_unblocks_receive() {
    let (port, server) = spawn_server(|stream| {
        // Hold the connection open without sending anything.
        thread::sleep(Duration::from_millis(500));
        drop(stream);
    });

    let config =
        Config::new("127.0.0.1", port, "/").with_wire_mode(WireMode::FramingLess);
    let mut conn = Connection::new(config);
    conn.connect().unwrap();

    thread::scope(|scope| {
        let receiver = scope.spawn(|| conn.receive());
        thread::sleep(Duration::from_millis(100));
        conn.terminate();
        let result = receiver.join().unwrap();
        let err = result.unwrap_err();
        assert!(err.is_fatal(), "expected a fatal error, got {err:?}");
    });
    assert!(!conn.is_connected());
    server.join().unwrap();
}

#[test]
fn test_peer_disconnect_surfaces() {
    let (port, server) = spawn_server(drop);

    let config =
        Config::new("127.0.0.1", port, "/").with_wire_mode(WireMode::FramingLess);
    let mut conn = Connection::new(config);
    conn.connect().unwrap();
    server.join().unwrap();

    // The peer is gone; the blocking receive observes end-of-stream.
    let err = conn.receive().unwrap_err();
    assert!(err.is_fatal());
    assert!(!conn.is_connected());
}

#[test]
fn test_setters_rejected_while_connected() {
    let (port, server) = spawn_server(|stream| {
        thread::sleep(Duration::from_millis(200));
        drop(stream);
    });

    let config =
        Config::new("127.0.0.1", port, "/").with_wire_mode(WireMode::FramingLess);
    let mut conn = Connection::new(config);
    conn.connect().unwrap();

    assert!(matches!(
        conn.set_verbose(true),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        conn.set_secure(TlsLevel::Tls13),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        conn.set_wire_mode(WireMode::Ws13),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        conn.set_address_list(vec!["10.0.0.1".into()]),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(conn.connect(), Err(Error::InvalidState(_))));

    conn.terminate();
    // Mutable again after close.
    conn.set_verbose(true).unwrap();
    server.join().unwrap();
}

#[test]
fn test_http_client_unary_request() {
    let (port, server) = spawn_server(|mut stream| {
        let request = read_request(&mut stream);
        let text = String::from_utf8(request).unwrap();
        assert!(text.starts_with("GET /ima/v1/monitor HTTP/1.1\r\n"));
        assert!(text.contains("Host: 127.0.0.1\r\n"));
        assert!(text.contains("Authorization: Basic YWRtaW46c2VjcmV0\r\n"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello")
            .unwrap();
    });

    let mut client = HttpClient::new("127.0.0.1", port);
    client.set_basic_auth("admin", "secret");
    client.connect().unwrap();

    let response = client.request(&HttpRequest::get("/ima/v1/monitor")).unwrap();
    assert_eq!(response.status(), Some(200));
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.content(), b"hello");

    client.disconnect();
    server.join().unwrap();
}

#[test]
fn test_http_post_with_json_body() {
    let (port, server) = spawn_server(|mut stream| {
        let mut request = read_request(&mut stream);
        // The body may trail the header block in the same segments.
        while !request.ends_with(b"{\"Action\":\"stop\"}") {
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).unwrap();
            assert!(n > 0);
            request.extend_from_slice(&buf[..n]);
        }
        let text = String::from_utf8(request).unwrap();
        assert!(text.starts_with("POST /admin HTTP/1.1\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Content-Length: 17\r\n"));
        stream.write_all(b"HTTP/1.1 204 No\r\n\r\n").unwrap();
    });

    let mut client = HttpClient::new("127.0.0.1", port);
    client.connect().unwrap();

    let request = HttpRequest::post("/admin").body(r#"{"Action":"stop"}"#);
    let response = client.request(&request).unwrap();
    assert_eq!(response.status(), Some(204));
    assert!(response.content().is_empty());

    client.disconnect();
    server.join().unwrap();
}
