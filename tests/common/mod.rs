//! In-process scripted server speaking the wire protocol.
//!
//! Test doubles for a real server: accept one connection, answer the
//! handshake, then read and write frames according to each test's script.
#![allow(dead_code)]

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Bind a listener on an ephemeral local port.
pub async fn listen() -> (TcpListener, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Read the client handshake preamble, returning the auth key it carried.
pub async fn read_handshake(stream: &mut TcpStream) -> String {
    let mut version = [0u8; 4];
    stream.read_exact(&mut version).await.unwrap();
    let mut key_len = [0u8; 4];
    stream.read_exact(&mut key_len).await.unwrap();
    let mut key = vec![0u8; u32::from_le_bytes(key_len) as usize];
    stream.read_exact(&mut key).await.unwrap();
    let mut wire_format = [0u8; 4];
    stream.read_exact(&mut wire_format).await.unwrap();
    String::from_utf8(key).unwrap()
}

/// Accept one connection and answer its handshake with `status` (which must
/// include the trailing NUL).
pub async fn accept_with_status(listener: &TcpListener, status: &[u8]) -> TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    read_handshake(&mut stream).await;
    stream.write_all(status).await.unwrap();
    stream
}

/// Accept one connection and complete the handshake successfully.
pub async fn accept(listener: &TcpListener) -> TcpStream {
    accept_with_status(listener, b"SUCCESS\0").await
}

/// Read one query frame. `None` when the client hung up.
pub async fn read_frame(stream: &mut TcpStream) -> Option<(u64, Value)> {
    let mut header = [0u8; 12];
    if stream.read_exact(&mut header).await.is_err() {
        return None;
    }
    let mut token = [0u8; 8];
    token.copy_from_slice(&header[..8]);
    let token = u64::from_le_bytes(token);
    let mut len = [0u8; 4];
    len.copy_from_slice(&header[8..]);
    let mut payload = vec![0u8; u32::from_le_bytes(len) as usize];
    stream.read_exact(&mut payload).await.unwrap();
    Some((token, serde_json::from_slice(&payload).unwrap()))
}

/// Write one response frame for `token`.
pub async fn write_frame(stream: &mut TcpStream, token: u64, payload: &Value) {
    let body = serde_json::to_vec(payload).unwrap();
    let mut frame = Vec::with_capacity(12 + body.len());
    frame.extend_from_slice(&token.to_le_bytes());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    stream.write_all(&frame).await.unwrap();
    stream.flush().await.unwrap();
}
