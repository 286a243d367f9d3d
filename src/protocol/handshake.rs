//! Connection handshake.
//!
//! A single synchronous exchange: the client sends the protocol version
//! magic, the auth key (length-prefixed), and the wire format magic, all
//! concatenated; the server answers with an ASCII status string terminated by
//! a NUL byte. Anything other than `SUCCESS` is a rejection.

use crate::error::{Error, Result};
use crate::protocol::codec::put_u32_le;
use crate::protocol::constants::{HANDSHAKE_SUCCESS, VERSION_V0_3, WIRE_FORMAT_JSON};
use crate::protocol::frame::FrameStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

/// Build the client half of the handshake.
pub fn client_preamble(auth_key: &str) -> Vec<u8> {
    let key = auth_key.as_bytes();
    let mut buf = Vec::with_capacity(12 + key.len());
    put_u32_le(&mut buf, VERSION_V0_3);
    put_u32_le(&mut buf, key.len() as u32);
    buf.extend_from_slice(key);
    put_u32_le(&mut buf, WIRE_FORMAT_JSON);
    buf
}

/// Drive the handshake over a fresh stream.
///
/// On success the stream is ready for framed queries; trailing bytes the
/// server sent after the status NUL stay in the receive buffer.
pub async fn perform<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut FrameStream<S>,
    auth_key: &str,
) -> Result<()> {
    stream.write_raw(&client_preamble(auth_key)).await?;

    let status = stream.read_until_nul().await?;
    let status = String::from_utf8_lossy(&status).into_owned();
    if status == HANDSHAKE_SUCCESS {
        trace!("handshake complete");
        Ok(())
    } else {
        Err(Error::HandshakeRejected { status })
    }
}
