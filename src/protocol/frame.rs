//! Frame-level I/O over the connection's socket.
//!
//! Every message in either direction is `u64 token || u32 length || payload`,
//! integers little-endian. One receive accumulator per connection; the reader
//! alternates between needing a header and needing a body.

use crate::error::{Error, Result};
use crate::protocol::codec::{get_u32_le, get_u64_le, put_u32_le, put_u64_le};
use crate::protocol::constants::FRAME_HEADER_SIZE;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Framed reader/writer over a byte stream.
#[derive(Debug)]
pub struct FrameStream<S> {
    stream: S,
    /// Receive accumulator for incomplete frames.
    read_buf: BytesMut,
    /// Bound on every socket receive.
    timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FrameStream<S> {
    /// Create a new frame stream with the given read timeout.
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream,
            read_buf: BytesMut::new(),
            timeout,
        }
    }

    /// Read timeout applied to every receive.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pull more bytes from the socket into the accumulator.
    ///
    /// Fails with `ConnectionClosed` on EOF and `ReadTimeout` when the
    /// configured bound expires.
    async fn fill(&mut self) -> Result<()> {
        let read = tokio::time::timeout(self.timeout, self.stream.read_buf(&mut self.read_buf));
        match read.await {
            Ok(Ok(0)) => Err(Error::ConnectionClosed),
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::ReadTimeout {
                timeout: self.timeout,
            }),
        }
    }

    /// Read bytes up to (and consuming) a NUL terminator.
    ///
    /// Returns the bytes preceding the NUL. Used for the handshake status
    /// string, which is the only unframed data the server sends.
    pub async fn read_until_nul(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(pos) = self.read_buf.iter().position(|&b| b == 0) {
                let line = self.read_buf.split_to(pos + 1);
                return Ok(line[..pos].to_vec());
            }
            self.fill().await?;
        }
    }

    /// Read one frame, returning its token and payload bytes.
    pub async fn read_frame(&mut self) -> Result<(u64, Bytes)> {
        while self.read_buf.len() < FRAME_HEADER_SIZE {
            self.fill().await?;
        }
        let header = self.read_buf.split_to(FRAME_HEADER_SIZE);
        let token = get_u64_le(&header)?;
        let len = get_u32_le(&header[8..])? as usize;

        while self.read_buf.len() < len {
            self.fill().await?;
        }
        let payload = self.read_buf.split_to(len).freeze();
        Ok((token, payload))
    }

    /// Write one frame: token, payload length, payload.
    pub async fn write_frame(&mut self, token: u64, payload: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        put_u64_le(&mut buf, token);
        put_u32_le(&mut buf, payload.len() as u32);
        buf.extend_from_slice(payload);
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Write raw bytes (handshake preamble is not framed).
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shut down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn frame_bytes(token: u64, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u64_le(&mut buf, token);
        put_u32_le(&mut buf, payload.len() as u32);
        buf.extend_from_slice(payload);
        buf
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let payload = br#"{"t":1,"r":[true]}"#;
        let on_wire = frame_bytes(7, payload);

        let mock = Builder::new()
            .write(&on_wire)
            .read(&on_wire)
            .build();
        let mut stream = FrameStream::new(mock, Duration::from_secs(1));

        stream.write_frame(7, payload).await.unwrap();
        let (token, body) = stream.read_frame().await.unwrap();
        assert_eq!(token, 7);
        assert_eq!(&body[..], payload);
    }

    #[tokio::test]
    async fn test_read_frame_across_split_reads() {
        let on_wire = frame_bytes(99, b"[2]");
        // Header and body arrive in three separate reads.
        let mock = Builder::new()
            .read(&on_wire[..5])
            .read(&on_wire[5..13])
            .read(&on_wire[13..])
            .build();
        let mut stream = FrameStream::new(mock, Duration::from_secs(1));

        let (token, body) = stream.read_frame().await.unwrap();
        assert_eq!(token, 99);
        assert_eq!(&body[..], b"[2]");
    }

    #[tokio::test]
    async fn test_two_frames_in_one_read() {
        let mut on_wire = frame_bytes(1, b"[2]");
        on_wire.extend_from_slice(&frame_bytes(2, b"[3]"));
        let mock = Builder::new().read(&on_wire).build();
        let mut stream = FrameStream::new(mock, Duration::from_secs(1));

        let (token, body) = stream.read_frame().await.unwrap();
        assert_eq!((token, &body[..]), (1, &b"[2]"[..]));
        let (token, body) = stream.read_frame().await.unwrap();
        assert_eq!((token, &body[..]), (2, &b"[3]"[..]));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_connection_closed() {
        let on_wire = frame_bytes(1, b"[2]");
        let mock = Builder::new().read(&on_wire[..6]).build();
        let mut stream = FrameStream::new(mock, Duration::from_secs(1));

        assert!(matches!(
            stream.read_frame().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_until_nul() {
        let mock = Builder::new().read(b"SUCC").read(b"ESS\0").build();
        let mut stream = FrameStream::new(mock, Duration::from_secs(1));

        let status = stream.read_until_nul().await.unwrap();
        assert_eq!(status, b"SUCCESS");
    }

    #[tokio::test]
    async fn test_bytes_after_nul_stay_buffered() {
        let mut wire = b"SUCCESS\0".to_vec();
        wire.extend_from_slice(&frame_bytes(5, b"[4]"));
        let mock = Builder::new().read(&wire).build();
        let mut stream = FrameStream::new(mock, Duration::from_secs(1));

        assert_eq!(stream.read_until_nul().await.unwrap(), b"SUCCESS");
        let (token, body) = stream.read_frame().await.unwrap();
        assert_eq!((token, &body[..]), (5, &b"[4]"[..]));
    }
}
