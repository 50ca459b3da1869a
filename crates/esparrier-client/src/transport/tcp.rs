//! TCP bridge transport.
//!
//! A USB bridge forwards each bulk frame over TCP with a one-byte direction
//! marker and a little-endian length:
//!
//! ```text
//! +--------+--------+--------+-------------------+
//! |  dir   | len_lo | len_hi | data[0..len]      |
//! +--------+--------+--------+-------------------+
//! ```
//!
//! `dir` is `'<'` for host→device frames and `'>'` for device→host frames.

use bytes::{Buf, BufMut, BytesMut};
use esparrier_protocol::MAX_FRAME_SIZE;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

use super::{Transport, TransportError};

/// Marker for host→device frames.
pub const BRIDGE_HOST_TO_DEVICE: u8 = b'<';
/// Marker for device→host frames.
pub const BRIDGE_DEVICE_TO_HOST: u8 = b'>';

const HEADER_LEN: usize = 3;

/// Buffering codec for bridge frames.
///
/// A codec encodes frames with its outbound marker and decodes frames carrying
/// its inbound marker. Bytes preceding an inbound marker are discarded.
#[derive(Debug)]
pub struct BridgeCodec {
    buffer: BytesMut,
    outbound: u8,
    inbound: u8,
}

impl BridgeCodec {
    /// Codec for the host end: sends `'<'`, receives `'>'`.
    pub fn host() -> Self {
        Self::with_markers(BRIDGE_HOST_TO_DEVICE, BRIDGE_DEVICE_TO_HOST)
    }

    /// Codec for the device end: sends `'>'`, receives `'<'`.
    pub fn device() -> Self {
        Self::with_markers(BRIDGE_DEVICE_TO_HOST, BRIDGE_HOST_TO_DEVICE)
    }

    fn with_markers(outbound: u8, inbound: u8) -> Self {
        BridgeCodec {
            buffer: BytesMut::with_capacity(4 * (HEADER_LEN + MAX_FRAME_SIZE)),
            outbound,
            inbound,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete inbound frame, if one is buffered.
    ///
    /// A length above [`MAX_FRAME_SIZE`] is a framing error; the offending
    /// marker is dropped so decoding can resynchronise.
    pub fn decode(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let skip = self
            .buffer
            .iter()
            .position(|&b| b == self.inbound)
            .unwrap_or(self.buffer.len());
        if skip > 0 {
            trace!(discarded = skip, "skipping bytes before bridge marker");
            self.buffer.advance(skip);
        }

        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = u16::from_le_bytes([self.buffer[1], self.buffer[2]]) as usize;
        if len > MAX_FRAME_SIZE {
            self.buffer.advance(1);
            return Err(TransportError::FrameTooLong {
                max: MAX_FRAME_SIZE,
                actual: len,
            });
        }
        if self.buffer.len() < HEADER_LEN + len {
            return Ok(None);
        }

        self.buffer.advance(HEADER_LEN);
        Ok(Some(self.buffer.split_to(len).to_vec()))
    }

    /// Encode an outbound frame.
    pub fn encode(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLong {
                max: MAX_FRAME_SIZE,
                actual: frame.len(),
            });
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + frame.len());
        buf.put_u8(self.outbound);
        buf.put_u16_le(frame.len() as u16);
        buf.extend_from_slice(frame);
        Ok(buf)
    }

    /// Bytes waiting to be decoded.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// [`Transport`] over a TCP connection to a USB bridge.
#[derive(Debug)]
pub struct TcpBridgeTransport {
    stream: TcpStream,
    codec: BridgeCodec,
    peer: String,
}

impl TcpBridgeTransport {
    /// Connect to a bridge.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let peer = match stream.peer_addr() {
            Ok(addr) => format!("tcp://{}", addr),
            Err(_) => "tcp://unknown".to_string(),
        };
        // Frames are tiny and latency bound.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "could not disable Nagle's algorithm");
        }
        debug!(%peer, "bridge connected");
        TcpBridgeTransport {
            stream,
            codec: BridgeCodec::host(),
            peer,
        }
    }
}

impl Transport for TcpBridgeTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let bytes = self.codec.encode(frame)?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = [0u8; 512];
        loop {
            if let Some(frame) = self.codec.decode()? {
                if frame.len() > max_len {
                    return Err(TransportError::FrameTooLong {
                        max: max_len,
                        actual: frame.len(),
                    });
                }
                return Ok(frame);
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                debug!(
                    peer = %self.peer,
                    discarded = self.codec.buffered_len(),
                    "bridge closed the connection"
                );
                return Err(TransportError::Closed);
            }
            self.codec.push(&buf[..n]);
        }
    }

    fn describe(&self) -> String {
        self.peer.clone()
    }
}
