//! Byte channels to a device.
//!
//! A [`Transport`] moves whole bulk frames. The session never opens or closes
//! it; the owner does, and reports a disconnect through
//! [`CloseHandle`](crate::CloseHandle).

mod tcp;

pub use tcp::{BridgeCodec, TcpBridgeTransport, BRIDGE_DEVICE_TO_HOST, BRIDGE_HOST_TO_DEVICE};

use thiserror::Error;

/// Transport-level failures. All of them surface as
/// [`ClientError::Connectivity`](crate::ClientError::Connectivity).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel was closed by either side.
    #[error("connection closed")]
    Closed,

    /// No frame arrived within the receive timeout.
    #[error("timed out waiting for the device")]
    TimedOut,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A received frame exceeded the requested length.
    #[error("received frame of {actual} bytes exceeds limit of {max}")]
    FrameTooLong {
        /// Requested maximum.
        max: usize,
        /// Actual frame length.
        actual: usize,
    },

    /// Could not open the channel.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// A duplex frame channel to one device.
///
/// Both methods may only be called while the channel is open. Each call
/// carries exactly one frame.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send one frame.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Receive one frame of at most `max_len` bytes.
    async fn receive(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Identifier used in logs and metric labels.
    fn describe(&self) -> String {
        "device".to_string()
    }
}
