//! Block codec for multi-frame transfers.
//!
//! Payloads larger than one frame travel as a sequence of fixed-size blocks.
//! The last block is zero-padded to [`BLOCK_SIZE`]:
//!
//! ```text
//! +----------------+----------------+-----------------------+
//! | block 0 (64 B) | block 1 (64 B) | block N-1 + zero pad  |
//! +----------------+----------------+-----------------------+
//! ```
//!
//! The config payload carries no length field. The reader finds its end by
//! scanning for the first byte that is `0` or above `0xF4`; the writer must
//! therefore never send such a byte inside the payload.

use bytes::{BufMut, BytesMut};

use crate::commands::BlockCount;
use crate::constants::*;
use crate::error::ProtocolError;

/// Find the logical end of a config payload inside reassembled blocks.
///
/// Returns the index of the first `0` byte or byte above `0xF4`, or the buffer
/// length if there is none.
pub fn payload_end(buf: &[u8]) -> usize {
    buf.iter()
        .position(|&b| b == 0 || b >= PAYLOAD_SENTINEL_MIN)
        .unwrap_or(buf.len())
}

/// Check that a config payload fits in one transfer and survives the
/// read-side boundary scan.
pub fn check_payload(payload: &[u8]) -> Result<BlockCount, ProtocolError> {
    if payload.len() > MAX_CONFIG_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            max: MAX_CONFIG_SIZE,
            actual: payload.len(),
        });
    }
    if let Some(offset) = payload
        .iter()
        .position(|&b| b == 0 || b >= PAYLOAD_SENTINEL_MIN)
    {
        return Err(ProtocolError::UnrepresentableByte {
            byte: payload[offset],
            offset,
        });
    }
    BlockCount::for_len(payload.len())
}

/// Split a payload into zero-padded blocks.
///
/// Fails if the payload needs more than [`MAX_BLOCKS`] blocks.
pub fn split_blocks(payload: &[u8]) -> Result<Vec<[u8; BLOCK_SIZE]>, ProtocolError> {
    let count = BlockCount::for_len(payload.len())?;
    let mut blocks = Vec::with_capacity(count.get());
    for chunk in payload.chunks(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block[..chunk.len()].copy_from_slice(chunk);
        blocks.push(block);
    }
    Ok(blocks)
}

/// Reassembles received blocks in order.
#[derive(Debug)]
pub struct BlockAssembler {
    /// Reassembly buffer, `expected * BLOCK_SIZE` bytes once complete.
    buffer: BytesMut,
    /// Number of blocks announced by the header.
    expected: usize,
    /// Number of blocks pushed so far.
    received: usize,
}

impl BlockAssembler {
    /// Create an assembler for `expected` blocks.
    pub fn new(expected: BlockCount) -> Self {
        BlockAssembler {
            buffer: BytesMut::with_capacity(expected.byte_len()),
            expected: expected.get(),
            received: 0,
        }
    }

    /// Append the next block.
    ///
    /// A short block is padded with zeros to keep later blocks aligned.
    pub fn push(&mut self, block: &[u8]) -> Result<(), ProtocolError> {
        if self.is_complete() {
            return Err(ProtocolError::InvalidData(format!(
                "unexpected block {} of {}",
                self.received + 1,
                self.expected
            )));
        }
        if block.len() > BLOCK_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: BLOCK_SIZE,
                actual: block.len(),
            });
        }
        self.buffer.extend_from_slice(block);
        self.buffer.put_bytes(0, BLOCK_SIZE - block.len());
        self.received += 1;
        Ok(())
    }

    /// Blocks still missing.
    pub fn remaining(&self) -> usize {
        self.expected - self.received
    }

    /// Whether every announced block has arrived.
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    /// Raw reassembled bytes, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Finish and return the payload up to its boundary.
    pub fn finish(self) -> Result<Vec<u8>, ProtocolError> {
        if !self.is_complete() {
            return Err(ProtocolError::InvalidData(format!(
                "incomplete transfer: {} of {} blocks",
                self.received, self.expected
            )));
        }
        let end = payload_end(&self.buffer);
        log::trace!(
            "config payload ends at byte {} of {} received",
            end,
            self.buffer.len()
        );
        let mut buffer = self.buffer;
        buffer.truncate(end);
        Ok(buffer.to_vec())
    }
}
