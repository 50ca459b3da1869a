//! Config transfer state machines.
//!
//! Reads and writes move the config document in 64-byte blocks. Each
//! direction is tracked by an explicit state so the single in-flight sequence
//! can be audited:
//!
//! ```text
//! write: Idle -> AwaitingBlocks(n) -> AwaitingAck -> Idle | Failed
//! read:  Idle -> AwaitingHeader -> AwaitingBlocks(n) -> Idle | Failed
//! ```
//!
//! In the write direction `AwaitingBlocks` means blocks still to send; the
//! device gives no answer to the command itself. In the read direction it
//! means blocks still to receive.

use esparrier_protocol::{
    check_payload, split_blocks, BlockAssembler, BlockCount, Command, ProtocolError, Response,
    BLOCK_SIZE,
};
use serde_json::Value;

use crate::error::{ClientError, ClientResult, ValidationError};

/// Progress of one config transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Nothing sent yet, or the transfer completed.
    Idle,
    /// Read command sent, waiting for the `Config` header.
    AwaitingHeader,
    /// Blocks left to move.
    AwaitingBlocks(usize),
    /// All blocks sent, waiting for the device's verdict.
    AwaitingAck,
    /// The transfer failed; the device may still expect blocks.
    Failed,
}

fn out_of_sequence(state: TransferState, step: &str) -> ClientError {
    ClientError::Protocol(ProtocolError::InvalidData(format!(
        "{} while transfer is {:?}",
        step, state
    )))
}

pub(crate) fn unexpected(expected: &'static str, response: &Response) -> ClientError {
    ClientError::Protocol(ProtocolError::UnexpectedResponse {
        expected,
        actual: response.response_type().to_string(),
    })
}

// ============================================================================
// Config Document
// ============================================================================

/// An opaque structured config document.
///
/// Serialized as compact JSON on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument(Value);

impl ConfigDocument {
    /// Wrap a JSON value.
    pub fn new(value: Value) -> Self {
        ConfigDocument(value)
    }

    /// Borrow the JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwrap the JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Serialize for transfer.
    ///
    /// Fails with a validation error when the result cannot be sent in one
    /// transfer.
    pub fn to_payload(&self) -> Result<Vec<u8>, ValidationError> {
        let payload =
            serde_json::to_vec(&self.0).map_err(|e| ValidationError::Serialize(e.to_string()))?;
        check_payload(&payload).map_err(ValidationError::from_protocol)?;
        Ok(payload)
    }

    /// Parse a received payload.
    pub fn from_payload(payload: &[u8]) -> ClientResult<Self> {
        serde_json::from_slice(payload)
            .map(ConfigDocument)
            .map_err(ClientError::Document)
    }
}

impl From<Value> for ConfigDocument {
    fn from(value: Value) -> Self {
        ConfigDocument(value)
    }
}

// ============================================================================
// Write
// ============================================================================

/// Host side of a config write.
#[derive(Debug)]
pub struct WriteTransfer {
    blocks: Vec<[u8; BLOCK_SIZE]>,
    count: BlockCount,
    next: usize,
    state: TransferState,
}

impl WriteTransfer {
    /// Prepare a payload. Nothing is sent if this fails.
    pub fn new(payload: &[u8]) -> Result<Self, ValidationError> {
        let count = check_payload(payload).map_err(ValidationError::from_protocol)?;
        let blocks = split_blocks(payload).map_err(ValidationError::from_protocol)?;
        Ok(WriteTransfer {
            blocks,
            count,
            next: 0,
            state: TransferState::Idle,
        })
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Number of blocks the payload occupies.
    pub fn block_count(&self) -> BlockCount {
        self.count
    }

    /// The command that opens the transfer. Moves to `AwaitingBlocks`.
    pub fn start(&mut self) -> ClientResult<Command> {
        if self.state != TransferState::Idle || self.next != 0 {
            return Err(out_of_sequence(self.state, "start"));
        }
        self.state = match self.count.get() {
            0 => TransferState::AwaitingAck,
            n => TransferState::AwaitingBlocks(n),
        };
        Ok(Command::WriteConfig { blocks: self.count })
    }

    /// Next block to send, or `None` once all have been handed out.
    pub fn next_block(&mut self) -> Option<[u8; BLOCK_SIZE]> {
        let TransferState::AwaitingBlocks(remaining) = self.state else {
            return None;
        };
        let block = self.blocks.get(self.next).copied()?;
        self.next += 1;
        self.state = match remaining - 1 {
            0 => TransferState::AwaitingAck,
            left => TransferState::AwaitingBlocks(left),
        };
        Some(block)
    }

    /// Consume the device's answer to the last block.
    pub fn finish(&mut self, frame: &[u8]) -> ClientResult<()> {
        if self.state != TransferState::AwaitingAck {
            let err = out_of_sequence(self.state, "acknowledgement");
            self.state = TransferState::Failed;
            return Err(err);
        }
        let outcome = match Response::decode(frame) {
            Ok(Response::Ok) => Ok(()),
            Ok(Response::Error(code)) => Err(ClientError::Device(code)),
            Ok(other) => Err(unexpected("ok", &other)),
            Err(e) => Err(e.into()),
        };
        self.state = if outcome.is_ok() {
            TransferState::Idle
        } else {
            TransferState::Failed
        };
        outcome
    }

    /// Mark the transfer as failed.
    pub fn fail(&mut self) {
        self.state = TransferState::Failed;
    }
}

// ============================================================================
// Read
// ============================================================================

/// Host side of a config read.
#[derive(Debug)]
pub struct ReadTransfer {
    assembler: Option<BlockAssembler>,
    state: TransferState,
}

impl Default for ReadTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadTransfer {
    /// A transfer that has not started.
    pub fn new() -> Self {
        ReadTransfer {
            assembler: None,
            state: TransferState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// The command that opens the transfer. Moves to `AwaitingHeader`.
    pub fn start(&mut self) -> ClientResult<Command> {
        if self.state != TransferState::Idle || self.assembler.is_some() {
            return Err(out_of_sequence(self.state, "start"));
        }
        self.state = TransferState::AwaitingHeader;
        Ok(Command::ReadConfig)
    }

    /// Consume the first response frame and return the announced block count.
    pub fn on_header(&mut self, frame: &[u8]) -> ClientResult<BlockCount> {
        if self.state != TransferState::AwaitingHeader {
            return Err(self.failed(out_of_sequence(self.state, "header")));
        }
        let count = match Response::decode(frame) {
            Ok(Response::Config { block_count }) => BlockCount::new(block_count as usize)
                .map_err(|e| self.failed(e.into()))?,
            Ok(Response::Error(code)) => return Err(self.failed(ClientError::Device(code))),
            Ok(other) => return Err(self.failed(unexpected("config", &other))),
            Err(e) => return Err(self.failed(e.into())),
        };
        self.assembler = Some(BlockAssembler::new(count));
        self.state = match count.get() {
            0 => TransferState::Idle,
            n => TransferState::AwaitingBlocks(n),
        };
        Ok(count)
    }

    /// Consume one block frame.
    pub fn on_block(&mut self, frame: &[u8]) -> ClientResult<()> {
        let TransferState::AwaitingBlocks(remaining) = self.state else {
            return Err(self.failed(out_of_sequence(self.state, "block")));
        };
        let pushed = match self.assembler.as_mut() {
            Some(assembler) => assembler.push(frame),
            None => Err(ProtocolError::InvalidData("block before header".to_string())),
        };
        if let Err(e) = pushed {
            return Err(self.failed(e.into()));
        }
        self.state = match remaining - 1 {
            0 => TransferState::Idle,
            left => TransferState::AwaitingBlocks(left),
        };
        Ok(())
    }

    /// Payload bytes up to the boundary, once every block has arrived.
    pub fn finish(self) -> ClientResult<Vec<u8>> {
        match (self.state, self.assembler) {
            (TransferState::Idle, Some(assembler)) => Ok(assembler.finish()?),
            (state, _) => Err(out_of_sequence(state, "finish")),
        }
    }

    /// Mark the transfer as failed.
    pub fn fail(&mut self) {
        self.state = TransferState::Failed;
    }

    fn failed(&mut self, err: ClientError) -> ClientError {
        self.state = TransferState::Failed;
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esparrier_protocol::DeviceErrorCode;
    use serde_json::json;

    #[test]
    fn test_write_state_machine() {
        let payload = vec![b'a'; 100];
        let mut transfer = WriteTransfer::new(&payload).unwrap();
        assert_eq!(transfer.state(), TransferState::Idle);

        let command = transfer.start().unwrap();
        assert_eq!(command.encode(), vec![b'w', 2]);
        assert_eq!(transfer.state(), TransferState::AwaitingBlocks(2));

        let first = transfer.next_block().unwrap();
        assert_eq!(first, [b'a'; 64]);
        assert_eq!(transfer.state(), TransferState::AwaitingBlocks(1));

        let second = transfer.next_block().unwrap();
        assert!(second[..36].iter().all(|&b| b == b'a'));
        assert!(second[36..].iter().all(|&b| b == 0));
        assert_eq!(transfer.state(), TransferState::AwaitingAck);
        assert!(transfer.next_block().is_none());

        transfer.finish(b"o").unwrap();
        assert_eq!(transfer.state(), TransferState::Idle);
    }

    #[test]
    fn test_write_ack_error() {
        let mut transfer = WriteTransfer::new(b"{}").unwrap();
        transfer.start().unwrap();
        while transfer.next_block().is_some() {}
        let err = transfer.finish(&[b'e', b'i']).unwrap_err();
        assert_eq!(err.device_code(), Some(DeviceErrorCode::InvalidConfig));
        assert_eq!(transfer.state(), TransferState::Failed);
    }

    #[test]
    fn test_write_ack_before_blocks_is_rejected() {
        let mut transfer = WriteTransfer::new(b"{}").unwrap();
        transfer.start().unwrap();
        assert!(transfer.finish(b"o").is_err());
        assert_eq!(transfer.state(), TransferState::Failed);
    }

    #[test]
    fn test_write_rejects_oversized_payload() {
        let payload = vec![b'x'; 4097];
        assert_eq!(
            WriteTransfer::new(&payload).unwrap_err(),
            ValidationError::ConfigTooLarge {
                size: 4097,
                max: 4096
            }
        );
    }

    #[test]
    fn test_read_state_machine() {
        let mut transfer = ReadTransfer::new();
        assert_eq!(transfer.start().unwrap(), Command::ReadConfig);
        assert_eq!(transfer.state(), TransferState::AwaitingHeader);

        let count = transfer.on_header(&[b'r', 2]).unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(transfer.state(), TransferState::AwaitingBlocks(2));

        let mut first = [b'{'; 64];
        first[1..].fill(b' ');
        transfer.on_block(&first).unwrap();
        transfer.on_block(b"}").unwrap();
        assert_eq!(transfer.state(), TransferState::Idle);

        let payload = transfer.finish().unwrap();
        assert_eq!(payload.len(), 65);
        assert_eq!(payload[64], b'}');
    }

    #[test]
    fn test_read_header_error_frame() {
        let mut transfer = ReadTransfer::new();
        transfer.start().unwrap();
        let err = transfer.on_header(&[b'e', b'z']).unwrap_err();
        assert_eq!(err.device_code(), Some(DeviceErrorCode::Unrecognized(b'z')));
        assert_eq!(transfer.state(), TransferState::Failed);
    }

    #[test]
    fn test_read_header_wrong_type() {
        let mut transfer = ReadTransfer::new();
        transfer.start().unwrap();
        let err = transfer.on_header(b"o").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }

    #[test]
    fn test_read_finish_before_complete() {
        let mut transfer = ReadTransfer::new();
        transfer.start().unwrap();
        transfer.on_header(&[b'r', 3]).unwrap();
        transfer.on_block(&[b'a'; 64]).unwrap();
        assert!(transfer.finish().is_err());
    }

    #[test]
    fn test_document_payload() {
        let doc = ConfigDocument::new(json!({"ssid": "home", "port": 24800}));
        let payload = doc.to_payload().unwrap();
        assert_eq!(payload, br#"{"port":24800,"ssid":"home"}"#.to_vec());
        assert_eq!(ConfigDocument::from_payload(&payload).unwrap(), doc);
    }

    #[test]
    fn test_document_decode_failure_is_protocol() {
        let err = ConfigDocument::from_payload(b"{\"ssid\":").unwrap_err();
        assert!(matches!(err, ClientError::Document(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }
}
