//! Protocol error types.

use thiserror::Error;

use crate::constants::*;

/// Errors that can occur when encoding or decoding protocol frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to be valid.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Frame is longer than the transport allows.
    #[error("frame too long: maximum {max} bytes, got {actual}")]
    FrameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// Leading byte matches no known response type.
    #[error("unknown response type: 0x{0:02X}")]
    UnknownResponse(u8),

    /// A response of the wrong type arrived for the operation in flight.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// What the operation was waiting for.
        expected: &'static str,
        /// What actually arrived.
        actual: String,
    },

    /// Block count outside `0..=MAX_BLOCKS`.
    #[error("block count {0} out of range (maximum {max})", max = MAX_BLOCKS)]
    BlockCountOutOfRange(usize),

    /// Payload does not fit in a single transfer.
    #[error("payload too large: maximum {max} bytes, got {actual}")]
    PayloadTooLarge {
        /// Maximum allowed size.
        max: usize,
        /// Actual size.
        actual: usize,
    },

    /// Payload contains a byte the read-side boundary scan would stop at.
    #[error("payload byte 0x{byte:02X} at offset {offset} cannot be transferred")]
    UnrepresentableByte {
        /// Offending byte.
        byte: u8,
        /// Offset within the payload.
        offset: usize,
    },

    /// Invalid data in a frame.
    #[error("invalid frame data: {0}")]
    InvalidData(String),

    /// Device answered with an error frame.
    #[error("device error: {0}")]
    Device(DeviceErrorCode),
}

/// Error codes carried by an error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    /// Endpoint I/O failed on the device.
    EndpointError,
    /// Device timed out waiting for data.
    Timeout,
    /// Configuration rejected.
    InvalidConfig,
    /// Command byte not recognized.
    UnknownCommand,
    /// Firmware update failure.
    Ota(OtaErrorCode),
    /// Any other code, kept verbatim.
    Unrecognized(u8),
}

impl DeviceErrorCode {
    /// Decode the bytes following an error response type byte.
    ///
    /// `bytes` must hold at least the code byte. An OTA error takes a second
    /// byte; if it is missing the code is reported as unrecognized.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let code = *bytes.first()?;
        Some(match code {
            ERR_OTA => match bytes.get(1) {
                Some(&sub) => DeviceErrorCode::Ota(OtaErrorCode::from(sub)),
                None => DeviceErrorCode::Unrecognized(code),
            },
            _ => DeviceErrorCode::from(code),
        })
    }

    /// Human-readable category.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceErrorCode::EndpointError => write!(f, "Endpoint error"),
            DeviceErrorCode::Timeout => write!(f, "Timeout"),
            DeviceErrorCode::InvalidConfig => write!(f, "Invalid configuration"),
            DeviceErrorCode::UnknownCommand => write!(f, "Unknown command"),
            DeviceErrorCode::Ota(code) => write!(f, "Firmware update failed: {}", code),
            DeviceErrorCode::Unrecognized(code) if code.is_ascii_graphic() => {
                write!(f, "Unknown error ({})", *code as char)
            }
            DeviceErrorCode::Unrecognized(code) => write!(f, "Unknown error (0x{:02X})", code),
        }
    }
}

impl From<u8> for DeviceErrorCode {
    fn from(code: u8) -> Self {
        match code {
            ERR_ENDPOINT => DeviceErrorCode::EndpointError,
            ERR_TIMEOUT => DeviceErrorCode::Timeout,
            ERR_INVALID_CONFIG => DeviceErrorCode::InvalidConfig,
            ERR_UNKNOWN_COMMAND => DeviceErrorCode::UnknownCommand,
            _ => DeviceErrorCode::Unrecognized(code),
        }
    }
}

/// Firmware update error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtaErrorCode {
    /// An update is already running.
    AlreadyInProgress,
    /// Data arrived before `OtaStart`.
    NotStarted,
    /// Updater could not be initialized.
    InitFailed,
    /// Flash write failed.
    WriteFailed,
    /// Image checksum did not match.
    CrcMismatch,
    /// Finalizing the image failed.
    FlushFailed,
    /// Image size rejected.
    InvalidSize,
    /// No partition to write to.
    PartitionNotFound,
    /// Any other sub-code.
    Unknown(u8),
}

impl std::fmt::Display for OtaErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OtaErrorCode::AlreadyInProgress => write!(f, "already in progress"),
            OtaErrorCode::NotStarted => write!(f, "not started"),
            OtaErrorCode::InitFailed => write!(f, "init failed"),
            OtaErrorCode::WriteFailed => write!(f, "write failed"),
            OtaErrorCode::CrcMismatch => write!(f, "CRC mismatch"),
            OtaErrorCode::FlushFailed => write!(f, "flush failed"),
            OtaErrorCode::InvalidSize => write!(f, "invalid size"),
            OtaErrorCode::PartitionNotFound => write!(f, "partition not found"),
            OtaErrorCode::Unknown(code) => write!(f, "unknown (0x{:02X})", code),
        }
    }
}

impl From<u8> for OtaErrorCode {
    fn from(code: u8) -> Self {
        match code {
            OTA_ERR_ALREADY_IN_PROGRESS => OtaErrorCode::AlreadyInProgress,
            OTA_ERR_NOT_STARTED => OtaErrorCode::NotStarted,
            OTA_ERR_INIT_FAILED => OtaErrorCode::InitFailed,
            OTA_ERR_WRITE_FAILED => OtaErrorCode::WriteFailed,
            OTA_ERR_CRC_MISMATCH => OtaErrorCode::CrcMismatch,
            OTA_ERR_FLUSH_FAILED => OtaErrorCode::FlushFailed,
            OTA_ERR_INVALID_SIZE => OtaErrorCode::InvalidSize,
            OTA_ERR_PARTITION_NOT_FOUND => OtaErrorCode::PartitionNotFound,
            _ => OtaErrorCode::Unknown(code),
        }
    }
}

impl From<OtaErrorCode> for u8 {
    fn from(code: OtaErrorCode) -> Self {
        match code {
            OtaErrorCode::AlreadyInProgress => OTA_ERR_ALREADY_IN_PROGRESS,
            OtaErrorCode::NotStarted => OTA_ERR_NOT_STARTED,
            OtaErrorCode::InitFailed => OTA_ERR_INIT_FAILED,
            OtaErrorCode::WriteFailed => OTA_ERR_WRITE_FAILED,
            OtaErrorCode::CrcMismatch => OTA_ERR_CRC_MISMATCH,
            OtaErrorCode::FlushFailed => OTA_ERR_FLUSH_FAILED,
            OtaErrorCode::InvalidSize => OTA_ERR_INVALID_SIZE,
            OtaErrorCode::PartitionNotFound => OTA_ERR_PARTITION_NOT_FOUND,
            OtaErrorCode::Unknown(code) => code,
        }
    }
}
