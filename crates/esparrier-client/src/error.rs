//! Client error taxonomy.
//!
//! Every operation fails with exactly one [`ClientError`]. [`ClientError::kind`]
//! folds the variants into the four categories callers act on.

use esparrier_protocol::{DeviceErrorCode, FirmwareVersion, ProtocolError};
use thiserror::Error;

use crate::transport::TransportError;

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Channel lost or I/O failed.
    Connectivity,
    /// Framing mismatch or undecodable payload.
    Protocol,
    /// Device answered with an error frame.
    Device,
    /// Rejected locally, nothing was sent.
    Validation,
}

impl ErrorKind {
    /// Lowercase name, used as a metrics label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Device => "device",
            ErrorKind::Validation => "validation",
        }
    }
}

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failed or the channel was closed.
    #[error("connectivity error: {0}")]
    Connectivity(#[from] TransportError),

    /// Unexpected or malformed frame.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// Config payload arrived intact but is not a valid document.
    #[error("protocol error: config document could not be decoded: {0}")]
    Document(#[source] serde_json::Error),

    /// Device returned an error frame.
    #[error("device error: {0}")]
    Device(DeviceErrorCode),

    /// Local check failed before anything was sent.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl ClientError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Connectivity(_) => ErrorKind::Connectivity,
            ClientError::Protocol(_) | ClientError::Document(_) => ErrorKind::Protocol,
            ClientError::Device(_) => ErrorKind::Device,
            ClientError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Device error code, if the device reported one.
    pub fn device_code(&self) -> Option<DeviceErrorCode> {
        match self {
            ClientError::Device(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Device(code) => ClientError::Device(code),
            other => ClientError::Protocol(other),
        }
    }
}

/// Local validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Serialized config exceeds the transfer limit.
    #[error("configuration too large: {size} bytes (maximum {max})")]
    ConfigTooLarge {
        /// Serialized size.
        size: usize,
        /// Limit.
        max: usize,
    },

    /// Payload holds a byte the device would read as end of payload.
    #[error("payload contains byte 0x{byte:02X} at offset {offset}, which cannot be transferred")]
    UnrepresentableByte {
        /// Offending byte.
        byte: u8,
        /// Offset in the payload.
        offset: usize,
    },

    /// Command argument or firmware image rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(ProtocolError),

    /// Required config field is empty.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// Config field longer than the device stores.
    #[error("field `{field}` is {actual} bytes long (maximum {max})")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Limit in bytes.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// Config field has an invalid value.
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What is wrong.
        reason: String,
    },

    /// Config could not be serialized.
    #[error("configuration could not be serialized: {0}")]
    Serialize(String),

    /// Firmware too old for the requested operation.
    #[error("firmware {version} does not support {feature} (requires {required} or later)")]
    UnsupportedFirmware {
        /// What was attempted.
        feature: &'static str,
        /// Reported firmware version.
        version: FirmwareVersion,
        /// Minimum version.
        required: FirmwareVersion,
    },

    /// Local file could not be read, parsed or written.
    #[error("{path}: {reason}")]
    File {
        /// File path.
        path: String,
        /// What went wrong.
        reason: String,
    },
}

impl ValidationError {
    /// Map a failed local protocol check.
    pub fn from_protocol(err: ProtocolError) -> Self {
        match err {
            ProtocolError::PayloadTooLarge { max, actual } => {
                ValidationError::ConfigTooLarge { size: actual, max }
            }
            ProtocolError::UnrepresentableByte { byte, offset } => {
                ValidationError::UnrepresentableByte { byte, offset }
            }
            other => ValidationError::InvalidArgument(other),
        }
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
