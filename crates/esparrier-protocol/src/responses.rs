//! Responses from the device.

use crate::constants::*;
use crate::error::*;
use crate::types::*;

/// Kind of an inbound frame, taken from its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// Running state record.
    State,
    /// Config header.
    Config,
    /// Success.
    Ok,
    /// Error with code.
    Error,
    /// Firmware update progress.
    Progress,
    /// Firmware update complete.
    Complete,
    /// Leading byte matches no known type. Never retry on this.
    Unknown(u8),
}

impl ResponseType {
    /// Classify a response type byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            RESP_STATE => ResponseType::State,
            RESP_CONFIG => ResponseType::Config,
            RESP_OK => ResponseType::Ok,
            RESP_ERROR => ResponseType::Error,
            RESP_OTA_PROGRESS => ResponseType::Progress,
            RESP_OTA_COMPLETE => ResponseType::Complete,
            other => ResponseType::Unknown(other),
        }
    }

    /// Classify an inbound frame by its first byte.
    pub fn of(frame: &[u8]) -> Result<Self, ProtocolError> {
        frame
            .first()
            .map(|&byte| Self::from_byte(byte))
            .ok_or(ProtocolError::FrameTooShort {
                expected: 1,
                actual: 0,
            })
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseType::State => write!(f, "state"),
            ResponseType::Config => write!(f, "config"),
            ResponseType::Ok => write!(f, "ok"),
            ResponseType::Error => write!(f, "error"),
            ResponseType::Progress => write!(f, "progress"),
            ResponseType::Complete => write!(f, "complete"),
            ResponseType::Unknown(byte) => write!(f, "unknown (0x{:02X})", byte),
        }
    }
}

/// Responses received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Running state.
    State(DeviceStatus),

    /// Config header; the blocks follow as raw frames.
    Config {
        /// Number of 64-byte blocks that follow.
        block_count: u8,
    },

    /// Generic success.
    Ok,

    /// Error reported by the device.
    Error(DeviceErrorCode),

    /// Firmware update progress.
    Progress {
        /// Bytes written so far.
        received: u32,
        /// Total image size.
        total: u32,
    },

    /// Firmware update finished.
    Complete,
}

impl Response {
    /// Type of this response.
    pub fn response_type(&self) -> ResponseType {
        match self {
            Response::State(_) => ResponseType::State,
            Response::Config { .. } => ResponseType::Config,
            Response::Ok => ResponseType::Ok,
            Response::Error(_) => ResponseType::Error,
            Response::Progress { .. } => ResponseType::Progress,
            Response::Complete => ResponseType::Complete,
        }
    }

    /// Decode an inbound frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_FRAME_SIZE,
                actual: frame.len(),
            });
        }

        match ResponseType::of(frame)? {
            ResponseType::State => Ok(Response::State(DeviceStatus::decode(&frame[1..])?)),

            ResponseType::Config => {
                if frame.len() < 2 {
                    return Err(ProtocolError::FrameTooShort {
                        expected: 2,
                        actual: frame.len(),
                    });
                }
                Ok(Response::Config {
                    block_count: frame[1],
                })
            }

            ResponseType::Ok => Ok(Response::Ok),

            ResponseType::Error => {
                let code = DeviceErrorCode::from_bytes(&frame[1..]).ok_or(
                    ProtocolError::FrameTooShort {
                        expected: 2,
                        actual: frame.len(),
                    },
                )?;
                Ok(Response::Error(code))
            }

            ResponseType::Progress => {
                if frame.len() < 9 {
                    return Err(ProtocolError::FrameTooShort {
                        expected: 9,
                        actual: frame.len(),
                    });
                }
                let received = u32::from_le_bytes([frame[1], frame[2], frame[3], frame[4]]);
                let total = u32::from_le_bytes([frame[5], frame[6], frame[7], frame[8]]);
                Ok(Response::Progress { received, total })
            }

            ResponseType::Complete => Ok(Response::Complete),

            ResponseType::Unknown(byte) => {
                log::debug!("unknown response type 0x{:02X} in {}-byte frame", byte, frame.len());
                Err(ProtocolError::UnknownResponse(byte))
            }
        }
    }

    /// Encode the response into a frame, as the device would.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + STATE_BODY_LEN);
        match self {
            Response::State(status) => {
                buf.push(RESP_STATE);
                buf.extend_from_slice(&status.encode());
            }
            Response::Config { block_count } => {
                buf.push(RESP_CONFIG);
                buf.push(*block_count);
            }
            Response::Ok => buf.push(RESP_OK),
            Response::Error(code) => {
                buf.push(RESP_ERROR);
                match code {
                    DeviceErrorCode::EndpointError => buf.push(ERR_ENDPOINT),
                    DeviceErrorCode::Timeout => buf.push(ERR_TIMEOUT),
                    DeviceErrorCode::InvalidConfig => buf.push(ERR_INVALID_CONFIG),
                    DeviceErrorCode::UnknownCommand => buf.push(ERR_UNKNOWN_COMMAND),
                    DeviceErrorCode::Ota(sub) => {
                        buf.push(ERR_OTA);
                        buf.push((*sub).into());
                    }
                    DeviceErrorCode::Unrecognized(byte) => buf.push(*byte),
                }
            }
            Response::Progress { received, total } => {
                buf.push(RESP_OTA_PROGRESS);
                buf.extend_from_slice(&received.to_le_bytes());
                buf.extend_from_slice(&total.to_le_bytes());
            }
            Response::Complete => buf.push(RESP_OTA_COMPLETE),
        }
        buf
    }

    /// Turn an error response into `Err`, pass anything else through.
    pub fn into_result(self) -> Result<Self, ProtocolError> {
        match self {
            Response::Error(code) => Err(ProtocolError::Device(code)),
            other => Ok(other),
        }
    }
}
