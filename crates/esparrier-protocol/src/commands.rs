//! Commands that can be sent to the device.

use crate::constants::*;
use crate::error::ProtocolError;

/// Number of 64-byte blocks in a transfer, guaranteed to be `0..=MAX_BLOCKS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockCount(u8);

impl BlockCount {
    /// Validate a block count.
    pub fn new(count: usize) -> Result<Self, ProtocolError> {
        if count > MAX_BLOCKS {
            return Err(ProtocolError::BlockCountOutOfRange(count));
        }
        Ok(BlockCount(count as u8))
    }

    /// Number of blocks needed to carry `len` bytes.
    pub fn for_len(len: usize) -> Result<Self, ProtocolError> {
        Self::new(len.div_ceil(BLOCK_SIZE))
    }

    /// Block count as a `usize`.
    pub fn get(&self) -> usize {
        self.0 as usize
    }

    /// Total bytes covered by the blocks.
    pub fn byte_len(&self) -> usize {
        self.get() * BLOCK_SIZE
    }
}

impl TryFrom<usize> for BlockCount {
    type Error = ProtocolError;

    fn try_from(count: usize) -> Result<Self, Self::Error> {
        BlockCount::new(count)
    }
}

impl From<BlockCount> for u8 {
    fn from(count: BlockCount) -> Self {
        count.0
    }
}

/// Commands that can be sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Query the running state.
    GetState,

    /// Read the stored configuration.
    ReadConfig,

    /// Stage a configuration. The device starts reading blocks immediately.
    WriteConfig {
        /// Number of blocks that follow.
        blocks: BlockCount,
    },

    /// Persist the staged configuration and restart.
    CommitConfig,

    /// Enable or disable keep-awake.
    SetKeepAwake {
        /// Whether to keep the host awake.
        enabled: bool,
    },

    /// Reboot the device.
    Reboot,

    /// Begin a firmware update.
    OtaStart {
        /// Image size in bytes.
        size: u32,
        /// CRC-32 of the image.
        crc: u32,
    },

    /// Announce a firmware data chunk.
    OtaData {
        /// Number of 64-byte packets that follow (at least one).
        packets: BlockCount,
        /// Number of image bytes in those packets.
        length: u16,
    },

    /// Abort the firmware update.
    OtaAbort,

    /// Query firmware update progress.
    OtaStatus,
}

impl Command {
    /// Get the command code byte.
    pub fn code(&self) -> u8 {
        match self {
            Command::GetState => CMD_GET_STATE,
            Command::ReadConfig => CMD_READ_CONFIG,
            Command::WriteConfig { .. } => CMD_WRITE_CONFIG,
            Command::CommitConfig => CMD_COMMIT_CONFIG,
            Command::SetKeepAwake { .. } => CMD_KEEP_AWAKE,
            Command::Reboot => CMD_REBOOT,
            Command::OtaStart { .. } => CMD_OTA_START,
            Command::OtaData { .. } => CMD_OTA_DATA,
            Command::OtaAbort => CMD_OTA_ABORT,
            Command::OtaStatus => CMD_OTA_STATUS,
        }
    }

    /// Short name, used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetState => "get_state",
            Command::ReadConfig => "read_config",
            Command::WriteConfig { .. } => "write_config",
            Command::CommitConfig => "commit_config",
            Command::SetKeepAwake { .. } => "set_keep_awake",
            Command::Reboot => "reboot",
            Command::OtaStart { .. } => "ota_start",
            Command::OtaData { .. } => "ota_data",
            Command::OtaAbort => "ota_abort",
            Command::OtaStatus => "ota_status",
        }
    }

    /// Encode the command into a frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9);

        match self {
            Command::GetState
            | Command::ReadConfig
            | Command::CommitConfig
            | Command::Reboot
            | Command::OtaAbort
            | Command::OtaStatus => {
                buf.push(self.code());
            }

            Command::WriteConfig { blocks } => {
                buf.push(CMD_WRITE_CONFIG);
                buf.push((*blocks).into());
            }

            Command::SetKeepAwake { enabled } => {
                buf.push(CMD_KEEP_AWAKE);
                buf.push(if *enabled { 1 } else { 0 });
            }

            Command::OtaStart { size, crc } => {
                buf.push(CMD_OTA_START);
                buf.extend_from_slice(&size.to_le_bytes());
                buf.extend_from_slice(&crc.to_le_bytes());
            }

            Command::OtaData { packets, length } => {
                buf.push(CMD_OTA_DATA);
                buf.push((*packets).into());
                buf.extend_from_slice(&length.to_le_bytes());
            }
        }

        buf
    }

    /// Decode a command frame, as the device would.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let Some(&code) = frame.first() else {
            return Err(ProtocolError::FrameTooShort {
                expected: 1,
                actual: 0,
            });
        };

        let need = |expected: usize| -> Result<(), ProtocolError> {
            if frame.len() < expected {
                Err(ProtocolError::FrameTooShort {
                    expected,
                    actual: frame.len(),
                })
            } else {
                Ok(())
            }
        };

        match code {
            CMD_GET_STATE => Ok(Command::GetState),
            CMD_READ_CONFIG => Ok(Command::ReadConfig),
            CMD_WRITE_CONFIG => {
                need(2)?;
                Ok(Command::WriteConfig {
                    blocks: BlockCount::new(frame[1] as usize)?,
                })
            }
            CMD_COMMIT_CONFIG => Ok(Command::CommitConfig),
            CMD_KEEP_AWAKE => {
                need(2)?;
                Ok(Command::SetKeepAwake {
                    enabled: frame[1] != 0,
                })
            }
            CMD_REBOOT => Ok(Command::Reboot),
            CMD_OTA_START => {
                need(9)?;
                Ok(Command::OtaStart {
                    size: u32::from_le_bytes([frame[1], frame[2], frame[3], frame[4]]),
                    crc: u32::from_le_bytes([frame[5], frame[6], frame[7], frame[8]]),
                })
            }
            CMD_OTA_DATA => {
                need(4)?;
                Ok(Command::OtaData {
                    packets: BlockCount::new(frame[1] as usize)?,
                    length: u16::from_le_bytes([frame[2], frame[3]]),
                })
            }
            CMD_OTA_ABORT => Ok(Command::OtaAbort),
            CMD_OTA_STATUS => Ok(Command::OtaStatus),
            _ => Err(ProtocolError::InvalidData(format!(
                "unknown command code: 0x{:02X}",
                code
            ))),
        }
    }
}
