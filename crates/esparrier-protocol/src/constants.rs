//! Protocol constants
//!
//! Command bytes, response type bytes, error codes and sizes used on the
//! vendor bulk control interface. Every command and response is identified by
//! a single ASCII byte.

// ============================================================================
// Command Codes (host → device)
// ============================================================================

/// Get the running state of the device.
pub const CMD_GET_STATE: u8 = b's';
/// Read the stored configuration.
pub const CMD_READ_CONFIG: u8 = b'r';
/// Stage a new configuration, followed by a block count byte.
pub const CMD_WRITE_CONFIG: u8 = b'w';
/// Persist the staged configuration and restart.
pub const CMD_COMMIT_CONFIG: u8 = b'c';
/// Enable or disable keep-awake, followed by a boolean byte.
pub const CMD_KEEP_AWAKE: u8 = b'k';
/// Trigger a software reset.
pub const CMD_REBOOT: u8 = b'b';
/// Begin a firmware update: size (u32 LE) and CRC-32 (u32 LE).
pub const CMD_OTA_START: u8 = b'O';
/// Firmware data chunk header: packet count (u8) and data length (u16 LE).
pub const CMD_OTA_DATA: u8 = b'D';
/// Abort a firmware update in progress.
pub const CMD_OTA_ABORT: u8 = b'A';
/// Query firmware update progress.
pub const CMD_OTA_STATUS: u8 = b'P';

// ============================================================================
// Response Types (device → host)
// ============================================================================

/// Running state record.
pub const RESP_STATE: u8 = b's';
/// Config header, followed by the block count.
pub const RESP_CONFIG: u8 = b'r';
/// Generic success.
pub const RESP_OK: u8 = b'o';
/// Error, followed by an error code byte.
pub const RESP_ERROR: u8 = b'e';
/// Firmware update progress: received (u32 LE), total (u32 LE).
pub const RESP_OTA_PROGRESS: u8 = b'P';
/// Firmware update finished, device is rebooting.
pub const RESP_OTA_COMPLETE: u8 = b'C';

// ============================================================================
// Error Codes
// ============================================================================

/// Endpoint I/O failed on the device.
pub const ERR_ENDPOINT: u8 = b'e';
/// Device timed out waiting for data.
pub const ERR_TIMEOUT: u8 = b't';
/// Configuration failed validation or could not be stored.
pub const ERR_INVALID_CONFIG: u8 = b'i';
/// Command byte not recognized by the firmware.
pub const ERR_UNKNOWN_COMMAND: u8 = b'u';
/// Firmware update error, followed by an OTA error code byte.
pub const ERR_OTA: u8 = b'O';

/// OTA already in progress.
pub const OTA_ERR_ALREADY_IN_PROGRESS: u8 = b'a';
/// OTA not started.
pub const OTA_ERR_NOT_STARTED: u8 = b'n';
/// OTA could not be initialized.
pub const OTA_ERR_INIT_FAILED: u8 = b'i';
/// Flash write failed.
pub const OTA_ERR_WRITE_FAILED: u8 = b'w';
/// Image checksum mismatch.
pub const OTA_ERR_CRC_MISMATCH: u8 = b'c';
/// Finalizing the update failed.
pub const OTA_ERR_FLUSH_FAILED: u8 = b'f';
/// Image size rejected.
pub const OTA_ERR_INVALID_SIZE: u8 = b's';
/// No target partition.
pub const OTA_ERR_PARTITION_NOT_FOUND: u8 = b'p';

// ============================================================================
// Feature Flags
// ============================================================================

/// Plain LED indicator.
pub const FEATURE_LED: u8 = 0b0000_0001;
/// Addressable RGB LED indicator.
pub const FEATURE_SMARTLED: u8 = 0b0000_0010;
/// Graphical display indicator.
pub const FEATURE_GRAPHICS: u8 = 0b0000_0100;
/// Clipboard sharing.
pub const FEATURE_CLIPBOARD: u8 = 0b1000_0000;

// ============================================================================
// Sizes
// ============================================================================

/// Maximum size of a single transport frame.
pub const MAX_FRAME_SIZE: usize = 64;
/// Size of a config or firmware block.
pub const BLOCK_SIZE: usize = 64;
/// Maximum number of blocks in one transfer.
pub const MAX_BLOCKS: usize = 64;
/// Maximum serialized configuration size.
pub const MAX_CONFIG_SIZE: usize = BLOCK_SIZE * MAX_BLOCKS;
/// Length of the state record following the response type byte.
pub const STATE_BODY_LEN: usize = 13;
/// Maximum firmware chunk carried by one `OtaData` command.
pub const MAX_OTA_CHUNK_SIZE: usize = BLOCK_SIZE * MAX_BLOCKS;
/// Maximum firmware image size (size of the OTA partition).
pub const MAX_FIRMWARE_SIZE: usize = 0x10_0000;

/// Model id reserved for generic boards of the ESP32-S3 family.
pub const MODEL_ID_GENERIC_FAMILY: u8 = 255;

/// First byte value treated as the end of a config payload, besides `0`.
///
/// Bytes above `0xF4` never occur in valid UTF-8.
pub const PAYLOAD_SENTINEL_MIN: u8 = 0xF5;
