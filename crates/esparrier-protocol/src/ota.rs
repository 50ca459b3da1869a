//! Firmware update chunking.
//!
//! An image is sent in chunks of up to [`MAX_OTA_CHUNK_SIZE`] bytes. Each
//! chunk is announced with an `OtaData` header and then sent as zero-padded
//! 64-byte packets; the header's length field tells the device how many of
//! those bytes belong to the image.

use crate::blocks::split_blocks;
use crate::commands::{BlockCount, Command};
use crate::constants::*;
use crate::error::ProtocolError;

/// CRC-32 (IEEE 802.3, reflected) of `data`, as checked by the device.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

/// A firmware image ready to be sent.
#[derive(Debug, Clone)]
pub struct FirmwareImage<'a> {
    data: &'a [u8],
    crc: u32,
}

impl<'a> FirmwareImage<'a> {
    /// Validate the image size and compute its checksum.
    pub fn new(data: &'a [u8]) -> Result<Self, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::InvalidData("empty firmware image".to_string()));
        }
        if data.len() > MAX_FIRMWARE_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                max: MAX_FIRMWARE_SIZE,
                actual: data.len(),
            });
        }
        Ok(FirmwareImage {
            data,
            crc: crc32(data),
        })
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image is empty. Always false for a constructed image.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// CRC-32 of the image.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// The `OtaStart` command for this image.
    pub fn start_command(&self) -> Command {
        Command::OtaStart {
            size: self.data.len() as u32,
            crc: self.crc,
        }
    }

    /// Iterate over the chunks of the image.
    pub fn chunks(&self) -> impl Iterator<Item = OtaChunk<'a>> + 'a {
        let data = self.data;
        data.chunks(MAX_OTA_CHUNK_SIZE)
            .enumerate()
            .map(move |(index, bytes)| OtaChunk {
                offset: index * MAX_OTA_CHUNK_SIZE,
                bytes,
            })
    }
}

/// One chunk of a firmware image.
#[derive(Debug, Clone, Copy)]
pub struct OtaChunk<'a> {
    /// Offset of the chunk in the image.
    pub offset: usize,
    /// Image bytes in the chunk.
    pub bytes: &'a [u8],
}

impl OtaChunk<'_> {
    /// The `OtaData` header announcing this chunk.
    pub fn header(&self) -> Result<Command, ProtocolError> {
        Ok(Command::OtaData {
            packets: BlockCount::for_len(self.bytes.len())?,
            length: u16::try_from(self.bytes.len()).map_err(|_| {
                ProtocolError::PayloadTooLarge {
                    max: MAX_OTA_CHUNK_SIZE,
                    actual: self.bytes.len(),
                }
            })?,
        })
    }

    /// Zero-padded packets carrying the chunk.
    pub fn packets(&self) -> Result<Vec<[u8; BLOCK_SIZE]>, ProtocolError> {
        split_blocks(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_values() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(
            crc32(b"The quick brown fox jumps over the lazy dog"),
            0x414F_A339
        );
    }

    #[test]
    fn test_image_size_limits() {
        assert!(FirmwareImage::new(&[]).is_err());
        let too_big = vec![0u8; MAX_FIRMWARE_SIZE + 1];
        assert!(FirmwareImage::new(&too_big).is_err());
        let max = vec![0u8; MAX_FIRMWARE_SIZE];
        assert_eq!(FirmwareImage::new(&max).unwrap().len(), MAX_FIRMWARE_SIZE);
    }

    #[test]
    fn test_chunk_plan() {
        let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let image = FirmwareImage::new(&data).unwrap();
        assert_eq!(
            image.start_command(),
            Command::OtaStart {
                size: 10_000,
                crc: crc32(&data)
            }
        );

        let chunks: Vec<_> = image.chunks().collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].offset, 8192);
        assert_eq!(chunks[2].bytes.len(), 10_000 - 8192);

        assert_eq!(
            chunks[0].header().unwrap(),
            Command::OtaData {
                packets: BlockCount::new(64).unwrap(),
                length: 4096
            }
        );
        assert_eq!(
            chunks[2].header().unwrap(),
            Command::OtaData {
                packets: BlockCount::new(29).unwrap(),
                length: 1808
            }
        );

        let packets = chunks[2].packets().unwrap();
        assert_eq!(packets.len(), 29);
        assert!(packets[28][1808 - 28 * 64..].iter().all(|&b| b == 0));
    }
}
