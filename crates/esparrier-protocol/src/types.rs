//! Types decoded from device responses.

use std::cmp::Ordering;
use std::net::Ipv4Addr;

use crate::constants::*;
use crate::error::ProtocolError;

// ============================================================================
// Firmware Version
// ============================================================================

/// Firmware version triple.
///
/// Ordering is lexicographic over (major, minor, patch), so `0.10.0` sorts
/// after `0.9.9` and `1.0.0` after `0.99.99`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FirmwareVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch version.
    pub patch: u8,
}

/// Oldest firmware that supports reading and writing the configuration.
pub const MIN_CONFIG_VERSION: FirmwareVersion = FirmwareVersion::new(0, 6, 0);
/// Oldest firmware that understands the `webusb_url` config field.
pub const WEBUSB_URL_VERSION: FirmwareVersion = FirmwareVersion::new(0, 7, 0);

impl FirmwareVersion {
    /// Create a version triple.
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        FirmwareVersion {
            major,
            minor,
            patch,
        }
    }

    /// Three-way comparison against another triple.
    pub fn compare(&self, major: u8, minor: u8, patch: u8) -> Ordering {
        self.cmp(&FirmwareVersion::new(major, minor, patch))
    }

    /// Whether this version is `major.minor.patch` or newer.
    pub fn at_least(&self, major: u8, minor: u8, patch: u8) -> bool {
        self.compare(major, minor, patch) != Ordering::Less
    }

    /// Whether the firmware can be configured over this interface.
    pub fn supports_config(&self) -> bool {
        *self >= MIN_CONFIG_VERSION
    }

    /// Whether the firmware accepts the `webusb_url` config field.
    pub fn supports_webusb_url(&self) -> bool {
        *self >= WEBUSB_URL_VERSION
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for FirmwareVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().trim_start_matches('v').split('.');
        let mut next = || -> Result<u8, ProtocolError> {
            parts
                .next()
                .ok_or_else(|| ProtocolError::InvalidData(format!("invalid version: {}", s)))?
                .parse::<u8>()
                .map_err(|_| ProtocolError::InvalidData(format!("invalid version: {}", s)))
        };
        let version = FirmwareVersion::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(ProtocolError::InvalidData(format!("invalid version: {}", s)));
        }
        Ok(version)
    }
}

// ============================================================================
// Feature Flags
// ============================================================================

/// Optional hardware capabilities reported by the device.
///
/// Each flag is an independent bit; reserved bits are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Features(u8);

impl Features {
    /// Plain LED indicator.
    pub const LED: Features = Features(FEATURE_LED);
    /// Addressable RGB LED indicator.
    pub const SMART_LED: Features = Features(FEATURE_SMARTLED);
    /// Graphical display.
    pub const GRAPHICS: Features = Features(FEATURE_GRAPHICS);
    /// Clipboard sharing.
    pub const CLIPBOARD: Features = Features(FEATURE_CLIPBOARD);

    const KNOWN: [(Features, &'static str); 4] = [
        (Features::LED, "LED"),
        (Features::SMART_LED, "SmartLED"),
        (Features::GRAPHICS, "Graphics"),
        (Features::CLIPBOARD, "Clipboard"),
    ];

    /// Decode a raw bitmask, dropping reserved bits.
    pub fn from_bits(bits: u8) -> Self {
        Features(bits & (FEATURE_LED | FEATURE_SMARTLED | FEATURE_GRAPHICS | FEATURE_CLIPBOARD))
    }

    /// Raw bitmask of the known flags.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub fn contains(&self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no known flag is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Names of the set flags in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        Self::KNOWN
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for Features {
    type Output = Features;

    fn bitor(self, rhs: Features) -> Features {
        Features(self.0 | rhs.0)
    }
}

impl std::fmt::Display for Features {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join(", "))
    }
}

// ============================================================================
// Model
// ============================================================================

/// Hardware model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Model(pub u8);

impl Model {
    /// Display name from the static model table.
    pub fn name(&self) -> std::borrow::Cow<'static, str> {
        let name = match self.0 {
            0 => "Generic",
            1 => "M5Atom S3 Lite",
            2 => "M5Atom S3",
            3 => "M5Atom S3R",
            4 => "DevKitC-1.0",
            5 => "DevKitC-1.1",
            6 => "XIAO ESP32S3",
            7 => "ESP32-S3-ETH",
            MODEL_ID_GENERIC_FAMILY => "Generic ESP32-S3",
            id => return format!("Unknown ({})", id).into(),
        };
        name.into()
    }

    /// Whether the id is in the model table.
    pub fn is_known(&self) -> bool {
        matches!(self.0, 0..=7 | MODEL_ID_GENERIC_FAMILY)
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

// ============================================================================
// Network Address
// ============================================================================

/// IPv4 address and prefix length assigned to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkAddress {
    /// Address octets.
    pub address: Ipv4Addr,
    /// Prefix length.
    pub prefix_len: u8,
}

impl NetworkAddress {
    /// Decode four octets and a prefix length.
    ///
    /// An all-zero address means "not assigned" whatever the prefix says.
    pub fn from_octets(octets: [u8; 4], prefix_len: u8) -> Option<Self> {
        if octets == [0; 4] {
            return None;
        }
        Some(NetworkAddress {
            address: Ipv4Addr::from(octets),
            prefix_len,
        })
    }
}

impl std::fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

// ============================================================================
// Device Status
// ============================================================================

/// Running state of the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Firmware version.
    pub version: FirmwareVersion,
    /// Hardware capabilities.
    pub features: Features,
    /// Raw feature bitmask as reported, reserved bits included.
    pub feature_bits: u8,
    /// Assigned address, if any.
    pub address: Option<NetworkAddress>,
    /// Connected to the Barrier server.
    pub server_connected: bool,
    /// Screen is active.
    pub active: bool,
    /// Keep-awake is enabled.
    pub keep_awake: bool,
    /// Hardware model.
    pub model: Model,
}

impl DeviceStatus {
    /// Decode the state record that follows the response type byte.
    ///
    /// Reads exactly [`STATE_BODY_LEN`] bytes; trailing bytes are ignored.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        if body.len() < STATE_BODY_LEN {
            return Err(ProtocolError::FrameTooShort {
                expected: STATE_BODY_LEN + 1,
                actual: body.len() + 1,
            });
        }
        let body = &body[..STATE_BODY_LEN];

        Ok(DeviceStatus {
            version: FirmwareVersion::new(body[0], body[1], body[2]),
            features: Features::from_bits(body[3]),
            feature_bits: body[3],
            address: NetworkAddress::from_octets([body[4], body[5], body[6], body[7]], body[8]),
            server_connected: body[9] != 0,
            active: body[10] != 0,
            keep_awake: body[11] != 0,
            model: Model(body[12]),
        })
    }

    /// Encode the state record, without the response type byte.
    pub fn encode(&self) -> [u8; STATE_BODY_LEN] {
        let mut body = [0u8; STATE_BODY_LEN];
        body[0] = self.version.major;
        body[1] = self.version.minor;
        body[2] = self.version.patch;
        body[3] = self.feature_bits;
        if let Some(addr) = self.address {
            body[4..8].copy_from_slice(&addr.address.octets());
            body[8] = addr.prefix_len;
        }
        body[9] = self.server_connected as u8;
        body[10] = self.active as u8;
        body[11] = self.keep_awake as u8;
        body[12] = self.model.0;
        body
    }

    /// Version as `major.minor.patch`.
    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    /// Address as `a.b.c.d/prefix`, or `Not assigned`.
    pub fn address_display(&self) -> String {
        match self.address {
            Some(addr) => addr.to_string(),
            None => "Not assigned".to_string(),
        }
    }
}
