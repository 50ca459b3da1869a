//! Typed device configuration.
//!
//! [`AppConfig`] mirrors the document the firmware stores. Optional fields
//! left unset are omitted on the wire so the firmware applies its own
//! defaults. Fields this version does not know about are carried through
//! unchanged.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult, ValidationError};
use crate::transfer::ConfigDocument;

/// Longest SSID the firmware stores.
pub const MAX_SSID_LEN: usize = 32;
/// Longest BLE device name the firmware stores.
pub const MAX_BLE_NAME_LEN: usize = 32;
/// Limit for every other string field.
pub const MAX_FIELD_LEN: usize = 64;
/// Most DNS servers the firmware accepts.
pub const MAX_DNS_SERVERS: usize = 3;

/// A string that is never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// The secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Redacted>")
    }
}

/// Device application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Wi-Fi network name.
    pub ssid: String,
    /// Wi-Fi password.
    pub password: Secret,
    /// Barrier server, `host:port`.
    pub server: String,
    /// Screen name announced to the server.
    pub screen_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip_wheel: Option<bool>,
    /// Report rate in Hz.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_rate: Option<u16>,
    /// Seconds between keep-awake mouse jiggles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jiggle_interval: Option<u16>,
    /// Indicator brightness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,

    /// Static address in CIDR notation. DHCP when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_server: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// USB vendor id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    /// USB product id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ble_device_name: Option<String>,
    /// Landing page advertised over WebUSB. Firmware 0.7.0 and later.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webusb_url: Option<String>,

    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.len() > max {
        return Err(ValidationError::FieldTooLong {
            field,
            max,
            actual: value.len(),
        });
    }
    Ok(())
}

fn check_required(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    check_len(field, value, max)
}

fn check_ipv4(field: &'static str, value: &str) -> Result<(), ValidationError> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidField {
            field,
            reason: format!("`{}` is not an IPv4 address", value),
        })
}

fn check_cidr(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidField { field, reason };
    let (addr, prefix) = value
        .split_once('/')
        .ok_or_else(|| invalid(format!("`{}` is missing a prefix length", value)))?;
    addr.parse::<Ipv4Addr>()
        .map_err(|_| invalid(format!("`{}` is not an IPv4 address", addr)))?;
    match prefix.parse::<u8>() {
        Ok(len) if len <= 32 => Ok(()),
        _ => Err(invalid(format!("`{}` is not a valid prefix length", prefix))),
    }
}

impl AppConfig {
    /// Check required fields and the limits the firmware enforces.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_required("ssid", &self.ssid, MAX_SSID_LEN)?;
        check_required("password", self.password.expose(), MAX_FIELD_LEN)?;
        check_required("server", &self.server, MAX_FIELD_LEN)?;
        check_required("screen_name", &self.screen_name, MAX_FIELD_LEN)?;

        if let Some(ip_addr) = &self.ip_addr {
            check_cidr("ip_addr", ip_addr)?;
        }
        if self.dns_server.len() > MAX_DNS_SERVERS {
            return Err(ValidationError::InvalidField {
                field: "dns_server",
                reason: format!(
                    "{} entries given, at most {} allowed",
                    self.dns_server.len(),
                    MAX_DNS_SERVERS
                ),
            });
        }
        for server in &self.dns_server {
            check_ipv4("dns_server", server)?;
        }
        if let Some(gateway) = &self.gateway {
            check_ipv4("gateway", gateway)?;
        }

        let optional = [
            ("manufacturer", &self.manufacturer, MAX_FIELD_LEN),
            ("product", &self.product, MAX_FIELD_LEN),
            ("serial_number", &self.serial_number, MAX_FIELD_LEN),
            ("ble_device_name", &self.ble_device_name, MAX_BLE_NAME_LEN),
            ("webusb_url", &self.webusb_url, MAX_FIELD_LEN),
        ];
        for (field, value, max) in optional {
            if let Some(value) = value {
                check_len(field, value, max)?;
            }
        }
        Ok(())
    }

    /// Convert to a transferable document.
    pub fn to_document(&self) -> Result<ConfigDocument, ValidationError> {
        serde_json::to_value(self)
            .map(ConfigDocument::new)
            .map_err(|e| ValidationError::Serialize(e.to_string()))
    }

    /// Interpret a document read from the device.
    pub fn from_document(document: &ConfigDocument) -> ClientResult<Self> {
        AppConfig::deserialize(document.as_value()).map_err(ClientError::Document)
    }
}

// ============================================================================
// Files
// ============================================================================

fn file_error(path: &Path, reason: impl fmt::Display) -> ValidationError {
    ValidationError::File {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Load a config document from a JSON or YAML file, chosen by extension.
pub fn load_document(path: &Path) -> Result<ConfigDocument, ValidationError> {
    let text = std::fs::read_to_string(path).map_err(|e| file_error(path, e))?;
    let value: Value = if is_yaml(path) {
        serde_yaml::from_str(&text).map_err(|e| file_error(path, e))?
    } else {
        serde_json::from_str(&text).map_err(|e| file_error(path, e))?
    };
    if !value.is_object() {
        return Err(file_error(path, "top level must be a mapping"));
    }
    Ok(ConfigDocument::new(value))
}

/// Render a document as pretty JSON, or YAML when `path` ends in `.yaml`/`.yml`.
pub fn render_document(
    document: &ConfigDocument,
    path: Option<&Path>,
) -> Result<String, ValidationError> {
    match path {
        Some(path) if is_yaml(path) => {
            serde_yaml::to_string(document.as_value()).map_err(|e| file_error(path, e))
        }
        _ => serde_json::to_string_pretty(document.as_value())
            .map(|mut text| {
                text.push('\n');
                text
            })
            .map_err(|e| ValidationError::Serialize(e.to_string())),
    }
}
