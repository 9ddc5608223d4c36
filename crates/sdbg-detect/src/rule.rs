//! Device identity rules
//!
//! A port is classified as the target device when its USB identifiers match
//! exactly, or, failing that, when its description contains one of the
//! configured tokens (case-insensitive).

use serde::Deserialize;

use crate::scanner::PortDescriptor;
use crate::usb_ids::ch340;

/// Description tokens that identify a ServeDebug-style serial bridge
pub const DEFAULT_DESCRIPTION_TOKENS: &[&str] = &["serial", "ch340", "cp210", "ft232", "usb"];

/// What counts as "the target device class"
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceMatchRule {
    /// USB Vendor ID for exact hardware match
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    /// USB Product ID for exact hardware match
    #[serde(default = "default_product_id")]
    pub product_id: u16,
    /// Case-insensitive substrings matched against the port description
    #[serde(default = "default_tokens")]
    pub description_tokens: Vec<String>,
}

fn default_vendor_id() -> u16 {
    ch340::CH340.vid
}

fn default_product_id() -> u16 {
    ch340::CH340.pid
}

fn default_tokens() -> Vec<String> {
    DEFAULT_DESCRIPTION_TOKENS
        .iter()
        .map(|t| t.to_string())
        .collect()
}

impl Default for DeviceMatchRule {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            description_tokens: default_tokens(),
        }
    }
}

/// Why a descriptor satisfied a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchReason {
    /// VID and PID both matched
    HardwareId,
    /// Description contained this token
    Description(String),
}

impl DeviceMatchRule {
    /// Create a rule from a VID/PID pair and description tokens
    pub fn new<I, S>(vendor_id: u16, product_id: u16, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vendor_id,
            product_id,
            description_tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Classify a descriptor against this rule
    ///
    /// The hardware ID check is authoritative: when both IDs are present and
    /// equal to the rule's pair, the description is never inspected.
    pub fn classify(&self, port: &PortDescriptor) -> Option<MatchReason> {
        if let (Some(vid), Some(pid)) = (port.vendor_id, port.product_id) {
            if vid == self.vendor_id && pid == self.product_id {
                return Some(MatchReason::HardwareId);
            }
        }

        let description = port.description.to_lowercase();
        self.description_tokens
            .iter()
            .map(|t| t.trim().to_lowercase())
            .find(|t| !t.is_empty() && description.contains(t.as_str()))
            .map(MatchReason::Description)
    }

    /// Check whether a descriptor is the target device
    pub fn matches(&self, port: &PortDescriptor) -> bool {
        self.classify(port).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_id_wins_regardless_of_description() {
        let rule = DeviceMatchRule::default();
        let port = PortDescriptor::new("COM7", "Bluetooth Modem").with_usb_ids(0x1A86, 0x7523);
        assert_eq!(rule.classify(&port), Some(MatchReason::HardwareId));
    }

    #[test]
    fn test_description_fallback_without_ids() {
        let rule = DeviceMatchRule::default();
        let port = PortDescriptor::new("COM3", "USB-SERIAL CH340");
        assert!(rule.matches(&port));
        // First configured token that appears wins
        assert_eq!(
            rule.classify(&port),
            Some(MatchReason::Description("serial".to_string()))
        );
    }

    #[test]
    fn test_unrelated_device_does_not_match() {
        let rule = DeviceMatchRule::default();
        let port = PortDescriptor::new("COM4", "Bluetooth Modem").with_usb_ids(0x05AC, 0x1234);
        assert!(!rule.matches(&port));
    }

    #[test]
    fn test_mismatched_ids_fall_back_to_description() {
        let rule = DeviceMatchRule::default();
        let port = PortDescriptor::new("/dev/ttyUSB0", "CP2102 USB to UART").with_usb_ids(0x10C4, 0xEA60);
        assert!(rule.matches(&port));
    }

    #[test]
    fn test_partial_ids_use_description() {
        let rule = DeviceMatchRule::new(0x1A86, 0x7523, ["debugger"]);
        let mut port = PortDescriptor::new("COM5", "Modem");
        port.vendor_id = Some(0x1A86);
        assert!(!rule.matches(&port));

        port.description = "ServeDebug DEBUGGER".to_string();
        assert!(rule.matches(&port));
    }

    #[test]
    fn test_blank_tokens_are_ignored() {
        let rule = DeviceMatchRule::new(0, 0, ["", "  "]);
        assert!(!rule.matches(&PortDescriptor::new("COM1", "Communications Port")));
    }

    #[test]
    fn test_tokens_are_case_insensitive() {
        let rule = DeviceMatchRule::new(0, 0, ["FT232"]);
        assert!(rule.matches(&PortDescriptor::new("COM2", "ft232r usb uart")));
    }

    #[test]
    fn test_serde_defaults() {
        let rule: DeviceMatchRule = serde_json::from_str(r#"{"vendor_id": 4292}"#).unwrap();
        assert_eq!(rule.vendor_id, 0x10C4);
        assert_eq!(rule.product_id, 0x7523);
        assert_eq!(rule.description_tokens.len(), DEFAULT_DESCRIPTION_TOKENS.len());
    }
}
