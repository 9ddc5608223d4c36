//! Serial port enumeration
//!
//! This module turns the platform's port list into [`PortDescriptor`]s and
//! hides the platform call behind the [`PortEnumerator`] trait so the watcher
//! can be fed synthetic port lists.

use serialport::{available_ports, SerialPortType};
use tracing::{debug, info};

use crate::error::DetectError;
use crate::usb_ids;

/// Snapshot of one discoverable port at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub name: String,
    /// Vendor-supplied label; empty if the platform reports none
    pub description: String,
    /// USB Vendor ID (if USB)
    pub vendor_id: Option<u16>,
    /// USB Product ID (if USB)
    pub product_id: Option<u16>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
}

impl PortDescriptor {
    /// Create a descriptor with only a name and description
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            vendor_id: None,
            product_id: None,
            manufacturer: None,
            serial_number: None,
        }
    }

    /// Attach USB hardware identifiers
    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self.product_id = Some(product_id);
        self
    }

    /// Create from serialport crate's port info
    pub(crate) fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                name,
                description: usb
                    .product
                    .clone()
                    .or_else(|| usb.manufacturer.clone())
                    .unwrap_or_default(),
                vendor_id: Some(usb.vid),
                product_id: Some(usb.pid),
                manufacturer: usb.manufacturer.clone(),
                serial_number: usb.serial_number.clone(),
            },
            SerialPortType::BluetoothPort => Self::new(name, "Bluetooth"),
            SerialPortType::PciPort | SerialPortType::Unknown => Self::new(name, ""),
        }
    }

    /// Short label for logs: "COM3 - USB-SERIAL CH340 [CH340 1A86:7523]"
    pub fn label(&self) -> String {
        let mut label = if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.description)
        };
        if let (Some(vid), Some(pid)) = (self.vendor_id, self.product_id) {
            match usb_ids::adapter_name(vid) {
                Some(adapter) => label.push_str(&format!(" [{} {:04X}:{:04X}]", adapter, vid, pid)),
                None => label.push_str(&format!(" [{:04X}:{:04X}]", vid, pid)),
            }
        }
        label
    }
}

/// Source of port lists for the watcher
///
/// Implementations must be callable from the blocking thread pool, so they
/// are required to be `Send + Sync`.
pub trait PortEnumerator: Send + Sync {
    /// Enumerate the ports currently attached
    fn enumerate(&self) -> Result<Vec<PortDescriptor>, DetectError>;
}

/// Scanner configuration
#[derive(Debug, Clone, Default)]
pub struct ScannerConfig {
    /// Skip ports whose name contains any of these patterns
    pub skip_patterns: Vec<String>,
}

/// Enumerator backed by the operating system's serial port list
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Create a new scanner with default configuration
    pub fn new() -> Self {
        Self {
            config: ScannerConfig {
                skip_patterns: vec![
                    // Always-present pseudo port on macOS
                    "Bluetooth-Incoming-Port".to_string(),
                ],
            },
        }
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Check if a port should be skipped
    fn should_skip_port(&self, port: &PortDescriptor) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.name.contains(pattern.as_str()))
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PortEnumerator for PortScanner {
    fn enumerate(&self) -> Result<Vec<PortDescriptor>, DetectError> {
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

        let result: Vec<_> = ports
            .into_iter()
            .map(|p| PortDescriptor::from_serialport(p.port_name, &p.port_type))
            .filter(|p| !self.should_skip_port(p))
            .collect();

        debug!("Enumerated {} serial port(s)", result.len());
        Ok(result)
    }
}

/// List the ports currently attached, logging each one
///
/// Unlike the watcher this does not diff against anything; it is the manual
/// "refresh" view of the port list.
pub fn list_ports(enumerator: &dyn PortEnumerator) -> Result<Vec<PortDescriptor>, DetectError> {
    info!("Enumerating serial ports...");
    let ports = enumerator.enumerate()?;

    if ports.is_empty() {
        info!("No serial ports found");
    } else {
        info!("Found {} serial port(s)", ports.len());
        for port in &ports {
            info!("  {}", port.label());
        }
    }

    Ok(ports)
}
