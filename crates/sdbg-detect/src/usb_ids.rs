//! USB Vendor/Product IDs for common USB-to-serial bridges
//!
//! The ServeDebug debugger ships on a WCH CH340, which is why that pair is
//! the default hardware identity in [`crate::DeviceMatchRule`]. The other
//! bridges are listed so descriptors can be labelled in logs.

/// USB Vendor ID / Product ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

/// WCH CH340/CH341
pub mod ch340 {
    use super::UsbId;

    pub const VID: u16 = 0x1A86;

    pub const CH340: UsbId = UsbId::new(VID, 0x7523);
    pub const CH341: UsbId = UsbId::new(VID, 0x5523);
}

/// Silicon Labs CP210x
pub mod cp210x {
    use super::UsbId;

    pub const VID: u16 = 0x10C4;

    pub const CP2102: UsbId = UsbId::new(VID, 0xEA60);
    pub const CP2105: UsbId = UsbId::new(VID, 0xEA70);
    pub const CP2108: UsbId = UsbId::new(VID, 0xEA71);
}

/// FTDI (Future Technology Devices International)
pub mod ftdi {
    use super::UsbId;

    pub const VID: u16 = 0x0403;

    pub const FT232R: UsbId = UsbId::new(VID, 0x6001);
    pub const FT2232: UsbId = UsbId::new(VID, 0x6010);
    pub const FT4232: UsbId = UsbId::new(VID, 0x6011);
    pub const FT232H: UsbId = UsbId::new(VID, 0x6014);
    pub const FT231X: UsbId = UsbId::new(VID, 0x6015);
}

/// Prolific PL2303
pub mod prolific {
    use super::UsbId;

    pub const VID: u16 = 0x067B;

    pub const PL2303: UsbId = UsbId::new(VID, 0x2303);
}

/// Get adapter family name from VID
pub fn adapter_name(vid: u16) -> Option<&'static str> {
    match vid {
        ch340::VID => Some("CH340"),
        cp210x::VID => Some("CP210x"),
        ftdi::VID => Some("FTDI"),
        prolific::VID => Some("PL2303"),
        _ => None,
    }
}
