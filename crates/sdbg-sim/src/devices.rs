//! Canned descriptors for typical serial devices

use sdbg_detect::usb_ids::{ch340, cp210x, ftdi};
use sdbg_detect::PortDescriptor;

/// ServeDebug debugger on its CH340 bridge
pub fn servedebug(name: &str) -> PortDescriptor {
    let mut port = PortDescriptor::new(name, "USB-SERIAL CH340")
        .with_usb_ids(ch340::CH340.vid, ch340::CH340.pid);
    port.manufacturer = Some("wch.cn".to_string());
    port
}

/// CP2102 bridge, recognized by description only
pub fn cp2102(name: &str) -> PortDescriptor {
    let mut port = PortDescriptor::new(name, "CP2102 USB to UART Bridge Controller")
        .with_usb_ids(cp210x::CP2102.vid, cp210x::CP2102.pid);
    port.manufacturer = Some("Silicon Labs".to_string());
    port
}

/// FTDI cable with a serial number
pub fn ft232(name: &str, serial: &str) -> PortDescriptor {
    let mut port =
        PortDescriptor::new(name, "FT232R").with_usb_ids(ftdi::FT232R.vid, ftdi::FT232R.pid);
    port.manufacturer = Some("FTDI".to_string());
    port.serial_number = Some(serial.to_string());
    port
}

/// Bluetooth modem that must never be classified as the debugger
pub fn bluetooth_modem(name: &str) -> PortDescriptor {
    PortDescriptor::new(name, "Bluetooth Modem").with_usb_ids(0x0A12, 0x0001)
}

/// Built-in UART with no USB identity
pub fn onboard_uart(name: &str) -> PortDescriptor {
    PortDescriptor::new(name, "Communications Port")
}
