//! ServeDebug Simulation Library
//!
//! This crate provides a simulated serial bus for exercising port detection
//! and connection sessions without physical hardware:
//!
//! - **SimulatedBus**: virtual ports that can be plugged, unplugged, fed
//!   inbound bytes and made to fail
//! - **devices**: canned descriptors (ServeDebug CH340, CP2102, Bluetooth modem, ...)
//!
//! # Example
//!
//! ```rust
//! use sdbg_sim::{devices, DeviceBehavior, SimulatedBus};
//! use sdbg_detect::PortEnumerator;
//!
//! let bus = SimulatedBus::new();
//! bus.attach(devices::servedebug("COM3"), DeviceBehavior::Loopback);
//!
//! let ports = bus.enumerate().unwrap();
//! assert_eq!(ports[0].name, "COM3");
//! ```

pub mod bus;
pub mod devices;

pub use bus::{DeviceBehavior, SimulatedBus};
