//! Scripted hotplug scenario for `--simulate`
//!
//! Plugs an onboard UART and a ServeDebug loopback device into a
//! [`SimulatedBus`], has the device greet the host, then unplugs and replugs
//! it so the whole detect/connect/disconnect cycle can be watched without
//! hardware.

use std::time::Duration;

use sdbg_session::{TransportError, TransportErrorKind};
use sdbg_sim::{devices, DeviceBehavior, SimulatedBus};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::info;

/// Port the simulated debugger appears on
pub const DEBUGGER_PORT: &str = "/dev/ttySIM3";

/// Bus pre-populated with ports that exist before the first scan
pub fn initial_bus() -> SimulatedBus {
    let bus = SimulatedBus::new();
    bus.attach(devices::onboard_uart("/dev/ttySIM0"), DeviceBehavior::Silent);
    bus.attach(devices::bluetooth_modem("/dev/ttySIM1"), DeviceBehavior::Silent);
    bus
}

/// Run the hotplug script in the background
pub fn spawn_scenario(bus: SimulatedBus) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(Duration::from_secs(2)).await;
        info!("[sim] plugging in ServeDebug");
        bus.attach(devices::servedebug(DEBUGGER_PORT), DeviceBehavior::Loopback);

        sleep(Duration::from_secs(3)).await;
        bus.push_inbound(DEBUGGER_PORT, b"ServeDebug ready\r\n");

        sleep(Duration::from_secs(10)).await;
        info!("[sim] line noise");
        bus.inject_error(
            DEBUGGER_PORT,
            TransportError::new(TransportErrorKind::Framing, "Framing error"),
        );

        sleep(Duration::from_secs(5)).await;
        info!("[sim] unplugging ServeDebug");
        bus.detach(DEBUGGER_PORT);

        sleep(Duration::from_secs(5)).await;
        info!("[sim] plugging ServeDebug back in");
        bus.attach(devices::servedebug(DEBUGGER_PORT), DeviceBehavior::Loopback);
        bus.push_inbound(DEBUGGER_PORT, b"ServeDebug ready\r\n");
    })
}
