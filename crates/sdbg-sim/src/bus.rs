//! In-memory serial bus
//!
//! A [`SimulatedBus`] is a set of virtual ports that can be plugged and
//! unplugged at will. It is both a [`PortEnumerator`] (for the watcher) and a
//! [`TransportOpener`] (for the session), so one bus drives a full hotplug
//! scenario.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use sdbg_detect::{DetectError, PortDescriptor, PortEnumerator};
use sdbg_session::{LinkSettings, Transport, TransportError, TransportErrorKind, TransportOpener};
use tracing::{debug, info};

/// How a virtual device answers writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceBehavior {
    /// Swallows writes
    Silent,
    /// Writes come back as inbound data
    Loopback,
}

#[derive(Debug)]
struct VirtualPort {
    /// Bumped on every plug-in; handles from an earlier plug-in are dead
    generation: u64,
    descriptor: PortDescriptor,
    behavior: DeviceBehavior,
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    pending_error: Option<TransportError>,
    open_handles: usize,
    last_settings: Option<LinkSettings>,
    /// Cap on bytes accepted per write (simulates a full output buffer)
    write_limit: Option<usize>,
}

#[derive(Debug, Default)]
struct BusState {
    ports: BTreeMap<String, VirtualPort>,
    enumeration_error: Option<String>,
    total_opens: usize,
    generations: u64,
}

/// A pluggable set of virtual serial ports
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        // A panic while holding the lock only happens in a failing test
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Plug in a device
    ///
    /// Attaching a name that is already present only updates its descriptor
    /// and behavior; open handles stay valid.
    pub fn attach(&self, descriptor: PortDescriptor, behavior: DeviceBehavior) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(port) = state.ports.get_mut(&descriptor.name) {
            port.descriptor = descriptor;
            port.behavior = behavior;
            return;
        }

        info!("[sim] attach {}", descriptor.label());
        state.generations += 1;
        state.ports.insert(
            descriptor.name.clone(),
            VirtualPort {
                generation: state.generations,
                descriptor,
                behavior,
                inbound: VecDeque::new(),
                written: Vec::new(),
                pending_error: None,
                open_handles: 0,
                last_settings: None,
                write_limit: None,
            },
        );
    }

    /// Unplug a device; open handles start failing with a fatal error
    pub fn detach(&self, name: &str) -> bool {
        let removed = self.lock().ports.remove(name).is_some();
        if removed {
            info!("[sim] detach {}", name);
        }
        removed
    }

    /// Make the next enumerations fail (or succeed again with `None`)
    pub fn set_enumeration_error(&self, error: Option<&str>) {
        self.lock().enumeration_error = error.map(str::to_string);
    }

    /// Queue bytes from the device towards the host
    pub fn push_inbound(&self, name: &str, data: &[u8]) -> bool {
        match self.lock().ports.get_mut(name) {
            Some(port) => {
                port.inbound.extend(data);
                true
            }
            None => false,
        }
    }

    /// Take everything the host wrote to the device so far
    pub fn take_written(&self, name: &str) -> Vec<u8> {
        self.lock()
            .ports
            .get_mut(name)
            .map(|p| std::mem::take(&mut p.written))
            .unwrap_or_default()
    }

    /// Make the next read or write on this port fail with `error`
    pub fn inject_error(&self, name: &str, error: TransportError) -> bool {
        match self.lock().ports.get_mut(name) {
            Some(port) => {
                port.pending_error = Some(error);
                true
            }
            None => false,
        }
    }

    /// Limit how many bytes a single write accepts
    pub fn set_write_limit(&self, name: &str, limit: Option<usize>) {
        if let Some(port) = self.lock().ports.get_mut(name) {
            port.write_limit = limit;
        }
    }

    /// Number of live handles on a port
    pub fn open_handles(&self, name: &str) -> usize {
        self.lock()
            .ports
            .get(name)
            .map(|p| p.open_handles)
            .unwrap_or(0)
    }

    /// Settings used by the most recent open of a port
    pub fn last_settings(&self, name: &str) -> Option<LinkSettings> {
        self.lock().ports.get(name).and_then(|p| p.last_settings)
    }

    /// Number of successful opens across all ports
    pub fn total_opens(&self) -> usize {
        self.lock().total_opens
    }

    /// Names of attached ports
    pub fn port_names(&self) -> Vec<String> {
        self.lock().ports.keys().cloned().collect()
    }
}

impl PortEnumerator for SimulatedBus {
    fn enumerate(&self) -> Result<Vec<PortDescriptor>, DetectError> {
        let state = self.lock();
        if let Some(error) = &state.enumeration_error {
            return Err(DetectError::EnumerationFailed(error.clone()));
        }
        Ok(state.ports.values().map(|p| p.descriptor.clone()).collect())
    }
}

impl TransportOpener for SimulatedBus {
    fn open(
        &mut self,
        port_name: &str,
        settings: &LinkSettings,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let port = state.ports.get_mut(port_name).ok_or_else(|| {
            TransportError::new(TransportErrorKind::DeviceNotFound, "No such device")
        })?;

        if port.open_handles > 0 {
            return Err(TransportError::new(
                TransportErrorKind::Busy,
                "Device or resource busy",
            ));
        }

        port.open_handles += 1;
        port.last_settings = Some(*settings);
        state.total_opens += 1;
        debug!("[sim] opened {} at {} baud", port_name, settings.baud_rate);

        Ok(Box::new(SimTransport {
            bus: self.clone(),
            name: port_name.to_string(),
            generation: port.generation,
        }))
    }
}

/// Handle on a virtual port
struct SimTransport {
    bus: SimulatedBus,
    name: String,
    generation: u64,
}

impl SimTransport {
    fn port<'a>(&self, state: &'a mut BusState) -> Result<&'a mut VirtualPort, TransportError> {
        state
            .ports
            .get_mut(&self.name)
            .filter(|p| p.generation == self.generation)
            .ok_or_else(unplugged)
    }
}

fn unplugged() -> TransportError {
    TransportError::new(
        TransportErrorKind::ResourceUnavailable,
        "The device was unexpectedly removed",
    )
}

impl Transport for SimTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.bus.lock();
        let port = self.port(&mut state)?;
        if let Some(error) = port.pending_error.take() {
            return Err(error);
        }

        let n = port.inbound.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(port.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.bus.lock();
        let port = self.port(&mut state)?;
        if let Some(error) = port.pending_error.take() {
            return Err(error);
        }

        let n = port.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        let accepted = &data[..n];
        port.written.extend_from_slice(accepted);
        if port.behavior == DeviceBehavior::Loopback {
            port.inbound.extend(accepted);
        }
        Ok(n)
    }
}

impl Drop for SimTransport {
    fn drop(&mut self) {
        let mut state = self.bus.lock();
        if let Ok(port) = self.port(&mut state) {
            port.open_handles = port.open_handles.saturating_sub(1);
        }
    }
}
