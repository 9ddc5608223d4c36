//! Glue between the port watcher and the connection session
//!
//! The orchestrator reacts to watch events (auto-connect when the debugger
//! shows up, disconnect when the bound port disappears), relays session
//! traffic to an output sink and keeps the byte counters.

use std::io::Write;

use sdbg_detect::WatchEvent;
use sdbg_session::{ByteCounters, ConnectionSession, SessionError, SessionEvent};
use tracing::{debug, info, trace, warn};

use crate::settings::Settings;

/// Owns the session and applies the auto-connect policy
pub struct Orchestrator {
    session: ConnectionSession,
    counters: ByteCounters,
    baud_rate: u32,
    auto_connect: bool,
    matched: u64,
}

impl Orchestrator {
    pub fn new(session: ConnectionSession, settings: &Settings) -> Self {
        Self {
            session,
            counters: ByteCounters::default(),
            baud_rate: settings.baud_rate,
            auto_connect: settings.auto_connect,
            matched: 0,
        }
    }

    /// React to one watcher event
    pub fn handle_watch_event(&mut self, event: &WatchEvent) {
        match event {
            WatchEvent::ScanStarted => trace!("Scan started"),
            WatchEvent::ScanFinished => trace!("Scan finished"),
            WatchEvent::PortAppeared(port) => {
                info!("Port appeared: {}", port.label());
            }
            WatchEvent::PortMatched { name, description } => {
                self.matched += 1;
                info!("ServeDebug detected on {} ({})", name, description);
                if !self.auto_connect {
                    debug!("Auto-connect disabled, not connecting to {}", name);
                } else if self.session.is_connected() {
                    debug!(
                        "Already connected to {:?}, ignoring {}",
                        self.session.current_port(),
                        name
                    );
                } else if let Err(e) = self.session.connect(name, self.baud_rate) {
                    // The session already reported this as ErrorOccurred
                    debug!("Auto-connect to {} failed: {}", name, e);
                }
            }
            WatchEvent::PortRemoved(name) => {
                info!("Port removed: {}", name);
                if self.session.current_port() == Some(name.as_str()) {
                    info!("Connected port {} disappeared, disconnecting", name);
                    self.session.disconnect();
                }
            }
        }
    }

    /// React to one session event, writing received bytes to `out`
    pub fn handle_session_event(
        &mut self,
        event: &SessionEvent,
        out: &mut impl Write,
    ) -> std::io::Result<()> {
        self.counters.observe(event);
        match event {
            SessionEvent::Connected(port) => {
                debug!("Session bound to {}", port);
            }
            SessionEvent::Disconnected => {
                info!(
                    "Disconnected (sent {} bytes, received {} bytes)",
                    self.counters.bytes_sent, self.counters.bytes_received
                );
            }
            SessionEvent::DataReceived(data) => {
                out.write_all(data)?;
                out.flush()?;
            }
            SessionEvent::BytesWritten(n) => debug!("Wrote {} bytes", n),
            SessionEvent::ErrorOccurred(message) => warn!("Serial error: {}", message),
        }
        Ok(())
    }

    /// Send one line of user input, newline-terminated
    ///
    /// Partial writes are retried until the whole line is out or the
    /// transport stops accepting bytes.
    pub fn send_line(&mut self, line: &str) {
        let mut data = line.as_bytes().to_vec();
        data.push(b'\n');

        let mut remaining = data.as_slice();
        while !remaining.is_empty() {
            match self.session.send_data(remaining) {
                Ok(0) => {
                    warn!("Device accepted no data, dropping {} bytes", remaining.len());
                    break;
                }
                Ok(n) => remaining = &remaining[n..],
                Err(SessionError::NotConnected) => {
                    warn!("Not connected, input dropped");
                    break;
                }
                Err(e) => {
                    debug!("Send failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Drain pending bytes from the device
    pub fn poll(&mut self) {
        self.session.poll_read();
    }

    /// Connect to a port chosen by the user
    pub fn connect(&mut self, port_name: &str) -> Result<(), SessionError> {
        self.session.connect(port_name, self.baud_rate)
    }

    /// Tear down the connection
    pub fn shutdown(&mut self) {
        self.session.disconnect();
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn counters(&self) -> ByteCounters {
        self.counters
    }

    /// Number of `PortMatched` events seen
    pub fn matched(&self) -> u64 {
        self.matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdbg_detect::PortWatcher;
    use sdbg_session::{TransportError, TransportErrorKind};
    use sdbg_sim::{devices, DeviceBehavior, SimulatedBus};
    use tokio::sync::mpsc;

    struct Harness {
        bus: SimulatedBus,
        watcher: PortWatcher,
        watch_rx: mpsc::UnboundedReceiver<WatchEvent>,
        session_rx: mpsc::UnboundedReceiver<SessionEvent>,
        orchestrator: Orchestrator,
        output: Vec<u8>,
    }

    impl Harness {
        fn new(settings: Settings) -> Self {
            let bus = SimulatedBus::new();
            let (watch_tx, watch_rx) = mpsc::unbounded_channel();
            let (session_tx, session_rx) = mpsc::unbounded_channel();
            let watcher = PortWatcher::with_rule(settings.match_rule.clone(), watch_tx);
            let session = ConnectionSession::new(Box::new(bus.clone()), session_tx);
            Self {
                bus,
                watcher,
                watch_rx,
                session_rx,
                orchestrator: Orchestrator::new(session, &settings),
                output: Vec::new(),
            }
        }

        /// Scan once and feed every resulting event through the orchestrator
        fn tick(&mut self) {
            self.watcher.scan(&self.bus);
            self.pump();
        }

        fn pump(&mut self) {
            while let Ok(event) = self.watch_rx.try_recv() {
                self.orchestrator.handle_watch_event(&event);
            }
            while let Ok(event) = self.session_rx.try_recv() {
                self.orchestrator
                    .handle_session_event(&event, &mut self.output)
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_auto_connects_to_matched_port() {
        let mut h = Harness::new(Settings::default());
        h.bus.attach(devices::onboard_uart("COM1"), DeviceBehavior::Silent);
        h.bus.attach(devices::servedebug("COM3"), DeviceBehavior::Silent);
        h.tick();

        assert_eq!(h.orchestrator.session().current_port(), Some("COM3"));
        assert_eq!(h.orchestrator.matched(), 1);
        assert_eq!(h.bus.last_settings("COM3").map(|s| s.baud_rate), Some(115_200));
    }

    #[test]
    fn test_auto_connect_disabled() {
        let settings = Settings {
            auto_connect: false,
            ..Settings::default()
        };
        let mut h = Harness::new(settings);
        h.bus.attach(devices::servedebug("COM3"), DeviceBehavior::Silent);
        h.tick();

        assert_eq!(h.orchestrator.matched(), 1);
        assert!(!h.orchestrator.session().is_connected());
        assert_eq!(h.bus.total_opens(), 0);
    }

    #[test]
    fn test_keeps_first_connection() {
        let mut h = Harness::new(Settings::default());
        h.bus.attach(devices::servedebug("COM3"), DeviceBehavior::Silent);
        h.tick();
        h.bus.attach(devices::servedebug("COM7"), DeviceBehavior::Silent);
        h.tick();

        assert_eq!(h.orchestrator.matched(), 2);
        assert_eq!(h.orchestrator.session().current_port(), Some("COM3"));
        assert_eq!(h.bus.open_handles("COM7"), 0);
    }

    #[test]
    fn test_disconnects_when_bound_port_removed() {
        let mut h = Harness::new(Settings::default());
        h.bus.attach(devices::servedebug("COM3"), DeviceBehavior::Silent);
        h.bus.attach(devices::cp2102("COM5"), DeviceBehavior::Silent);
        h.tick();
        assert_eq!(h.orchestrator.session().current_port(), Some("COM3"));

        // Unrelated removal leaves the connection alone
        h.bus.detach("COM5");
        h.tick();
        assert!(h.orchestrator.session().is_connected());

        h.bus.detach("COM3");
        h.tick();
        assert!(!h.orchestrator.session().is_connected());
    }

    #[test]
    fn test_reconnects_after_replug() {
        let mut h = Harness::new(Settings::default());
        h.bus.attach(devices::servedebug("COM3"), DeviceBehavior::Silent);
        h.tick();
        h.bus.detach("COM3");
        h.tick();
        h.bus.attach(devices::servedebug("COM3"), DeviceBehavior::Silent);
        h.tick();

        assert_eq!(h.orchestrator.session().current_port(), Some("COM3"));
        assert_eq!(h.bus.total_opens(), 2);
        assert_eq!(h.bus.open_handles("COM3"), 1);
    }

    #[test]
    fn test_relays_traffic_and_counts_bytes() {
        let mut h = Harness::new(Settings::default());
        h.bus.attach(devices::servedebug("COM3"), DeviceBehavior::Loopback);
        h.tick();

        h.orchestrator.send_line("status");
        h.orchestrator.poll();
        h.pump();

        assert_eq!(h.output, b"status\n");
        assert_eq!(h.bus.take_written("COM3"), b"status\n");
        let counters = h.orchestrator.counters();
        assert_eq!(counters.bytes_sent, 7);
        assert_eq!(counters.bytes_received, 7);
    }

    #[test]
    fn test_send_line_retries_partial_writes() {
        let mut h = Harness::new(Settings::default());
        h.bus.attach(devices::servedebug("COM3"), DeviceBehavior::Silent);
        h.tick();
        h.bus.set_write_limit("COM3", Some(3));

        h.orchestrator.send_line("version");
        h.pump();

        assert_eq!(h.bus.take_written("COM3"), b"version\n");
        assert_eq!(h.orchestrator.counters().bytes_sent, 8);
    }

    #[test]
    fn test_send_line_while_disconnected_is_dropped() {
        let mut h = Harness::new(Settings::default());
        h.orchestrator.send_line("ignored");
        h.pump();
        assert_eq!(h.orchestrator.counters(), ByteCounters::default());
    }

    #[test]
    fn test_counters_reset_on_new_connection() {
        let mut h = Harness::new(Settings::default());
        h.bus.attach(devices::servedebug("COM3"), DeviceBehavior::Loopback);
        h.tick();
        h.orchestrator.send_line("abc");
        h.orchestrator.poll();
        h.pump();
        assert_eq!(h.orchestrator.counters().bytes_sent, 4);

        h.bus.inject_error(
            "COM3",
            TransportError::new(TransportErrorKind::ResourceUnavailable, "gone"),
        );
        h.orchestrator.poll();
        h.pump();
        assert!(!h.orchestrator.session().is_connected());

        // The port never left the snapshot, so reconnect by hand
        h.orchestrator.connect("COM3").unwrap();
        h.pump();
        assert_eq!(h.orchestrator.counters(), ByteCounters::default());
    }
}
