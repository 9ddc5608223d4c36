//! Connection lifecycle state machine
//!
//! A [`ConnectionSession`] owns at most one open transport. All transitions
//! go through `connect`/`disconnect` here, so callers never have to check
//! "was I already connected" themselves.

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{SessionError, TransportError};
use crate::events::SessionEvent;
use crate::transport::{LinkSettings, Transport, TransportOpener};

const READ_CHUNK: usize = 4096;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { port_name: String, baud_rate: u32 },
    Connected { port_name: String, baud_rate: u32 },
}

/// The single serial connection to the debugger
pub struct ConnectionSession {
    opener: Box<dyn TransportOpener>,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    events: mpsc::UnboundedSender<SessionEvent>,
    buffer: Vec<u8>,
}

impl ConnectionSession {
    /// Create a disconnected session
    pub fn new(
        opener: Box<dyn TransportOpener>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            opener,
            transport: None,
            state: ConnectionState::Disconnected,
            events,
            buffer: vec![0u8; READ_CHUNK],
        }
    }

    /// Open `port_name`, tearing down any existing connection first
    ///
    /// On failure the session stays disconnected and an `ErrorOccurred` event
    /// is the only event fired for the attempt.
    pub fn connect(&mut self, port_name: &str, baud_rate: u32) -> Result<(), SessionError> {
        if self.state != ConnectionState::Disconnected {
            debug!(
                "Already bound to {:?}, disconnecting before connecting to {}",
                self.current_port(),
                port_name
            );
            self.disconnect();
        }

        self.state = ConnectionState::Connecting {
            port_name: port_name.to_string(),
            baud_rate,
        };

        match self.opener.open(port_name, &LinkSettings::new(baud_rate)) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state = ConnectionState::Connected {
                    port_name: port_name.to_string(),
                    baud_rate,
                };
                info!("Connected to {} at {} baud", port_name, baud_rate);
                self.emit(SessionEvent::Connected(port_name.to_string()));
                Ok(())
            }
            Err(source) => {
                self.state = ConnectionState::Disconnected;
                let err = SessionError::OpenFailed {
                    port: port_name.to_string(),
                    source,
                };
                warn!("{}", err);
                self.emit(SessionEvent::ErrorOccurred(err.to_string()));
                Err(err)
            }
        }
    }

    /// Close the port (if open) and fire `Disconnected`
    ///
    /// Always succeeds and always fires the event, even when already
    /// disconnected.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            drop(transport);
            info!("Serial port closed");
        }
        self.state = ConnectionState::Disconnected;
        self.emit(SessionEvent::Disconnected);
    }

    /// Write bytes to the device
    ///
    /// Returns `SessionError::NotConnected` without firing anything when no
    /// port is open. The returned count may be less than `data.len()`.
    pub fn send_data(&mut self, data: &[u8]) -> Result<usize, SessionError> {
        let transport = match (&self.state, self.transport.as_mut()) {
            (ConnectionState::Connected { .. }, Some(transport)) => transport,
            _ => return Err(SessionError::NotConnected),
        };
        if data.is_empty() {
            return Ok(0);
        }

        match transport.write(data) {
            Ok(written) => {
                trace!("Wrote {} of {} bytes", written, data.len());
                if written > 0 {
                    self.emit(SessionEvent::BytesWritten(written));
                }
                Ok(written)
            }
            Err(e) => {
                self.handle_error(e.clone());
                Err(SessionError::Transport(e))
            }
        }
    }

    /// Drain pending inbound bytes and deliver them as one `DataReceived`
    ///
    /// Returns the number of bytes delivered. Read errors go through the same
    /// escalation as [`report_error`](Self::report_error).
    pub fn poll_read(&mut self) -> usize {
        let Some(transport) = self.transport.as_mut() else {
            return 0;
        };

        let mut received = Vec::new();
        let mut failure = None;
        loop {
            match transport.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => {
                    received.extend_from_slice(&self.buffer[..n]);
                    if n < self.buffer.len() {
                        break;
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let count = received.len();
        if count > 0 {
            trace!("Read {} bytes: {:02X?}", count, received);
            self.emit(SessionEvent::DataReceived(received));
        }
        if let Some(e) = failure {
            self.handle_error(e);
        }
        count
    }

    /// Feed an error reported by the transport outside a read or write
    ///
    /// Ignored while disconnected.
    pub fn report_error(&mut self, error: TransportError) {
        if self.state == ConnectionState::Disconnected {
            debug!("Ignoring transport error while disconnected: {}", error);
            return;
        }
        self.handle_error(error);
    }

    fn handle_error(&mut self, error: TransportError) {
        warn!("Serial error ({}): {}", error.kind, error.message);
        self.emit(SessionEvent::ErrorOccurred(error.message.clone()));

        if error.is_fatal() {
            warn!("Fatal serial error, disconnecting");
            self.disconnect();
        }
    }

    /// Check if a port is open
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected { .. })
    }

    /// Port the session is bound to, if any
    pub fn current_port(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting { port_name, .. }
            | ConnectionState::Connected { port_name, .. } => Some(port_name),
        }
    }

    /// Baud rate of the bound port, if any
    pub fn baud_rate(&self) -> Option<u32> {
        match &self.state {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting { baud_rate, .. }
            | ConnectionState::Connected { baud_rate, .. } => Some(*baud_rate),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
