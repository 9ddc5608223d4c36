//! Serial transport abstraction
//!
//! [`ConnectionSession`](crate::ConnectionSession) talks to the port only
//! through [`TransportOpener`] and [`Transport`], so the session can be
//! exercised against an in-memory bus. [`SerialOpener`] is the real
//! implementation on top of the `serialport` crate.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::TransportError;

/// Default baud rate for the ServeDebug debugger
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Line settings for an open port
///
/// Framing is fixed at 8 data bits, no parity, 1 stop bit, no flow control;
/// only the baud rate varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl LinkSettings {
    /// 8N1, no flow control, at the given baud rate
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

/// An open, exclusively owned serial handle
///
/// Dropping the transport closes the underlying port.
pub trait Transport: Send {
    /// Read whatever is available without blocking
    ///
    /// Returns `Ok(0)` when nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write bytes, returning how many the transport accepted
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;
}

/// Opens transports by port name
pub trait TransportOpener: Send {
    /// Open the named port with the given settings
    fn open(
        &mut self,
        port_name: &str,
        settings: &LinkSettings,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Transport over an OS serial port
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        // Querying the input queue surfaces unplug errors even when idle
        let available = self
            .port
            .bytes_to_read()
            .map_err(|e| TransportError::from(e).on_open_handle())? as usize;
        if available == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = available.min(buf.len());
        match self.port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TransportError::from(e).on_open_handle()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let written = self
            .port
            .write(data)
            .map_err(|e| TransportError::from(e).on_open_handle())?;
        self.port
            .flush()
            .map_err(|e| TransportError::from(e).on_open_handle())?;
        Ok(written)
    }
}

/// Opener for OS serial ports
#[derive(Debug, Clone)]
pub struct SerialOpener {
    timeout: Duration,
}

impl SerialOpener {
    /// Create an opener with a short I/O timeout
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_millis(100),
        }
    }
}

impl Default for SerialOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportOpener for SerialOpener {
    fn open(
        &mut self,
        port_name: &str,
        settings: &LinkSettings,
    ) -> Result<Box<dyn Transport>, TransportError> {
        debug!("Opening {} at {} baud", port_name, settings.baud_rate);
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(self.timeout)
            .open()?;

        Ok(Box::new(SerialTransport { port }))
    }
}
