//! ServeDebug Connection Session
//!
//! This crate manages the single serial connection to the debugger:
//! connecting (with implicit teardown of any previous connection),
//! disconnecting, sending and receiving bytes, and turning transport errors
//! into lifecycle events.
//!
//! Errors fall into two classes. Fatal ones (device not found, permission
//! denied, resource unavailable) are reported and then force a disconnect;
//! everything else is reported and the connection stays up. A consumer can
//! therefore treat a `Disconnected` event as the signal that the port became
//! unusable.
//!
//! # Example
//!
//! ```rust,no_run
//! use sdbg_session::{ConnectionSession, SerialOpener, SessionEvent, DEFAULT_BAUD_RATE};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let mut session = ConnectionSession::new(Box::new(SerialOpener::new()), tx);
//!
//! if session.connect("/dev/ttyUSB0", DEFAULT_BAUD_RATE).is_ok() {
//!     session.send_data(b"hello\n").ok();
//!     session.poll_read();
//! }
//!
//! while let Ok(event) = rx.try_recv() {
//!     println!("{:?}", event);
//! }
//! ```

pub mod counters;
pub mod error;
pub mod events;
pub mod session;
pub mod transport;

pub use counters::ByteCounters;
pub use error::{SessionError, TransportError, TransportErrorKind};
pub use events::SessionEvent;
pub use session::{ConnectionSession, ConnectionState};
pub use transport::{
    LinkSettings, SerialOpener, SerialTransport, Transport, TransportOpener, DEFAULT_BAUD_RATE,
};
