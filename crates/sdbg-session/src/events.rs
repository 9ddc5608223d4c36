//! Session lifecycle and traffic events

/// Events emitted by [`ConnectionSession`](crate::ConnectionSession)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The port was opened
    Connected(String),

    /// The session is disconnected (fired on every `disconnect`, even a redundant one)
    Disconnected,

    /// Bytes arrived from the device; one delivery per read, not per message
    DataReceived(Vec<u8>),

    /// The transport accepted this many bytes
    BytesWritten(usize),

    /// The transport or an open attempt reported an error
    ErrorOccurred(String),
}
