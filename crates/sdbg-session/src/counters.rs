//! Traffic counters folded from session events

use crate::events::SessionEvent;

/// Bytes sent and received on the current connection
///
/// Both counters reset to zero when a `Connected` event is observed and only
/// grow otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounters {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl ByteCounters {
    /// Update the counters from one session event
    pub fn observe(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Connected(_) => self.reset(),
            SessionEvent::BytesWritten(n) => {
                self.bytes_sent = self.bytes_sent.saturating_add(*n as u64);
            }
            SessionEvent::DataReceived(data) => {
                self.bytes_received = self.bytes_received.saturating_add(data.len() as u64);
            }
            SessionEvent::Disconnected | SessionEvent::ErrorOccurred(_) => {}
        }
    }

    /// Zero both counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
