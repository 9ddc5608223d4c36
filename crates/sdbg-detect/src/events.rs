//! Events emitted by the port watcher

use crate::scanner::PortDescriptor;

/// Hotplug and classification events
///
/// For a single port name, `PortAppeared` is always delivered before the
/// matching `PortMatched`. Ordering between different port names within one
/// scan follows enumeration order and must not be relied upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A scan cycle began
    ScanStarted,

    /// A port name was seen that was absent from the previous snapshot
    PortAppeared(PortDescriptor),

    /// A newly appeared port satisfies the active match rule
    PortMatched {
        /// Port name
        name: String,
        /// Port description
        description: String,
    },

    /// A port name from the previous snapshot is gone
    PortRemoved(String),

    /// A scan cycle ended
    ScanFinished,
}
