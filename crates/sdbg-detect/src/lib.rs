//! ServeDebug Port Detection Library
//!
//! This crate enumerates serial ports, tracks them appearing and disappearing
//! across periodic scans, and recognizes the ServeDebug debugger by USB
//! identifiers or description keywords.
//!
//! # Example
//!
//! ```rust,no_run
//! use sdbg_detect::{PortScanner, PortWatcher, WatchEvent};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let mut watcher = PortWatcher::new(tx);
//! watcher.scan(&PortScanner::new());
//!
//! while let Ok(event) = rx.try_recv() {
//!     if let WatchEvent::PortMatched { name, description } = event {
//!         println!("ServeDebug on {} ({})", name, description);
//!     }
//! }
//! ```

pub mod actor;
pub mod error;
pub mod events;
pub mod rule;
pub mod scanner;
pub mod usb_ids;
pub mod watcher;

pub use actor::{run_watcher_actor, WatcherCommand, WatcherHandle};
pub use error::DetectError;
pub use events::WatchEvent;
pub use rule::{DeviceMatchRule, MatchReason};
pub use scanner::{list_ports, PortDescriptor, PortEnumerator, PortScanner, ScannerConfig};
pub use watcher::{PortSnapshot, PortWatcher, ScanOutcome, ScanSummary, ScanTicket};
