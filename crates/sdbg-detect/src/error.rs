//! Error types for port detection

use thiserror::Error;

/// Errors that can occur during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// Scan interval must be a positive number of milliseconds
    #[error("invalid scan interval: {0}ms (must be greater than zero)")]
    InvalidInterval(u64),

    /// The watcher actor has shut down
    #[error("port watcher is no longer running")]
    WatcherGone,
}
