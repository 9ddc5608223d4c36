//! Hotplug tracking by snapshot diffing
//!
//! [`PortWatcher`] keeps the set of port names seen at the last scan and
//! turns each new enumeration into appear/match/remove events. It owns no
//! timer: whoever drives it (the actor in [`crate::actor`], or a test) calls
//! [`PortWatcher::scan`] or the two-phase [`PortWatcher::begin_scan`] /
//! [`PortWatcher::complete_scan`] pair on each tick.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::DetectError;
use crate::events::WatchEvent;
use crate::rule::DeviceMatchRule;
use crate::scanner::{PortDescriptor, PortEnumerator};

/// Port names observed at one enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSnapshot {
    names: BTreeSet<String>,
}

impl PortSnapshot {
    /// Check if a port name is in the snapshot
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of ports in the snapshot
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over port names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Proof that a scan was started; consumed by [`PortWatcher::complete_scan`]
#[derive(Debug)]
#[must_use = "a begun scan blocks further scans until it is completed"]
pub struct ScanTicket {
    _private: (),
}

/// Counts from one completed scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub appeared: usize,
    pub matched: usize,
    pub removed: usize,
}

/// Result of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Another scan was still in progress; nothing happened
    Skipped,
    /// The scan ran to completion
    Completed(ScanSummary),
}

/// Serial port hotplug watcher
pub struct PortWatcher {
    rule: DeviceMatchRule,
    snapshot: PortSnapshot,
    scanning: bool,
    interval: Option<Duration>,
    events: mpsc::UnboundedSender<WatchEvent>,
}

impl PortWatcher {
    /// Create a watcher with the default ServeDebug match rule
    pub fn new(events: mpsc::UnboundedSender<WatchEvent>) -> Self {
        Self::with_rule(DeviceMatchRule::default(), events)
    }

    /// Create a watcher with a custom match rule
    pub fn with_rule(rule: DeviceMatchRule, events: mpsc::UnboundedSender<WatchEvent>) -> Self {
        Self {
            rule,
            snapshot: PortSnapshot::default(),
            scanning: false,
            interval: None,
            events,
        }
    }

    /// Begin periodic scanning at the given interval
    ///
    /// Calling this while running replaces the interval.
    pub fn start(&mut self, interval_ms: u64) -> Result<(), DetectError> {
        if interval_ms == 0 {
            return Err(DetectError::InvalidInterval(interval_ms));
        }
        self.interval = Some(Duration::from_millis(interval_ms));
        info!("Port detection started, interval {}ms", interval_ms);
        Ok(())
    }

    /// Halt periodic scanning
    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            info!("Port detection stopped");
        }
    }

    /// Check if periodic scanning is active
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Current scan interval, if running
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Replace the classification rule; applies from the next scan
    pub fn configure_match_rule(&mut self, rule: DeviceMatchRule) {
        debug!("Match rule updated: {:?}", rule);
        self.rule = rule;
    }

    /// Port names seen at the last completed scan
    pub fn snapshot(&self) -> &PortSnapshot {
        &self.snapshot
    }

    /// Check if a scan has begun but not completed
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Start a scan cycle
    ///
    /// Returns `None` without emitting anything if a scan is already in
    /// progress.
    pub fn begin_scan(&mut self) -> Option<ScanTicket> {
        if self.scanning {
            debug!("Scan already in progress, skipping tick");
            return None;
        }
        self.scanning = true;
        self.emit(WatchEvent::ScanStarted);
        Some(ScanTicket { _private: () })
    }

    /// Finish a scan cycle with the enumeration result
    ///
    /// An enumeration failure counts as an empty port list, so every known
    /// port is reported removed for this cycle.
    pub fn complete_scan(
        &mut self,
        ticket: ScanTicket,
        enumerated: Result<Vec<PortDescriptor>, DetectError>,
    ) -> ScanSummary {
        let ScanTicket { _private: () } = ticket;

        let ports = enumerated.unwrap_or_else(|e| {
            warn!("{}; treating as no ports", e);
            Vec::new()
        });

        let mut summary = ScanSummary::default();
        let mut next = PortSnapshot::default();

        for port in ports {
            if !next.names.insert(port.name.clone()) {
                continue;
            }
            if self.snapshot.contains(&port.name) {
                continue;
            }

            info!("New port: {}", port.label());
            summary.appeared += 1;
            let matched = self.rule.classify(&port);
            let name = port.name.clone();
            let description = port.description.clone();
            self.emit(WatchEvent::PortAppeared(port));

            if let Some(reason) = matched {
                info!("Recognized ServeDebug device on {} ({:?})", name, reason);
                summary.matched += 1;
                self.emit(WatchEvent::PortMatched { name, description });
            }
        }

        let removed: Vec<String> = self
            .snapshot
            .names
            .difference(&next.names)
            .cloned()
            .collect();
        for name in removed {
            info!("Port removed: {}", name);
            summary.removed += 1;
            self.emit(WatchEvent::PortRemoved(name));
        }

        self.snapshot = next;
        self.scanning = false;
        self.emit(WatchEvent::ScanFinished);
        summary
    }

    /// Run one full scan cycle synchronously
    pub fn scan(&mut self, enumerator: &dyn PortEnumerator) -> ScanOutcome {
        match self.begin_scan() {
            Some(ticket) => {
                let result = enumerator.enumerate();
                ScanOutcome::Completed(self.complete_scan(ticket, result))
            }
            None => ScanOutcome::Skipped,
        }
    }

    fn emit(&self, event: WatchEvent) {
        let _ = self.events.send(event);
    }
}
