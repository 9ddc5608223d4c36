//! Port watcher actor
//!
//! Drives a [`PortWatcher`] from a tokio interval. Enumeration runs on the
//! blocking pool because the platform call can take longer than the scan
//! interval; ticks that fire while it is in flight hit the watcher's
//! re-entrancy guard and are skipped. Diffing and event emission stay on the
//! actor task.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sdbg_detect::{PortScanner, PortWatcher, WatcherHandle};
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), sdbg_detect::DetectError> {
//! let (event_tx, mut event_rx) = mpsc::unbounded_channel();
//! let watcher = PortWatcher::new(event_tx);
//! let (handle, _task) = WatcherHandle::spawn(watcher, Arc::new(PortScanner::new()));
//!
//! handle.start(1500).await?;
//! while let Some(event) = event_rx.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

use std::future::pending;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::DetectError;
use crate::rule::DeviceMatchRule;
use crate::scanner::{PortDescriptor, PortEnumerator};
use crate::watcher::{PortWatcher, ScanTicket};

type Enumeration = Result<Vec<PortDescriptor>, DetectError>;

/// Commands sent to the watcher actor
#[derive(Debug)]
pub enum WatcherCommand {
    /// Begin (or re-time) periodic scanning
    Start {
        interval_ms: u64,
        response: oneshot::Sender<Result<(), DetectError>>,
    },
    /// Halt periodic scanning
    Stop,
    /// Replace the classification rule
    ConfigureRule(DeviceMatchRule),
    /// Query whether periodic scanning is active
    IsRunning(oneshot::Sender<bool>),
    /// Run a scan now, outside the timer (skipped if one is in flight)
    ScanNow,
    /// Shutdown the actor
    Shutdown,
}

/// Scan started on the blocking pool, awaiting its result
struct InFlight {
    ticket: ScanTicket,
    task: JoinHandle<Enumeration>,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn next_enumeration(in_flight: &mut Option<InFlight>) -> Enumeration {
    match in_flight {
        Some(scan) => match (&mut scan.task).await {
            Ok(result) => result,
            Err(e) => Err(DetectError::EnumerationFailed(e.to_string())),
        },
        None => pending().await,
    }
}

fn make_ticker(watcher: &PortWatcher) -> Option<Interval> {
    watcher.interval().map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    })
}

fn launch_scan(
    watcher: &mut PortWatcher,
    enumerator: &Arc<dyn PortEnumerator>,
    in_flight: &mut Option<InFlight>,
) {
    let Some(ticket) = watcher.begin_scan() else {
        return;
    };
    let enumerator = Arc::clone(enumerator);
    let task = tokio::task::spawn_blocking(move || enumerator.enumerate());
    *in_flight = Some(InFlight { ticket, task });
}

/// Run the watcher actor until shutdown or until all handles are dropped
pub async fn run_watcher_actor(
    mut watcher: PortWatcher,
    enumerator: Arc<dyn PortEnumerator>,
    mut cmd_rx: mpsc::Receiver<WatcherCommand>,
) {
    info!("Port watcher actor started");
    let mut ticker = make_ticker(&watcher);
    let mut in_flight: Option<InFlight> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    WatcherCommand::Start { interval_ms, response } => {
                        let result = watcher.start(interval_ms);
                        if result.is_ok() {
                            ticker = make_ticker(&watcher);
                        }
                        let _ = response.send(result);
                    }
                    WatcherCommand::Stop => {
                        watcher.stop();
                        ticker = None;
                    }
                    WatcherCommand::ConfigureRule(rule) => {
                        watcher.configure_match_rule(rule);
                    }
                    WatcherCommand::IsRunning(response) => {
                        let _ = response.send(watcher.is_running());
                    }
                    WatcherCommand::ScanNow => {
                        launch_scan(&mut watcher, &enumerator, &mut in_flight);
                    }
                    WatcherCommand::Shutdown => {
                        info!("Port watcher shutting down");
                        break;
                    }
                }
            }

            _ = next_tick(&mut ticker) => {
                launch_scan(&mut watcher, &enumerator, &mut in_flight);
            }

            result = next_enumeration(&mut in_flight) => {
                if let Some(scan) = in_flight.take() {
                    let summary = watcher.complete_scan(scan.ticket, result);
                    debug!(
                        "Scan complete: {} appeared, {} matched, {} removed",
                        summary.appeared, summary.matched, summary.removed
                    );
                }
            }
        }
    }

    info!("Port watcher actor stopped");
}

/// Client side of the watcher actor
#[derive(Clone)]
pub struct WatcherHandle {
    cmd_tx: mpsc::Sender<WatcherCommand>,
}

impl WatcherHandle {
    /// Spawn the actor on the current tokio runtime
    pub fn spawn(
        watcher: PortWatcher,
        enumerator: Arc<dyn PortEnumerator>,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let task = tokio::spawn(run_watcher_actor(watcher, enumerator, cmd_rx));
        (Self { cmd_tx }, task)
    }

    async fn send(&self, cmd: WatcherCommand) -> Result<(), DetectError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| DetectError::WatcherGone)
    }

    /// Begin periodic scanning; an interval of zero is rejected
    pub async fn start(&self, interval_ms: u64) -> Result<(), DetectError> {
        let (response, rx) = oneshot::channel();
        self.send(WatcherCommand::Start {
            interval_ms,
            response,
        })
        .await?;
        rx.await.map_err(|_| DetectError::WatcherGone)?
    }

    /// Halt periodic scanning
    pub async fn stop(&self) -> Result<(), DetectError> {
        self.send(WatcherCommand::Stop).await
    }

    /// Check if periodic scanning is active
    pub async fn is_running(&self) -> Result<bool, DetectError> {
        let (response, rx) = oneshot::channel();
        self.send(WatcherCommand::IsRunning(response)).await?;
        rx.await.map_err(|_| DetectError::WatcherGone)
    }

    /// Replace the classification rule
    pub async fn configure_match_rule(&self, rule: DeviceMatchRule) -> Result<(), DetectError> {
        self.send(WatcherCommand::ConfigureRule(rule)).await
    }

    /// Trigger an immediate scan
    pub async fn scan_now(&self) -> Result<(), DetectError> {
        self.send(WatcherCommand::ScanNow).await
    }

    /// Stop the actor
    pub async fn shutdown(&self) -> Result<(), DetectError> {
        self.send(WatcherCommand::Shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WatchEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    struct SharedPorts(Mutex<Vec<PortDescriptor>>);

    impl PortEnumerator for SharedPorts {
        fn enumerate(&self) -> Result<Vec<PortDescriptor>, DetectError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<WatchEvent>) -> WatchEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_start_rejects_zero_interval() {
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let ports = Arc::new(SharedPorts(Mutex::new(Vec::new())));
        let (handle, task) = WatcherHandle::spawn(PortWatcher::new(event_tx), ports);

        assert!(matches!(
            handle.start(0).await,
            Err(DetectError::InvalidInterval(0))
        ));
        assert!(!handle.is_running().await.unwrap());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_periodic_scan_reports_hotplug() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let ports = Arc::new(SharedPorts(Mutex::new(vec![PortDescriptor::new(
            "COM3",
            "USB-SERIAL CH340",
        )])));
        let (handle, task) = WatcherHandle::spawn(PortWatcher::new(event_tx), ports.clone());

        handle.start(10).await.unwrap();
        assert!(handle.is_running().await.unwrap());

        assert_eq!(next_event(&mut event_rx).await, WatchEvent::ScanStarted);
        assert!(matches!(
            next_event(&mut event_rx).await,
            WatchEvent::PortAppeared(p) if p.name == "COM3"
        ));
        assert!(matches!(
            next_event(&mut event_rx).await,
            WatchEvent::PortMatched { name, .. } if name == "COM3"
        ));
        assert_eq!(next_event(&mut event_rx).await, WatchEvent::ScanFinished);

        ports.0.lock().unwrap().clear();
        loop {
            if let WatchEvent::PortRemoved(name) = next_event(&mut event_rx).await {
                assert_eq!(name, "COM3");
                break;
            }
        }

        handle.stop().await.unwrap();
        assert!(!handle.is_running().await.unwrap());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_now_without_timer() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let ports = Arc::new(SharedPorts(Mutex::new(Vec::new())));
        let (handle, task) = WatcherHandle::spawn(PortWatcher::new(event_tx), ports);

        handle.scan_now().await.unwrap();
        assert_eq!(next_event(&mut event_rx).await, WatchEvent::ScanStarted);
        assert_eq!(next_event(&mut event_rx).await, WatchEvent::ScanFinished);
        assert!(!handle.is_running().await.unwrap());

        drop(handle);
        task.await.unwrap();
    }

    /// Enumerator that blocks until the test releases it, once per call
    struct GatedPorts {
        calls: AtomicUsize,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl PortEnumerator for GatedPorts {
        fn enumerate(&self) -> Result<Vec<PortDescriptor>, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // A dropped sender opens the gate for good
            let _ = self.release.lock().unwrap().recv();
            Ok(vec![PortDescriptor::new("COM3", "USB-SERIAL CH340")])
        }
    }

    #[tokio::test]
    async fn test_ticks_during_slow_enumeration_are_skipped() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let ports = Arc::new(GatedPorts {
            calls: AtomicUsize::new(0),
            release: Mutex::new(release_rx),
        });
        let (handle, task) = WatcherHandle::spawn(PortWatcher::new(event_tx), ports.clone());

        handle.start(10).await.unwrap();
        assert_eq!(next_event(&mut event_rx).await, WatchEvent::ScanStarted);

        // Many intervals pass while the first enumeration is stuck
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(ports.calls.load(Ordering::SeqCst), 1);
        assert!(event_rx.try_recv().is_err());

        release_tx.send(()).unwrap();
        assert!(matches!(
            next_event(&mut event_rx).await,
            WatchEvent::PortAppeared(p) if p.name == "COM3"
        ));
        assert!(matches!(
            next_event(&mut event_rx).await,
            WatchEvent::PortMatched { name, .. } if name == "COM3"
        ));
        assert_eq!(next_event(&mut event_rx).await, WatchEvent::ScanFinished);

        // The next tick starts exactly one new scan, which blocks again
        assert_eq!(next_event(&mut event_rx).await, WatchEvent::ScanStarted);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(ports.calls.load(Ordering::SeqCst), 2);
        assert!(event_rx.try_recv().is_err());

        // Same port set, so the completed scan only closes the bracket
        release_tx.send(()).unwrap();
        assert_eq!(next_event(&mut event_rx).await, WatchEvent::ScanFinished);

        handle.stop().await.unwrap();
        drop(release_tx);
        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
