//! ServeDebug Monitor
//!
//! Watches the serial ports, connects to the ServeDebug debugger as soon as
//! it is plugged in and relays bytes between the terminal and the device.

mod orchestrator;
mod settings;
mod simulation;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use orchestrator::Orchestrator;
use sdbg_detect::{list_ports, PortEnumerator, PortScanner, PortWatcher, WatcherHandle};
use sdbg_session::{ConnectionSession, SerialOpener, TransportOpener};
use settings::Settings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the open port is drained
const READ_POLL: Duration = Duration::from_millis(20);

const USAGE: &str = "\
Usage: servedebug [OPTIONS]

Options:
  --simulate      Use a simulated serial bus with a scripted hotplug scenario
  --list          Print the available serial ports and exit
  --port <NAME>   Connect to NAME at startup instead of waiting for detection
  -h, --help      Show this help";

#[derive(Debug, Default)]
struct Args {
    simulate: bool,
    list_only: bool,
    port: Option<String>,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--simulate" => args.simulate = true,
            "--list" => args.list_only = true,
            "--port" => {
                args.port = Some(iter.next().context("--port needs a port name")?);
            }
            "-h" | "--help" => return Ok(None),
            other => anyhow::bail!("unknown argument {other:?}\n\n{USAGE}"),
        }
    }
    Ok(Some(args))
}

/// Log the ports present at startup
///
/// A failed listing is not fatal: the watcher retries on every scan.
fn initial_listing(enumerator: &dyn PortEnumerator) -> usize {
    // list_ports logs every port it finds
    match list_ports(enumerator) {
        Ok(ports) => ports.len(),
        Err(e) => {
            tracing::warn!("Initial port listing failed: {}; watching anyway", e);
            0
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only device output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "servedebug=info,sdbg_detect=info,sdbg_session=info,sdbg_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(args) = parse_args()? else {
        println!("{USAGE}");
        return Ok(());
    };

    let settings = Settings::load();
    tracing::info!("Starting ServeDebug monitor");

    let (enumerator, opener): (Arc<dyn PortEnumerator>, Box<dyn TransportOpener>) =
        if args.simulate {
            let bus = simulation::initial_bus();
            simulation::spawn_scenario(bus.clone());
            (Arc::new(bus.clone()), Box::new(bus))
        } else {
            (Arc::new(PortScanner::new()), Box::new(SerialOpener::new()))
        };

    if args.list_only {
        list_ports(enumerator.as_ref()).context("listing serial ports")?;
        return Ok(());
    }
    initial_listing(enumerator.as_ref());

    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel();
    let (session_tx, mut session_rx) = mpsc::unbounded_channel();

    let watcher = PortWatcher::with_rule(settings.match_rule.clone(), watch_tx);
    let (watcher_handle, watcher_task) = WatcherHandle::spawn(watcher, enumerator);
    watcher_handle
        .start(settings.scan_interval_ms)
        .await
        .context("starting port watcher")?;

    let mut orchestrator =
        Orchestrator::new(ConnectionSession::new(opener, session_tx), &settings);
    if let Some(port) = &args.port {
        orchestrator
            .connect(port)
            .with_context(|| format!("connecting to {port}"))?;
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut read_tick = interval(READ_POLL);
    read_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            Some(event) = watch_rx.recv() => orchestrator.handle_watch_event(&event),
            Some(event) = session_rx.recv() => {
                orchestrator
                    .handle_session_event(&event, &mut stdout)
                    .context("writing device output")?;
            }
            _ = read_tick.tick() => orchestrator.poll(),
            line = stdin.next_line(), if stdin_open => match line.context("reading stdin")? {
                Some(line) => orchestrator.send_line(&line),
                None => {
                    tracing::debug!("stdin closed, relaying device output only");
                    stdin_open = false;
                }
            },
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let counters = orchestrator.counters();
    tracing::info!(
        "{} detections; last port {:?}; sent {} bytes, received {} bytes",
        orchestrator.matched(),
        orchestrator.session().current_port(),
        counters.bytes_sent,
        counters.bytes_received
    );
    orchestrator.shutdown();
    // Flush the final Disconnected through the orchestrator for its summary log
    while let Ok(event) = session_rx.try_recv() {
        orchestrator.handle_session_event(&event, &mut stdout)?;
    }
    stdout.flush()?;

    watcher_handle.shutdown().await.ok();
    watcher_task.await.ok();
    Ok(())
}
