//! Scan driver
//!
//! Owns the single connection handle, the timers, and the clock, and feeds
//! events into the pure state machine. One task; `tokio::select!` over the
//! line reader, the armed timer, and shutdown. A fired timer carries the
//! generation it was armed under, and a generation mismatch makes it a
//! no-op, so a timer cancelled during a transition can never fire a stale
//! transition later.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::classify::{classify, LineClass};
use crate::config::LoggerConfig;
use crate::events::{DataRecord, EventBus};
use crate::logfile::CsvLogWriter;

use super::fsm::{Effect, ScanEvent, ScanFsm, ScanState};
use super::port::PortOpener;

/// Snapshot of the scanner published on every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanStatus {
    /// Current state
    pub state: ScanState,
    /// Candidate port currently in play, if any
    pub port: Option<String>,
    /// True iff a device is confirmed live
    pub connected: bool,
}

/// Which timer is armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Liveness,
    Backoff,
}

/// The single armed timer, tagged with the generation it belongs to
struct ArmedTimer {
    kind: TimerKind,
    generation: u64,
    deadline: Instant,
}

type LineReader<P> = Lines<BufReader<P>>;

enum Wake {
    Line(io::Result<Option<String>>),
    Timer(TimerKind, u64),
}

/// Control handle for a running [`Scanner`].
///
/// Dropping the handle stops the scanner.
pub struct ScannerHandle {
    status: watch::Receiver<ScanStatus>,
    shutdown: watch::Sender<bool>,
}

impl ScannerHandle {
    /// Watch channel of status snapshots
    pub fn status(&self) -> watch::Receiver<ScanStatus> {
        self.status.clone()
    }

    /// The latest status snapshot
    pub fn current(&self) -> ScanStatus {
        self.status.borrow().clone()
    }

    /// Ask the scanner task to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// The connection manager: cycles candidate ports, supervises the open
/// connection, and routes received lines into the logging pipeline.
pub struct Scanner<O: PortOpener> {
    opener: O,
    fsm: ScanFsm,
    writer: CsvLogWriter,
    events: EventBus,
    reader: Option<LineReader<O::Port>>,
    timer: Option<ArmedTimer>,
    generation: u64,
    connected: bool,
    status_tx: watch::Sender<ScanStatus>,
    shutdown: watch::Receiver<bool>,
}

impl<O: PortOpener> Scanner<O> {
    /// Build a scanner over the configured candidate list.
    pub fn new(
        config: &LoggerConfig,
        opener: O,
        writer: CsvLogWriter,
        events: EventBus,
    ) -> (Self, ScannerHandle) {
        let fsm = ScanFsm::new(config.candidate_ports.clone(), config.timing.clone());
        let (status_tx, status_rx) = watch::channel(ScanStatus {
            state: ScanState::Idle,
            port: None,
            connected: false,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scanner = Self {
            opener,
            fsm,
            writer,
            events,
            reader: None,
            timer: None,
            generation: 0,
            connected: false,
            status_tx,
            shutdown: shutdown_rx,
        };
        let handle = ScannerHandle {
            status: status_rx,
            shutdown: shutdown_tx,
        };
        (scanner, handle)
    }

    /// Run the scan loop until shutdown. Spawn this on its own task.
    pub async fn run(mut self) {
        let mut pending: VecDeque<ScanEvent> = VecDeque::new();
        pending.push_back(ScanEvent::Start);

        loop {
            let event = match pending.pop_front() {
                Some(event) => event,
                None => match self.next_wake().await {
                    Some(event) => event,
                    None => break,
                },
            };

            let effects = self.fsm.on_event(event);
            for effect in effects {
                self.apply(effect, &mut pending).await;
            }
            self.publish_status();
        }

        tracing::debug!("scanner stopped");
    }

    /// Wait for the next external event; `None` means shutdown.
    async fn next_wake(&mut self) -> Option<ScanEvent> {
        loop {
            let wake = tokio::select! {
                _ = self.shutdown.changed() => return None,
                res = Self::next_line(&mut self.reader) => Wake::Line(res),
                (kind, generation) = Self::timer_fired(&self.timer) => Wake::Timer(kind, generation),
            };

            match wake {
                Wake::Line(Ok(Some(line))) => return Some(ScanEvent::LineReceived(line)),
                Wake::Line(Ok(None)) => {
                    self.reader = None;
                    return Some(ScanEvent::ConnectionClosed);
                }
                Wake::Line(Err(e)) => {
                    self.reader = None;
                    return Some(ScanEvent::ConnectionError(e.to_string()));
                }
                Wake::Timer(kind, generation) => {
                    if generation != self.generation {
                        // Cancelled timer that fired anyway: a no-op.
                        if self.timer.as_ref().map(|t| t.generation) == Some(generation) {
                            self.timer = None;
                        }
                        continue;
                    }
                    self.timer = None;
                    return Some(match kind {
                        TimerKind::Liveness => ScanEvent::LivenessExpired,
                        TimerKind::Backoff => ScanEvent::BackoffExpired,
                    });
                }
            }
        }
    }

    async fn next_line(reader: &mut Option<LineReader<O::Port>>) -> io::Result<Option<String>> {
        match reader {
            Some(lines) => lines.next_line().await,
            None => std::future::pending().await,
        }
    }

    async fn timer_fired(timer: &Option<ArmedTimer>) -> (TimerKind, u64) {
        match timer {
            Some(t) => {
                tokio::time::sleep_until(t.deadline).await;
                (t.kind, t.generation)
            }
            None => std::future::pending().await,
        }
    }

    async fn apply(&mut self, effect: Effect, pending: &mut VecDeque<ScanEvent>) {
        match effect {
            Effect::OpenPort(index) => {
                let name = self.fsm.port_name(index).to_string();
                match self.opener.open(&name).await {
                    Ok(port) => {
                        self.reader = Some(BufReader::new(port).lines());
                        pending.push_back(ScanEvent::OpenSucceeded);
                    }
                    Err(e) => pending.push_back(ScanEvent::OpenFailed(e.to_string())),
                }
            }
            Effect::ClosePort => {
                // Safe on an already-closed or never-opened connection
                self.reader = None;
            }
            Effect::StartLiveness(duration) => self.arm(TimerKind::Liveness, duration),
            Effect::CancelLiveness => {
                if matches!(
                    self.timer,
                    Some(ArmedTimer {
                        kind: TimerKind::Liveness,
                        ..
                    })
                ) {
                    self.disarm();
                }
            }
            Effect::StartBackoff(duration) => self.arm(TimerKind::Backoff, duration),
            Effect::SetConnected(connected) => self.connected = connected,
            Effect::RouteLine(line) => self.route_line(&line),
            Effect::Log(message) => self.events.log(message),
        }
    }

    fn arm(&mut self, kind: TimerKind, duration: Duration) {
        self.generation = self.generation.wrapping_add(1);
        self.timer = Some(ArmedTimer {
            kind,
            generation: self.generation,
            deadline: Instant::now() + duration,
        });
    }

    fn disarm(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.timer = None;
    }

    /// Classify a received line: data rows reach the CSV writer and the
    /// event bus, everything else the event bus only.
    fn route_line(&self, raw: &str) {
        let line = raw.trim();
        match classify(line) {
            LineClass::Data => {
                // Fire-and-continue; the append task retries on its own
                let _ = self.writer.append(line);
                self.events.data(DataRecord::from_line(line));
            }
            LineClass::Diagnostic => {
                if line.is_empty() {
                    // Blank lines stay off the event bus
                    tracing::trace!(port = %self.fsm.current_port(), "blank line from device");
                } else {
                    self.events
                        .log(format!("[{}] {line}", self.fsm.current_port()));
                }
            }
        }
    }

    fn publish_status(&self) {
        let status = ScanStatus {
            state: self.fsm.state(),
            port: match self.fsm.state() {
                ScanState::Idle => None,
                _ => Some(self.fsm.current_port().to_string()),
            },
            connected: self.connected,
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}
