//! Port scan state machine
//!
//! The pure transition core of the connection manager: no I/O, no timers,
//! just `(state, event) -> effects`. The async driver owns the port handle
//! and the clock and executes the effects this machine emits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scan/connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    /// Not started
    Idle,
    /// Attempting to open the current candidate port
    Probing,
    /// Port opened; waiting for the first line to confirm a live device
    WaitingForData,
    /// Device confirmed; lines are flowing
    Active,
    /// Tearing down after a failure, waiting out a backoff before the next probe
    ClosingAndAdvancing,
    /// Every candidate refused in one pass; waiting out the long backoff
    AllPortsExhausted,
}

/// Inputs to the state machine
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Kick off the scan
    Start,
    /// The current candidate opened
    OpenSucceeded,
    /// The current candidate refused to open
    OpenFailed(String),
    /// A complete line arrived on the open connection
    LineReceived(String),
    /// The liveness timer expired with no line seen
    LivenessExpired,
    /// A backoff delay elapsed
    BackoffExpired,
    /// The connection hit end-of-stream
    ConnectionClosed,
    /// The connection reported an error
    ConnectionError(String),
}

/// Side effects for the driver to execute, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open the candidate port at this index
    OpenPort(usize),
    /// Close the connection if one is open (idempotent)
    ClosePort,
    /// Arm the liveness timer
    StartLiveness(Duration),
    /// Disarm the liveness timer
    CancelLiveness,
    /// Arm a backoff timer
    StartBackoff(Duration),
    /// Update the connected flag
    SetConnected(bool),
    /// Hand a received line to the classifier pipeline
    RouteLine(String),
    /// Emit a status message
    Log(String),
}

/// Timer durations governing the scan loop
#[derive(Debug, Clone)]
pub struct ScanTiming {
    /// How long an opened port gets to produce its first line
    pub liveness: Duration,
    /// Pause between one candidate failing and probing the next
    pub probe_backoff: Duration,
    /// Pause after an active connection is lost, before rescanning from the top
    pub lost_backoff: Duration,
    /// Pause after a full pass with no live device
    pub rescan_backoff: Duration,
}

impl Default for ScanTiming {
    fn default() -> Self {
        Self {
            liveness: Duration::from_secs(3),
            probe_backoff: Duration::from_secs(1),
            lost_backoff: Duration::from_secs(2),
            rescan_backoff: Duration::from_secs(3),
        }
    }
}

/// The state machine proper
pub struct ScanFsm {
    ports: Vec<String>,
    timing: ScanTiming,
    state: ScanState,
    index: usize,
}

impl ScanFsm {
    /// Create a machine over a fixed, non-empty candidate list
    pub fn new(ports: Vec<String>, timing: ScanTiming) -> Self {
        debug_assert!(!ports.is_empty(), "candidate port list must not be empty");
        Self {
            ports,
            timing,
            state: ScanState::Idle,
            index: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Index of the candidate currently in play
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name of the candidate currently in play
    pub fn current_port(&self) -> &str {
        &self.ports[self.index]
    }

    /// Name of the candidate at `index`
    pub fn port_name(&self, index: usize) -> &str {
        &self.ports[index]
    }

    /// True iff a device is confirmed live
    pub fn is_connected(&self) -> bool {
        self.state == ScanState::Active
    }

    /// Advance the machine by one event, returning the effects to run.
    ///
    /// Events that make no sense in the current state (a stale timer that
    /// slipped past cancellation, a line after teardown) are no-ops.
    pub fn on_event(&mut self, event: ScanEvent) -> Vec<Effect> {
        use ScanState::*;

        match (self.state, event) {
            (Idle, ScanEvent::Start) => self.probe_current(),

            (Probing, ScanEvent::OpenSucceeded) => {
                self.state = WaitingForData;
                vec![Effect::Log(format!(
                    "Opened {}, waiting for data",
                    self.current_port()
                ))]
            }

            (Probing, ScanEvent::OpenFailed(reason)) => {
                let mut effects = vec![
                    Effect::CancelLiveness,
                    Effect::ClosePort,
                    Effect::Log(format!(
                        "Could not open {}: {reason}",
                        self.current_port()
                    )),
                ];
                effects.extend(self.advance());
                effects
            }

            (WaitingForData, ScanEvent::LineReceived(line)) => {
                self.state = Active;
                vec![
                    Effect::CancelLiveness,
                    Effect::SetConnected(true),
                    Effect::Log(format!("Arduino detected on {}", self.current_port())),
                    Effect::RouteLine(line),
                ]
            }

            (WaitingForData, ScanEvent::LivenessExpired) => {
                let mut effects = vec![
                    Effect::ClosePort,
                    Effect::Log(format!(
                        "No data from {} before timeout",
                        self.current_port()
                    )),
                ];
                effects.extend(self.advance());
                effects
            }

            (WaitingForData, ScanEvent::ConnectionError(reason)) => {
                let mut effects = vec![
                    Effect::CancelLiveness,
                    Effect::ClosePort,
                    Effect::Log(format!(
                        "Error on {} while waiting for data: {reason}",
                        self.current_port()
                    )),
                ];
                effects.extend(self.advance());
                effects
            }

            (WaitingForData, ScanEvent::ConnectionClosed) => {
                let mut effects = vec![
                    Effect::CancelLiveness,
                    Effect::ClosePort,
                    Effect::Log(format!(
                        "{} closed before any data arrived",
                        self.current_port()
                    )),
                ];
                effects.extend(self.advance());
                effects
            }

            (Active, ScanEvent::LineReceived(line)) => vec![Effect::RouteLine(line)],

            (Active, ScanEvent::ConnectionClosed) => {
                // Start over from the first candidate, not the next one:
                // a re-plugged device often re-enumerates under an earlier name.
                self.state = ClosingAndAdvancing;
                self.index = 0;
                vec![
                    Effect::SetConnected(false),
                    Effect::ClosePort,
                    Effect::Log("Connection lost, rescanning from the first port".to_string()),
                    Effect::StartBackoff(self.timing.lost_backoff),
                ]
            }

            (Active, ScanEvent::ConnectionError(reason)) => {
                let mut effects = vec![
                    Effect::SetConnected(false),
                    Effect::ClosePort,
                    Effect::Log(format!(
                        "Error on {}: {reason}",
                        self.current_port()
                    )),
                ];
                effects.extend(self.advance());
                effects
            }

            (ClosingAndAdvancing, ScanEvent::BackoffExpired)
            | (AllPortsExhausted, ScanEvent::BackoffExpired) => self.probe_current(),

            // Stale or irrelevant for the current state
            _ => Vec::new(),
        }
    }

    /// Enter `Probing` for the current index
    fn probe_current(&mut self) -> Vec<Effect> {
        self.state = ScanState::Probing;
        vec![
            Effect::Log(format!("Probing {}", self.current_port())),
            Effect::StartLiveness(self.timing.liveness),
            Effect::OpenPort(self.index),
        ]
    }

    /// Move to the next candidate, or wrap into the exhausted pause.
    /// The scan never gives up permanently.
    fn advance(&mut self) -> Vec<Effect> {
        self.index += 1;
        if self.index >= self.ports.len() {
            self.index = 0;
            self.state = ScanState::AllPortsExhausted;
            vec![
                Effect::Log("All candidate ports tried, pausing before rescan".to_string()),
                Effect::StartBackoff(self.timing.rescan_backoff),
            ]
        } else {
            self.state = ScanState::ClosingAndAdvancing;
            vec![Effect::StartBackoff(self.timing.probe_backoff)]
        }
    }
}
