//! Runtime configuration
//!
//! The candidate port list, baud rate, file locations, and scan timing.
//! Fixed at startup; there is no CLI surface beyond process launch.

use std::path::PathBuf;

use crate::scanner::ScanTiming;

/// Baud rate the device sketch is expected to use
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Everything the logger needs to run
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Candidate serial ports, probed in order
    pub candidate_ports: Vec<String>,
    /// Baud rate for every candidate
    pub baud_rate: u32,
    /// Directory holding the daily CSV files
    pub log_dir: PathBuf,
    /// Path of the persisted header schema
    pub headers_path: PathBuf,
    /// Scan loop timer durations
    pub timing: ScanTiming,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ardulog");

        Self {
            candidate_ports: default_candidate_ports(),
            baud_rate: DEFAULT_BAUD_RATE,
            log_dir: data_dir.join("logs"),
            headers_path: data_dir.join("headers.json"),
            timing: ScanTiming::default(),
        }
    }
}

/// Ports an Arduino usually appears on, most likely first
#[cfg(unix)]
fn default_candidate_ports() -> Vec<String> {
    [
        "/dev/ttyACM0",
        "/dev/ttyACM1",
        "/dev/ttyUSB0",
        "/dev/ttyUSB1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(windows)]
fn default_candidate_ports() -> Vec<String> {
    (3..=8).map(|n| format!("COM{n}")).collect()
}
