//! Daily CSV log files
//!
//! One append-only file per calendar day, named from the date. The writer
//! appends accepted device lines; the catalog summarizes existing files for
//! export tooling.

mod catalog;
mod retry;
mod writer;

pub use catalog::{is_log_file_name, list_log_files, log_file_info, LogFileInfo};
pub use writer::CsvLogWriter;

pub(crate) use retry::with_backoff;

use chrono::NaiveDate;
use thiserror::Error;

/// Prefix shared by every daily log file
pub const LOG_FILE_PREFIX: &str = "arduino_logs_";

/// Field delimiter used by the device inside one data line
pub const FIELD_DELIMITER: char = '|';

/// File name for the log file covering `date`
pub fn log_file_name(date: NaiveDate) -> String {
    format!("{LOG_FILE_PREFIX}{}.csv", date.format("%Y-%m-%d"))
}

/// Errors from log file access, split by whether a retry can help
#[derive(Error, Debug)]
pub enum LogFileError {
    /// Busy, locked or briefly missing; worth retrying
    #[error("transient log file error: {0}")]
    Transient(#[source] std::io::Error),

    /// Anything else; retrying will not help
    #[error("log file error: {0}")]
    Terminal(#[source] std::io::Error),
}

impl LogFileError {
    /// Whether the retry loop should have another go
    pub fn is_transient(&self) -> bool {
        matches!(self, LogFileError::Transient(_))
    }
}

impl From<std::io::Error> for LogFileError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            // PermissionDenied covers files locked by another process on
            // Windows; NotFound covers a file deleted between check and open.
            ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::PermissionDenied
            | ErrorKind::NotFound => LogFileError::Transient(e),
            _ => LogFileError::Terminal(e),
        }
    }
}
