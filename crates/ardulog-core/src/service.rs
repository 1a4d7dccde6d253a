//! Command interface for the UI collaborator
//!
//! The small surface a desktop frontend talks to: header schema commands,
//! log file listing and export, and the pushed event stream. Commands never
//! panic and never throw; failures come back as a structured
//! [`CommandOutcome`].

use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::LoggerConfig;
use crate::events::{AppEvent, EventBus};
use crate::headers::HeaderRegistry;
use crate::logfile::{self, CsvLogWriter, LogFileInfo};

/// Result object handed back to command callers
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    /// Whether the command took effect
    pub success: bool,
    /// Failure description when it did not
    pub error: Option<String>,
}

impl CommandOutcome {
    /// Successful outcome
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Failed outcome with a description
    pub fn failed(error: impl Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// The command/event surface exposed to the UI collaborator
pub struct LoggerService {
    headers: HeaderRegistry,
    writer: CsvLogWriter,
    events: EventBus,
    log_dir: PathBuf,
}

impl LoggerService {
    /// Wire up the service over already-built collaborators
    pub fn new(
        config: &LoggerConfig,
        headers: HeaderRegistry,
        writer: CsvLogWriter,
        events: EventBus,
    ) -> Self {
        Self {
            headers,
            writer,
            events,
            log_dir: config.log_dir.clone(),
        }
    }

    /// Current header schema
    pub fn headers(&self) -> Vec<String> {
        self.headers.get()
    }

    /// Replace the header schema; applies to log files created afterwards
    pub fn save_headers(&self, headers: Vec<String>) -> CommandOutcome {
        match self.headers.save(headers) {
            Ok(()) => {
                self.events.log("Header schema updated");
                CommandOutcome::ok()
            }
            Err(e) => CommandOutcome::failed(e),
        }
    }

    /// Restore the built-in header schema
    pub fn reset_headers(&self) -> CommandOutcome {
        self.headers.reset();
        self.events.log("Header schema reset to defaults");
        CommandOutcome::ok()
    }

    /// Every daily log file on disk, newest-modified first
    pub fn all_log_files(&self) -> Vec<LogFileInfo> {
        logfile::list_log_files(&self.log_dir)
    }

    /// Summary of today's log file, absent until something was written
    pub fn current_log_info(&self) -> Option<LogFileInfo> {
        logfile::log_file_info(&self.writer.current_log_path())
    }

    /// Copy today's log file to `destination`
    pub fn save_current_log_as(&self, destination: &Path) -> CommandOutcome {
        let source = self.writer.current_log_path();
        self.copy_log(&source, destination)
    }

    /// Copy the named log file to `destination`.
    ///
    /// `file_name` must be a bare daily log file name; anything else
    /// (including path traversal) is rejected.
    pub fn save_named_log_as(&self, file_name: &str, destination: &Path) -> CommandOutcome {
        if !logfile::is_log_file_name(file_name) {
            return CommandOutcome::failed(format!("not a log file name: {file_name}"));
        }
        let source = self.log_dir.join(file_name);
        self.copy_log(&source, destination)
    }

    /// Subscribe to pushed events (log messages and data records)
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.events.subscribe()
    }

    /// The process-lifetime status message buffer
    pub fn log_messages(&self) -> Vec<String> {
        self.events.messages()
    }

    fn copy_log(&self, source: &Path, destination: &Path) -> CommandOutcome {
        match std::fs::copy(source, destination) {
            Ok(bytes) => {
                self.events.log(format!(
                    "Exported {} ({bytes} bytes) to {}",
                    source.display(),
                    destination.display()
                ));
                CommandOutcome::ok()
            }
            Err(e) => {
                tracing::warn!(
                    source = %source.display(),
                    destination = %destination.display(),
                    error = %e,
                    "log export failed"
                );
                CommandOutcome::failed(e)
            }
        }
    }
}
