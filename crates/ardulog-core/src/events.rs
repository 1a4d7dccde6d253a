//! Event bus
//!
//! Delivers data records and status log lines to presentation collaborators
//! over a broadcast channel, and keeps the process-lifetime buffer of
//! human-readable status messages. Slow subscribers lag rather than block
//! the core.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::broadcast;

/// Broadcast channel capacity; laggards drop oldest events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One accepted data line, split into fields
#[derive(Debug, Clone, Serialize)]
pub struct DataRecord {
    /// When the line was received
    pub timestamp: DateTime<Local>,
    /// Pipe-split, trimmed field values
    pub fields: Vec<String>,
}

impl DataRecord {
    /// Build a record from a raw device line, stamped with the current time
    pub fn from_line(line: &str) -> Self {
        Self {
            timestamp: Local::now(),
            fields: line
                .split(crate::logfile::FIELD_DELIMITER)
                .map(|f| f.trim().to_string())
                .collect(),
        }
    }
}

/// Events pushed to the UI collaborator
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Human-readable status line
    LogMessage(String),
    /// Freshly received data record
    DataRecord(DataRecord),
}

/// Cloneable bus carrying [`AppEvent`]s plus the status message buffer
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
    messages: Arc<Mutex<Vec<String>>>,
}

impl EventBus {
    /// Create a bus with the default capacity
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to pushed events
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Record a status message: buffered, broadcast, and mirrored to tracing
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");

        let stamped = format!("[{}] {message}", Local::now().format("%H:%M:%S"));
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(stamped.clone());

        // No subscribers is fine
        let _ = self.tx.send(AppEvent::LogMessage(stamped));
    }

    /// Broadcast a data record
    pub fn data(&self, record: DataRecord) {
        let _ = self.tx.send(AppEvent::DataRecord(record));
    }

    /// Snapshot of every status message logged this process lifetime
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
