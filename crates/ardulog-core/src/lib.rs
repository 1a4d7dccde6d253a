//! # Ardulog Core Library
//!
//! Core functionality for the Ardulog serial data logger.

#![warn(missing_docs)]

//!
//! This library provides:
//! - Automatic discovery of an Arduino among a fixed list of candidate
//!   serial ports, with reconnection when the device disappears
//! - Classification of streamed lines into data rows and diagnostic noise
//! - Durable append-only daily CSV logging with a persisted column schema
//! - A command/event surface for a desktop UI collaborator
//!
//! ## Example
//!
//! ```rust,ignore
//! use ardulog_core::prelude::*;
//!
//! let config = LoggerConfig::default();
//! let events = EventBus::new();
//! let headers = HeaderRegistry::load(config.headers_path.clone());
//! let writer = CsvLogWriter::new(config.log_dir.clone(), headers.clone(), events.clone());
//!
//! let opener = SerialOpener::new(config.baud_rate);
//! let (scanner, handle) = Scanner::new(&config, opener, writer.clone(), events.clone());
//! tokio::spawn(scanner.run());
//! ```

pub mod classify;
pub mod config;
pub mod events;
pub mod headers;
pub mod logfile;
pub mod scanner;
pub mod service;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::classify::{classify, LineClass};
    pub use crate::config::LoggerConfig;
    pub use crate::events::{AppEvent, DataRecord, EventBus};
    pub use crate::headers::HeaderRegistry;
    pub use crate::logfile::{CsvLogWriter, LogFileInfo};
    pub use crate::scanner::{ScanState, ScanStatus, Scanner, ScannerHandle, SerialOpener};
    pub use crate::service::{CommandOutcome, LoggerService};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
