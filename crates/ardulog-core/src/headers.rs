//! Header registry
//!
//! Holds the ordered CSV column schema and persists it across restarts as a
//! small JSON file. The schema is replaced wholesale on every update; the
//! first column is always the reserved timestamp column. A schema change
//! only affects log files created afterwards; an in-flight daily file keeps
//! the header row it was created with.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the reserved first column, stamped onto every record
pub const RESERVED_FIRST_COLUMN: &str = "Timestamp";

/// Built-in schema used when nothing valid is persisted
pub const DEFAULT_HEADERS: [&str; 4] = [RESERVED_FIRST_COLUMN, "Value1", "Value2", "Value3"];

/// Errors from header schema updates
#[derive(Error, Debug)]
pub enum HeaderError {
    /// A schema needs the timestamp column plus at least one data column
    #[error("header schema needs at least 2 columns, got {0}")]
    TooFewColumns(usize),

    /// Persisting the schema to disk failed
    #[error("failed to persist header schema: {0}")]
    Persist(#[from] std::io::Error),

    /// Serializing the schema failed
    #[error("failed to encode header schema: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk representation: `{ "headers": [...] }`
#[derive(Serialize, Deserialize)]
struct HeaderFile {
    headers: Vec<String>,
}

/// Shared, cloneable registry of the current column schema
#[derive(Clone)]
pub struct HeaderRegistry {
    path: PathBuf,
    headers: Arc<RwLock<Vec<String>>>,
}

impl HeaderRegistry {
    /// Load the schema persisted at `path`, falling back to the built-in
    /// default when the file is absent or malformed. Never fails.
    pub fn load(path: PathBuf) -> Self {
        let headers = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HeaderFile>(&content) {
                Ok(file) => sanitize(file.headers),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "malformed header config, using defaults");
                    default_headers()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => default_headers(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable header config, using defaults");
                default_headers()
            }
        };

        Self {
            path,
            headers: Arc::new(RwLock::new(headers)),
        }
    }

    /// Snapshot of the current schema
    pub fn get(&self) -> Vec<String> {
        self.headers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the schema with `new_headers` and persist it.
    ///
    /// Element 0 is forced to the reserved name regardless of input. The
    /// in-memory schema is replaced before persisting, so a persist failure
    /// still leaves the new schema live for the current process.
    pub fn save(&self, new_headers: Vec<String>) -> Result<(), HeaderError> {
        if new_headers.len() < 2 {
            return Err(HeaderError::TooFewColumns(new_headers.len()));
        }

        let mut headers = new_headers;
        headers[0] = RESERVED_FIRST_COLUMN.to_string();

        *self.headers.write().unwrap_or_else(|e| e.into_inner()) = headers.clone();
        self.persist(&headers)
    }

    /// Restore the built-in default schema, best-effort deleting the
    /// persisted file. Deletion failure is logged, not fatal.
    pub fn reset(&self) {
        *self.headers.write().unwrap_or_else(|e| e.into_inner()) = default_headers();

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not delete header config");
            }
        }
    }

    /// Full overwrite via temp file + rename
    fn persist(&self, headers: &[String]) -> Result<(), HeaderError> {
        let json = serde_json::to_string_pretty(&HeaderFile {
            headers: headers.to_vec(),
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn default_headers() -> Vec<String> {
    DEFAULT_HEADERS.iter().map(|s| s.to_string()).collect()
}

/// Force the schema invariants onto a loaded schema
fn sanitize(mut headers: Vec<String>) -> Vec<String> {
    if headers.len() < 2 {
        tracing::warn!("persisted header schema too short, using defaults");
        return default_headers();
    }
    headers[0] = RESERVED_FIRST_COLUMN.to_string();
    headers
}
