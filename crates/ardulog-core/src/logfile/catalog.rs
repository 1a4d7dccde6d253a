//! Log file catalog
//!
//! Enumerates existing daily log files for export tooling. Failures never
//! reach the caller: an unreadable directory yields an empty list, an
//! unreadable file is skipped, both with a logged reason.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

use super::LOG_FILE_PREFIX;

/// Summary of one daily log file
#[derive(Debug, Clone, Serialize)]
pub struct LogFileInfo {
    /// Bare file name, e.g. `arduino_logs_2024-01-02.csv`
    pub file_name: String,
    /// Full path
    pub path: PathBuf,
    /// Size on disk in bytes
    pub size_bytes: u64,
    /// Last modification time
    pub modified: DateTime<Local>,
    /// Data rows in the file (line count minus the header, floored at 0)
    pub entry_count: usize,
}

/// Whether `name` looks like a daily log file (`arduino_logs_<date>.csv`)
pub fn is_log_file_name(name: &str) -> bool {
    name.strip_prefix(LOG_FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(".csv"))
        .map(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok())
        .unwrap_or(false)
}

/// List all daily log files under `dir`, newest-modified first.
pub fn list_log_files(dir: &Path) -> Vec<LogFileInfo> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(dir = %dir.display(), error = %e, "could not read log directory");
            return Vec::new();
        }
    };

    let mut files: Vec<LogFileInfo> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_log_file_name(&name) {
                return None;
            }
            log_file_info(&entry.path())
        })
        .collect();

    files.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });
    files
}

/// Summarize a single log file; `None` when it is absent or unreadable.
pub fn log_file_info(path: &Path) -> Option<LogFileInfo> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable log file");
            return None;
        }
    };

    let modified = meta
        .modified()
        .map(DateTime::<Local>::from)
        .unwrap_or_else(|_| Local::now());

    Some(LogFileInfo {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        size_bytes: meta.len(),
        modified,
        entry_count: count_entries(path),
    })
}

/// Data rows in the file: lines minus the header row, floored at 0
fn count_entries(path: &Path) -> usize {
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().count().saturating_sub(1),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not count log entries");
            0
        }
    }
}
