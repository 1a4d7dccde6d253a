//! Append-only CSV writer
//!
//! Stamps accepted device lines with a local timestamp and appends them to
//! the current day's file. Appends run on their own task so callers never
//! block; transient file errors are retried with linear backoff, and a
//! record dropped after retry exhaustion is always logged loudly enough for
//! a postmortem.
//!
//! Field values are written as-is: embedded commas or quotes are not
//! escaped, matching the lossy format consumers of these files expect.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use crate::events::EventBus;
use crate::headers::HeaderRegistry;

use super::{log_file_name, with_backoff, LogFileError, FIELD_DELIMITER};

/// Attempts per record, including the first
const MAX_APPEND_ATTEMPTS: u32 = 3;

/// Backoff base; the n-th retry waits n times this
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Timestamp format for the first CSV column (ISO-8601, millisecond precision)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Cloneable handle to the daily CSV log
#[derive(Clone)]
pub struct CsvLogWriter {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    headers: HeaderRegistry,
    events: EventBus,
}

impl CsvLogWriter {
    /// Create a writer targeting `dir`, taking header snapshots from
    /// `headers` whenever a new daily file is created.
    pub fn new(dir: PathBuf, headers: HeaderRegistry, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir,
                headers,
                events,
            }),
        }
    }

    /// Path of the log file covering today
    pub fn current_log_path(&self) -> PathBuf {
        self.inner.dir.join(log_file_name(Local::now().date_naive()))
    }

    /// Make sure the log directory and today's file exist.
    ///
    /// An inaccessible file is a warning, not an error: the first append
    /// will try again.
    pub async fn initialize(&self) {
        if let Err(e) = self.inner.ensure_current_file().await {
            tracing::warn!(error = %e, "could not prepare today's log file, will retry on append");
            self.inner
                .events
                .log(format!("Log file unavailable: {e}"));
        }
    }

    /// Append one accepted device line, stamped with the current time.
    ///
    /// The line is split on `|`, fields trimmed, and the row written on a
    /// spawned task. The returned handle lets tests await completion;
    /// production call sites drop it.
    pub fn append(&self, raw_line: &str) -> JoinHandle<Result<(), LogFileError>> {
        let inner = self.inner.clone();
        let stamp = Local::now();
        let raw = raw_line.to_string();

        tokio::spawn(async move {
            let row = format_row(&stamp, &raw);
            let result =
                with_backoff(MAX_APPEND_ATTEMPTS, RETRY_BASE_DELAY, || inner.append_row(&row))
                    .await;

            if let Err(e) = &result {
                // The one failure that must never be silent: a dropped record.
                tracing::error!(
                    timestamp = %stamp.format(TIMESTAMP_FORMAT),
                    line = %raw,
                    error = %e,
                    "dropping record after failed append"
                );
                inner.events.log(format!(
                    "Dropped record from {}: {raw} ({e})",
                    stamp.format(TIMESTAMP_FORMAT)
                ));
            }

            result
        })
    }
}

/// Timestamp column plus the pipe-split, trimmed fields, comma-joined
fn format_row(stamp: &DateTime<Local>, raw: &str) -> String {
    let mut fields = vec![stamp.format(TIMESTAMP_FORMAT).to_string()];
    fields.extend(raw.split(FIELD_DELIMITER).map(|f| f.trim().to_string()));
    fields.join(",")
}

impl Inner {
    /// Create today's file with a header row if it does not exist yet.
    /// An existing file is reused untouched, whatever its header says.
    async fn ensure_current_file(&self) -> Result<PathBuf, LogFileError> {
        let path = self.dir.join(log_file_name(Local::now().date_naive()));
        if tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                let header = self.headers.get().join(",") + "\n";
                file.write_all(header.as_bytes()).await?;
                tracing::info!(path = %path.display(), "created new daily log file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
        Ok(path)
    }

    async fn append_row(&self, row: &str) -> Result<(), LogFileError> {
        let path = self.ensure_current_file().await?;
        let mut file = OpenOptions::new().append(true).open(&path).await?;
        file.write_all(format!("{row}\n").as_bytes()).await?;
        // tokio's File buffers writes; flush so the row is on disk before
        // the append future resolves, as the JoinHandle contract promises.
        file.flush().await?;
        Ok(())
    }
}
