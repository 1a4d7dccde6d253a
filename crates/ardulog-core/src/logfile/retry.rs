//! Bounded retry with linear backoff for log file operations.

use std::future::Future;
use std::time::Duration;

use super::LogFileError;

/// Run `op` up to `max_attempts` times, sleeping `base_delay * attempt`
/// between attempts. Only transient errors are retried; a terminal error or
/// exhausted attempts returns the last error.
pub(crate) async fn with_backoff<T, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, LogFileError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LogFileError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                tracing::debug!(attempt, error = %e, "transient log file error, retrying");
                tokio::time::sleep(base_delay * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
