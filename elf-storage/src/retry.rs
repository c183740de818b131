//! Retry with exponential backoff for single-row operations that lost a
//! write lock. Non-recoverable errors fail fast.

use elf_core::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 100;
const MAX_DELAY_MS: u64 = 5000;

/// Run `op` up to five times, backing off exponentially (with jitter) on
/// recoverable database contention.
pub(crate) async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() && attempt < MAX_ATTEMPTS => {
                let backoff =
                    (BASE_DELAY_MS * 2u64.saturating_pow(attempt - 1)).min(MAX_DELAY_MS);
                let jitter = rand::random_range(0..=backoff / 2);
                warn!(op = op_name, attempt, backoff_ms = backoff + jitter, error = %e, "Retrying after contention");
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
