//! Retry logic for transient upstream errors.

use std::future::Future;
use std::time::Duration;

use super::{HeosError, HeosResult};

/// Runs `operation`, retrying transient failures after each delay in `delays`.
///
/// Non-transient errors return immediately. When every attempt fails the
/// last transient error is returned.
pub(crate) async fn with_retry<T, F, Fut>(
    action: &str,
    delays: &[u64],
    mut operation: F,
) -> HeosResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HeosResult<T>>,
{
    let attempts = delays.len() + 1;
    let mut last_error = None;
    for (attempt, &delay_ms) in std::iter::once(&0).chain(delays.iter()).enumerate() {
        if attempt > 0 {
            log::info!(
                "[Upstream] Retrying {} (attempt {}/{}) after {}ms",
                action,
                attempt + 1,
                attempts,
                delay_ms
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() => {
                log::warn!("[Upstream] {} transient error: {}", action, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or(HeosError::ConnectionClosed))
}
