//! Exponential backoff retry loop.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Delay slept after failed attempt `retry` (1-indexed):
/// `initial * 2^(retry - 1)`, saturating.
#[must_use]
pub fn backoff_delay(initial: Duration, retry: u32) -> Duration {
    let factor = 2_u32
        .checked_pow(retry.saturating_sub(1))
        .unwrap_or(u32::MAX);
    initial.saturating_mul(factor)
}

/// Run `attempt` up to `max_attempts` times, sleeping
/// [`backoff_delay`] between failures.
///
/// `attempt` receives the 1-indexed attempt number. Returns `true` on the
/// first successful attempt, `false` once every attempt failed or `cancel`
/// fired. The sleeps are `tokio::time::sleep`, so other tasks keep running.
pub async fn retry_with_backoff<F, Fut>(
    max_attempts: u32,
    initial_delay: Duration,
    cancel: &CancellationToken,
    mut attempt: F,
) -> bool
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    for n in 1..=max_attempts {
        if cancel.is_cancelled() {
            info!(attempt = n, "retry loop cancelled");
            return false;
        }

        if attempt(n).await {
            return true;
        }

        if n < max_attempts {
            let delay = backoff_delay(initial_delay, n);
            warn!(attempt = n, ?delay, "attempt failed, retrying");
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(attempt = n, "retry loop cancelled during backoff");
                    return false;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    warn!(max_attempts, "all attempts failed");
    false
}
