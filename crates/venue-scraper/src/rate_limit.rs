//! Retry with exponential backoff for forum page fetches.
//!
//! Only errors for which [`ScraperError::is_retriable`] holds are retried;
//! everything else is returned on the first failure.

use std::future::Future;
use std::time::Duration;

use crate::error::ScraperError;

const MAX_DELAY_MS: u64 = 60_000;

/// Delay before retry number `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// capped at one minute, then scaled by a jitter factor in `[0.75, 1.25)`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn backoff_delay_ms(backoff_base_ms: u64, attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(32);
    let raw = backoff_base_ms.saturating_mul(1u64 << exp).min(MAX_DELAY_MS);
    let jitter = rand::random::<f64>() * 0.5 + 0.75;
    (raw as f64 * jitter) as u64
}

/// Runs `operation`, retrying transient failures up to `max_retries` extra
/// times. With `max_retries = 3` the operation runs at most 4 times.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retriable() || attempt >= max_retries {
            return Err(err);
        }
        attempt += 1;

        let delay_ms = match &err {
            ScraperError::RateLimited {
                retry_after_secs, ..
            } if backoff_base_ms > 0 => retry_after_secs
                .saturating_mul(1000)
                .min(MAX_DELAY_MS)
                .max(backoff_delay_ms(backoff_base_ms, attempt)),
            _ => backoff_delay_ms(backoff_base_ms, attempt),
        };
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms,
            error = %err,
            "transient forum fetch error, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}
