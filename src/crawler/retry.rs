//! Bounded retry with exponential backoff and jitter.
//!
//! Every failed attempt is logged and retried until `max_attempts` attempts
//! have been made in total; after that the last error is handed back to the
//! caller, which abandons the item. Only errors that `FetchError::is_retryable`
//! accepts grow the backoff; the rest wait the initial delay.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{FetchError, PageError};

pub async fn fetch_with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, PageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let limit = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempts = attempt, "image fetched after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if attempt >= limit {
            return Err(PageError::Exhausted { attempts: attempt, last: err });
        }

        tracing::warn!(
            error = %err,
            attempt,
            max_attempts = limit,
            "error downloading image, retrying"
        );

        let transient = err.is_retryable();
        let base = if transient { delay } else { config.initial_delay };
        let wait = if config.jitter { add_jitter(base) } else { base };
        if !wait.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(PageError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(PageError::Cancelled);
        }

        if transient {
            delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier.max(1.0))
                .min(config.max_delay);
        }
    }
}

/// Stretch `delay` by a random 0-100%
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
