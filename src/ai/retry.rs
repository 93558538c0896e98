//! Retry/backoff helpers shared by the LLM and embedding gateways.
//!
//! One chokepoint, one policy: exponential backoff with capped jitter, 3
//! attempts, 500ms base delay, factor 2.0, capped at 30s. No per-provider
//! circuit breaker — a single upstream means a single failure mode to
//! manage.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::types::{ErrorCategory, PipelineError, Result};

pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_DELAY: Duration = Duration::from_millis(500);
pub const MAX_DELAY: Duration = Duration::from_secs(30);
pub const BACKOFF_FACTOR: f32 = 2.0;

/// Exponential backoff with a cap, mirroring the chain's "current * factor,
/// clamped to max" rule.
fn next_delay(current: Duration, factor: f32, max: Duration) -> Duration {
    let next = Duration::from_secs_f32(current.as_secs_f32() * factor);
    std::cmp::min(next, max)
}

/// Jitter capped at a quarter of the base delay, so backoff stays
/// predictable but retries from concurrent callers don't stampede in lockstep.
fn jitter(base: Duration) -> Duration {
    let max_jitter_ms = (base.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
}

/// Run `op` up to [`MAX_ATTEMPTS`] times, retrying only errors whose
/// [`ErrorCategory`] is [`ErrorCategory::Transient`]. Any other error returns
/// immediately on the first attempt.
pub async fn with_retry<T, F, Fut>(operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = BASE_DELAY;
    let mut last_err = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.category() == ErrorCategory::Transient => {
                if attempt == MAX_ATTEMPTS {
                    last_err = Some(err);
                    break;
                }
                let wait = retry_after(&err).unwrap_or(delay) + jitter(delay);
                warn!(operation, attempt, wait_ms = wait.as_millis() as u64, "retrying after transient error");
                tokio::time::sleep(wait).await;
                delay = next_delay(delay, BACKOFF_FACTOR, MAX_DELAY);
                last_err = Some(err);
            }
            Err(err) => {
                debug!(operation, "non-transient error, not retrying");
                return Err(err);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| PipelineError::upstream(operation, "retries exhausted")))
}

fn retry_after(err: &PipelineError) -> Option<Duration> {
    match err {
        PipelineError::Upstream { retry_after, .. } => *retry_after,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, PipelineError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::upstream("test", "503 server error")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::decode("garbage", "no json found")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
