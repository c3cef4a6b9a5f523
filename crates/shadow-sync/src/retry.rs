//! Retry/backoff policy for cloud data-plane calls
//!
//! Transient upstream errors (`ServiceUnavailable`, `Throttling`,
//! `InternalFailure`, `Timeout`) are retried with exponential backoff:
//! 1s initial delay, factor 2, capped at 60s, unbounded until the
//! operation succeeds or a non-transient outcome is reached. Terminal
//! errors are returned immediately so the caller can drop the request
//! without blocking the queue.

use std::time::Duration;

use shadow_core::domain::CloudError;
use tracing::warn;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const BACKOFF_FACTOR: u32 = 2;
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Runs `f` repeatedly until it returns `Ok`, a non-transient `Err`, or
/// `should_stop` reports true between attempts.
///
/// Backoff is unbounded in attempt count — only transient `CloudError`
/// variants are retried; anything else (including a conflict) is
/// returned to the caller on the first attempt.
pub async fn with_retry<F, Fut, T>(operation: &str, should_stop: impl Fn() -> bool, f: F) -> Result<T, CloudError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, CloudError>>,
{
    let mut delay = INITIAL_DELAY;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if should_stop() {
                    return Err(err);
                }
                warn!(operation, delay_ms = delay.as_millis() as u64, error = %err, "transient error, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * BACKOFF_FACTOR).min(MAX_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", || false, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CloudError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", || false, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(CloudError::Throttling)
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), CloudError> = with_retry("op", || false, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CloudError::Unauthorized)
        })
        .await;
        assert_eq!(result.unwrap_err(), CloudError::Unauthorized);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_stop_aborts_retry_loop() {
        let result: Result<(), CloudError> =
            with_retry("op", || true, || async { Err(CloudError::ServiceUnavailable) }).await;
        assert_eq!(result.unwrap_err(), CloudError::ServiceUnavailable);
    }
}
