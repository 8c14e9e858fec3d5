// =============================================================================
// Retrier — bounded attempts with exponential backoff and optional jitter
// =============================================================================
//
// Delay at attempt `n` (0-indexed) is `min(initial * base^n, max)`; with
// jitter enabled the delay is scaled by a uniform sample in [0.5, 1.0].
// Retryable-ness is decided by the caller's predicate so this module has no
// knowledge of `RpcError` specifically.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub exponential_base: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            exponential_base: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `n` (0-indexed, i.e. the wait before the *next*
    /// call after the `n`-th failure).
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        let factor = if self.jitter {
            rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * factor)
    }
}

/// Raised when every attempt has been exhausted.
#[derive(Debug, Clone)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "retry exhausted after {} attempts: {}", self.attempts, self.last_error)
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryExhausted<E> {}

/// Execute `operation` with bounded retries. `is_retryable` decides whether a
/// given error should be retried; `on_retry` (if given) is invoked between
/// attempts but never after the final failure.
pub async fn execute_with_retry<T, E, Fut, Op, Retryable>(
    config: &RetryConfig,
    mut operation: Op,
    is_retryable: Retryable,
    mut on_retry: Option<&mut (dyn FnMut(u32, &E) + Send)>,
) -> Result<T, RetryExhausted<E>>
where
    Fut: Future<Output = Result<T, E>>,
    Op: FnMut() -> Fut,
    Retryable: Fn(&E) -> bool,
{
    let mut last_error: Option<E> = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(RetryExhausted { attempts: attempt + 1, last_error: e });
                }

                let is_last = attempt + 1 >= config.max_attempts;
                if is_last {
                    return Err(RetryExhausted { attempts: config.max_attempts, last_error: e });
                }

                if let Some(cb) = on_retry.as_deref_mut() {
                    cb(attempt, &e);
                }
                warn!(attempt = attempt + 1, max = config.max_attempts, "retrying after failure");
                last_error = Some(e);

                tokio::time::sleep(config.delay_for(attempt)).await;
            }
        }
    }

    // Unreachable given the loop above always returns, but keeps the compiler
    // happy without an `unwrap`.
    Err(RetryExhausted {
        attempts: config.max_attempts,
        last_error: last_error.expect("loop always sets last_error before falling through"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Retryable;
    #[derive(Debug)]
    struct Terminal;

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
            ..RetryConfig::default()
        };

        let result: Result<(), RetryExhausted<Retryable>> = execute_with_retry(
            &config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Retryable) }
            },
            |_| true,
            None,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_early_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig { max_attempts: 5, ..RetryConfig::default() };

        let result: Result<(), RetryExhausted<Terminal>> = execute_with_retry(
            &config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Terminal) }
            },
            |_| false,
            None,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_exhausting() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            jitter: false,
            ..RetryConfig::default()
        };

        let result = execute_with_retry(
            &config,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 1 { Err(Retryable) } else { Ok(42) } }
            },
            |_| true,
            None,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
