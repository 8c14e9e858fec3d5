// =============================================================================
// CircuitBreaker — Closed / Open / HalfOpen health gate
// =============================================================================
//
// State transitions are performed under a single mutex region (matching the
// rest of this crate's shared-state pattern, e.g. the risk engine in the
// teacher repo); concurrent callers observing Open reject without touching
// the shared counters.
// =============================================================================

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub state: CircuitState,
    #[serde(skip)]
    pub last_state_change: Option<Instant>,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    last_state_change: Option<Instant>,
}

/// Error returned immediately by `execute` when the circuit is open and no
/// probe is admitted yet.
#[derive(Debug, Clone, thiserror::Error)]
#[error("circuit open")]
pub struct CircuitOpenError;

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

enum Admission {
    Proceed,
    Reject,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
                total_calls: 0,
                total_successes: 0,
                total_failures: 0,
                last_state_change: None,
            }),
        }
    }

    /// Execute `op` under the breaker's admission policy. Returns
    /// `Ok(Err(CircuitOpenError))`-shaped semantics via a dedicated error type
    /// so callers can distinguish "circuit rejected" from "operation failed".
    pub async fn execute<T, E, Fut, Op>(&self, op: Op) -> Result<Result<T, E>, CircuitOpenError>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let admission = {
            let mut inner = self.inner.lock();
            inner.total_calls += 1;
            match inner.state {
                CircuitState::Closed => Admission::Proceed,
                CircuitState::HalfOpen => Admission::Proceed,
                CircuitState::Open => {
                    let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                    if elapsed >= self.config.timeout {
                        inner.state = CircuitState::HalfOpen;
                        inner.half_open_successes = 0;
                        inner.last_state_change = Some(Instant::now());
                        info!("circuit breaker → half-open (cooldown elapsed)");
                        Admission::Proceed
                    } else {
                        Admission::Reject
                    }
                }
            }
        };

        let Admission::Proceed = admission else {
            return Err(CircuitOpenError);
        };

        let result = op().await;

        let mut inner = self.inner.lock();
        match &result {
            Ok(_) => {
                inner.total_successes += 1;
                match inner.state {
                    CircuitState::Closed => {
                        inner.consecutive_failures = 0;
                    }
                    CircuitState::HalfOpen => {
                        inner.half_open_successes += 1;
                        if inner.half_open_successes >= self.config.success_threshold {
                            inner.state = CircuitState::Closed;
                            inner.consecutive_failures = 0;
                            inner.last_state_change = Some(Instant::now());
                            info!("circuit breaker → closed (recovered)");
                        }
                    }
                    CircuitState::Open => {}
                }
            }
            Err(_) => {
                inner.total_failures += 1;
                match inner.state {
                    CircuitState::Closed => {
                        inner.consecutive_failures += 1;
                        if inner.consecutive_failures >= self.config.failure_threshold {
                            inner.state = CircuitState::Open;
                            inner.opened_at = Some(Instant::now());
                            inner.last_state_change = Some(Instant::now());
                            info!(
                                failures = inner.consecutive_failures,
                                "circuit breaker → open (failure threshold reached)"
                            );
                        }
                    }
                    CircuitState::HalfOpen => {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                        inner.last_state_change = Some(Instant::now());
                        info!("circuit breaker → open (probe failed)");
                    }
                    CircuitState::Open => {}
                }
            }
        }

        Ok(result)
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
        inner.last_state_change = Some(Instant::now());
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        CircuitStats {
            total_calls: inner.total_calls,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            state: inner.state,
            last_state_change: inner.last_state_change,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_failure_threshold_and_rejects_without_io() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            timeout: Duration::from_secs(60),
        });

        for _ in 0..2 {
            let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitOpenError)));
    }

    #[tokio::test]
    async fn half_open_after_cooldown_then_closes_on_success_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            timeout: Duration::from_millis(10),
        });

        let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let _ = breaker.execute(|| async { Ok::<_, &str>(()) }).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let _ = breaker.execute(|| async { Ok::<_, &str>(()) }).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            timeout: Duration::from_millis(10),
        });

        let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = breaker.execute(|| async { Err::<(), _>("boom again") }).await;

        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
