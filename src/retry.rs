//! Exponential backoff with jitter for flaky remote calls.
//!
//! After failed attempt `i` (counting from zero) the caller waits
//! `base * 2^i + jitter`, where jitter is drawn uniformly from
//! `0..=max_jitter`. With the defaults (five attempts, one second base, one
//! second jitter) the total wait before the last attempt lies between 15 and
//! 19 seconds. The error from the last attempt is handed back untouched.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    max_attempts: u32,
    base: Duration,
    max_jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl Backoff {
    /// Create a policy. A `max_attempts` of zero still runs the operation once.
    pub fn new(max_attempts: u32, base: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max_jitter,
        }
    }

    /// Default delays with a different attempt budget.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt` (zero-based), given a jitter sample.
    pub fn delay_for(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).saturating_add(jitter)
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// Waiting uses `tokio::time::sleep`, so other tasks keep running while a
    /// retry is pending.
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt + 1 >= self.max_attempts => return Err(error),
                Err(error) => {
                    let delay = self.delay_for(attempt, self.sample_jitter());
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Remote call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Retry `op` with the default delays and the given attempt budget.
pub async fn with_exponential_backoff<T, E, F, Fut>(op: F, max_attempts: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    Backoff::with_max_attempts(max_attempts).retry(op).await
}
