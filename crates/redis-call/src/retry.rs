//! Repeating a unit of work until it stops failing with a retryable error.
//!
//! The typical unit is an optimistic transaction: watch some keys, read
//! them, then [`Connection::multi`]. When another client wins the race the
//! commit fails with [`RedisCallError::TransactionAborted`] and [`insist`]
//! simply runs the body again.

use crate::connection::Connection;
use crate::error::{ErrorKind, RedisCallError};
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how patiently [`insist`] repeats its body
#[derive(Debug, Clone, PartialEq)]
pub struct InsistPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Error kinds worth another attempt, on top of aborted transactions
    pub retry_on: Vec<ErrorKind>,

    /// Delay before the first repeat; zero repeats immediately
    pub initial_delay: Duration,

    /// Delay cap
    pub max_delay: Duration,

    /// Growth factor applied per repeat
    pub backoff_multiplier: f64,
}

impl Default for InsistPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_on: Vec::new(),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 2.0,
        }
    }
}

impl InsistPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Also repeat on errors of `kind`
    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        if !self.retry_on.contains(&kind) {
            self.retry_on.push(kind);
        }
        self
    }

    /// Wait between attempts, growing from `initial` up to `max`
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max.max(initial);
        self
    }

    pub fn is_retryable(&self, error: &RedisCallError) -> bool {
        let kind = error.kind();
        kind == ErrorKind::TransactionAborted || self.retry_on.contains(&kind)
    }

    /// Delay before repeat number `repeat` (0-based)
    pub fn calculate_delay(&self, repeat: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        // Negative multipliers clamp to zero; non-finite ones keep the delay constant
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(0.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(repeat).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        Duration::from_secs_f64(secs.clamp(0.0, self.max_delay.as_secs_f64()))
    }
}

/// Run `body` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up; the last error is returned.
pub async fn insist<T, F>(
    conn: &mut Connection,
    policy: &InsistPolicy,
    mut body: F,
) -> Result<T, RedisCallError>
where
    F: for<'c> FnMut(&'c mut Connection) -> BoxFuture<'c, Result<T, RedisCallError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match body(&mut *conn).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && policy.is_retryable(&error) => {
                let delay = policy.calculate_delay(attempt - 1);
                debug!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Repeating after retryable error"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(error) => {
                if policy.is_retryable(&error) {
                    warn!(attempts = attempt, error = %error, "Giving up after repeated failures");
                }
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
