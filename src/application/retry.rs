//! Bounded retry with exponential backoff for remote calls.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::infrastructure::error::{RemoteError, RemoteResult};

/// Retry policy for calls to remote collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total calls, including the first one
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 2000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps; same attempt count as the default.
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed; attempt 0 is the first call).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

/// Outcome of one call, as seen by the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Success(T),
    /// Worth another try, after `retry_after` if the server said so
    Throttled {
        retry_after: Option<Duration>,
        cause: RemoteError,
    },
    Failed(RemoteError),
}

impl<T> From<RemoteResult<T>> for Attempt<T> {
    fn from(result: RemoteResult<T>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(e) if e.is_retryable() => Attempt::Throttled {
                retry_after: e.retry_after(),
                cause: e,
            },
            Err(e) => Attempt::Failed(e),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy's attempts run out.
///
/// On exhaustion the last retryable error is returned.
pub fn with_retry<T, F>(policy: &RetryPolicy, label: &str, mut op: F) -> RemoteResult<T>
where
    F: FnMut() -> RemoteResult<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match Attempt::from(op()) {
            Attempt::Success(value) => return Ok(value),
            Attempt::Failed(e) => return Err(e),
            Attempt::Throttled { retry_after, cause } => {
                attempt += 1;
                if attempt >= max_attempts {
                    warn!("{label}: giving up after {attempt} attempts: {cause}");
                    return Err(cause);
                }
                let delay = retry_after.unwrap_or_else(|| policy.delay_for_attempt(attempt));
                debug!("{label}: {cause}; retry {attempt}/{} in {delay:?}", max_attempts - 1);
                pause(delay);
            }
        }
    }
}

/// Sleep for `delay`; zero is a no-op.
pub fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
