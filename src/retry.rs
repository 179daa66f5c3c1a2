//! Exponential backoff for calls to unreliable external services.
//!
//! [`RetryPolicy::run`] wraps any async operation. Failures are classified by
//! the caller through [`Classify`]; only kinds listed in the policy's
//! retryable set are retried.
//!
//! # Backoff Strategy
//!
//! ```text
//! attempt 1 fails -> wait initial_delay
//! attempt 2 fails -> wait initial_delay * backoff_factor
//! ...
//! attempt max_attempts fails -> RetryError::Exhausted
//! ```
//!
//! With the defaults (3 attempts, 1s, factor 2.0) the waits are 1s and 2s.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::{Rng, rng};
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{error, warn};

/// Why an external call failed, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The service asked us to slow down (HTTP 429).
    RateLimited,
    /// The service is temporarily unavailable (HTTP 502/503/504).
    ServiceUnavailable,
    /// The request timed out.
    Timeout,
    /// The connection could not be established.
    Connection,
    /// Anything else. Never worth retrying.
    Permanent,
}

impl FailureKind {
    /// All kinds considered transient.
    pub const TRANSIENT: [FailureKind; 4] = [
        FailureKind::RateLimited,
        FailureKind::ServiceUnavailable,
        FailureKind::Timeout,
        FailureKind::Connection,
    ];
}

/// Classify an error into a [`FailureKind`].
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

/// Failure returned by [`RetryPolicy::run`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed with a kind outside the retryable set.
    #[error("non-retryable failure: {0}")]
    Permanent(#[source] E),

    /// Every attempt failed with a retryable kind. This is final for the call.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying error of the last attempt.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    /// Whether all attempts were used up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Retry configuration. Cheap to clone; holds no per-call state.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
    max_jitter: Duration,
    retry_on: HashSet<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::ZERO,
            retry_on: FailureKind::TRANSIENT.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total attempts including the first one. Values below 1 are treated as 1.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Multiplier applied to the delay after each wait. Must be finite and >= 1.
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = if factor.is_finite() && factor >= 1.0 {
            factor
        } else {
            1.0
        };
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Upper bound of the random delay added to each wait. Zero disables jitter.
    pub fn max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Replace the set of failure kinds that are retried.
    pub fn retry_on(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        self.retry_on.contains(&kind)
    }

    fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = self.max_jitter.as_millis() as u64;
        Duration::from_millis(rng().random_range(0..=max_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `operation` only names the call in log lines.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let total_t0 = Instant::now();
        let mut delay = self.initial_delay.min(self.max_delay);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let e = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let kind = e.failure_kind();
            if !self.is_retryable(kind) {
                warn!(operation, attempt, ?kind, error = %e, "non-retryable failure");
                return Err(RetryError::Permanent(e));
            }

            if attempt >= self.max_attempts {
                error!(
                    operation,
                    attempt,
                    max = self.max_attempts,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    ?kind,
                    error = %e,
                    "final failure; retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: e,
                });
            }

            let wait = delay + self.jitter();
            warn!(
                operation,
                attempt,
                max = self.max_attempts,
                ?kind,
                ?wait,
                error = %e,
                "attempt failed; backing off"
            );
            sleep(wait).await;
            delay = self.next_delay(delay);
        }
    }
}
