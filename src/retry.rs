//! Bounded retries with exponential backoff and jitter.
//!
//! [`RetryPolicy::next_delay`] holds every decision. The async and blocking
//! drivers below only differ in how they wait.

use crate::error::Error;
use crate::request::RequestSpec;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry configuration. Read-only once a client is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max: Duration,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    Retry(Duration),
    /// The error is final; return it unchanged.
    Fail,
    /// The error was retryable but the attempt cap is reached.
    Exhausted,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(30))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; values below 1 are raised to 1.
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max: max.max(base),
        }
    }

    /// Maximum attempts, counting the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Exponential part of the delay before retry `retry` (1-based):
    /// `min(base * 2^(retry-1), max)`.
    pub fn exponential_delay(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << shift).min(self.max)
    }

    /// Full delay before retry `retry`: the exponential part plus jitter in `[0, base)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base_nanos = u64::try_from(self.base.as_nanos()).unwrap_or(u64::MAX);
        let jitter = if base_nanos == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(fastrand::u64(0..base_nanos))
        };
        self.exponential_delay(retry) + jitter
    }

    /// Decide what follows failed attempt number `attempt` (1-based).
    ///
    /// Only transport failures, 5xx and 429 are retried, and never for a request
    /// that is unsafe to repeat (POST/PATCH without an idempotency key).
    /// A server `Retry-After` hint replaces the computed delay.
    pub fn next_delay(&self, spec: &RequestSpec, attempt: u32, error: &Error) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Fail;
        }

        if !spec.is_retry_safe() {
            return RetryDecision::Fail;
        }

        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }

        RetryDecision::Retry(error.retry_after().unwrap_or_else(|| self.backoff(attempt)))
    }
}

/// Run `op` until it succeeds or the policy gives up.
///
/// The token, if given, is observed while an attempt is in flight and while
/// sleeping between attempts.
pub(crate) async fn run<F, Fut, T>(
    policy: &RetryPolicy,
    spec: &RequestSpec,
    cancel: Option<&CancellationToken>,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(method = %spec.method(), path = spec.path(), attempt, "sending request");

        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(Error::Cancelled),
                r = op() => r,
            },
            None => op().await,
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let delay = settle(policy, spec, attempt, error)?;

        match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return Err(Error::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}

/// Blocking counterpart of [`run`].
pub(crate) fn run_blocking<F, T>(policy: &RetryPolicy, spec: &RequestSpec, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Result<T, Error>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(method = %spec.method(), path = spec.path(), attempt, "sending request");

        let error = match op() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let delay = settle(policy, spec, attempt, error)?;
        std::thread::sleep(delay);
    }
}

/// Turn a failed attempt into either a delay or the error to surface.
fn settle(
    policy: &RetryPolicy,
    spec: &RequestSpec,
    attempt: u32,
    error: Error,
) -> Result<Duration, Error> {
    match policy.next_delay(spec, attempt, &error) {
        RetryDecision::Retry(delay) => {
            warn!(
                path = spec.path(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying request"
            );
            Ok(delay)
        }
        RetryDecision::Fail => Err(error),
        RetryDecision::Exhausted => {
            warn!(path = spec.path(), attempts = attempt, error = %error, "retries exhausted");
            Err(Error::RetryExhausted {
                attempts: attempt,
                source: Box::new(error),
            })
        }
    }
}
