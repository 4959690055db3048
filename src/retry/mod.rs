//! Retry engine with exponential backoff.
//!
//! [`with_retry`] runs a fallible async operation, classifies each failure and
//! retries only failures the classifier marks retryable. Attempts are strictly
//! sequential; the only suspension points are the operation itself and the
//! backoff sleep between attempts.
//!
//! Two entry-point shapes share the same loop: [`with_retry`] returns a
//! `Result` for `?`-style propagation, [`retry_with_backoff`] returns an
//! [`ActionResult`] for call sites that hand the outcome to a client.

pub mod fallback;
pub mod outcome;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Classifier, NormalizedError, RawError};

pub use fallback::{graceful_degrade, with_fallback};
pub use outcome::{safe_execute, safe_execute_using, ActionResult};

/// Base delay used by [`retry_with_backoff`].
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Configuration for retry behavior with exponential backoff.
///
/// The delay before attempt `n` (the first retry is attempt 2) is
/// `base_delay * 2^(n - 2)`, optionally capped at `max_delay`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values below 1 act as 1.
    /// Default: 3
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    /// Default: 1000
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Time limit for a single attempt, in milliseconds.
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: None,
            attempt_timeout_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with the given attempt budget and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: millis(base_delay),
            max_delay_ms: None,
            attempt_timeout_ms: None,
        }
    }

    /// Caps every delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = Some(millis(max_delay));
        self
    }

    /// Fails an attempt that runs longer than `timeout` with a retryable timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = Some(millis(timeout));
        self
    }

    /// Total attempts allowed, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the first retry.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Per-attempt time limit, if any.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// Calculates the delay to wait before the given attempt (1-based).
    ///
    /// Attempt 1 runs immediately; attempt 2 waits `base_delay`, attempt 3
    /// waits twice that, and so on.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let multiplier = 2u64.saturating_pow(attempt - 2);
        let delay_millis = self.base_delay_ms.saturating_mul(multiplier);
        let capped_millis = match self.max_delay_ms {
            Some(max) => delay_millis.min(max),
            None => delay_millis,
        };
        Duration::from_millis(capped_millis)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent.
///
/// Failures are classified with the process-wide default [`Classifier`].
/// The last classified error is returned when retries are exhausted.
pub async fn with_retry<T, E, F, Fut>(operation: F, policy: &RetryPolicy) -> Result<T, NormalizedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
{
    with_retry_using(Classifier::shared(), operation, policy).await
}

/// Same as [`with_retry`] with an explicit classifier.
pub async fn with_retry_using<T, E, F, Fut>(
    classifier: &Classifier,
    mut operation: F,
    policy: &RetryPolicy,
) -> Result<T, NormalizedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        let error = match run_attempt(&mut operation, policy).await {
            Ok(value) => return Ok(value),
            Err(raw) => classifier.classify(raw),
        };

        if !error.is_retryable() {
            debug!(attempt, kind = %error.kind(), "Non-retryable failure, giving up");
            return Err(error);
        }
        if attempt >= max_attempts {
            warn!(attempt, kind = %error.kind(), "Retry attempts exhausted");
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt + 1);
        warn!(
            attempt,
            max_attempts,
            delay_ms = millis(delay),
            kind = %error.kind(),
            "Retryable failure, backing off"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}

async fn run_attempt<T, E, F, Fut>(operation: &mut F, policy: &RetryPolicy) -> Result<T, RawError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
{
    match policy.attempt_timeout() {
        Some(limit) => match tokio::time::timeout(limit, operation()).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(RawError::Timeout(format!(
                "attempt exceeded {}ms",
                limit.as_millis()
            ))),
        },
        None => operation().await.map_err(Into::into),
    }
}

/// Like [`with_retry`], but stops as soon as `cancel` completes.
///
/// Cancellation abandons the in-flight attempt or backoff sleep and fails with
/// a non-retryable `Unknown` error carrying the `CANCELLED` code.
pub async fn with_retry_cancellable<T, E, F, Fut, C>(
    operation: F,
    policy: &RetryPolicy,
    cancel: C,
) -> Result<T, NormalizedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
    C: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = cancel => {
            debug!("Retry loop cancelled");
            Err(Classifier::shared().classify(RawError::Cancelled))
        }
        result = with_retry(operation, policy) => result,
    }
}

/// Retries with [`DEFAULT_BASE_DELAY`] and returns a tagged result instead of an error.
pub async fn retry_with_backoff<T, E, F, Fut>(operation: F, max_attempts: u32) -> ActionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
{
    let policy = RetryPolicy::new(max_attempts, DEFAULT_BASE_DELAY);
    with_retry(operation, &policy).await.into()
}
