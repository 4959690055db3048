//! Circuit breaker for unreliable dependencies.
//!
//! One [`CircuitBreaker`] guards one named dependency (the database service,
//! the AI generation service) for the lifetime of the process. It counts
//! consecutive failures and, once the threshold is reached, rejects calls
//! without running them until a cooldown has passed. The first call after the
//! cooldown is a trial: success closes the breaker, failure re-opens it.
//!
//! ```text
//! Closed --(failures >= threshold)--> Open
//! Open --(cooldown elapsed, next call)--> HalfOpen
//! HalfOpen --(trial succeeds)--> Closed
//! HalfOpen --(trial fails)--> Open
//! ```

pub mod registry;

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::RawError;

pub use registry::{BreakerRegistry, AI_GENERATION, DATABASE};

/// Settings for a single breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    /// Default: 5
    pub failure_threshold: u32,
    /// Time after the last failure before a trial call is allowed, in milliseconds.
    /// Default: 60000
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 60_000,
        }
    }
}

impl BreakerConfig {
    /// Creates a breaker configuration.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown_ms: u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The cooldown as a duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls pass through.
    #[default]
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// A single trial call is in flight.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Rejection returned while a breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{dependency} is temporarily unavailable (circuit open, retry in {}ms)", .retry_after.as_millis())]
pub struct CircuitOpen {
    /// Name of the guarded dependency.
    pub dependency: String,
    /// Time left until a trial call will be admitted.
    pub retry_after: Duration,
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without running the operation.
    #[error("{0}")]
    Open(#[from] CircuitOpen),
    /// The operation ran and failed; the error is passed through untouched.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Returns true if this is a fast-fail rejection.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }

    /// Returns the operation's own error, if the operation ran.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            BreakerError::Open(_) => None,
            BreakerError::Operation(error) => Some(error),
        }
    }
}

impl<E: Into<RawError>> From<BreakerError<E>> for RawError {
    fn from(error: BreakerError<E>) -> Self {
        match error {
            BreakerError::Open(open) => RawError::CircuitOpen(open),
            BreakerError::Operation(error) => error.into(),
        }
    }
}

/// Point-in-time view of a breaker, for monitoring and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    /// Dependency name.
    pub name: String,
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures.
    pub failures: u32,
    /// Monotonic time of the most recent failure.
    #[serde(skip)]
    pub last_failure_time: Option<Instant>,
    /// Wall-clock time of the most recent failure.
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct BreakerRecord {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

/// How a call got past the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Circuit breaker guarding one dependency.
///
/// The record is updated under a short lock before and after the operation;
/// the lock is never held while the operation runs.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    record: Mutex<BreakerRecord>,
}

impl CircuitBreaker {
    /// Creates a closed breaker with zero failures.
    ///
    /// A threshold of zero is treated as one.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let config = BreakerConfig {
            failure_threshold: config.failure_threshold.max(1),
            ..config
        };
        Self {
            name: name.into(),
            config,
            record: Mutex::new(BreakerRecord::default()),
        }
    }

    /// Name of the guarded dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker's settings.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Runs `operation` through the breaker.
    ///
    /// While open and cooling down the operation is not invoked and
    /// [`BreakerError::Open`] is returned. Otherwise the operation runs and its
    /// error, if any, comes back unchanged in [`BreakerError::Operation`].
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let outcome = operation().await;
        guard.armed = false;

        match outcome {
            Ok(value) => {
                self.record_success(admission);
                Ok(value)
            }
            Err(error) => {
                self.record_failure(admission);
                Err(BreakerError::Operation(error))
            }
        }
    }

    /// Returns a snapshot of the breaker without changing it.
    pub fn state(&self) -> BreakerSnapshot {
        let record = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: record.state,
            failures: record.consecutive_failures,
            last_failure_time: record.last_failure,
            last_failure_at: record.last_failure_at,
        }
    }

    /// Returns just the current state.
    pub fn current_state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, BreakerRecord> {
        // The record is always left consistent, so a poisoned lock is still usable.
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<Admission, CircuitOpen> {
        let mut record = self.lock();
        match record.state {
            BreakerState::Closed => Ok(Admission::Normal),
            BreakerState::HalfOpen => {
                debug!(dependency = %self.name, "Rejecting call while trial is in flight");
                Err(self.rejection(Duration::ZERO))
            }
            BreakerState::Open => {
                let cooldown = self.config.cooldown();
                let elapsed = record
                    .last_failure
                    .map_or(cooldown, |at| Instant::now().saturating_duration_since(at));

                if elapsed < cooldown {
                    debug!(
                        dependency = %self.name,
                        remaining_ms = (cooldown - elapsed).as_millis() as u64,
                        "Circuit open, rejecting call"
                    );
                    return Err(self.rejection(cooldown - elapsed));
                }

                record.state = BreakerState::HalfOpen;
                info!(dependency = %self.name, "Cooldown elapsed, admitting trial call");
                Ok(Admission::Trial)
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut record = self.lock();
        match admission {
            Admission::Trial => {
                record.state = BreakerState::Closed;
                record.consecutive_failures = 0;
                info!(dependency = %self.name, "Trial call succeeded, circuit closed");
            }
            // A call admitted before the breaker opened does not close it.
            Admission::Normal if record.state == BreakerState::Closed => {
                record.consecutive_failures = 0;
            }
            Admission::Normal => {}
        }
    }

    fn record_failure(&self, admission: Admission) {
        let mut record = self.lock();
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.last_failure = Some(Instant::now());
        record.last_failure_at = Some(Utc::now());

        match admission {
            Admission::Trial => {
                record.state = BreakerState::Open;
                warn!(
                    dependency = %self.name,
                    failures = record.consecutive_failures,
                    "Trial call failed, circuit re-opened"
                );
            }
            Admission::Normal
                if record.state == BreakerState::Closed
                    && record.consecutive_failures >= self.config.failure_threshold =>
            {
                record.state = BreakerState::Open;
                warn!(
                    dependency = %self.name,
                    failures = record.consecutive_failures,
                    cooldown_ms = self.config.cooldown_ms,
                    "Failure threshold reached, circuit opened"
                );
            }
            Admission::Normal => {
                debug!(
                    dependency = %self.name,
                    failures = record.consecutive_failures,
                    "Recorded failure"
                );
            }
        }
    }

    fn rejection(&self, retry_after: Duration) -> CircuitOpen {
        CircuitOpen {
            dependency: self.name.clone(),
            retry_after,
        }
    }
}

/// Puts an abandoned trial back to `Open` so the next caller can try again.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut record = self.breaker.lock();
        if record.state == BreakerState::HalfOpen {
            record.state = BreakerState::Open;
            debug!(dependency = %self.breaker.name, "Trial call abandoned, circuit open");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_breaker() -> CircuitBreaker {
        CircuitBreaker::new("database", BreakerConfig::new(5, Duration::from_secs(60)))
    }

    async fn fail(breaker: &CircuitBreaker) -> BreakerError<RawError> {
        breaker
            .execute(|| async { Err::<(), _>(RawError::message("boom")) })
            .await
            .unwrap_err()
    }

    async fn open_breaker(breaker: &CircuitBreaker) {
        for _ in 0..breaker.config().failure_threshold {
            fail(breaker).await;
        }
        assert_eq!(breaker.current_state(), BreakerState::Open);
    }

    #[test]
    fn test_default_config() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown(), Duration::from_secs(60));
    }

    #[test]
    fn test_new_breaker_is_closed() {
        let snapshot = test_breaker().state();
        assert_eq!(snapshot.name, "database");
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.failures, 0);
        assert!(snapshot.last_failure_time.is_none());
        assert!(snapshot.last_failure_at.is_none());
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let breaker = CircuitBreaker::new("ai_generation", BreakerConfig::new(0, Duration::ZERO));
        assert_eq!(breaker.config().failure_threshold, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_passes_value_through() {
        let breaker = test_breaker();
        let value = breaker
            .execute(|| async { Ok::<_, RawError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(breaker.state().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_passed_through_unchanged() {
        let breaker = test_breaker();
        let error = fail(&breaker).await;

        assert!(!error.is_open());
        assert_eq!(error.into_operation_error(), Some(RawError::message("boom")));
        assert_eq!(breaker.state().failures, 1);
        assert_eq!(breaker.current_state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breaker = test_breaker();
        fail(&breaker).await;
        fail(&breaker).await;
        breaker
            .execute(|| async { Ok::<_, RawError>(()) })
            .await
            .unwrap();

        assert_eq!(breaker.state().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let breaker = test_breaker();
        for _ in 0..4 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.current_state(), BreakerState::Closed);

        fail(&breaker).await;
        let snapshot = breaker.state();
        assert_eq!(snapshot.state, BreakerState::Open);
        assert_eq!(snapshot.failures, 5);
        assert!(snapshot.last_failure_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_does_not_run_operation() {
        let breaker = test_breaker();
        open_breaker(&breaker).await;
        tokio::time::advance(Duration::from_secs(20)).await;

        let calls = AtomicU32::new(0);
        let error = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RawError>(())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match error {
            BreakerError::Open(open) => {
                assert_eq!(open.dependency, "database");
                assert_eq!(open.retry_after, Duration::from_secs(40));
            }
            BreakerError::Operation(_) => panic!("Expected Open variant"),
        }
        assert_eq!(breaker.state().failures, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_success_closes() {
        let breaker = test_breaker();
        open_breaker(&breaker).await;
        tokio::time::advance(Duration::from_secs(60)).await;

        let value = breaker
            .execute(|| async { Ok::<_, RawError>("ok") })
            .await
            .unwrap();

        assert_eq!(value, "ok");
        let snapshot = breaker.state();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_failure_reopens_and_refreshes_timestamp() {
        let breaker = test_breaker();
        open_breaker(&breaker).await;
        let opened_at = breaker.state().last_failure_time.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let error = fail(&breaker).await;
        assert!(!error.is_open());

        let snapshot = breaker.state();
        assert_eq!(snapshot.state, BreakerState::Open);
        assert!(snapshot.failures >= 5);
        assert!(snapshot.last_failure_time.unwrap() > opened_at);

        let calls = AtomicU32::new(0);
        let error = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RawError>(())
            })
            .await
            .unwrap_err();
        assert!(error.is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_trial_in_flight() {
        let breaker = Arc::new(test_breaker());
        open_breaker(&breaker).await;
        tokio::time::advance(Duration::from_secs(60)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let breaker = Arc::clone(&breaker);
            tokio::spawn(async move {
                breaker
                    .execute(|| async move {
                        let _ = wait.await;
                        Ok::<_, RawError>(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(breaker.current_state(), BreakerState::HalfOpen);

        let concurrent = breaker
            .execute(|| async { Ok::<_, RawError>(()) })
            .await
            .unwrap_err();
        assert!(concurrent.is_open());

        release.send(()).unwrap();
        trial.await.unwrap().unwrap();
        assert_eq!(breaker.current_state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_returns_to_open() {
        let breaker = test_breaker();
        open_breaker(&breaker).await;
        tokio::time::advance(Duration::from_secs(60)).await;

        let trial = breaker.execute(|| std::future::pending::<Result<(), RawError>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), trial).await;
        assert!(timed_out.is_err());

        assert_eq!(breaker.current_state(), BreakerState::Open);
        // The cooldown is still measured from the last real failure.
        let value = breaker
            .execute(|| async { Ok::<_, RawError>(1) })
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(breaker.current_state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_error_into_raw_error() {
        let breaker = test_breaker();
        open_breaker(&breaker).await;

        let rejected = breaker
            .execute(|| async { Ok::<_, RawError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(RawError::from(rejected), RawError::CircuitOpen(_)));

        let failed = BreakerError::Operation(RawError::message("boom"));
        assert_eq!(RawError::from(failed), RawError::message("boom"));
    }

    #[test]
    fn test_circuit_open_display() {
        let open = CircuitOpen {
            dependency: "ai_generation".to_string(),
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(
            open.to_string(),
            "ai_generation is temporarily unavailable (circuit open, retry in 1500ms)"
        );
    }

    #[test]
    fn test_breaker_state_display() {
        assert_eq!(BreakerState::Closed.to_string(), "closed");
        assert_eq!(BreakerState::Open.to_string(), "open");
        assert_eq!(BreakerState::HalfOpen.to_string(), "half_open");
    }
}
