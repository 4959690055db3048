//! Steadfast - error normalization, retries and circuit breaking for
//! services that depend on unreliable backends.
//!
//! The crate has three cooperating parts:
//!
//! - [`error`]: turns any failure into a [`NormalizedError`] with one of eight
//!   kinds, a user-safe message and a retryability flag.
//! - [`retry`]: re-runs an async operation with exponential backoff while its
//!   classified failures are retryable, plus fallback and safe wrappers.
//! - [`breaker`]: per-dependency circuit breakers that stop calling a failing
//!   dependency for a cooldown period.
//!
//! ```no_run
//! use steadfast::{config::ResilienceConfig, retry::with_retry, RawError, DATABASE};
//!
//! # async fn fetch_tasks() -> Result<Vec<String>, RawError> { Ok(vec![]) }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ResilienceConfig::from_env()?;
//! let registry = config.registry();
//! let database = registry.get(DATABASE).ok_or("no database breaker")?;
//!
//! let tasks = with_retry(|| database.execute(fetch_tasks), &config.retry).await?;
//! println!("{} tasks", tasks.len());
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

pub use breaker::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker,
    CircuitOpen, AI_GENERATION, DATABASE,
};
pub use error::{classify, Classifier, ErrorKind, NormalizedError, RawError};
pub use retry::{
    graceful_degrade, retry_with_backoff, safe_execute, with_fallback, with_retry, ActionResult,
    RetryPolicy,
};
