//! Degraded execution: fall back to another source or a reduced path.
//!
//! [`with_fallback`] and [`graceful_degrade`] share one control flow and differ
//! only in intent (another data source vs. less functionality). Neither retries.

use std::fmt::Display;
use std::future::Future;

use tracing::warn;

/// Runs `primary`; if it fails, runs `secondary` and returns its result.
///
/// A failure of `secondary` is returned as-is.
pub async fn with_fallback<T, E1, E2, P, PFut, S, SFut>(primary: P, secondary: S) -> Result<T, E2>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, E1>>,
    E1: Display,
    S: FnOnce() -> SFut,
    SFut: Future<Output = Result<T, E2>>,
{
    run_with_secondary("fallback", primary, secondary).await
}

/// Runs `primary`; if it fails, runs the reduced-functionality `degraded` path.
pub async fn graceful_degrade<T, E1, E2, P, PFut, D, DFut>(primary: P, degraded: D) -> Result<T, E2>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, E1>>,
    E1: Display,
    D: FnOnce() -> DFut,
    DFut: Future<Output = Result<T, E2>>,
{
    run_with_secondary("degraded", primary, degraded).await
}

async fn run_with_secondary<T, E1, E2, P, PFut, S, SFut>(
    path: &'static str,
    primary: P,
    secondary: S,
) -> Result<T, E2>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, E1>>,
    E1: Display,
    S: FnOnce() -> SFut,
    SFut: Future<Output = Result<T, E2>>,
{
    match primary().await {
        Ok(value) => Ok(value),
        Err(error) => {
            warn!(path, error = %error, "Primary operation failed, using secondary path");
            secondary().await
        }
    }
}
