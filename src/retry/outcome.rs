//! Tagged results and the safe single-shot wrapper.

use std::future::Future;

use chrono::Utc;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::error;

use crate::error::{Classifier, NormalizedError, RawError};

/// Outcome of an operation, as handed back across a process boundary.
///
/// Serializes as `{"success": true, "data": ...}` or
/// `{"success": false, "error": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult<T> {
    /// The operation produced a value.
    Success(T),
    /// The operation failed; the error is already classified.
    Failure(NormalizedError),
}

impl<T> ActionResult<T> {
    /// Returns true for [`ActionResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success(_))
    }

    /// The value, if the operation succeeded.
    pub fn data(&self) -> Option<&T> {
        match self {
            ActionResult::Success(data) => Some(data),
            ActionResult::Failure(_) => None,
        }
    }

    /// The error, if the operation failed.
    pub fn error(&self) -> Option<&NormalizedError> {
        match self {
            ActionResult::Success(_) => None,
            ActionResult::Failure(error) => Some(error),
        }
    }

    /// Maps the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ActionResult<U> {
        match self {
            ActionResult::Success(data) => ActionResult::Success(f(data)),
            ActionResult::Failure(error) => ActionResult::Failure(error),
        }
    }

    /// Converts back into a `Result`.
    pub fn into_result(self) -> Result<T, NormalizedError> {
        self.into()
    }
}

impl<T> From<Result<T, NormalizedError>> for ActionResult<T> {
    fn from(result: Result<T, NormalizedError>) -> Self {
        match result {
            Ok(data) => ActionResult::Success(data),
            Err(error) => ActionResult::Failure(error),
        }
    }
}

impl<T> From<ActionResult<T>> for Result<T, NormalizedError> {
    fn from(result: ActionResult<T>) -> Self {
        match result {
            ActionResult::Success(data) => Ok(data),
            ActionResult::Failure(error) => Err(error),
        }
    }
}

impl<T: Serialize> Serialize for ActionResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ActionResult", 2)?;
        match self {
            ActionResult::Success(data) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
            }
            ActionResult::Failure(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

/// Runs `operation` once and turns any failure into a classified, logged
/// [`ActionResult::Failure`].
///
/// `context` names the call site in the log record.
pub async fn safe_execute<T, E, F, Fut>(operation: F, context: &str) -> ActionResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
{
    safe_execute_using(Classifier::shared(), operation, context).await
}

/// Same as [`safe_execute`] with an explicit classifier.
pub async fn safe_execute_using<T, E, F, Fut>(
    classifier: &Classifier,
    operation: F,
    context: &str,
) -> ActionResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RawError>,
{
    match operation().await {
        Ok(data) => ActionResult::Success(data),
        Err(failure) => {
            let original: RawError = failure.into();
            let normalized = classifier.classify(original.clone());
            error!(
                context,
                kind = %normalized.kind(),
                user_message = normalized.message(),
                code = normalized.code(),
                retryable = normalized.is_retryable(),
                original_error = ?original,
                timestamp = %Utc::now().to_rfc3339(),
                "Operation failed"
            );
            ActionResult::Failure(normalized)
        }
    }
}
