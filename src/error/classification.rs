//! Normalized error types for the resilience layer
//!
//! Every failure that crosses this crate's boundary is described by a
//! [`NormalizedError`]: one [`ErrorKind`] out of a closed set, a message that is
//! safe to show an end user, and optional diagnostics. Whether the failure is
//! worth retrying is decided by the classifier and cannot be set by callers.

use serde::Serialize;
use serde_json::Value;

/// The kind of a normalized error. This is the only vocabulary exposed to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Input failed validation (per-field issues in `details`).
    Validation,
    /// The caller is not signed in or the session is invalid.
    Authentication,
    /// The caller is signed in but not allowed to do this.
    Authorization,
    /// The requested resource does not exist.
    NotFound,
    /// Connectivity problems, timeouts and unavailable services.
    Network,
    /// Errors reported by the database service.
    Database,
    /// The dependency is throttling us.
    RateLimit,
    /// Nothing recognizable.
    Unknown,
}

impl ErrorKind {
    /// Returns the stable wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Authentication => "AUTHENTICATION",
            ErrorKind::Authorization => "AUTHORIZATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Network => "NETWORK",
            ErrorKind::Database => "DATABASE",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error with kind, user-facing message, diagnostics and retryability.
///
/// Values are only produced by the [`Classifier`](super::Classifier); the fields are
/// read through accessors so `retryable` always reflects the classification rules.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
    kind: ErrorKind,
    message: String,
    code: Option<String>,
    details: Option<Value>,
    retryable: bool,
}

impl NormalizedError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            details: None,
            retryable,
        }
    }

    pub(crate) fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub(crate) fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub(crate) fn with_optional_details(mut self, details: Option<Value>) -> Self {
        self.details = details;
        self
    }

    /// The error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message that is safe to display to an end user.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Code reported by the originating system, if any.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Structured diagnostics (validation issues, raw payloads).
    ///
    /// Meant for logs; review before surfacing in a UI.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Returns true if repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl std::fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for NormalizedError {}
