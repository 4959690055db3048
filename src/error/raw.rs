//! Raw failure shapes recognized by the classifier
//!
//! Each dependency reports failures differently: the validation layer returns
//! per-field issues, the database service returns a code/message pair, the HTTP
//! client returns status codes and transport errors. [`RawError`] is the closed
//! set of shapes we understand. Anything else ends up in [`RawError::Value`].

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::NormalizedError;
use crate::breaker::CircuitOpen;

/// One per-field issue reported by input validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// Path to the offending field, e.g. `["deadline"]` or `["links", "0", "url"]`.
    pub path: Vec<String>,
    /// Human-readable description of the problem.
    pub message: String,
    /// Validator-specific code such as `too_small`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FieldIssue {
    /// Creates an issue for a single top-level field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: vec![field.into()],
            message: message.into(),
            code: None,
        }
    }

    /// Sets the validator code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Error reported by the database service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseError {
    /// Origin error code (`PGRST116`, `23505`, `08006`, ...).
    pub code: Option<String>,
    /// Origin message.
    pub message: String,
    /// Extra detail text.
    pub details: Option<String>,
    /// Hint text.
    pub hint: Option<String>,
}

impl DatabaseError {
    /// Creates a database error from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    /// Sets the detail text.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Sets the hint text.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A failure as observed at its origin, before classification.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RawError {
    /// Input validation failed.
    #[error("validation failed with {} issue(s)", .0.len())]
    Validation(Vec<FieldIssue>),

    /// The database service returned an error.
    #[error("database error: {0}")]
    Database(DatabaseError),

    /// An HTTP dependency answered with an error status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never reached the dependency.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// The request or an attempt exceeded its time limit.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A circuit breaker rejected the call without running it.
    #[error("{0}")]
    CircuitOpen(CircuitOpen),

    /// The caller gave up waiting.
    #[error("operation cancelled")]
    Cancelled,

    /// Already classified; passes through unchanged.
    #[error("{0}")]
    Classified(NormalizedError),

    /// An error with nothing but a message.
    #[error("{0}")]
    Error(String),

    /// A value that does not look like an error at all.
    #[error("unrecognized error value: {0}")]
    Value(Value),
}

impl RawError {
    /// Shorthand for a database error.
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        RawError::Database(DatabaseError::new(code, message))
    }

    /// Shorthand for a message-only error.
    pub fn message(message: impl Into<String>) -> Self {
        RawError::Error(message.into())
    }

    /// Decodes a JSON error payload into the closed set of recognized shapes.
    ///
    /// Objects are matched in this order: an `issues` array (validation), a
    /// string `code` with a string `message` (database), a numeric `status`
    /// (HTTP), a string `code` alone (database, message left empty), a
    /// `TypeError` mentioning fetch (transport), any string `message`.
    /// Everything else, including bare strings and numbers, stays a
    /// [`RawError::Value`].
    pub fn from_json(value: Value) -> Self {
        let Value::Object(object) = &value else {
            return RawError::Value(value);
        };

        if let Some(issues) = decode_issues(object) {
            return RawError::Validation(issues);
        }

        let message = object.get("message").and_then(Value::as_str);

        if let (Some(code), Some(message)) = (object.get("code").and_then(Value::as_str), message)
        {
            return RawError::Database(DatabaseError {
                code: Some(code.to_string()),
                message: message.to_string(),
                details: object.get("details").and_then(text_of),
                hint: object.get("hint").and_then(text_of),
            });
        }

        if let Some(status) = object.get("status").and_then(Value::as_u64) {
            if let Ok(status) = u16::try_from(status) {
                return RawError::Http {
                    status,
                    message: message.unwrap_or_default().to_string(),
                };
            }
        }

        // A bare code is still a database error; the classifier fills in the message.
        if let Some(code) = object.get("code").and_then(Value::as_str) {
            return RawError::Database(DatabaseError {
                code: Some(code.to_string()),
                message: String::new(),
                details: object.get("details").and_then(text_of),
                hint: object.get("hint").and_then(text_of),
            });
        }

        match message {
            Some(message) => {
                let name = object.get("name").and_then(Value::as_str).unwrap_or("");
                if name == "TypeError" && message.to_ascii_lowercase().contains("fetch") {
                    RawError::FetchFailed(message.to_string())
                } else {
                    RawError::Error(message.to_string())
                }
            }
            None => RawError::Value(value),
        }
    }
}

fn decode_issues(object: &Map<String, Value>) -> Option<Vec<FieldIssue>> {
    let issues = object.get("issues")?.as_array()?;
    let mut decoded = Vec::with_capacity(issues.len());
    for issue in issues {
        let message = issue.get("message")?.as_str()?;
        let path = issue
            .get("path")
            .and_then(Value::as_array)
            .map(|segments| segments.iter().filter_map(text_of).collect())
            .unwrap_or_default();
        decoded.push(FieldIssue {
            path,
            message: message.to_string(),
            code: issue.get("code").and_then(Value::as_str).map(str::to_string),
        });
    }
    Some(decoded)
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

impl From<Value> for RawError {
    fn from(value: Value) -> Self {
        RawError::from_json(value)
    }
}

impl From<NormalizedError> for RawError {
    fn from(error: NormalizedError) -> Self {
        RawError::Classified(error)
    }
}

impl From<DatabaseError> for RawError {
    fn from(error: DatabaseError) -> Self {
        RawError::Database(error)
    }
}

impl From<CircuitOpen> for RawError {
    fn from(open: CircuitOpen) -> Self {
        RawError::CircuitOpen(open)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::Error(message)
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::Error(message.to_string())
    }
}

impl From<std::io::Error> for RawError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        match error.kind() {
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe
            | Io::AddrNotAvailable => RawError::FetchFailed(error.to_string()),
            Io::TimedOut => RawError::Timeout(error.to_string()),
            _ => RawError::Error(error.to_string()),
        }
    }
}

impl From<reqwest::Error> for RawError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return RawError::Timeout(error.to_string());
        }
        if error.is_connect() {
            return RawError::FetchFailed(error.to_string());
        }
        match error.status() {
            Some(status) => RawError::Http {
                status: status.as_u16(),
                message: error.to_string(),
            },
            None => RawError::Error(error.to_string()),
        }
    }
}
