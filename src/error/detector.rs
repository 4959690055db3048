//! Error classifier
//!
//! Turns a [`RawError`] into a [`NormalizedError`] using an explicit decision
//! table. Structured shapes (validation issues, database errors, HTTP statuses,
//! transport failures) are matched first; message-only errors are then run
//! through an ordered list of regex patterns. Classification never fails: an
//! unrecognized input becomes [`ErrorKind::Unknown`].

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{DatabaseError, ErrorKind, NormalizedError, RawError};

/// Message used for values that do not look like errors.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Code attached to breaker fast-fail rejections.
pub const CIRCUIT_OPEN_CODE: &str = "CIRCUIT_OPEN";

/// Code attached to cancelled operations.
pub const CANCELLED_CODE: &str = "CANCELLED";

/// A pattern for classifying message-only errors.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    /// The compiled regex pattern.
    regex: Regex,
    /// The kind to assign when this pattern matches.
    kind: ErrorKind,
    /// The user-facing message to report instead of the raw text.
    message: String,
    /// Whether errors matching this pattern are worth retrying.
    retryable: bool,
}

impl ErrorPattern {
    /// Creates a new error pattern.
    ///
    /// # Panics
    /// Panics if the regex pattern is invalid. Use [`ErrorPattern::with_regex`]
    /// for patterns that come from user input.
    pub fn new(pattern: &str, kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self::with_regex(
            Regex::new(pattern).expect("Invalid regex pattern"),
            kind,
            message,
            retryable,
        )
    }

    /// Creates a new error pattern with a pre-compiled regex.
    pub fn with_regex(
        regex: Regex,
        kind: ErrorKind,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            regex,
            kind,
            message: message.into(),
            retryable,
        }
    }

    /// Returns the regex pattern.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Returns the kind assigned on match.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the user-facing message assigned on match.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Checks if this pattern matches the given text.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    fn to_error(&self) -> NormalizedError {
        NormalizedError::new(self.kind, self.message.clone(), self.retryable)
    }
}

/// Which database errors count as "not found" and which are transient.
///
/// The defaults cover the PostgREST not-found sentinel and the PostgreSQL
/// connection-exception and shutdown codes. Deployments extend the lists from
/// configuration instead of patching the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseErrorPolicy {
    /// Codes meaning "no rows matched".
    pub not_found_codes: Vec<String>,
    /// Codes that indicate a transient condition.
    pub transient_codes: Vec<String>,
    /// Code prefixes (SQLSTATE classes) that indicate a transient condition.
    pub transient_code_prefixes: Vec<String>,
    /// Case-insensitive message fragments that indicate a transient condition.
    pub transient_messages: Vec<String>,
}

impl Default for DatabaseErrorPolicy {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|item| item.to_string()).collect()
        }

        Self {
            not_found_codes: owned(&["PGRST116"]),
            transient_codes: owned(&[
                "PGRST000", // could not connect to the database
                "PGRST001", // internal connection error
                "PGRST002", // schema cache unavailable
                "53300",    // too_many_connections
                "57014",    // query_canceled (statement timeout)
                "57P01",    // admin_shutdown
                "57P03",    // cannot_connect_now
                "40001",    // serialization_failure
                "40P01",    // deadlock_detected
            ]),
            transient_code_prefixes: owned(&["08"]),
            transient_messages: owned(&[
                "connection",
                "timeout",
                "timed out",
                "econnrefused",
                "econnreset",
                "network",
            ]),
        }
    }
}

impl DatabaseErrorPolicy {
    /// Returns true if the code is a not-found sentinel.
    pub fn is_not_found(&self, code: Option<&str>) -> bool {
        code.is_some_and(|code| self.not_found_codes.iter().any(|known| known == code))
    }

    /// Returns true if the code or message indicates a transient condition.
    pub fn is_transient(&self, code: Option<&str>, message: &str) -> bool {
        if let Some(code) = code {
            if self.transient_codes.iter().any(|known| known == code)
                || self
                    .transient_code_prefixes
                    .iter()
                    .any(|prefix| code.starts_with(prefix.as_str()))
            {
                return true;
            }
        }

        let message = message.to_lowercase();
        self.transient_messages
            .iter()
            .any(|fragment| message.contains(&fragment.to_lowercase()))
    }
}

/// Classifies raw failures into normalized errors.
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Database not-found and transient tables.
    database: DatabaseErrorPolicy,
    /// Message patterns, in priority order.
    patterns: Vec<ErrorPattern>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Creates a classifier with the default database policy and message patterns.
    pub fn new() -> Self {
        Self {
            database: DatabaseErrorPolicy::default(),
            patterns: Self::default_patterns(),
        }
    }

    /// Returns the process-wide classifier with default settings.
    pub fn shared() -> &'static Classifier {
        static SHARED: OnceLock<Classifier> = OnceLock::new();
        SHARED.get_or_init(Classifier::new)
    }

    /// Replaces the database policy.
    pub fn with_database_policy(mut self, policy: DatabaseErrorPolicy) -> Self {
        self.database = policy;
        self
    }

    /// Replaces the message patterns.
    pub fn with_patterns(mut self, patterns: Vec<ErrorPattern>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Appends a message pattern after the existing ones.
    pub fn add_pattern(&mut self, pattern: ErrorPattern) {
        self.patterns.push(pattern);
    }

    /// Returns the database policy.
    pub fn database_policy(&self) -> &DatabaseErrorPolicy {
        &self.database
    }

    /// Returns the number of message patterns configured.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn default_patterns() -> Vec<ErrorPattern> {
        vec![
            ErrorPattern::new(
                r"(?i)timeout|timed[\s\-]?out|\btime[\s\-]out\b",
                ErrorKind::Network,
                "Request timed out",
                true,
            ),
            ErrorPattern::new(
                r"(?i)unauthori[sz]ed|unauthenticated|not\s+authenticated|auth(entication)?\s+(required|failed)|jwt\s+expired|invalid\s+(api\s+)?(token|key)",
                ErrorKind::Authentication,
                "Authentication required",
                false,
            ),
            ErrorPattern::new(
                r"(?i)rate[\s\-]?limit|too\s+many\s+requests",
                ErrorKind::RateLimit,
                "Too many requests, please try again later",
                true,
            ),
            ErrorPattern::new(
                r"(?i)forbidden|permission\s+denied|access\s+denied",
                ErrorKind::Authorization,
                "You do not have permission to perform this action",
                false,
            ),
        ]
    }

    /// Classifies a raw failure.
    ///
    /// Never panics and always returns a [`NormalizedError`]; the same input
    /// always yields the same result.
    pub fn classify(&self, raw: impl Into<RawError>) -> NormalizedError {
        match raw.into() {
            RawError::Classified(error) => error,
            RawError::Validation(issues) => {
                NormalizedError::new(ErrorKind::Validation, "Invalid input data", false)
                    .with_details(serde_json::to_value(&issues).unwrap_or(Value::Null))
            }
            RawError::Database(error) => self.classify_database(error),
            RawError::FetchFailed(_) => {
                NormalizedError::new(ErrorKind::Network, "Network connection failed", true)
            }
            RawError::Timeout(_) => {
                NormalizedError::new(ErrorKind::Network, "Request timed out", true)
            }
            RawError::Http { status, message } => self.classify_status(status, &message),
            RawError::CircuitOpen(open) => {
                NormalizedError::new(ErrorKind::Network, "Service temporarily unavailable", false)
                    .with_code(CIRCUIT_OPEN_CODE)
                    .with_details(json!({
                        "dependency": open.dependency,
                        "retryAfterMs": duration_millis(open.retry_after),
                    }))
            }
            RawError::Cancelled => {
                NormalizedError::new(ErrorKind::Unknown, "Operation was cancelled", false)
                    .with_code(CANCELLED_CODE)
            }
            RawError::Error(message) => self
                .classify_message(&message)
                .unwrap_or_else(|| NormalizedError::new(ErrorKind::Unknown, message, false)),
            RawError::Value(value) => {
                NormalizedError::new(ErrorKind::Unknown, UNEXPECTED_ERROR_MESSAGE, false)
                    .with_details(value)
            }
        }
    }

    /// Runs a message through the pattern table.
    ///
    /// Returns `None` if no pattern matches.
    pub fn classify_message(&self, message: &str) -> Option<NormalizedError> {
        self.patterns
            .iter()
            .find(|pattern| pattern.matches(message))
            .map(ErrorPattern::to_error)
    }

    fn classify_database(&self, error: DatabaseError) -> NormalizedError {
        let DatabaseError {
            code,
            message,
            details,
            hint,
        } = error;
        let diagnostics = database_diagnostics(details, hint);

        if self.database.is_not_found(code.as_deref()) {
            let message = if message.is_empty() {
                "Resource not found".to_string()
            } else {
                message
            };
            let normalized = NormalizedError::new(ErrorKind::NotFound, message, false)
                .with_optional_details(diagnostics);
            return match code {
                Some(code) => normalized.with_code(code),
                None => normalized,
            };
        }

        let retryable = self.database.is_transient(code.as_deref(), &message);
        let message = if message.is_empty() {
            "A database error occurred".to_string()
        } else {
            message
        };
        let normalized = NormalizedError::new(ErrorKind::Database, message, retryable)
            .with_optional_details(diagnostics);
        match code {
            Some(code) => normalized.with_code(code),
            None => normalized,
        }
    }

    fn classify_status(&self, status: u16, message: &str) -> NormalizedError {
        let normalized = match status {
            401 => NormalizedError::new(ErrorKind::Authentication, "Authentication required", false),
            403 => NormalizedError::new(
                ErrorKind::Authorization,
                "You do not have permission to perform this action",
                false,
            ),
            404 => NormalizedError::new(ErrorKind::NotFound, "Resource not found", false),
            408 | 504 => NormalizedError::new(ErrorKind::Network, "Request timed out", true),
            429 => NormalizedError::new(
                ErrorKind::RateLimit,
                "Too many requests, please try again later",
                true,
            ),
            500..=599 => NormalizedError::new(
                ErrorKind::Network,
                "Service temporarily unavailable",
                true,
            ),
            _ => self
                .classify_message(message)
                .unwrap_or_else(|| NormalizedError::new(ErrorKind::Unknown, message, false)),
        };
        normalized.with_code(status.to_string())
    }
}

fn database_diagnostics(details: Option<String>, hint: Option<String>) -> Option<Value> {
    if details.is_none() && hint.is_none() {
        return None;
    }
    Some(json!({ "details": details, "hint": hint }))
}

fn duration_millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Classifies a raw failure with the process-wide default classifier.
pub fn classify(raw: impl Into<RawError>) -> NormalizedError {
    Classifier::shared().classify(raw)
}
