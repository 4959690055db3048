//! Error taxonomy and classification
//!
//! This module normalizes failures from every dependency into a single
//! [`NormalizedError`] shape. Raw failures are described by [`RawError`], a
//! closed set of recognized origin shapes, and mapped by the [`Classifier`]
//! onto one of the eight [`ErrorKind`] values with a retryability flag.

pub mod classification;
pub mod detector;
pub mod raw;

// Re-export main types for convenient access
pub use classification::{ErrorKind, NormalizedError};
pub use detector::{
    classify, Classifier, DatabaseErrorPolicy, ErrorPattern, CANCELLED_CODE, CIRCUIT_OPEN_CODE,
    UNEXPECTED_ERROR_MESSAGE,
};
pub use raw::{DatabaseError, FieldIssue, RawError};
