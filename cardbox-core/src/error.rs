//! Error types for core card operations

use thiserror::Error;

/// Per-item parse failures.
///
/// These are skip-and-continue errors: a single bad object key or a
/// malformed report must never abort the batch that contains it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("object key too shallow: {key}")]
    PathTooShallow { key: String },

    #[error("not a report object: {key}")]
    WrongFilename { key: String },

    #[error("malformed report JSON: {reason}")]
    MalformedJson { reason: String },

    #[error("unable to parse card date '{value}' with any known format")]
    UnknownDateFormat { value: String },
}

/// A single filter-field mismatch.
///
/// The `Display` form is the caller-visible message; `field` is kept
/// separate so logs can name the offending key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Expected: {expected}, Received: {received}")]
pub struct FilterMismatch {
    /// Name of the query field that failed.
    pub field: &'static str,
    /// The value the query asked for.
    pub expected: String,
    /// The value the candidate actually carried.
    pub received: String,
}
