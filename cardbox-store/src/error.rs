//! Error types for store operations

use thiserror::Error;

/// Store layer errors.
///
/// Network/auth failures against either backing store surface as
/// `Backend` and propagate to the caller; the reconciliation cycle
/// aborts its current item on them but the publisher loop keeps
/// running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("{op} failed: {reason}")]
    Backend { op: &'static str, reason: String },

    #[error("I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
