//! Error types for the sync engine.
//!
//! The engine's failure taxonomy, in decreasing severity:
//!
//! - store failures propagate as [`SyncError::Store`]; the current
//!   cycle item aborts, the publisher loop continues on its next tick
//! - local filesystem failures propagate as [`SyncError::Io`]
//! - per-item parse failures (bad keys, malformed reports) are logged
//!   and skipped, never raised
//! - lock contention is a normal outcome, not an error (see
//!   [`crate::downloader::DownloadOutcome::InProgress`])
//! - per-directory cleanup failures are logged and counted (see
//!   [`crate::mirror::CleanupReport`])
//!
//! Nothing in this crate terminates the process.

use cardbox_store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("malformed card payload for {card_date}: {reason}")]
    MalformedCard { card_date: String, reason: String },
}

impl SyncError {
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
