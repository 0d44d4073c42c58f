//! Unified error handling for the run-tracker library.
//!
//! Pure computations (distance, stats aggregation, reward evaluation) never
//! fail; errors here come from the tracker lifecycle and the storage layer.

use crate::session::RunStatus;

/// Unified error type for run-tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// Location access was refused; tracking cannot start.
    ///
    /// Recoverable by the caller (re-request permission); the tracker
    /// stays in `Idle` and never retries on its own.
    #[error("location permission denied")]
    PermissionDenied,

    /// A lifecycle method was called from a state that does not allow it.
    /// State is left untouched.
    #[error("invalid transition: {operation} while {status:?}")]
    InvalidTransition {
        operation: &'static str,
        status: RunStatus,
    },

    /// Persistence read/write failure (disk, quota, remote store).
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Malformed catalog entry, missing required field, or other misuse
    /// that indicates a programming error rather than a runtime condition.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl TrackError {
    /// Shorthand for a storage error with a formatted message.
    pub fn storage(message: impl Into<String>) -> Self {
        TrackError::Storage {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration error with a formatted message.
    pub fn config(message: impl Into<String>) -> Self {
        TrackError::Config {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for TrackError {
    fn from(err: rusqlite::Error) -> Self {
        TrackError::Storage {
            message: err.to_string(),
        }
    }
}

/// Result type alias for run-tracker operations.
pub type Result<T> = std::result::Result<T, TrackError>;
