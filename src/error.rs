//! Error types for the attendance engine and its stores.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Caller-fixable problems with a session or sighting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Session window is degenerate: end {end} is not after start {start}")]
    DegenerateWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Required presence fraction {0} is outside (0, 1]")]
    FractionOutOfRange(f64),

    #[error("Session id must not be empty")]
    EmptySessionId,

    #[error("Device identifier must not be empty")]
    EmptyDeviceId,
}

/// Failures reported by a session, sighting or record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(String),

    #[error("Store serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Rejected by store: {0}")]
    Rejected(#[from] ValidationError),

    #[error("Session already exists: {0}")]
    Conflict(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors returned by a batch attendance computation.
#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("Invalid session: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AttendanceError {
    /// Check if this error indicates the session does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AttendanceError::NotFound { .. })
    }

    /// Short machine-readable code for transport responses.
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::Validation(_) => "VALIDATION_ERROR",
            AttendanceError::NotFound { .. } => "NOT_FOUND",
            AttendanceError::Store(_) => "STORE_ERROR",
        }
    }
}

pub type Result<T, E = AttendanceError> = std::result::Result<T, E>;
