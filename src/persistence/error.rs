//! Error types for persistence operations.

use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error (file operations, disk I/O)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format error (invalid magic bytes, version mismatch, corruption)
    #[error("format error: {0}")]
    Format(String),

    /// A committed file is truncated or carries the wrong magic bytes.
    #[error("corrupt segment: {0}")]
    Corrupt(String),

    /// Resource not found (file, segment, etc.)
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The stored graph does not cover the catalog it is being loaded for.
    #[error("stale index: stored {actual} vectors, catalog has {expected}")]
    StaleIndex { expected: usize, actual: usize },

    /// The stored graph was built for a different embedding dimensionality.
    #[error("dimension mismatch: stored {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl PersistenceError {
    /// True when the caller should rebuild from the catalog instead of failing hard.
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Corrupt(_)
                | Self::StaleIndex { .. }
                | Self::DimensionMismatch { .. }
        )
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl From<durability::PersistenceError> for PersistenceError {
    fn from(e: durability::PersistenceError) -> Self {
        match e {
            durability::PersistenceError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::NotFound(e.to_string())
            }
            durability::PersistenceError::Io(e) => Self::Io(e),
            durability::PersistenceError::NotFound(s) => Self::NotFound(s),
            other => Self::Format(other.to_string()),
        }
    }
}
