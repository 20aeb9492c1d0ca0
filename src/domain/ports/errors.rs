//! Errors returned by collaborator ports.

use thiserror::Error;

/// Failure talking to an external collaborator (record store, results
/// index, or work canceller).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The requested record does not exist.
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// A stored value could not be parsed.
    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    /// Any other backend-specific failure.
    #[error("Backend error: {0}")]
    Backend(String),
}
