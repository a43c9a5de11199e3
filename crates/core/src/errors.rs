use thiserror::Error;

/// Failure taxonomy surfaced by every engine operation.
///
/// `Validation` means nothing happened and the caller must fix its input.
/// `Conflict` means the request is either finalized or was modified
/// concurrently; the caller should reload and retry. `Store` is an
/// underlying persistence failure and is never retried internally.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("request `{0}` not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store failure: {0}")]
    Store(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The optimistic concurrency guard tripped: the row's version no longer
    /// matches the snapshot the transition was computed from.
    #[error("conflicting concurrent update")]
    VersionMismatch,
    #[error("database error: {0}")]
    Database(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::VersionMismatch => {
                Self::Conflict("request was modified concurrently, reload and retry".to_owned())
            }
            StoreError::Database(message) | StoreError::Decode(message) => Self::Store(message),
        }
    }
}
