use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Aspect '{aspect_name}' is not registered for entity type '{entity_type}'")]
    UnknownAspect {
        entity_type: String,
        aspect_name: String,
    },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Transaction failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Publish error: {0}")]
    PublishError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Variant name, used as the suffix of exception counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "ParseError",
            Self::SerializationError(_) => "SerializationError",
            Self::UnsupportedOperation(_) => "UnsupportedOperation",
            Self::UnknownAspect { .. } => "UnknownAspect",
            Self::PreconditionFailed(_) => "PreconditionFailed",
            Self::WriteConflict(_) => "WriteConflict",
            Self::EntityNotFound(_) => "EntityNotFound",
            Self::RetriesExhausted { .. } => "RetriesExhausted",
            Self::PublishError(_) => "PublishError",
            Self::ExecutionError(_) => "ExecutionError",
            Self::LockError(_) => "LockError",
        }
    }

    /// Returns `true` when re-running the whole transaction body may succeed.
    pub fn is_retryable(&self) -> bool {
        classify_conflict(self).is_some()
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

/// Classifies the kind of concurrent-write conflict storage reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The row observed at read time was changed by another committed writer.
    OptimisticLock,
    /// Two in-flight transactions wrote the same key.
    WriteWrite,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OptimisticLock => "optimistic_lock",
            Self::WriteWrite => "write_write",
        };
        write!(f, "{label}")
    }
}

/// Analyzes a `StoreError` and classifies it as a retryable write conflict.
///
/// Returns `None` for everything that re-running the transaction cannot fix.
pub fn classify_conflict(err: &StoreError) -> Option<ConflictKind> {
    match err {
        StoreError::WriteConflict(message) => {
            let lower = message.to_lowercase();
            if lower.contains("write-write") {
                Some(ConflictKind::WriteWrite)
            } else {
                Some(ConflictKind::OptimisticLock)
            }
        }
        _ => None,
    }
}
