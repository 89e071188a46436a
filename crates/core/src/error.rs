//! Error taxonomy shared by the record store and the event channel.

use thiserror::Error;

/// Result type used across store and channel operations.
pub type DataResult<T> = Result<T, DataError>;

/// Typed failure surfaced to callers of the store and the channel.
///
/// Callers pattern-match on these kinds, so every layer below maps its own
/// failures into exactly one of them. Nothing here is retried internally;
/// retry/backoff belongs to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataError {
    /// The requested entity, topic or partition does not exist.
    #[error("entity not found: {id}")]
    NotFound { id: String },

    /// The underlying session or transport is unusable (closed, unreachable).
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// A write violated a constraint (duplicate key, invalid merge target).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A payload or stored row could not be decoded into the target shape.
    #[error("deserialization failure: {0}")]
    DeserializationFailure(String),
}

impl DataError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailure(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::DeserializationFailure(msg.into())
    }

    /// Returns `true` for the `NotFound` kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short, stable name of the error kind (for logs and outer layers).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ConnectionFailure(_) => "connection_failure",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::DeserializationFailure(_) => "deserialization_failure",
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        Self::DeserializationFailure(err.to_string())
    }
}
