use std::sync::Arc;

use thiserror::Error;

use shopkit_core::{DataError, Row};

use super::statement::Statement;

/// Outcome of executing a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Rows returned by a `SELECT` (empty for writes).
    pub rows: Vec<Row>,
    /// `false` when a conditional write (`IF [NOT] EXISTS`) did not apply.
    pub applied: bool,
}

impl QueryResult {
    pub fn applied() -> Self {
        Self {
            rows: Vec::new(),
            applied: true,
        }
    }

    pub fn not_applied() -> Self {
        Self {
            rows: Vec::new(),
            applied: false,
        }
    }

    pub fn rows(rows: Vec<Row>) -> Self {
        Self { rows, applied: true }
    }
}

/// Session-level failure.
///
/// ## Mapping to `DataError`
///
/// | SessionError | DataError |
/// |---|---|
/// | `Closed`, `Unavailable`, `InvalidQuery` | `ConnectionFailure` |
/// | `Constraint` | `ConstraintViolation` |
/// | `Decode` | `DeserializationFailure` |
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error("session unavailable: {0}")]
    Unavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("failed to decode row: {0}")]
    Decode(String),
}

impl From<SessionError> for DataError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Closed => DataError::connection("session is closed"),
            SessionError::Unavailable(msg) => DataError::connection(msg),
            SessionError::InvalidQuery(msg) => {
                DataError::connection(format!("query could not execute: {msg}"))
            }
            SessionError::Constraint(msg) => DataError::constraint(msg),
            SessionError::Decode(msg) => DataError::deserialization(msg),
        }
    }
}

/// Database session handle.
///
/// One session is shared by every concurrent unit of work, so implementations
/// must be `Send + Sync`. Each `execute` is its own logical transaction; there
/// is no cross-call locking. Concurrent writes to the same key rely on
/// conditional statements, whose outcome is reported through
/// [`QueryResult::applied`].
pub trait Session: Send + Sync {
    fn execute(&self, statement: &Statement) -> Result<QueryResult, SessionError>;

    /// Close the session. Later `execute` calls fail with `SessionError::Closed`.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

impl<S> Session for Arc<S>
where
    S: Session + ?Sized,
{
    fn execute(&self, statement: &Statement) -> Result<QueryResult, SessionError> {
        (**self).execute(statement)
    }

    fn close(&self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}
