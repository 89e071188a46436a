//! Postgres-backed session.
//!
//! Executes rendered SQL through a `sqlx` pool. The `Session` trait is
//! synchronous, so the session owns a small Tokio runtime and drives every
//! query with `block_on`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | SessionError |
//! |------------|----------------------|--------------|
//! | Database (unique violation) | `23505` | `Constraint` |
//! | Database (undefined table / column) | `42P01` / `42703` | `InvalidQuery` |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolClosed | N/A | `Closed` |
//! | ColumnDecode / Decode | N/A | `Decode` |
//! | Other | N/A | `Unavailable` |
//!
//! ## Lightweight transactions
//!
//! `INSERT .. ON CONFLICT DO NOTHING`, `UPDATE` and `DELETE` report whether
//! they applied through the affected-row count.

use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _};
use tokio::runtime::Runtime;
use tracing::{debug, instrument};

use shopkit_core::{Row, Value};

use super::session::{QueryResult, Session, SessionError};
use super::statement::Statement;

/// Postgres session backed by a `sqlx` connection pool.
pub struct PostgresSession {
    pool: PgPool,
    runtime: Runtime,
}

impl std::fmt::Debug for PostgresSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSession")
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

impl PostgresSession {
    /// Connect to `database_url` with at most `max_connections` pooled connections.
    pub fn connect(database_url: &str, max_connections: u32) -> Result<Self, SessionError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SessionError::Unavailable(format!("failed to start runtime: {e}")))?;

        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(database_url),
            )
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self { pool, runtime })
    }

    async fn run(&self, statement: &Statement) -> Result<QueryResult, SessionError> {
        let sql = statement.to_sql();
        let values = statement.values();
        let query = bind_all(sqlx::query(&sql), &values);

        match statement {
            Statement::Select { .. } => {
                let rows = query
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error(statement.kind(), e))?;
                let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
                Ok(QueryResult::rows(rows))
            }
            _ => {
                let done = query
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error(statement.kind(), e))?;
                Ok(write_outcome(statement, done.rows_affected()))
            }
        }
    }
}

impl Session for PostgresSession {
    #[instrument(skip(self, statement), fields(table = %statement.table(), op = statement.kind()), err)]
    fn execute(&self, statement: &Statement) -> Result<QueryResult, SessionError> {
        if self.pool.is_closed() {
            return Err(SessionError::Closed);
        }
        debug!(sql = %statement.to_sql(), "executing statement");
        self.runtime.block_on(self.run(statement))
    }

    fn close(&self) {
        self.runtime.block_on(self.pool.close());
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            Value::Int(i) => query.bind(*i),
            Value::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row, SessionError> {
    let mut out = Row::new();
    for column in row.columns() {
        let name = column.name();
        let ordinal = column.ordinal();
        let value = if let Ok(i) = row.try_get::<i64, _>(ordinal) {
            Value::Int(i)
        } else if let Ok(i) = row.try_get::<i32, _>(ordinal) {
            Value::Int(i64::from(i))
        } else if let Ok(s) = row.try_get::<String, _>(ordinal) {
            Value::Text(s)
        } else {
            return Err(SessionError::Decode(format!(
                "column '{name}' is neither integer nor text"
            )));
        };
        out.set(name, value);
    }
    Ok(out)
}

/// A conditional write that touched no row did not apply.
fn write_outcome(statement: &Statement, rows_affected: u64) -> QueryResult {
    if statement.is_conditional() && rows_affected == 0 {
        QueryResult::not_applied()
    } else {
        QueryResult::applied()
    }
}

fn error_for_sqlstate(code: Option<&str>, msg: String) -> SessionError {
    match code {
        Some("23505") => SessionError::Constraint(msg),
        Some("42P01") | Some("42703") => SessionError::InvalidQuery(msg),
        _ => SessionError::Unavailable(msg),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SessionError {
    match err {
        sqlx::Error::Database(db_err) => {
            error_for_sqlstate(db_err.code().as_deref(), format!("{operation}: {db_err}"))
        }
        sqlx::Error::PoolClosed => SessionError::Closed,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            SessionError::Decode(format!("{operation}: {err}"))
        }
        other => SessionError::Unavailable(format!("{operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delete(if_exists: bool) -> Statement {
        Statement::Delete {
            table: "shop".into(),
            key: ("id".into(), Value::Int(1)),
            if_exists,
        }
    }

    #[test]
    fn conditional_write_without_affected_rows_did_not_apply() {
        assert_eq!(write_outcome(&delete(true), 0), QueryResult::not_applied());
        assert_eq!(write_outcome(&delete(true), 1), QueryResult::applied());
        assert_eq!(write_outcome(&delete(false), 0), QueryResult::applied());

        let insert = Statement::Insert {
            table: "shop".into(),
            row: Row::new().with("id", 1i64),
            if_not_exists: true,
        };
        assert!(!write_outcome(&insert, 0).applied);
    }

    #[test]
    fn sqlstates_map_onto_session_errors() {
        assert!(matches!(
            error_for_sqlstate(Some("23505"), "dup".into()),
            SessionError::Constraint(_)
        ));
        assert!(matches!(
            error_for_sqlstate(Some("42P01"), "no table".into()),
            SessionError::InvalidQuery(_)
        ));
        assert!(matches!(
            error_for_sqlstate(Some("42703"), "no column".into()),
            SessionError::InvalidQuery(_)
        ));
        assert!(matches!(
            error_for_sqlstate(Some("57P01"), "admin shutdown".into()),
            SessionError::Unavailable(_)
        ));
        assert!(matches!(error_for_sqlstate(None, "?".into()), SessionError::Unavailable(_)));
    }

    #[test]
    fn driver_errors_map_onto_session_errors() {
        assert_eq!(map_sqlx_error("select", sqlx::Error::PoolClosed), SessionError::Closed);
        assert!(matches!(
            map_sqlx_error("select", sqlx::Error::Decode("bad utf-8".into())),
            SessionError::Decode(_)
        ));
        assert!(matches!(
            map_sqlx_error("select", sqlx::Error::PoolTimedOut),
            SessionError::Unavailable(_)
        ));
    }
}
