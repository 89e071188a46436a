use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use shopkit_core::{Record, Row, Value};

use super::session::{QueryResult, Session, SessionError};
use super::statement::Statement;

#[derive(Debug)]
struct Table {
    key: String,
    columns: Vec<String>,
    /// Primary key -> row; `BTreeMap` gives the natural key order on scans.
    rows: BTreeMap<Value, Row>,
}

impl Table {
    fn check_columns<'a>(
        &self,
        name: &str,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), SessionError> {
        for c in columns {
            if !self.columns.iter().any(|known| known == c) {
                return Err(SessionError::InvalidQuery(format!(
                    "undefined column '{c}' in table '{name}'"
                )));
            }
        }
        Ok(())
    }

    fn check_key(&self, name: &str, column: &str) -> Result<(), SessionError> {
        if column != self.key {
            return Err(SessionError::InvalidQuery(format!(
                "'{column}' is not the primary key of '{name}'"
            )));
        }
        Ok(())
    }

    fn insert(&mut self, name: &str, row: &Row, if_not_exists: bool) -> Result<QueryResult, SessionError> {
        self.check_columns(name, row.iter().map(|(c, _)| c))?;
        let key = row.get(&self.key).cloned().ok_or_else(|| {
            SessionError::InvalidQuery(format!("missing primary key '{}'", self.key))
        })?;

        if if_not_exists && self.rows.contains_key(&key) {
            return Ok(QueryResult::not_applied());
        }
        self.rows.insert(key, row.clone());
        Ok(QueryResult::applied())
    }

    fn update(
        &mut self,
        name: &str,
        key: &(String, Value),
        assignments: &Row,
        if_exists: bool,
    ) -> Result<QueryResult, SessionError> {
        self.check_key(name, &key.0)?;
        self.check_columns(name, assignments.iter().map(|(c, _)| c))?;
        if assignments.contains(&self.key) {
            return Err(SessionError::InvalidQuery(format!(
                "primary key '{}' cannot be updated",
                self.key
            )));
        }

        match self.rows.get_mut(&key.1) {
            Some(row) => row.merge(assignments),
            None if if_exists => return Ok(QueryResult::not_applied()),
            None => {
                let mut row = Row::new().with(key.0.clone(), key.1.clone());
                row.merge(assignments);
                self.rows.insert(key.1.clone(), row);
            }
        }
        Ok(QueryResult::applied())
    }

    fn delete(&mut self, name: &str, key: &(String, Value), if_exists: bool) -> Result<QueryResult, SessionError> {
        self.check_key(name, &key.0)?;
        let removed = self.rows.remove(&key.1).is_some();
        if if_exists && !removed {
            return Ok(QueryResult::not_applied());
        }
        Ok(QueryResult::applied())
    }
}

/// In-memory session for tests/dev.
///
/// Tables must be created before use (no implicit schema). Conditional writes
/// follow lightweight-transaction semantics: they report `applied == false`
/// instead of failing. Unconditional inserts/updates are upserts.
#[derive(Debug)]
pub struct InMemorySession {
    tables: RwLock<HashMap<String, Table>>,
    closed: AtomicBool,
    available: AtomicBool,
}

impl Default for InMemorySession {
    fn default() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table (idempotent, like `CREATE TABLE IF NOT EXISTS`).
    pub fn create_table(&self, name: &str, key: &str, columns: &[&str]) -> Result<(), SessionError> {
        if !columns.contains(&key) {
            return Err(SessionError::InvalidQuery(format!(
                "primary key '{key}' is not a column of '{name}'"
            )));
        }

        let mut tables = self
            .tables
            .write()
            .map_err(|_| SessionError::Unavailable("lock poisoned".to_string()))?;
        tables.entry(name.to_string()).or_insert_with(|| Table {
            key: key.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: BTreeMap::new(),
        });
        Ok(())
    }

    /// Create the table backing record type `R`.
    pub fn create_table_for<R: Record>(&self) -> Result<(), SessionError> {
        self.create_table(R::TABLE, R::KEY, R::COLUMNS)
    }

    /// Simulate the backend becoming (un)reachable without closing the session.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn select(&self, name: &str, conditions: &Row) -> Result<QueryResult, SessionError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| SessionError::Unavailable("lock poisoned".to_string()))?;
        let table = tables
            .get(name)
            .ok_or_else(|| SessionError::InvalidQuery(format!("unconfigured table {name}")))?;
        table.check_columns(name, conditions.iter().map(|(c, _)| c))?;

        let rows = table
            .rows
            .values()
            .filter(|row| conditions.iter().all(|(c, v)| row.get(c) == Some(v)))
            .cloned()
            .collect();
        Ok(QueryResult::rows(rows))
    }

    fn write<F>(&self, name: &str, op: F) -> Result<QueryResult, SessionError>
    where
        F: FnOnce(&mut Table) -> Result<QueryResult, SessionError>,
    {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| SessionError::Unavailable("lock poisoned".to_string()))?;
        let table = tables
            .get_mut(name)
            .ok_or_else(|| SessionError::InvalidQuery(format!("unconfigured table {name}")))?;
        op(table)
    }

    fn ensure_usable(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(SessionError::Unavailable("no hosts available".to_string()));
        }
        Ok(())
    }
}

impl Session for InMemorySession {
    fn execute(&self, statement: &Statement) -> Result<QueryResult, SessionError> {
        self.ensure_usable()?;

        match statement {
            Statement::Select {
                table, conditions, ..
            } => self.select(table, conditions),
            Statement::Insert {
                table,
                row,
                if_not_exists,
            } => self.write(table, |t| t.insert(table, row, *if_not_exists)),
            Statement::Update {
                table,
                key,
                assignments,
                if_exists,
            } => self.write(table, |t| t.update(table, key, assignments, *if_exists)),
            Statement::Delete {
                table,
                key,
                if_exists,
            } => self.write(table, |t| t.delete(table, key, *if_exists)),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> InMemorySession {
        let s = InMemorySession::new();
        s.create_table("shop", "id", &["id", "name", "location", "state"])
            .unwrap();
        s
    }

    fn insert(id: i64, name: &str, if_not_exists: bool) -> Statement {
        Statement::Insert {
            table: "shop".into(),
            row: Row::new()
                .with("id", id)
                .with("name", name)
                .with("location", "")
                .with("state", ""),
            if_not_exists,
        }
    }

    fn select_all() -> Statement {
        Statement::Select {
            table: "shop".into(),
            conditions: Row::new(),
            order_by: "id".into(),
        }
    }

    #[test]
    fn scans_return_rows_in_key_order() {
        let s = session();
        for id in [3, 1, 2] {
            s.execute(&insert(id, "x", false)).unwrap();
        }

        let ids: Vec<i64> = s
            .execute(&select_all())
            .unwrap()
            .rows
            .iter()
            .map(|r| r.int("id").unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn insert_if_not_exists_does_not_overwrite() {
        let s = session();
        assert!(s.execute(&insert(1, "first", true)).unwrap().applied);
        assert!(!s.execute(&insert(1, "second", true)).unwrap().applied);

        let rows = s.execute(&select_all()).unwrap().rows;
        assert_eq!(rows[0].text("name").unwrap(), "first");
    }

    #[test]
    fn conditional_update_and_delete_report_missing_rows() {
        let s = session();
        let update = Statement::Update {
            table: "shop".into(),
            key: ("id".into(), Value::Int(9)),
            assignments: Row::new().with("name", "x"),
            if_exists: true,
        };
        let delete = Statement::Delete {
            table: "shop".into(),
            key: ("id".into(), Value::Int(9)),
            if_exists: true,
        };

        assert!(!s.execute(&update).unwrap().applied);
        assert!(!s.execute(&delete).unwrap().applied);
        assert!(s.execute(&select_all()).unwrap().rows.is_empty());
    }

    #[test]
    fn unknown_tables_and_columns_are_invalid_queries() {
        let s = session();
        let bad_table = Statement::Select {
            table: "nope".into(),
            conditions: Row::new(),
            order_by: "id".into(),
        };
        let bad_column = Statement::Select {
            table: "shop".into(),
            conditions: Row::new().with("colour", "red"),
            order_by: "id".into(),
        };

        assert!(matches!(s.execute(&bad_table), Err(SessionError::InvalidQuery(_))));
        assert!(matches!(s.execute(&bad_column), Err(SessionError::InvalidQuery(_))));
    }

    #[test]
    fn closed_session_rejects_every_statement() {
        let s = session();
        s.close();

        assert!(s.is_closed());
        assert_eq!(s.execute(&select_all()), Err(SessionError::Closed));
        assert_eq!(s.execute(&insert(1, "x", true)), Err(SessionError::Closed));
    }

    #[test]
    fn unavailable_backend_recovers() {
        let s = session();
        s.set_available(false);
        assert!(matches!(s.execute(&select_all()), Err(SessionError::Unavailable(_))));

        s.set_available(true);
        assert!(s.execute(&select_all()).is_ok());
    }
}
