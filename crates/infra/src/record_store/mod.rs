//! Query-by-example / partial-update store over a [`Session`].
//!
//! `RecordStore<R>` is generic over any [`Record`]. It holds no connection
//! state of its own (only its [`StoreConfig`]), so a single store can be shared
//! by every concurrent unit of work; the session handle is passed per call.
//!
//! ## Semantics
//!
//! - **get**: present fields of the example are ANDed equality constraints;
//!   an empty example returns every row. Results follow primary-key order.
//! - **create**: `INSERT .. IF NOT EXISTS`; an existing key is a
//!   `ConstraintViolation`.
//! - **update**: read by key, overwrite only the present fields, write with
//!   `UPDATE .. IF EXISTS`. A missing row is `NotFound { id }`; a row that
//!   disappears between the read and the conditional write is a
//!   `ConstraintViolation`.
//! - **delete**: governed by [`DeletePolicy`].
//!
//! Session failures always surface as errors, never as empty results.

use std::marker::PhantomData;

use tracing::{debug, instrument};

use shopkit_core::{DataError, DataResult, Record, Row, Value};

use crate::config::{DeletePolicy, StoreConfig};
use crate::db::{Session, Statement};

/// Generic store for records of type `R`.
#[derive(Debug, Clone)]
pub struct RecordStore<R> {
    config: StoreConfig,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Default for RecordStore<R> {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl<R: Record> RecordStore<R> {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            _record: PhantomData,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// All records matching the present fields of `example`.
    #[instrument(skip(self, session, example), fields(table = R::TABLE), err)]
    pub fn get<S>(&self, session: &S, example: &R::Fields) -> DataResult<Vec<R>>
    where
        S: Session + ?Sized,
    {
        self.select(session, R::present(example))
    }

    /// Insert `record`; fails if its key is already taken.
    #[instrument(skip(self, session, record), fields(table = R::TABLE, key = %record.key()), err)]
    pub fn create<S>(&self, session: &S, record: &R) -> DataResult<Vec<R>>
    where
        S: Session + ?Sized,
    {
        let key = record.key();
        let result = session.execute(&Statement::Insert {
            table: R::TABLE.to_string(),
            row: record.to_row(),
            if_not_exists: true,
        })?;

        if !result.applied {
            return Err(DataError::constraint(format!(
                "duplicate key {}={key} in {}",
                R::KEY,
                R::TABLE
            )));
        }

        self.select(session, key_row::<R>(&key))
    }

    /// Merge the present fields of `patch` into the stored row with the same key.
    #[instrument(skip(self, session, patch), fields(table = R::TABLE), err)]
    pub fn update<S>(&self, session: &S, patch: &R::Fields) -> DataResult<Vec<R>>
    where
        S: Session + ?Sized,
    {
        let key = R::key_of(patch).ok_or_else(|| {
            DataError::constraint(format!("update patch for {} carries no {}", R::TABLE, R::KEY))
        })?;

        let existing = self.select(session, key_row::<R>(&key))?;
        if existing.is_empty() {
            return Err(DataError::not_found(key.to_string()));
        }

        let mut assignments = R::present(patch);
        assignments.remove(R::KEY);
        if assignments.is_empty() {
            debug!(key = %key, "patch has no fields to write");
            return Ok(existing);
        }

        let result = session.execute(&Statement::Update {
            table: R::TABLE.to_string(),
            key: (R::KEY.to_string(), key.clone()),
            assignments,
            if_exists: true,
        })?;

        if !result.applied {
            return Err(DataError::constraint(format!(
                "{}={key} disappeared during update",
                R::KEY
            )));
        }

        self.select(session, key_row::<R>(&key))
    }

    /// Remove the row identified by `key`.
    #[instrument(skip(self, session), fields(table = R::TABLE, policy = ?self.config.delete_policy), err)]
    pub fn delete<S>(&self, session: &S, key: &Value) -> DataResult<()>
    where
        S: Session + ?Sized,
    {
        let require_existing = self.config.delete_policy == DeletePolicy::RequireExisting;
        let result = session.execute(&Statement::Delete {
            table: R::TABLE.to_string(),
            key: (R::KEY.to_string(), key.clone()),
            if_exists: require_existing,
        })?;

        if require_existing && !result.applied {
            return Err(DataError::not_found(key.to_string()));
        }
        Ok(())
    }

    fn select<S>(&self, session: &S, conditions: Row) -> DataResult<Vec<R>>
    where
        S: Session + ?Sized,
    {
        let result = session.execute(&Statement::Select {
            table: R::TABLE.to_string(),
            conditions,
            order_by: R::KEY.to_string(),
        })?;
        result.rows.iter().map(R::from_row).collect()
    }
}

fn key_row<R: Record>(key: &Value) -> Row {
    Row::new().with(R::KEY, key.clone())
}

/// Turn a textual identifier (path parameter) into a key value.
///
/// Numeric text becomes `Value::Int`; anything else stays text.
pub fn parse_key(raw: &str) -> Value {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(i) => Value::Int(i),
        Err(_) => Value::Text(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemorySession, QueryResult, SessionError};
    use shopkit_shop::{Shop, ShopFields};

    fn seeded() -> InMemorySession {
        let session = InMemorySession::new();
        session.create_table_for::<Shop>().unwrap();
        let store = RecordStore::<Shop>::default();
        store
            .create(&session, &Shop::new(1, "Pramod", "Gaya", "Bihar"))
            .unwrap();
        session
    }

    #[test]
    fn create_rejects_duplicate_keys() {
        let session = seeded();
        let store = RecordStore::<Shop>::default();

        let err = store
            .create(&session, &Shop::new(1, "Other", "X", "Y"))
            .unwrap_err();
        assert!(matches!(err, DataError::ConstraintViolation(_)));

        let stored = store.get(&session, &ShopFields::by_id(1)).unwrap();
        assert_eq!(stored[0].name, "Pramod");
    }

    #[test]
    fn update_without_key_is_rejected() {
        let session = seeded();
        let store = RecordStore::<Shop>::default();

        let err = store
            .update(&session, &ShopFields::any().name("x"))
            .unwrap_err();
        assert!(matches!(err, DataError::ConstraintViolation(_)));
    }

    #[test]
    fn update_of_missing_row_is_not_found() {
        let session = seeded();
        let store = RecordStore::<Shop>::default();

        let err = store
            .update(&session, &ShopFields::by_id(42).name("x"))
            .unwrap_err();
        assert_eq!(err, DataError::not_found("42"));
        assert!(store.get(&session, &ShopFields::by_id(42)).unwrap().is_empty());
    }

    /// Deletes the target row right before forwarding an update, like a
    /// concurrent writer racing the read-merge-write sequence.
    struct RacingDelete(InMemorySession);

    impl Session for RacingDelete {
        fn execute(&self, statement: &Statement) -> Result<QueryResult, SessionError> {
            if let Statement::Update { table, key, .. } = statement {
                self.0.execute(&Statement::Delete {
                    table: table.clone(),
                    key: key.clone(),
                    if_exists: false,
                })?;
            }
            self.0.execute(statement)
        }

        fn close(&self) {
            self.0.close()
        }

        fn is_closed(&self) -> bool {
            self.0.is_closed()
        }
    }

    #[test]
    fn row_deleted_during_update_is_a_constraint_violation() {
        let session = RacingDelete(seeded());
        let store = RecordStore::<Shop>::default();

        let err = store
            .update(&session, &ShopFields::by_id(1).name("x"))
            .unwrap_err();
        assert!(matches!(err, DataError::ConstraintViolation(_)));

        // the conditional write did not resurrect the row
        assert!(store.get(&session.0, &ShopFields::by_id(1)).unwrap().is_empty());
    }

    #[test]
    fn empty_string_is_a_real_value_in_a_patch() {
        let session = seeded();
        let store = RecordStore::<Shop>::default();

        let updated = store
            .update(&session, &ShopFields::by_id(1).location(""))
            .unwrap();
        assert_eq!(updated, vec![Shop::new(1, "Pramod", "", "Bihar")]);
    }

    #[test]
    fn get_on_broken_session_is_an_error_not_an_empty_result() {
        let session = seeded();
        session.set_available(false);
        let store = RecordStore::<Shop>::default();

        let err = store.get(&session, &ShopFields::any()).unwrap_err();
        assert!(matches!(err, DataError::ConnectionFailure(_)));
    }

    #[test]
    fn require_existing_policy_reports_missing_rows() {
        let session = seeded();
        let store = RecordStore::<Shop>::new(StoreConfig {
            delete_policy: DeletePolicy::RequireExisting,
        });

        assert_eq!(
            store.delete(&session, &Value::Int(7)),
            Err(DataError::not_found("7"))
        );
        assert_eq!(store.delete(&session, &Value::Int(1)), Ok(()));
    }

    #[test]
    fn parse_key_prefers_integers() {
        assert_eq!(parse_key("123"), Value::Int(123));
        assert_eq!(parse_key(" 7 "), Value::Int(7));
        assert_eq!(parse_key("abc"), Value::Text("abc".into()));
    }
}
