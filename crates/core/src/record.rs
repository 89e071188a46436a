//! Record trait: mapping between an entity and a table row.

use crate::error::DataResult;
use crate::value::{Row, Value};

/// An entity persisted as one row of a single logical table.
///
/// `Fields` is the sparse form of the record: one `Option` per column. It is
/// used both as a query-by-example filter (present fields are ANDed equality
/// constraints) and as a partial-update patch (present fields overwrite, absent
/// fields keep the stored value). Presence is explicit, so an intentionally
/// empty string is distinguishable from "unset".
pub trait Record: Clone + core::fmt::Debug + Send + Sync + Sized + 'static {
    /// Sparse per-field form of the record.
    type Fields: Clone + Default + core::fmt::Debug + Send + Sync;

    /// Table name.
    const TABLE: &'static str;

    /// Primary key column. Must be listed in `COLUMNS`.
    const KEY: &'static str;

    /// All columns, primary key first.
    const COLUMNS: &'static [&'static str];

    /// Full row for this record.
    fn to_row(&self) -> Row;

    /// Decode a stored row.
    fn from_row(row: &Row) -> DataResult<Self>;

    /// Only the present fields, in column order.
    fn present(fields: &Self::Fields) -> Row;

    /// Primary key of this record.
    fn key(&self) -> Value {
        self.to_row()
            .get(Self::KEY)
            .cloned()
            .unwrap_or(Value::Int(0))
    }

    /// Primary key carried by a sparse form, if set.
    fn key_of(fields: &Self::Fields) -> Option<Value> {
        Self::present(fields).get(Self::KEY).cloned()
    }
}
