//! Column values and rows exchanged with a database session.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// A single column value.
///
/// Values are totally ordered so that primary keys sort naturally (integers
/// before text, then by value).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            Value::Int(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// An ordered list of `(column, value)` pairs.
///
/// Column order is preserved as inserted; setting an existing column replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some((_, v)) => *v = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Remove a column, returning its value if it was present.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.columns.iter().position(|(c, _)| c == column)?;
        Some(self.columns.remove(idx).1)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Overwrite this row's columns with every column present in `other`.
    pub fn merge(&mut self, other: &Row) {
        for (column, value) in other.iter() {
            self.set(column, value.clone());
        }
    }

    /// Typed accessor for integer columns.
    pub fn int(&self, column: &str) -> DataResult<i64> {
        match self.get(column) {
            Some(Value::Int(v)) => Ok(*v),
            Some(other) => Err(DataError::deserialization(format!(
                "column '{column}' is not an integer: {other:?}"
            ))),
            None => Err(DataError::deserialization(format!("missing column '{column}'"))),
        }
    }

    /// Typed accessor for text columns.
    pub fn text(&self, column: &str) -> DataResult<String> {
        match self.get(column) {
            Some(Value::Text(v)) => Ok(v.clone()),
            Some(other) => Err(DataError::deserialization(format!(
                "column '{column}' is not text: {other:?}"
            ))),
            None => Err(DataError::deserialization(format!("missing column '{column}'"))),
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (c, v) in iter {
            row.set(c, v);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let mut row = Row::new().with("id", 1).with("name", "a");
        row.set("id", 2);

        let cols: Vec<_> = row.iter().map(|(c, _)| c.to_string()).collect();
        assert_eq!(cols, vec!["id", "name"]);
        assert_eq!(row.int("id").unwrap(), 2);
    }

    #[test]
    fn merge_overwrites_only_present_columns() {
        let mut stored = Row::new().with("id", 2).with("name", "Shubh").with("state", "Karnataka");
        let patch = Row::new().with("state", "Bihar");
        stored.merge(&patch);

        assert_eq!(stored.text("name").unwrap(), "Shubh");
        assert_eq!(stored.text("state").unwrap(), "Bihar");
    }

    #[test]
    fn typed_accessors_reject_mismatches() {
        let row = Row::new().with("id", "not-a-number");
        assert!(matches!(row.int("id"), Err(DataError::DeserializationFailure(_))));
        assert!(matches!(row.text("missing"), Err(DataError::DeserializationFailure(_))));
    }

    #[test]
    fn values_order_integers_naturally() {
        let mut keys = vec![Value::from(10), Value::from(2), Value::from(7)];
        keys.sort();
        assert_eq!(keys, vec![Value::Int(2), Value::Int(7), Value::Int(10)]);
    }
}
