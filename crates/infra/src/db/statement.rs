//! Parameterized statements against a single table.
//!
//! Statements carry their bind values separately from the rendered text, so no
//! value ever gets spliced into a query string. The same statement renders to
//! CQL (`?` placeholders, lightweight transactions via `IF [NOT] EXISTS`) and
//! to SQL (`$n` placeholders) for the Postgres session.

use core::fmt;

use shopkit_core::{Row, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `SELECT * FROM table WHERE c1 = ? AND ...` ordered by `order_by`.
    Select {
        table: String,
        conditions: Row,
        order_by: String,
    },
    /// Insert a full row; with `if_not_exists` it is a lightweight transaction.
    Insert {
        table: String,
        row: Row,
        if_not_exists: bool,
    },
    /// Overwrite `assignments` on the row identified by `key`.
    Update {
        table: String,
        key: (String, Value),
        assignments: Row,
        if_exists: bool,
    },
    /// Remove the row identified by `key`.
    Delete {
        table: String,
        key: (String, Value),
        if_exists: bool,
    },
}

impl Statement {
    pub fn table(&self) -> &str {
        match self {
            Statement::Select { table, .. }
            | Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. } => table,
        }
    }

    /// Short operation name for logs/spans.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select { .. } => "select",
            Statement::Insert { .. } => "insert",
            Statement::Update { .. } => "update",
            Statement::Delete { .. } => "delete",
        }
    }

    /// Whether the statement is a conditional (compare-and-set) write.
    pub fn is_conditional(&self) -> bool {
        match self {
            Statement::Select { .. } => false,
            Statement::Insert { if_not_exists, .. } => *if_not_exists,
            Statement::Update { if_exists, .. } | Statement::Delete { if_exists, .. } => *if_exists,
        }
    }

    /// Bind values, in placeholder order.
    pub fn values(&self) -> Vec<Value> {
        match self {
            Statement::Select { conditions, .. } => conditions.iter().map(|(_, v)| v.clone()).collect(),
            Statement::Insert { row, .. } => row.iter().map(|(_, v)| v.clone()).collect(),
            Statement::Update {
                key, assignments, ..
            } => assignments
                .iter()
                .map(|(_, v)| v.clone())
                .chain(std::iter::once(key.1.clone()))
                .collect(),
            Statement::Delete { key, .. } => vec![key.1.clone()],
        }
    }

    /// Render as CQL with `?` placeholders.
    pub fn to_cql(&self) -> String {
        match self {
            Statement::Select {
                table,
                conditions,
                order_by,
            } => {
                let mut q = format!("SELECT * FROM {table}");
                if !conditions.is_empty() {
                    let preds: Vec<String> = conditions.iter().map(|(c, _)| format!("{c} = ?")).collect();
                    q.push_str(" WHERE ");
                    q.push_str(&preds.join(" AND "));
                    // Filtering on anything but the partition key needs server-side filtering.
                    if conditions.iter().any(|(c, _)| c != order_by.as_str()) {
                        q.push_str(" ALLOW FILTERING");
                    }
                }
                q
            }
            Statement::Insert {
                table,
                row,
                if_not_exists,
            } => {
                let cols: Vec<&str> = row.iter().map(|(c, _)| c).collect();
                let marks = vec!["?"; cols.len()];
                let mut q = format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    cols.join(", "),
                    marks.join(", ")
                );
                if *if_not_exists {
                    q.push_str(" IF NOT EXISTS");
                }
                q
            }
            Statement::Update {
                table,
                key,
                assignments,
                if_exists,
            } => {
                let sets: Vec<String> = assignments.iter().map(|(c, _)| format!("{c} = ?")).collect();
                let mut q = format!("UPDATE {table} SET {} WHERE {} = ?", sets.join(", "), key.0);
                if *if_exists {
                    q.push_str(" IF EXISTS");
                }
                q
            }
            Statement::Delete {
                table,
                key,
                if_exists,
            } => {
                let mut q = format!("DELETE FROM {table} WHERE {} = ?", key.0);
                if *if_exists {
                    q.push_str(" IF EXISTS");
                }
                q
            }
        }
    }

    /// Render as SQL with `$n` placeholders.
    ///
    /// Conditional writes become `ON CONFLICT DO NOTHING` / plain `WHERE`
    /// clauses; the caller learns whether they applied from the affected-row
    /// count.
    pub fn to_sql(&self) -> String {
        match self {
            Statement::Select {
                table,
                conditions,
                order_by,
            } => {
                let mut q = format!("SELECT * FROM {table}");
                if !conditions.is_empty() {
                    let preds: Vec<String> = conditions
                        .iter()
                        .enumerate()
                        .map(|(i, (c, _))| format!("{c} = ${}", i + 1))
                        .collect();
                    q.push_str(" WHERE ");
                    q.push_str(&preds.join(" AND "));
                }
                q.push_str(&format!(" ORDER BY {order_by} ASC"));
                q
            }
            Statement::Insert {
                table,
                row,
                if_not_exists,
            } => {
                let cols: Vec<&str> = row.iter().map(|(c, _)| c).collect();
                let marks: Vec<String> = (1..=cols.len()).map(|i| format!("${i}")).collect();
                let mut q = format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    cols.join(", "),
                    marks.join(", ")
                );
                if *if_not_exists {
                    q.push_str(" ON CONFLICT DO NOTHING");
                }
                q
            }
            Statement::Update {
                table,
                key,
                assignments,
                ..
            } => {
                let sets: Vec<String> = assignments
                    .iter()
                    .enumerate()
                    .map(|(i, (c, _))| format!("{c} = ${}", i + 1))
                    .collect();
                format!(
                    "UPDATE {table} SET {} WHERE {} = ${}",
                    sets.join(", "),
                    key.0,
                    assignments.len() + 1
                )
            }
            Statement::Delete { table, key, .. } => {
                format!("DELETE FROM {table} WHERE {} = $1", key.0)
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(conditions: Row) -> Statement {
        Statement::Select {
            table: "shop".into(),
            conditions,
            order_by: "id".into(),
        }
    }

    #[test]
    fn select_without_conditions_reads_the_whole_table() {
        assert_eq!(select(Row::new()).to_cql(), "SELECT * FROM shop");
        assert_eq!(select(Row::new()).to_sql(), "SELECT * FROM shop ORDER BY id ASC");
    }

    #[test]
    fn select_by_key_needs_no_filtering() {
        let stmt = select(Row::new().with("id", 1));
        assert_eq!(stmt.to_cql(), "SELECT * FROM shop WHERE id = ?");
        assert_eq!(stmt.values(), vec![Value::Int(1)]);
    }

    #[test]
    fn select_on_regular_columns_allows_filtering() {
        let stmt = select(Row::new().with("name", "Pramod").with("state", "Bihar"));
        assert_eq!(
            stmt.to_cql(),
            "SELECT * FROM shop WHERE name = ? AND state = ? ALLOW FILTERING"
        );
        assert_eq!(
            stmt.to_sql(),
            "SELECT * FROM shop WHERE name = $1 AND state = $2 ORDER BY id ASC"
        );
    }

    #[test]
    fn insert_if_not_exists_is_a_lightweight_transaction() {
        let stmt = Statement::Insert {
            table: "shop".into(),
            row: Row::new().with("id", 1).with("name", "x"),
            if_not_exists: true,
        };
        assert_eq!(stmt.to_cql(), "INSERT INTO shop (id, name) VALUES (?, ?) IF NOT EXISTS");
        assert_eq!(
            stmt.to_sql(),
            "INSERT INTO shop (id, name) VALUES ($1, $2) ON CONFLICT DO NOTHING"
        );
        assert!(stmt.is_conditional());
    }

    #[test]
    fn update_binds_assignments_before_key() {
        let stmt = Statement::Update {
            table: "shop".into(),
            key: ("id".into(), Value::Int(2)),
            assignments: Row::new().with("location", "Gaya").with("state", "Bihar"),
            if_exists: true,
        };
        assert_eq!(
            stmt.to_cql(),
            "UPDATE shop SET location = ?, state = ? WHERE id = ? IF EXISTS"
        );
        assert_eq!(stmt.to_sql(), "UPDATE shop SET location = $1, state = $2 WHERE id = $3");
        assert_eq!(
            stmt.values(),
            vec![Value::from("Gaya"), Value::from("Bihar"), Value::Int(2)]
        );
    }

    #[test]
    fn delete_renders_key_predicate() {
        let stmt = Statement::Delete {
            table: "shop".into(),
            key: ("id".into(), Value::Int(3)),
            if_exists: false,
        };
        assert_eq!(stmt.to_string(), "DELETE FROM shop WHERE id = ?");
        assert_eq!(stmt.kind(), "delete");
        assert!(!stmt.is_conditional());
    }
}
