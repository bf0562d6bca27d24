//! Values and row sets returned by a backend.

use std::fmt;

use itertools::Itertools;
use serde::Serialize;

/// A value fetched from a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Null,
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) => write!(f, "{r}"),
            SqlValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            SqlValue::Blob(b) => {
                write!(f, "X'")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                write!(f, "'")
            }
            SqlValue::Null => write!(f, "NULL"),
        }
    }
}

/// A row of values from a query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row(pub Vec<SqlValue>);

impl Row {
    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.iter().join(", "))
    }
}

/// The rows returned by one statement, with the result column names.
///
/// Statements that return no rows produce an empty set with no columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Single-column row set, handy for building expectations.
    pub fn single_column(name: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            columns: vec![name.into()],
            rows: values.into_iter().map(|v| Row(vec![v])).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first value of the first row, for scalar queries.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|r| r.0.first())
    }
}

impl fmt::Display for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return write!(f, "(empty)");
        }
        write!(f, "{}", self.rows.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(SqlValue::Integer(-3).to_string(), "-3");
        assert_eq!(SqlValue::Text("it's".into()).to_string(), "'it''s'");
        assert_eq!(SqlValue::Blob(vec![0xab, 0x01]).to_string(), "X'AB01'");
        assert_eq!(SqlValue::Null.to_string(), "NULL");
    }

    #[test]
    fn test_row_set_scalar() {
        let rows = RowSet::single_column("count", vec![SqlValue::Integer(4)]);
        assert_eq!(rows.scalar(), Some(&SqlValue::Integer(4)));
        assert_eq!(rows.to_string(), "(4)");
        assert!(RowSet::default().scalar().is_none());
        assert_eq!(RowSet::default().to_string(), "(empty)");
    }
}
