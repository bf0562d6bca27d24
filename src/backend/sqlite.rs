use rusqlite::types::ValueRef;
use rusqlite::Connection;

use super::{Backend, BackendError};
use crate::expected::ExpectedErrors;
use crate::schema::{FieldSnapshot, IndexSnapshot, MeasurementSnapshot, SchemaSnapshot};
use crate::value::{Row, RowSet, SqlValue};

/// In-memory SQLite database driven through rusqlite.
pub struct SqliteBackend {
    conn: Connection,
    expected: ExpectedErrors,
}

impl SqliteBackend {
    pub fn new() -> Result<Self, BackendError> {
        Ok(Self {
            conn: open()?,
            expected: expected_errors(),
        })
    }

    fn query_strings(&self, sql: &str, columns: &[usize]) -> Result<Vec<Vec<String>>, BackendError> {
        let rows = self.execute_rows(sql)?;
        Ok(rows
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|&i| match row.values().get(i) {
                        Some(SqlValue::Text(s)) => s.clone(),
                        Some(SqlValue::Integer(n)) => n.to_string(),
                        _ => String::new(),
                    })
                    .collect()
            })
            .collect())
    }

    fn execute_rows(&self, sql: &str) -> Result<RowSet, BackendError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| BackendError::Query(e.to_string()))?;

        let column_count = stmt.column_count();
        if column_count == 0 {
            stmt.execute([])
                .map_err(|e| BackendError::Query(e.to_string()))?;
            return Ok(RowSet::default());
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut query_rows = stmt
            .query([])
            .map_err(|e| BackendError::Query(e.to_string()))?;
        let mut rows = Vec::new();
        while let Some(row) = query_rows
            .next()
            .map_err(|e| BackendError::Query(e.to_string()))?
        {
            let values = (0..column_count)
                .map(|i| convert_value(row.get_ref(i).ok()))
                .collect();
            rows.push(Row(values));
        }
        Ok(RowSet::new(columns, rows))
    }

    fn measurement(&self, name: &str, is_view: bool) -> Result<MeasurementSnapshot, BackendError> {
        let quoted = name.replace('"', "\"\"");
        let mut fields = Vec::new();
        // cid, name, type, notnull, dflt_value, pk
        for column in self.query_strings(&format!("PRAGMA table_info(\"{quoted}\")"), &[1, 2, 3])? {
            let [column_name, type_name, not_null] = <[String; 3]>::try_from(column)
                .map_err(|_| BackendError::Query("malformed table_info row".into()))?;
            if type_name.is_empty() {
                tracing::debug!("skipping untyped column {name}.{column_name}");
                continue;
            }
            fields.push(FieldSnapshot {
                name: column_name,
                type_name,
                not_null: not_null == "1",
            });
        }

        let mut indexes = Vec::new();
        if !is_view {
            // seq, name, unique, origin, partial
            for index in self.query_strings(&format!("PRAGMA index_list(\"{quoted}\")"), &[1, 3])? {
                let (index_name, origin) = (&index[0], &index[1]);
                if origin != "c" {
                    continue;
                }
                let index_quoted = index_name.replace('"', "\"\"");
                // seqno, cid, name
                let columns = self
                    .query_strings(&format!("PRAGMA index_info(\"{index_quoted}\")"), &[2])?
                    .into_iter()
                    .flatten()
                    .collect();
                indexes.push(IndexSnapshot {
                    name: index_name.clone(),
                    columns,
                });
            }
        }

        Ok(MeasurementSnapshot {
            name: name.to_string(),
            is_view,
            fields,
            tags: Vec::new(),
            indexes,
        })
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn reset(&mut self) -> Result<(), BackendError> {
        self.conn = open()?;
        Ok(())
    }

    fn introspect(&mut self) -> Result<SchemaSnapshot, BackendError> {
        let objects = self.query_strings(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[0, 1],
        )?;

        let mut measurements = Vec::with_capacity(objects.len());
        let mut unresolved = Vec::new();
        for object in objects {
            let (name, kind) = (&object[0], &object[1]);
            match self.measurement(name, kind == "view") {
                Ok(m) => measurements.push(m),
                // A view whose base table was dropped can no longer be described.
                Err(BackendError::Query(e)) => {
                    tracing::debug!("skipping {kind} {name}: {e}");
                    unresolved.push(name.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(SchemaSnapshot {
            measurements,
            unresolved,
        })
    }

    fn execute(&mut self, sql: &str) -> Result<RowSet, BackendError> {
        tracing::trace!(sql, "sqlite execute");
        self.execute_rows(sql)
    }

    fn expected_errors(&self) -> &ExpectedErrors {
        &self.expected
    }

    fn explain(&self, sql: &str) -> String {
        format!("EXPLAIN QUERY PLAN {sql}")
    }
}

fn open() -> Result<Connection, BackendError> {
    Connection::open_in_memory().map_err(|e| BackendError::Connection(e.to_string()))
}

fn expected_errors() -> ExpectedErrors {
    let mut expected = ExpectedErrors::new();
    expected.add_all([
        "integer overflow",
        "UNIQUE constraint failed",
        "NOT NULL constraint failed",
        "parser stack overflow",
        "Expression tree is too large",
        "too many terms",
    ]);
    // ALTER TABLE re-parses dependent views and fails on broken ones.
    if let Err(e) = expected.add_regex(r"^error in view v\d+: ") {
        tracing::warn!("invalid expected error pattern: {e}");
    }
    expected
}

fn convert_value(value: Option<ValueRef<'_>>) -> SqlValue {
    match value {
        None | Some(ValueRef::Null) => SqlValue::Null,
        Some(ValueRef::Integer(i)) => SqlValue::Integer(i),
        Some(ValueRef::Real(f)) => SqlValue::Real(f),
        Some(ValueRef::Text(s)) => SqlValue::Text(String::from_utf8_lossy(s).to_string()),
        Some(ValueRef::Blob(b)) => SqlValue::Blob(b.to_vec()),
    }
}
