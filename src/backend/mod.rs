//! Backend capability trait.
//!
//! The oracle engine and the scheduler only talk to a database through
//! [`Backend`]. Execution is blocking and strictly sequential.

mod sqlite;

pub use sqlite::SqliteBackend;

use crate::config::FuzzConfig;
use crate::expected::{self, ErrorClass, ExpectedErrors};
use crate::scheduler::{Action, RepeatBounds};
use crate::schema::SchemaSnapshot;
use crate::value::RowSet;

/// Failure reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The statement failed; the connection is still usable.
    #[error("{0}")]
    Query(String),
    /// The connection is gone. Always fatal.
    #[error("connection lost: {0}")]
    Connection(String),
}

impl BackendError {
    pub fn message(&self) -> &str {
        match self {
            BackendError::Query(m) | BackendError::Connection(m) => m,
        }
    }
}

/// A database under test.
pub trait Backend {
    fn name(&self) -> &str;

    /// Drop all state and start from an empty database.
    fn reset(&mut self) -> Result<(), BackendError>;

    /// Read the catalog into a backend-neutral snapshot.
    fn introspect(&mut self) -> Result<SchemaSnapshot, BackendError>;

    /// Execute one statement. Statements without a result set return an
    /// empty [`RowSet`].
    fn execute(&mut self, sql: &str) -> Result<RowSet, BackendError>;

    fn expected_errors(&self) -> &ExpectedErrors;

    fn classify(&self, err: &BackendError) -> ErrorClass {
        expected::classify(err, self.expected_errors())
    }

    /// How often an action runs per round.
    fn action_bounds(&self, action: Action, config: &FuzzConfig) -> RepeatBounds {
        config.bounds(action)
    }

    /// The statement that asks the backend for the plan of `sql`.
    fn explain(&self, sql: &str) -> String {
        format!("EXPLAIN {sql}")
    }
}
