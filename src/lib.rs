//! Metamorphic logic-bug finder for SQL engines.
//!
//! Random schemas and data are created through a [`Backend`], then oracles
//! derive queries that must relate in a known way (ternary logic
//! partitioning, non-optimizing reference engine construction). A mismatch
//! is a logic bug in the backend; no second database is consulted.

pub mod ast;
pub mod backend;
pub mod compare;
pub mod config;
pub mod context;
pub mod error;
pub mod expected;
pub mod generate;
pub mod oracle;
pub mod policy;
pub mod runner;
pub mod scheduler;
pub mod schema;
pub mod typing;
pub mod value;

pub use backend::{Backend, BackendError, SqliteBackend};
pub use compare::{compare, Comparison};
pub use config::FuzzConfig;
pub use context::{Context, Coverage};
pub use error::{FuzzError, GenError};
pub use expected::{ErrorClass, ExpectedErrors};
pub use oracle::{
    BugReport, Derivation, InconclusiveReason, Law, Oracle, OracleEngine, OracleRegistry, Verdict,
};
pub use policy::Policy;
pub use runner::{BugRecord, Fuzzer, RunConfig, RunOutcome, RunReport, RunStats};
pub use scheduler::{Action, RepeatBounds, Scheduler};
pub use schema::{build_schema, Schema, SchemaSnapshot};
pub use value::{Row, RowSet, SqlValue};
