//! Error types for query generation and fuzzing rounds.

use std::fmt;

use crate::backend::BackendError;
use crate::schema::SchemaError;

/// Error that can occur while generating expressions, queries or statements.
///
/// Generation errors are defects in the fuzzer itself, never in the backend
/// under test, so they travel all the way up to the run report.
#[derive(Debug, Clone)]
pub struct GenError {
    pub kind: GenErrorKind,
    pub scope: String,
    pub context: Vec<String>,
}

/// Kind of generation error.
#[derive(Debug, Clone)]
pub enum GenErrorKind {
    /// No valid candidates available (all filtered out by policy weights).
    Exhausted { reason: String },

    /// Schema doesn't have required objects.
    SchemaEmpty { needed: String },

    /// An internal contract was broken: empty column pool, missing type rule,
    /// predicate outside the tri-state domain.
    InvariantViolation { message: String },

    /// Invalid configuration.
    InvalidConfig { message: String },
}

impl GenError {
    /// Create an exhausted error.
    pub fn exhausted(scope: &str, reason: impl Into<String>) -> Self {
        Self {
            kind: GenErrorKind::Exhausted {
                reason: reason.into(),
            },
            scope: scope.to_string(),
            context: vec![],
        }
    }

    /// Create a schema empty error.
    pub fn schema_empty(needed: impl Into<String>) -> Self {
        Self {
            kind: GenErrorKind::SchemaEmpty {
                needed: needed.into(),
            },
            scope: String::new(),
            context: vec![],
        }
    }

    /// Create an invariant violation error.
    pub fn invariant(scope: &str, message: impl Into<String>) -> Self {
        Self {
            kind: GenErrorKind::InvariantViolation {
                message: message.into(),
            },
            scope: scope.to_string(),
            context: vec![],
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self {
            kind: GenErrorKind::InvalidConfig {
                message: message.into(),
            },
            scope: String::new(),
            context: vec![],
        }
    }

    /// Add context to the error.
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    /// Set the scope.
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self.kind, GenErrorKind::InvariantViolation { .. })
    }
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            GenErrorKind::Exhausted { reason } => {
                if self.scope.is_empty() {
                    write!(f, "no valid candidates: {reason}")?;
                } else {
                    write!(f, "no valid candidates in scope '{}': {reason}", self.scope)?;
                }
            }
            GenErrorKind::SchemaEmpty { needed } => {
                write!(f, "schema missing required {needed}")?;
            }
            GenErrorKind::InvariantViolation { message } => {
                if self.scope.is_empty() {
                    write!(f, "generator invariant violated: {message}")?;
                } else {
                    write!(
                        f,
                        "generator invariant violated in scope '{}': {message}",
                        self.scope
                    )?;
                }
            }
            GenErrorKind::InvalidConfig { message } => {
                write!(f, "invalid configuration: {message}")?;
            }
        }

        if !self.context.is_empty() {
            write!(f, "\n  context:")?;
            for c in &self.context {
                write!(f, "\n    - {c}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for GenError {}

/// Errors that end a check, a round or the whole run.
///
/// Expected backend errors and detected logic bugs are not errors here: they
/// are expressed as [`crate::oracle::Verdict`]s.
#[derive(Debug, thiserror::Error)]
pub enum FuzzError {
    /// The backend connection failed; the executor layer decides what to do.
    #[error("backend connection error: {0}")]
    Connection(BackendError),

    /// The generator broke one of its own contracts.
    #[error(transparent)]
    Generator(#[from] GenError),

    /// Random DDL left the database without tables. Aborts the round only.
    #[error("schema has no tables, skipping the rest of the round")]
    EmptySchemaSkip,

    /// The catalog snapshot could not be turned into a schema.
    #[error("invalid schema snapshot: {0}")]
    Schema(SchemaError),

    /// An oracle name that no registry entry provides.
    #[error("unknown oracle '{name}' (available: {available})")]
    UnknownOracle { name: String, available: String },
}

impl FuzzError {
    /// Errors that only end the current round.
    pub fn is_round_local(&self) -> bool {
        matches!(self, FuzzError::EmptySchemaSkip)
    }
}

impl From<SchemaError> for FuzzError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Empty => FuzzError::EmptySchemaSkip,
            other => FuzzError::Schema(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_error() {
        let err = GenError::exhausted("where clause", "no columns available");
        assert!(matches!(err.kind, GenErrorKind::Exhausted { .. }));
        assert_eq!(err.scope, "where clause");
    }

    #[test]
    fn test_error_with_context() {
        let err = GenError::invariant("expression", "empty column pool")
            .with_context("generating WHERE predicate")
            .with_context("tables: t0");

        assert!(err.is_invariant_violation());
        assert_eq!(err.context.len(), 2);
        let msg = err.to_string();
        assert!(msg.contains("invariant violated in scope 'expression'"));
        assert!(msg.contains("context:"));
        assert!(msg.contains("generating WHERE predicate"));
    }

    #[test]
    fn test_schema_empty_maps_to_skip() {
        let err: FuzzError = SchemaError::Empty.into();
        assert!(matches!(err, FuzzError::EmptySchemaSkip));
        assert!(err.is_round_local());

        let err: FuzzError = SchemaError::UnknownType {
            table: "t0".into(),
            column: "c0".into(),
            type_name: "JSONB".into(),
        }
        .into();
        assert!(matches!(err, FuzzError::Schema(_)));
        assert!(!err.is_round_local());
    }

    #[test]
    fn test_generator_error_is_fatal() {
        let err: FuzzError = GenError::invariant("literal", "no type rule").into();
        assert!(!err.is_round_local());
        assert!(err.to_string().contains("no type rule"));
    }
}
