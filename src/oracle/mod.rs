//! Metamorphic test oracles.
//!
//! An oracle derives a base query and a set of variant queries related to it
//! by a [`Law`]. The [`OracleEngine`] executes all of them, classifies any
//! backend error and checks the law on the results. A law violation is a
//! logic bug in the backend: no reference database is involved.

mod norec;
mod registry;
mod tlp;

use std::collections::BTreeMap;

use serde::Serialize;

pub use norec::NoRec;
pub use registry::OracleRegistry;
pub use tlp::{TlpHaving, TlpWhere};

use crate::ast::Select;
use crate::backend::{Backend, BackendError};
use crate::compare::{compare, distinct_rows, multiset_union, Comparison};
use crate::context::Context;
use crate::error::{FuzzError, GenError};
use crate::expected::ErrorClass;
use crate::policy::Policy;
use crate::schema::{Schema, Table};
use crate::value::{Row, RowSet, SqlValue};

/// A metamorphic test oracle.
pub trait Oracle {
    fn name(&self) -> &'static str;

    /// Build the base query and its variants for one check.
    fn derive(&self, ctx: &mut Context, schema: &Schema) -> Result<Derivation, GenError>;
}

/// Relation that must hold between base and variant results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Law {
    /// The base rows equal the multiset union of the variant rows. With
    /// `distinct`, the union is deduplicated first.
    PartitionUnion { distinct: bool },
    /// The single value of the base equals the single value of the only
    /// variant. NULL counts as 0.
    ScalarEquality,
}

/// Queries derived for one check.
#[derive(Debug, Clone)]
pub struct Derivation {
    pub base: Select,
    pub variants: Vec<Select>,
    pub law: Law,
}

/// Evidence for a logic bug.
#[derive(Debug, Clone, Serialize)]
pub struct BugReport {
    pub oracle: String,
    pub law: Law,
    pub base_sql: String,
    pub variant_sqls: Vec<String>,
    /// Rows of the base query.
    pub expected: RowSet,
    /// Rows recombined from the variants.
    pub actual: RowSet,
    pub missing: Vec<Row>,
    pub unexpected: Vec<Row>,
}

impl std::fmt::Display for BugReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "oracle {} found a logic bug", self.oracle)?;
        writeln!(f, "  base:    {}", self.base_sql)?;
        for sql in &self.variant_sqls {
            writeln!(f, "  variant: {sql}")?;
        }
        writeln!(f, "  expected ({} rows): {}", self.expected.len(), self.expected)?;
        writeln!(f, "  actual   ({} rows): {}", self.actual.len(), self.actual)?;
        writeln!(f, "  missing:    {}", RowSet::new(vec![], self.missing.clone()))?;
        write!(f, "  unexpected: {}", RowSet::new(vec![], self.unexpected.clone()))
    }
}

/// Why a check could not reach a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InconclusiveReason {
    /// A query hit a registered limitation of the backend.
    ExpectedError { sql: String, message: String },
    /// The base query failed with an unregistered error.
    BaseQueryRejected { sql: String, message: String },
    /// The base query ran but a variant failed with an unregistered error.
    AsymmetricFailure { sql: String, message: String },
}

impl InconclusiveReason {
    /// Failures worth a human look even though they are not proven bugs.
    pub fn is_suspicious(&self) -> bool {
        matches!(self, InconclusiveReason::AsymmetricFailure { .. })
    }
}

/// Outcome of one oracle check.
#[derive(Debug, Clone)]
pub enum Verdict {
    BugFound(Box<BugReport>),
    NoBug,
    Inconclusive(InconclusiveReason),
}

impl Verdict {
    pub fn is_bug(&self) -> bool {
        matches!(self, Verdict::BugFound(_))
    }
}

/// Per-oracle verdict counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OracleStats {
    pub checks: usize,
    pub bugs: usize,
    pub no_bugs: usize,
    pub inconclusive: usize,
    pub suspicious: usize,
    pub expected_errors: usize,
}

impl OracleStats {
    fn record(&mut self, verdict: &Verdict) {
        self.checks += 1;
        match verdict {
            Verdict::BugFound(_) => self.bugs += 1,
            Verdict::NoBug => self.no_bugs += 1,
            Verdict::Inconclusive(reason) => {
                self.inconclusive += 1;
                if reason.is_suspicious() {
                    self.suspicious += 1;
                }
                if matches!(reason, InconclusiveReason::ExpectedError { .. }) {
                    self.expected_errors += 1;
                }
            }
        }
    }
}

/// Runs derivations against a backend and counts verdicts per oracle.
#[derive(Debug, Default)]
pub struct OracleEngine {
    stats: BTreeMap<String, OracleStats>,
}

impl OracleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &BTreeMap<String, OracleStats> {
        &self.stats
    }

    /// Derive queries with `oracle` and evaluate them.
    pub fn check(
        &mut self,
        oracle: &dyn Oracle,
        ctx: &mut Context,
        schema: &Schema,
        backend: &mut dyn Backend,
    ) -> Result<Verdict, FuzzError> {
        let derivation = oracle
            .derive(ctx, schema)
            .map_err(|e| e.in_scope(oracle.name()))?;
        self.evaluate(backend, oracle.name(), &derivation)
    }

    /// Execute the base and every variant in sequence and apply the law.
    pub fn evaluate(
        &mut self,
        backend: &mut dyn Backend,
        oracle_name: &str,
        derivation: &Derivation,
    ) -> Result<Verdict, FuzzError> {
        let verdict = evaluate_derivation(backend, oracle_name, derivation)?;
        match &verdict {
            Verdict::BugFound(report) => tracing::error!("{report}"),
            Verdict::NoBug => tracing::debug!(oracle = oracle_name, "no bug"),
            Verdict::Inconclusive(reason) => {
                tracing::debug!(oracle = oracle_name, ?reason, "inconclusive")
            }
        }
        self.stats
            .entry(oracle_name.to_string())
            .or_default()
            .record(&verdict);
        Ok(verdict)
    }
}

enum Outcome {
    Rows(RowSet),
    Failed(ErrorClass, String),
}

fn execute(backend: &mut dyn Backend, sql: &str) -> Result<Outcome, FuzzError> {
    tracing::debug!(sql, "executing");
    match backend.execute(sql) {
        Ok(rows) => Ok(Outcome::Rows(rows)),
        Err(err @ BackendError::Connection(_)) => Err(FuzzError::Connection(err)),
        Err(err) => Ok(Outcome::Failed(
            backend.classify(&err),
            err.message().to_string(),
        )),
    }
}

fn evaluate_derivation(
    backend: &mut dyn Backend,
    oracle_name: &str,
    derivation: &Derivation,
) -> Result<Verdict, FuzzError> {
    let base_sql = derivation.base.to_string();
    let base = match execute(backend, &base_sql)? {
        Outcome::Rows(rows) => rows,
        Outcome::Failed(ErrorClass::Expected, message) => {
            return Ok(Verdict::Inconclusive(InconclusiveReason::ExpectedError {
                sql: base_sql,
                message,
            }));
        }
        Outcome::Failed(ErrorClass::Unexpected, message) => {
            tracing::warn!(sql = %base_sql, "base query rejected: {message}");
            return Ok(Verdict::Inconclusive(
                InconclusiveReason::BaseQueryRejected {
                    sql: base_sql,
                    message,
                },
            ));
        }
    };

    let variant_sqls: Vec<String> = derivation.variants.iter().map(|v| v.to_string()).collect();
    let mut variants = Vec::with_capacity(variant_sqls.len());
    for sql in &variant_sqls {
        match execute(backend, sql)? {
            Outcome::Rows(rows) => variants.push(rows),
            Outcome::Failed(ErrorClass::Expected, message) => {
                return Ok(Verdict::Inconclusive(InconclusiveReason::ExpectedError {
                    sql: sql.clone(),
                    message,
                }));
            }
            Outcome::Failed(ErrorClass::Unexpected, message) => {
                tracing::error!(
                    oracle = oracle_name,
                    base = %base_sql,
                    sql = %sql,
                    "variant failed while base succeeded: {message}"
                );
                return Ok(Verdict::Inconclusive(
                    InconclusiveReason::AsymmetricFailure {
                        sql: sql.clone(),
                        message,
                    },
                ));
            }
        }
    }

    let (expected, actual) = match derivation.law {
        Law::PartitionUnion { distinct } => {
            let union = multiset_union(&variants);
            let union = if distinct { distinct_rows(&union) } else { union };
            (base, union)
        }
        Law::ScalarEquality => {
            let Some(variant) = variants.first() else {
                return Err(GenError::invariant("scalar law", "no variant query").into());
            };
            (scalar_or_zero(&base), scalar_or_zero(variant))
        }
    };

    match compare(&expected, &actual) {
        Comparison::Equal => Ok(Verdict::NoBug),
        Comparison::NotEqual {
            missing,
            unexpected,
        } => Ok(Verdict::BugFound(Box::new(BugReport {
            oracle: oracle_name.to_string(),
            law: derivation.law,
            base_sql,
            variant_sqls,
            expected,
            actual,
            missing,
            unexpected,
        }))),
    }
}

/// Single-value row set of a scalar result, with NULL and "no row" read as 0.
fn scalar_or_zero(rows: &RowSet) -> RowSet {
    let value = match rows.scalar() {
        None | Some(SqlValue::Null) => SqlValue::Integer(0),
        Some(value) => value.clone(),
    };
    RowSet::single_column("value", vec![value])
}

/// Non-empty set of tables for one check, capped by the policy.
pub(crate) fn pick_tables<'a>(
    ctx: &mut Context,
    schema: &'a Schema,
    policy: &Policy,
) -> Result<Vec<&'a Table>, GenError> {
    let mut tables = schema.random_non_empty_tables(ctx);
    if tables.is_empty() {
        return Err(GenError::schema_empty("at least one table"));
    }
    if tables.len() > policy.max_select_tables.max(1) {
        ctx.shuffle(&mut tables);
        tables.truncate(policy.max_select_tables.max(1));
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ColumnRef, Expr, ExprType, FromItem, SelectItem, TableRef};
    use crate::backend::SqliteBackend;
    use crate::schema::CompositeType;

    fn select(sql_table: &str, column: &str) -> Select {
        Select::new(
            vec![SelectItem::new(Expr::column(ColumnRef::new(
                sql_table,
                column,
                ExprType::new(CompositeType::int(4), true),
            )))],
            vec![FromItem::Table(TableRef::new(sql_table))],
        )
    }

    fn backend() -> SqliteBackend {
        let mut db = SqliteBackend::new().unwrap();
        db.execute("CREATE TABLE t0 (c0 INT)").unwrap();
        db.execute("INSERT INTO t0 (c0) VALUES (1), (NULL), (2)").unwrap();
        db
    }

    #[test]
    fn test_partition_union_detects_missing_rows() {
        let mut db = backend();
        let mut engine = OracleEngine::new();
        let base = select("t0", "c0");

        // Two copies of the full table cannot be a partition of it.
        let derivation = Derivation {
            base: base.clone(),
            variants: vec![base.clone(), base.clone()],
            law: Law::PartitionUnion { distinct: false },
        };
        let verdict = engine.evaluate(&mut db, "test", &derivation).unwrap();
        let Verdict::BugFound(report) = verdict else {
            panic!("expected a bug");
        };
        assert_eq!(report.unexpected.len(), 3);
        assert!(report.missing.is_empty());

        // ... unless the union is deduplicated.
        let derivation = Derivation {
            law: Law::PartitionUnion { distinct: true },
            ..derivation
        };
        assert!(matches!(
            engine.evaluate(&mut db, "test", &derivation).unwrap(),
            Verdict::NoBug
        ));
        assert_eq!(engine.stats()["test"].checks, 2);
        assert_eq!(engine.stats()["test"].bugs, 1);
    }

    #[test]
    fn test_base_rejected_and_asymmetric_failure() {
        let mut db = backend();
        let mut engine = OracleEngine::new();

        let missing = select("t9", "c0");
        let derivation = Derivation {
            base: missing.clone(),
            variants: vec![],
            law: Law::PartitionUnion { distinct: false },
        };
        assert!(matches!(
            engine.evaluate(&mut db, "test", &derivation).unwrap(),
            Verdict::Inconclusive(InconclusiveReason::BaseQueryRejected { .. })
        ));

        let derivation = Derivation {
            base: select("t0", "c0"),
            variants: vec![missing],
            law: Law::PartitionUnion { distinct: false },
        };
        let verdict = engine.evaluate(&mut db, "test", &derivation).unwrap();
        let Verdict::Inconclusive(reason) = verdict else {
            panic!("expected inconclusive");
        };
        assert!(reason.is_suspicious());
        assert_eq!(engine.stats()["test"].suspicious, 1);
        assert_eq!(engine.stats()["test"].inconclusive, 2);
    }

    #[test]
    fn test_scalar_null_counts_as_zero() {
        let zero = RowSet::single_column("c", vec![SqlValue::Integer(0)]);
        let null = RowSet::single_column("c", vec![SqlValue::Null]);
        assert!(compare(&scalar_or_zero(&zero), &scalar_or_zero(&null)).is_equal());
        assert!(compare(&scalar_or_zero(&RowSet::default()), &scalar_or_zero(&zero)).is_equal());
    }

    #[test]
    fn test_pick_tables_respects_cap() {
        use crate::schema::{Column, SchemaBuilder};
        let schema = (0..5)
            .fold(SchemaBuilder::new(), |b, i| {
                b.table(Table::new(
                    format!("t{i}"),
                    vec![Column::new("c0", CompositeType::int(4))],
                ))
            })
            .build();
        let policy = Policy::default();
        let mut ctx = Context::new_with_seed(10);
        for _ in 0..50 {
            let tables = pick_tables(&mut ctx, &schema, &policy).unwrap();
            assert!(!tables.is_empty() && tables.len() <= policy.max_select_tables);
        }
        assert!(pick_tables(&mut ctx, &Schema::default(), &policy).is_err());
    }
}
