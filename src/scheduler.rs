//! Per-round action scheduling.
//!
//! A round starts from an empty database, creates a few tables and then
//! interleaves random DDL/DML statements with oracle checks until every
//! action has used up its drawn repeat count.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::ast::Stmt;
use crate::backend::{Backend, BackendError};
use crate::config::FuzzConfig;
use crate::context::Context;
use crate::error::{FuzzError, GenError};
use crate::expected::ErrorClass;
use crate::generate::stmt::{
    generate_alter_table, generate_create_index, generate_create_table, generate_create_view,
    generate_delete, generate_drop_table, generate_insert,
};
use crate::generate::{synthesize_select, ExprGenerator};
use crate::oracle::{pick_tables, BugReport, Oracle, OracleEngine, Verdict};
use crate::policy::Policy;
use crate::schema::{build_schema, Schema, SchemaError, Table};

/// Attempts per initial table before giving up on it.
const CREATE_TABLE_ATTEMPTS: usize = 10;

/// Something the scheduler can do within a round.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumIter,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    CreateTable,
    Insert,
    AlterTable,
    CreateIndex,
    CreateView,
    Delete,
    DropTable,
    /// One oracle check.
    Query,
    Explain,
}

/// Inclusive range of how many times an action runs per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatBounds {
    pub min: usize,
    pub max: usize,
}

impl RepeatBounds {
    /// Largest repeat count a single action may be configured with.
    pub const MAX_REPEAT: usize = 100_000;

    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max && self.max <= Self::MAX_REPEAT
    }

    fn draw(&self, ctx: &mut Context) -> usize {
        ctx.gen_range_inclusive(self.min, self.max)
    }
}

/// Counters for one round.
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    /// The round was cut short because the schema ran empty.
    pub skipped: bool,
    pub statements: usize,
    pub expected_errors: usize,
    pub unexpected_errors: usize,
    pub checks: usize,
    pub bugs: Vec<BugReport>,
}

/// Drives rounds against a backend.
pub struct Scheduler<'a> {
    config: &'a FuzzConfig,
    policy: Policy,
    oracles: &'a [Box<dyn Oracle>],
    verbose: bool,
}

impl<'a> Scheduler<'a> {
    pub fn new(config: &'a FuzzConfig, oracles: &'a [Box<dyn Oracle>]) -> Self {
        Self {
            config,
            policy: config.policy(),
            oracles,
            verbose: false,
        }
    }

    /// Log every statement at info level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run one round. An empty schema ends the round early and marks it
    /// skipped; every other error is fatal to the run.
    pub fn run_round(
        &self,
        ctx: &mut Context,
        backend: &mut dyn Backend,
        engine: &mut OracleEngine,
    ) -> Result<RoundReport, FuzzError> {
        let mut report = RoundReport::default();
        match self.drive(ctx, backend, engine, &mut report) {
            Ok(()) => Ok(report),
            Err(e) if e.is_round_local() => {
                tracing::info!("round skipped: {e}");
                report.skipped = true;
                Ok(report)
            }
            Err(e) => Err(e),
        }
    }

    fn drive(
        &self,
        ctx: &mut Context,
        backend: &mut dyn Backend,
        engine: &mut OracleEngine,
        report: &mut RoundReport,
    ) -> Result<(), FuzzError> {
        if self.oracles.is_empty() {
            return Err(GenError::invalid_config("no oracle configured").into());
        }
        backend.reset().map_err(FuzzError::Connection)?;

        let initial = ctx.gen_range_inclusive(1, self.config.max_initial_tables.max(1));
        for _ in 0..initial {
            for attempt in 1..=CREATE_TABLE_ATTEMPTS {
                let schema = load_schema(backend)?;
                let stmt = Stmt::CreateTable(generate_create_table(ctx, &self.policy, &schema));
                if self.execute(backend, &stmt, report)? {
                    break;
                }
                tracing::debug!(attempt, "initial table creation failed");
            }
        }

        let mut schema = load_schema(backend)?;
        let mut remaining: Vec<(Action, usize)> = Action::iter()
            .map(|action| (action, backend.action_bounds(action, self.config).draw(ctx)))
            .collect();
        tracing::debug!(?remaining, "action counts");

        loop {
            let weights: Vec<u32> = remaining
                .iter()
                .map(|(_, n)| u32::try_from(*n).unwrap_or(u32::from(u16::MAX)))
                .collect();
            let Some(idx) = ctx.weighted_index(&weights) else {
                break;
            };
            remaining[idx].1 -= 1;
            let action = remaining[idx].0;

            if !schema.has_tables() {
                return Err(FuzzError::EmptySchemaSkip);
            }
            if self.perform(ctx, backend, engine, &schema, action, report)? {
                schema = load_schema(backend)?;
            }
        }
        Ok(())
    }

    /// Run one action. Returns whether the schema may have changed.
    fn perform(
        &self,
        ctx: &mut Context,
        backend: &mut dyn Backend,
        engine: &mut OracleEngine,
        schema: &Schema,
        action: Action,
        report: &mut RoundReport,
    ) -> Result<bool, FuzzError> {
        let base_tables: Vec<&Table> = schema.base_tables().collect();
        let policy = &self.policy;

        let stmt = match action {
            Action::Query => {
                let Some(oracle) = ctx.choose(self.oracles) else {
                    return Ok(false);
                };
                report.checks += 1;
                if let Verdict::BugFound(bug) = engine.check(oracle.as_ref(), ctx, schema, backend)? {
                    report.bugs.push(*bug);
                }
                return Ok(false);
            }
            Action::Explain => {
                let tables = pick_tables(ctx, schema, policy)?;
                let generator = ExprGenerator::for_tables(policy, &tables);
                let mut select = synthesize_select(ctx, policy, &tables, &generator)?;
                select.where_clause = Some(generator.generate_predicate(ctx, policy.max_expr_depth)?);
                let sql = backend.explain(&select.to_string());
                self.execute_sql(backend, &sql, report)?;
                return Ok(false);
            }
            Action::CreateTable => {
                if base_tables.len() >= self.config.max_tables {
                    return Ok(false);
                }
                Stmt::CreateTable(generate_create_table(ctx, policy, schema))
            }
            Action::DropTable => Stmt::DropTable(generate_drop_table(ctx, schema)?),
            Action::Insert
            | Action::AlterTable
            | Action::CreateIndex
            | Action::CreateView
            | Action::Delete => {
                let Some(table) = ctx.choose(&base_tables).copied() else {
                    return Ok(false);
                };
                match action {
                    Action::Insert => Stmt::Insert(generate_insert(ctx, policy, table)),
                    Action::AlterTable => Stmt::AlterTable(generate_alter_table(ctx, policy, table)),
                    Action::CreateIndex => {
                        Stmt::CreateIndex(generate_create_index(ctx, policy, schema, table))
                    }
                    Action::CreateView => {
                        Stmt::CreateView(generate_create_view(ctx, policy, schema, table)?)
                    }
                    _ => Stmt::Delete(generate_delete(ctx, policy, table)?),
                }
            }
        };

        self.execute(backend, &stmt, report)?;
        Ok(stmt.changes_schema())
    }

    /// Execute a generated statement. Returns whether it succeeded.
    fn execute(
        &self,
        backend: &mut dyn Backend,
        stmt: &Stmt,
        report: &mut RoundReport,
    ) -> Result<bool, FuzzError> {
        self.execute_sql(backend, &stmt.to_string(), report)
    }

    fn execute_sql(
        &self,
        backend: &mut dyn Backend,
        sql: &str,
        report: &mut RoundReport,
    ) -> Result<bool, FuzzError> {
        if self.verbose {
            tracing::info!("{sql};");
        } else {
            tracing::debug!(sql, "statement");
        }
        report.statements += 1;

        match backend.execute(sql) {
            Ok(_) => Ok(true),
            Err(err @ BackendError::Connection(_)) => Err(FuzzError::Connection(err)),
            Err(err) => {
                match backend.classify(&err) {
                    ErrorClass::Expected => {
                        report.expected_errors += 1;
                        tracing::debug!(sql, "expected error: {err}");
                    }
                    ErrorClass::Unexpected => {
                        report.unexpected_errors += 1;
                        tracing::warn!(sql, "unexpected error: {err}");
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Current schema. Unlike [`build_schema`], an empty database is not an error
/// here.
fn load_schema(backend: &mut dyn Backend) -> Result<Schema, FuzzError> {
    let snapshot = backend.introspect().map_err(FuzzError::Connection)?;
    match build_schema(&snapshot) {
        Ok(schema) => Ok(schema),
        Err(SchemaError::Empty) => Ok(Schema::default()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteBackend;
    use crate::oracle::OracleRegistry;

    fn oracles(config: &FuzzConfig) -> Vec<Box<dyn Oracle>> {
        OracleRegistry::new()
            .resolve(&config.oracles, &config.policy())
            .unwrap()
    }

    #[test]
    fn test_action_names() {
        assert_eq!(Action::CreateTable.to_string(), "create_table");
        assert_eq!(
            serde_json::to_string(&Action::DropTable).unwrap(),
            "\"drop_table\""
        );
        assert_eq!(Action::iter().count(), 9);
    }

    #[test]
    fn test_round_runs_queries() {
        let config = FuzzConfig {
            max_queries: 20,
            oracles: vec!["tlp-where".into(), "norec".into()],
            ..FuzzConfig::default()
        };
        let oracles = oracles(&config);
        let scheduler = Scheduler::new(&config, &oracles);
        let mut db = SqliteBackend::new().unwrap();
        let mut engine = OracleEngine::new();

        let mut ctx = Context::new_with_seed(21);
        let mut checks = 0;
        for _ in 0..5 {
            let report = scheduler.run_round(&mut ctx, &mut db, &mut engine).unwrap();
            assert!(report.bugs.is_empty(), "{:?}", report.bugs);
            assert!(report.statements > 0);
            checks += report.checks;
        }
        assert!(checks > 0);
        let engine_checks: usize = engine.stats().values().map(|s| s.checks).sum();
        assert_eq!(engine_checks, checks);
    }

    #[test]
    fn test_round_is_deterministic() {
        let config = FuzzConfig::default();
        let oracles = oracles(&config);
        let scheduler = Scheduler::new(&config, &oracles);

        let run = |seed| {
            let mut db = SqliteBackend::new().unwrap();
            let mut engine = OracleEngine::new();
            let mut ctx = Context::new_with_seed(seed);
            let report = scheduler.run_round(&mut ctx, &mut db, &mut engine).unwrap();
            (
                report.statements,
                report.checks,
                report.expected_errors,
                ctx.coverage().total_exprs(),
            )
        };
        assert_eq!(run(33), run(33));
    }

    #[test]
    fn test_dropping_everything_skips_round() {
        let mut config = FuzzConfig {
            max_initial_tables: 1,
            max_queries: 5,
            ..FuzzConfig::default()
        };
        for action in Action::iter() {
            config.actions.insert(action, RepeatBounds::new(0, 0));
        }
        config.actions.insert(Action::DropTable, RepeatBounds::new(1, 1));
        config.actions.insert(Action::Query, RepeatBounds::new(1, 1));
        let oracles = oracles(&config);
        let scheduler = Scheduler::new(&config, &oracles);

        let mut db = SqliteBackend::new().unwrap();
        let mut engine = OracleEngine::new();
        let mut ctx = Context::new_with_seed(5);
        let report = scheduler.run_round(&mut ctx, &mut db, &mut engine).unwrap();
        // The query either ran before the drop or the round was cut short.
        assert!(report.skipped || report.checks == 1);
        assert!(report.skipped != (report.checks == 1));
    }
}
