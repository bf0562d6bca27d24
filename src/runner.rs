//! Multi-round fuzzing runs.
//!
//! A run draws one seed per round from the run seed, drives the scheduler
//! for every round and collects verdict counters and bug records. A bug
//! record carries its round seed, so `--round-seed` replays that round alone.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context as _, Result};
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::backend::Backend;
use crate::config::FuzzConfig;
use crate::context::{Context, Coverage};
use crate::oracle::{BugReport, Oracle, OracleEngine, OracleRegistry, OracleStats};
use crate::scheduler::{RoundReport, Scheduler};

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Seed of the run; every round seed is drawn from it.
    pub seed: u64,
    pub rounds: usize,
    /// Replay exactly one round with this seed instead.
    pub round_seed: Option<u64>,
    pub verbose: bool,
    pub fuzz: FuzzConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            rounds: 10,
            round_seed: None,
            verbose: false,
            fuzz: FuzzConfig::default(),
        }
    }
}

/// Statistics from a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub rounds_completed: usize,
    pub rounds_skipped: usize,
    pub statements: usize,
    pub checks: usize,
    pub bugs: usize,
    pub no_bugs: usize,
    pub inconclusive: usize,
    /// Variant queries that failed while their base query succeeded.
    pub suspicious: usize,
    pub expected_errors: usize,
    pub unexpected_errors: usize,
    pub exprs_generated: usize,
}

impl RunStats {
    pub fn is_success(&self) -> bool {
        self.bugs == 0
    }

    fn add_round(&mut self, round: &RoundReport) {
        if round.skipped {
            self.rounds_skipped += 1;
        } else {
            self.rounds_completed += 1;
        }
        self.statements += round.statements;
        self.expected_errors += round.expected_errors;
        self.unexpected_errors += round.unexpected_errors;
    }

    fn add_oracle(&mut self, stats: &OracleStats) {
        self.checks += stats.checks;
        self.bugs += stats.bugs;
        self.no_bugs += stats.no_bugs;
        self.inconclusive += stats.inconclusive;
        self.suspicious += stats.suspicious;
        self.expected_errors += stats.expected_errors;
    }

    /// Sum of two runs, used by `loop --jobs`.
    pub fn merge(&mut self, other: &RunStats) {
        self.rounds_completed += other.rounds_completed;
        self.rounds_skipped += other.rounds_skipped;
        self.statements += other.statements;
        self.checks += other.checks;
        self.bugs += other.bugs;
        self.no_bugs += other.no_bugs;
        self.inconclusive += other.inconclusive;
        self.suspicious += other.suspicious;
        self.expected_errors += other.expected_errors;
        self.unexpected_errors += other.unexpected_errors;
        self.exprs_generated += other.exprs_generated;
    }

    pub fn to_table(&self, seed: Option<u64>) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let status = if self.is_success() {
            Cell::new("NO BUGS")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold)
        } else {
            Cell::new("BUGS FOUND")
                .fg(Color::Red)
                .add_attribute(Attribute::Bold)
        };
        table.set_header(vec![
            Cell::new("Fuzzing Results").add_attribute(Attribute::Bold),
            status,
        ]);

        if let Some(seed) = seed {
            table.add_row(vec![Cell::new("Seed").fg(Color::Cyan), Cell::new(seed)]);
        }
        for (label, value) in [
            ("Rounds Completed", self.rounds_completed),
            ("Rounds Skipped", self.rounds_skipped),
            ("Statements Executed", self.statements),
            ("Oracle Checks", self.checks),
            ("Expressions Generated", self.exprs_generated),
            ("No Bug", self.no_bugs),
            ("Inconclusive", self.inconclusive),
            ("Expected Errors", self.expected_errors),
        ] {
            table.add_row(vec![Cell::new(label).fg(Color::Blue), Cell::new(value)]);
        }

        let warn = |n: usize, color: Color| {
            if n > 0 {
                Cell::new(n).fg(color)
            } else {
                Cell::new(n).fg(Color::Green)
            }
        };
        table.add_row(vec![
            Cell::new("Unexpected Errors").fg(Color::Yellow),
            warn(self.unexpected_errors, Color::Yellow),
        ]);
        table.add_row(vec![
            Cell::new("Suspicious").fg(Color::Yellow),
            warn(self.suspicious, Color::Yellow),
        ]);
        table.add_row(vec![
            Cell::new("Logic Bugs").fg(Color::Red),
            warn(self.bugs, Color::Red).add_attribute(Attribute::Bold),
        ]);
        table
    }

    pub fn print_table(&self, seed: Option<u64>) {
        println!("\n{}", self.to_table(seed));
    }
}

/// A bug with what is needed to replay it.
#[derive(Debug, Clone, Serialize)]
pub struct BugRecord {
    pub round: usize,
    pub round_seed: u64,
    pub report: BugReport,
}

/// Result of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutcome {
    pub stats: RunStats,
    pub oracle_stats: BTreeMap<String, OracleStats>,
    pub bugs: Vec<BugRecord>,
    #[serde(skip)]
    pub coverage: Coverage,
}

/// The JSON report written with `--report`.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub seeds: Vec<u64>,
    pub config: &'a FuzzConfig,
    pub stats: &'a RunStats,
    pub coverage: BTreeMap<String, usize>,
    pub bugs: Vec<&'a BugRecord>,
}

impl<'a> RunReport<'a> {
    pub fn new(
        seeds: Vec<u64>,
        config: &'a FuzzConfig,
        outcomes: &'a [RunOutcome],
        stats: &'a RunStats,
    ) -> Self {
        let mut coverage = Coverage::default();
        for outcome in outcomes {
            coverage.merge(&outcome.coverage);
        }
        Self {
            seeds,
            config,
            stats,
            coverage: coverage
                .iter()
                .map(|(kind, count)| (kind.to_string(), count))
                .collect(),
            bugs: outcomes.iter().flat_map(|o| o.bugs.iter()).collect(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        tracing::info!(
            "Wrote report ({} bugs) to {}",
            self.bugs.len(),
            path.display()
        );
        Ok(())
    }
}

/// Runs rounds against one backend.
pub struct Fuzzer<B: Backend> {
    config: RunConfig,
    backend: B,
    oracles: Vec<Box<dyn Oracle>>,
}

impl<B: Backend> Fuzzer<B> {
    /// Resolve the configured oracles. Unknown names fail here, before any
    /// round starts.
    pub fn new(config: RunConfig, backend: B) -> Result<Self> {
        config.fuzz.check().context("invalid fuzzing configuration")?;
        let oracles = OracleRegistry::new().resolve(&config.fuzz.oracles, &config.fuzz.policy())?;
        Ok(Self {
            config,
            backend,
            oracles,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Round seeds in execution order.
    pub fn round_seeds(&self) -> Vec<u64> {
        if let Some(seed) = self.config.round_seed {
            return vec![seed];
        }
        let mut master = Context::new_with_seed(self.config.seed);
        (0..self.config.rounds).map(|_| master.gen_u64()).collect()
    }

    pub fn run(&mut self) -> Result<RunOutcome> {
        tracing::info!(
            "Starting run on {} with seed={}, rounds={}, oracles={:?}",
            self.backend.name(),
            self.config.seed,
            self.config.rounds,
            self.config.fuzz.oracles,
        );

        let scheduler = Scheduler::new(&self.config.fuzz, &self.oracles).verbose(self.config.verbose);
        let mut engine = OracleEngine::new();
        let mut outcome = RunOutcome::default();

        for (round, round_seed) in self.round_seeds().into_iter().enumerate() {
            tracing::info!("Round {}: seed {round_seed}", round + 1);
            let mut ctx = Context::new_with_seed(round_seed);
            let report = scheduler
                .run_round(&mut ctx, &mut self.backend, &mut engine)
                .with_context(|| format!("round {} (seed {round_seed}) failed", round + 1))?;

            outcome.stats.add_round(&report);
            outcome.coverage.merge(&ctx.take_coverage());
            for bug in report.bugs {
                tracing::error!("Round {} (seed {round_seed}) found a bug", round + 1);
                outcome.bugs.push(BugRecord {
                    round: round + 1,
                    round_seed,
                    report: bug,
                });
            }
        }

        for stats in engine.stats().values() {
            outcome.stats.add_oracle(stats);
        }
        outcome.stats.exprs_generated = outcome.coverage.total_exprs();
        outcome.oracle_stats = engine.stats().clone();
        Ok(outcome)
    }
}
