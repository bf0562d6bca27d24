//! Metamorphic logic-bug finder.
//!
//! Runs TLP and NoREC checks against an in-memory SQLite database and exits
//! with status 1 when a logic bug was found.

use std::io::{stdin, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use logic_fuzzer::{
    Fuzzer, FuzzConfig, OracleRegistry, RunConfig, RunOutcome, RunReport, RunStats, SqliteBackend,
};
use rand::RngCore;

/// SQLancer-style metamorphic testing of SQL engines.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run seed; every round seed is drawn from it.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of rounds.
    #[arg(short, long, default_value_t = 10)]
    rounds: usize,

    /// Replay a single round with this seed.
    #[arg(long)]
    round_seed: Option<u64>,

    /// Maximum number of base tables per round.
    #[arg(short = 't', long)]
    max_tables: Option<usize>,

    /// Maximum number of columns per created table.
    #[arg(short = 'c', long)]
    max_columns: Option<usize>,

    /// Maximum number of oracle checks per round.
    #[arg(short = 'n', long)]
    max_queries: Option<usize>,

    /// Maximum depth of generated expressions.
    #[arg(short = 'd', long)]
    max_depth: Option<usize>,

    /// Oracles to run, comma separated.
    #[arg(short, long, value_delimiter = ',')]
    oracle: Vec<String>,

    /// JSON5 configuration file. Command line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log every generated statement.
    #[arg(short, long)]
    verbose: bool,

    /// Write a JSON report to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the fuzzer in a loop with random seeds.
    Loop {
        /// Number of iterations to run (0 for infinite).
        #[arg(default_value_t = 0)]
        iterations: u64,

        /// Independent fuzzers per iteration, each on its own thread.
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// Collect bugs and write a JSON report to this path instead of
        /// stopping at the first one.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

impl Args {
    fn fuzz_config(&self) -> Result<FuzzConfig> {
        let mut config = match &self.config {
            Some(path) => FuzzConfig::load(path)?,
            None => FuzzConfig::default(),
        };
        if let Some(n) = self.max_tables {
            config.max_tables = n;
        }
        if let Some(n) = self.max_columns {
            config.max_columns = n;
        }
        if let Some(n) = self.max_queries {
            config.max_queries = n;
        }
        if let Some(n) = self.max_depth {
            config.max_expr_depth = n;
        }
        if !self.oracle.is_empty() {
            config.oracles = self.oracle.clone();
        }
        config.check()?;

        // Fail on unknown oracle names before any backend is opened.
        OracleRegistry::new().resolve(&config.oracles, &config.policy())?;
        Ok(config)
    }

    fn run_config(&self, seed: u64, fuzz: &FuzzConfig) -> RunConfig {
        RunConfig {
            seed,
            rounds: self.rounds,
            round_seed: self.round_seed,
            verbose: self.verbose,
            fuzz: fuzz.clone(),
        }
    }
}

fn main() -> Result<()> {
    let mut subscriber = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()),
    );
    if !stdin().is_terminal() {
        subscriber = subscriber.with_ansi(false)
    }
    subscriber.init();

    let args = Args::parse();
    let fuzz = args.fuzz_config()?;

    match args.command {
        Some(Commands::Loop {
            iterations,
            jobs,
            ref report,
        }) => run_loop(&args, &fuzz, iterations, jobs.max(1), report.as_ref()),
        None => run_single(&args, &fuzz),
    }
}

fn run_once(config: RunConfig) -> Result<RunOutcome> {
    let backend = SqliteBackend::new().context("failed to open SQLite")?;
    let mut fuzzer = Fuzzer::new(config, backend)?;
    fuzzer.run()
}

fn print_bugs(outcome: &RunOutcome) {
    for bug in &outcome.bugs {
        println!(
            "\nround {} (replay with --round-seed {}):\n{}",
            bug.round, bug.round_seed, bug.report
        );
    }
}

fn run_single(args: &Args, fuzz: &FuzzConfig) -> Result<()> {
    let seed = args.seed.unwrap_or_else(|| rand::rng().next_u64());
    let outcome = run_once(args.run_config(seed, fuzz))?;

    print_bugs(&outcome);
    outcome.stats.print_table(Some(seed));
    if let Some(path) = &args.report {
        let outcomes = [outcome];
        RunReport::new(vec![seed], fuzz, &outcomes, &outcomes[0].stats).write(path)?;
        if !outcomes[0].stats.is_success() {
            std::process::exit(1);
        }
    } else if !outcome.stats.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_loop(
    args: &Args,
    fuzz: &FuzzConfig,
    iterations: u64,
    jobs: usize,
    report: Option<&PathBuf>,
) -> Result<()> {
    let collecting = report.is_some();
    let mut seeds = Vec::new();
    let mut outcomes = Vec::new();
    let mut total = RunStats::default();
    let mut iteration = 0u64;
    let mut errored = false;

    loop {
        let batch: Vec<u64> = (0..jobs).map(|_| rand::rng().next_u64()).collect();
        tracing::info!("Iteration {}: seeds {batch:?}", iteration + 1);

        let results: Vec<(u64, Result<RunOutcome>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|&seed| {
                    let config = args.run_config(seed, fuzz);
                    (seed, scope.spawn(move || run_once(config)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(seed, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("fuzzer thread panicked")));
                    (seed, result)
                })
                .collect()
        });

        let mut failed = false;
        for (seed, result) in results {
            seeds.push(seed);
            match result {
                Ok(outcome) => {
                    if !outcome.stats.is_success() {
                        tracing::error!(
                            "Iteration {} found {} bug(s) (seed {seed})",
                            iteration + 1,
                            outcome.stats.bugs
                        );
                        print_bugs(&outcome);
                        failed = true;
                    }
                    total.merge(&outcome.stats);
                    outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!("Iteration {} errored (seed {seed}): {e:#}", iteration + 1);
                    errored = true;
                    failed = true;
                }
            }
        }

        iteration += 1;
        if failed && !collecting {
            break;
        }
        if iterations > 0 && iteration >= iterations {
            tracing::info!("Completed {} iterations", iterations);
            break;
        }
    }

    total.print_table(None);
    if let Some(path) = report {
        RunReport::new(seeds, fuzz, &outcomes, &total).write(path)?;
    }
    if errored || !total.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
