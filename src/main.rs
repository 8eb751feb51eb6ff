//! Token-Lab CLI
//!
//! Runs the full deterministic research pipeline and writes the report
//! artifacts into `--output-dir`.
//!
//! # Usage
//!
//! ```bash
//! # Hermetic run over the fixture dataset:
//! cargo run --bin tokenlab -- --output-dir ./out --use-fixtures
//!
//! # Run over a recorded SQLite dataset:
//! cargo run --bin tokenlab -- --output-dir ./out --db ./tokenlab.db
//! ```
//!
//! # Exit Codes
//!
//! - 0: run completed and all artifacts were written
//! - 1: configuration error (no data source, bad arguments)
//! - 2: fatal pipeline error (storage unavailable, invariant violation,
//!   output write failure)

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tokenlab_backend::fixtures::{load_fixtures, FixtureConfig};
use tokenlab_backend::pipeline::{run_pipeline, PipelineConfig};
use tokenlab_backend::report::ReportWriter;
use tokenlab_backend::storage::sqlite::SqliteDatabase;
use tokenlab_backend::storage::Stores;
use tokenlab_backend::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tokenlab")]
#[command(about = "Deterministic token-trading research pipeline")]
struct Args {
    /// Directory the report artifacts are written into.
    #[arg(long)]
    output_dir: String,

    /// Run over the deterministic fixture dataset instead of a database.
    #[arg(long, default_value_t = false)]
    use_fixtures: bool,

    /// Path to a SQLite raw-data store.
    #[arg(long, env = "TOKENLAB_DB")]
    db: Option<String>,

    /// Seed for the fixture generator.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Strategy version recorded in the reproducibility envelope.
    #[arg(long, default_value = "1.0.0")]
    strategy_version: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokenlab_backend=info,tokenlab=info".into()),
        )
        .init();

    // The verbatim command line goes into the reproducibility envelope.
    let replay_command = std::env::args().collect::<Vec<_>>().join(" ");
    let args = Args::parse();

    match run(&args, replay_command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("run failed: {:#}", e);
            if e.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
    }
}

#[derive(Debug)]
struct ConfigError(String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

fn run(args: &Args, replay_command: String) -> Result<()> {
    let stores: Stores = if args.use_fixtures {
        let stores = Stores::in_memory();
        let config = FixtureConfig {
            seed: args.seed,
            ..FixtureConfig::default()
        };
        let summary = load_fixtures(&stores, &config)
            .context("loading the fixture dataset failed")?;
        info!(
            candidates = summary.candidates,
            swaps = summary.swaps,
            "fixture dataset ready"
        );
        stores
    } else if let Some(db_path) = &args.db {
        let db = SqliteDatabase::open(db_path)
            .with_context(|| format!("opening raw-data store {db_path} failed"))?;
        db.stores()
    } else {
        bail!(ConfigError(
            "either --use-fixtures or --db <path> is required".to_string()
        ));
    };

    let cancel = CancellationToken::new();
    let mut config = PipelineConfig::new(replay_command, chrono::Utc::now());
    config.strategy_version = args.strategy_version.clone();

    let report = run_pipeline(&stores, &config, &cancel).context("pipeline failed")?;
    info!(decision = %report.decision, "pipeline finished");

    let writer = ReportWriter::new(&args.output_dir);
    let artifacts = writer
        .write_all(&report, &cancel)
        .with_context(|| format!("writing artifacts into {} failed", args.output_dir))?;

    info!(
        output_dir = %args.output_dir,
        written = artifacts.written.len(),
        decision = %report.decision,
        "done"
    );
    Ok(())
}
