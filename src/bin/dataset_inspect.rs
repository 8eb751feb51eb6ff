//! Dataset Inspection Tool
//!
//! CLI to look inside a recorded token-lab SQLite dataset without running
//! the full pipeline: candidate counts, stream statistics, per-candidate
//! summaries, and a standalone sufficiency dry-run.
//!
//! Usage:
//!   cargo run --bin dataset_inspect -- --db ./tokenlab.db summary
//!   cargo run --bin dataset_inspect -- --db ./tokenlab.db candidate --candidate-id <ID>
//!   cargo run --bin dataset_inspect -- --db ./tokenlab.db sufficiency

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use tokenlab_backend::cancel::CancellationToken;
use tokenlab_backend::events::CandidateSource;
use tokenlab_backend::replay::ReplayEngine;
use tokenlab_backend::storage::sqlite::SqliteDatabase;
use tokenlab_backend::storage::Stores;
use tokenlab_backend::sufficiency::SufficiencyChecker;

#[derive(Parser, Debug)]
#[command(name = "dataset_inspect")]
#[command(about = "Inspect a recorded token-lab dataset")]
struct Cli {
    /// Path to the SQLite database.
    #[arg(long)]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dataset-wide statistics: candidates per source, stream ranges.
    Summary,

    /// Per-candidate detail: event counts and merged-stream head.
    Candidate {
        #[arg(long)]
        candidate_id: String,

        /// Merged events to print.
        #[arg(long, default_value = "10")]
        head: usize,
    },

    /// Run the six sufficiency checks and print every finding.
    Sufficiency,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dataset_inspect=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let db = SqliteDatabase::open(&cli.db)
        .with_context(|| format!("opening dataset {} failed", cli.db))?;
    let stores = db.stores();

    match cli.command {
        Commands::Summary => print_summary(&stores),
        Commands::Candidate { candidate_id, head } => print_candidate(&stores, &candidate_id, head),
        Commands::Sufficiency => print_sufficiency(&stores),
    }
}

fn fmt_ts(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("{ms}"))
}

fn fmt_range(range: Option<(i64, i64)>) -> String {
    match range {
        Some((min, max)) => format!("{} .. {}", fmt_ts(min), fmt_ts(max)),
        None => "(empty)".to_string(),
    }
}

fn print_summary(stores: &Stores) -> Result<()> {
    let candidates = stores.candidates.all()?;
    let mut per_source: BTreeMap<&str, usize> = BTreeMap::new();
    let mut per_day: BTreeMap<String, usize> = BTreeMap::new();
    for candidate in &candidates {
        *per_source.entry(candidate.source.as_str()).or_insert(0) += 1;
        if let Some(dt) = DateTime::from_timestamp_millis(candidate.discovered_at) {
            *per_day.entry(dt.date_naive().to_string()).or_insert(0) += 1;
        }
    }

    println!("=== DATASET SUMMARY ===");
    println!("candidates: {}", candidates.len());
    for (source, count) in &per_source {
        println!("  {source}: {count}");
    }
    println!("swap range:           {}", fmt_range(stores.swaps.get_global_time_range()?));
    println!(
        "liquidity range:      {}",
        fmt_range(stores.liquidity_events.get_global_time_range()?)
    );
    println!("price series range:   {}", fmt_range(stores.prices.get_global_time_range()?));
    println!(
        "liquidity series rng: {}",
        fmt_range(stores.liquidity_series.get_global_time_range()?)
    );
    println!("trades: {}", stores.trades.all()?.len());
    println!("aggregates: {}", stores.aggregates.all()?.len());

    println!("\ndiscoveries per UTC day:");
    for (day, count) in &per_day {
        println!("  {day}: {count}");
    }
    Ok(())
}

fn print_candidate(stores: &Stores, candidate_id: &str, head: usize) -> Result<()> {
    let candidate = stores
        .candidates
        .get_by_id(candidate_id)
        .with_context(|| format!("candidate {candidate_id} not found"))?;

    println!("=== CANDIDATE {} ===", candidate.candidate_id);
    println!("source:        {}", candidate.source);
    println!("mint:          {}", candidate.mint);
    println!("pool:          {}", candidate.pool.as_deref().unwrap_or("(none)"));
    println!("discovered_at: {}", fmt_ts(candidate.discovered_at));
    println!("slot:          {}", candidate.slot);

    let swaps = stores.swaps.get_by_candidate_id(candidate_id)?;
    let liquidity = stores.liquidity_events.get_by_candidate_id(candidate_id)?;
    let prices = stores.prices.get_by_candidate_id(candidate_id)?;
    println!("swaps: {}  liquidity events: {}  price points: {}", swaps.len(), liquidity.len(), prices.len());

    let engine = ReplayEngine::new(stores.swaps.clone(), stores.liquidity_events.clone());
    let merged = engine.merged_events(candidate_id)?;
    println!("\nmerged stream head ({} of {}):", head.min(merged.len()), merged.len());
    for event in merged.iter().take(head) {
        let key = tokenlab_backend::ordering::Keyed::event_key(event);
        println!(
            "  slot {:>10}  {:<9}  {}  {}",
            key.slot,
            key.kind.name(),
            key.tx_signature,
            fmt_ts(event.timestamp_ms())
        );
    }
    Ok(())
}

fn print_sufficiency(stores: &Stores) -> Result<()> {
    let report = SufficiencyChecker::new(stores.clone()).check(&CancellationToken::new())?;

    println!("=== SUFFICIENCY ===");
    println!("verdict: {}", if report.passed { "PASS" } else { "FAIL" });
    for check in &report.checks {
        println!(
            "  [{}] {:<26} observed {:<28} threshold {}",
            if check.passed { "PASS" } else { "FAIL" },
            check.check.name(),
            check.observed,
            check.threshold
        );
    }
    if !report.messages.is_empty() {
        println!("\nfindings:");
        for message in &report.messages {
            println!("  - [{}] {}", message.check.name(), message.message);
        }
    }

    // A NEW_TOKEN tally helps interpret a failing count check.
    let new_tokens = stores
        .candidates
        .all()?
        .iter()
        .filter(|c| c.source == CandidateSource::NewToken)
        .count();
    println!("\nNEW_TOKEN candidates: {new_tokens}");
    Ok(())
}
