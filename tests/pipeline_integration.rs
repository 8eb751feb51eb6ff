//! End-to-end pipeline test: fixtures in, artifacts out, and bit-stable
//! reproduction across two independent runs.

use chrono::DateTime;
use std::fs;
use tokenlab_backend::decision::GateDecision;
use tokenlab_backend::fixtures::{load_fixtures, FixtureConfig};
use tokenlab_backend::pipeline::{run_pipeline, PipelineConfig};
use tokenlab_backend::report::{
    ReportWriter, CHECKSUMS_SHA256, DECISION_GATE_REPORT_MD, METADATA_JSON, REPORT_JSON,
    REPORT_PHASE1_MD, STRATEGY_AGGREGATES_CSV, TRADE_RECORDS_CSV,
};
use tokenlab_backend::storage::Stores;
use tokenlab_backend::CancellationToken;

/// Fixed report timestamp so two runs are byte-comparable.
const REPORT_TS_MS: i64 = 1_700_000_000_000;

fn full_run(seed: u64, out_dir: &std::path::Path) -> tokenlab_backend::RunReport {
    let stores = Stores::in_memory();
    load_fixtures(&stores, &FixtureConfig { seed, ..FixtureConfig::default() }).unwrap();

    let config = PipelineConfig::new(
        "tokenlab --output-dir out --use-fixtures",
        DateTime::from_timestamp_millis(REPORT_TS_MS).unwrap(),
    );
    let cancel = CancellationToken::new();

    let report = run_pipeline(&stores, &config, &cancel).unwrap();
    ReportWriter::new(out_dir).write_all(&report, &cancel).unwrap();
    report
}

#[test]
fn fixture_run_produces_complete_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let report = full_run(42, dir.path());

    // The default fixture shape satisfies sufficiency, so the gate runs.
    assert!(report.sufficiency.passed, "sufficiency findings: {:?}", report.sufficiency.messages);
    assert_ne!(report.decision, GateDecision::InsufficientData);
    assert!(!report.evaluations.is_empty());

    // Every stored trade replays identically.
    assert!(report.verification.passed(), "mismatches: {:?}", report.verification.mismatches);
    assert!(report.verification.total_trades > 0);

    for name in [
        REPORT_PHASE1_MD,
        DECISION_GATE_REPORT_MD,
        REPORT_JSON,
        STRATEGY_AGGREGATES_CSV,
        TRADE_RECORDS_CSV,
        METADATA_JSON,
        CHECKSUMS_SHA256,
    ] {
        assert!(dir.path().join(name).exists(), "missing artifact {name}");
    }

    // The markdown report carries the required sections.
    let phase1 = fs::read_to_string(dir.path().join(REPORT_PHASE1_MD)).unwrap();
    for section in [
        "## Executive Summary",
        "## Data Summary",
        "## Data Quality",
        "## Strategy Metrics",
        "## NEW_TOKEN vs ACTIVE_TOKEN",
        "## Scenario Sensitivity",
        "## Reproducibility",
        "## Replay References",
    ] {
        assert!(phase1.contains(section), "missing section {section}");
    }

    // The envelope records the command and the data version.
    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join(METADATA_JSON)).unwrap()).unwrap();
    assert_eq!(metadata["data_version"], report.data_version.version.as_str());
    assert_eq!(metadata["data_version_source"], "stores");
    assert_eq!(metadata["replay_command"], "tokenlab --output-dir out --use-fixtures");
    assert_eq!(metadata["strategy_version"], report.strategy_version.as_str());
    assert_eq!(metadata["decision"], report.decision.as_str());
}

#[test]
fn two_runs_are_bit_identical() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let report_a = full_run(42, dir_a.path());
    let report_b = full_run(42, dir_b.path());

    assert_eq!(report_a.data_version, report_b.data_version);
    assert_eq!(report_a.decision, report_b.decision);

    // Every artifact byte-matches, which the checksum files summarize.
    let checksums_a = fs::read(dir_a.path().join(CHECKSUMS_SHA256)).unwrap();
    let checksums_b = fs::read(dir_b.path().join(CHECKSUMS_SHA256)).unwrap();
    assert_eq!(checksums_a, checksums_b);

    let report_md_a = fs::read(dir_a.path().join(REPORT_PHASE1_MD)).unwrap();
    let report_md_b = fs::read(dir_b.path().join(REPORT_PHASE1_MD)).unwrap();
    assert_eq!(report_md_a, report_md_b);
}

#[test]
fn different_seed_changes_the_data_version() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let report_a = full_run(42, dir_a.path());
    let report_b = full_run(43, dir_b.path());
    assert_ne!(report_a.data_version.version, report_b.data_version.version);
}

#[test]
fn sparse_dataset_yields_insufficient_data() {
    let stores = Stores::in_memory();
    load_fixtures(
        &stores,
        &FixtureConfig {
            seed: 7,
            new_token_candidates: 5,
            active_token_candidates: 1,
            days: 3,
            ..FixtureConfig::default()
        },
    )
    .unwrap();

    let config = PipelineConfig::new(
        "tokenlab --output-dir out --use-fixtures",
        DateTime::from_timestamp_millis(REPORT_TS_MS).unwrap(),
    );
    let cancel = CancellationToken::new();
    let report = run_pipeline(&stores, &config, &cancel).unwrap();

    assert!(!report.sufficiency.passed);
    assert_eq!(report.decision, GateDecision::InsufficientData);
    // The gate was never evaluated.
    assert!(report.evaluations.is_empty());

    // Artifacts still get written, with the decision clearly marked.
    let dir = tempfile::tempdir().unwrap();
    ReportWriter::new(dir.path()).write_all(&report, &cancel).unwrap();
    let gate_report = fs::read_to_string(dir.path().join(DECISION_GATE_REPORT_MD)).unwrap();
    assert!(gate_report.contains("INSUFFICIENT_DATA"));
    assert!(gate_report.contains("sufficiency failed"));
}
