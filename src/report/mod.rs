//! Report Assembly
//!
//! Renders every run artifact into the output directory:
//!
//! - `REPORT_PHASE1.md`, `DECISION_GATE_REPORT.md` - markdown reports
//! - `strategy_aggregates.csv`, `trade_records.csv`, `scenario_outcomes.csv`
//! - `report.json` - the full structured run report
//! - `metadata.json` - the reproducibility envelope
//! - `metrics_queries.sql` - canonical read-side queries for the store
//! - `checksums.sha256` - SHA-256 over every artifact above
//!
//! Files are opened, fully written, and closed one at a time; the
//! checksum pass reads closed files only. A table that would carry zero
//! data rows is not written - its absence is recorded in the checksum
//! file instead of being an error (the INSUFFICIENT_DATA path produces
//! several of these).

use crate::aggregate::StrategyAggregate;
use crate::cancel::CancellationToken;
use crate::data_version::DataVersion;
use crate::decision::{GateDecision, StrategyEvaluation};
use crate::ids::sha256_hex;
use crate::simulation::SimulationStats;
use crate::sufficiency::SufficiencyReport;
use crate::trade::TradeRecord;
use crate::verification::VerificationReport;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod csv;
pub mod markdown;

pub const REPORT_PHASE1_MD: &str = "REPORT_PHASE1.md";
pub const DECISION_GATE_REPORT_MD: &str = "DECISION_GATE_REPORT.md";
pub const REPORT_JSON: &str = "report.json";
pub const STRATEGY_AGGREGATES_CSV: &str = "strategy_aggregates.csv";
pub const TRADE_RECORDS_CSV: &str = "trade_records.csv";
pub const SCENARIO_OUTCOMES_CSV: &str = "scenario_outcomes.csv";
pub const METADATA_JSON: &str = "metadata.json";
pub const METRICS_QUERIES_SQL: &str = "metrics_queries.sql";
pub const CHECKSUMS_SHA256: &str = "checksums.sha256";

/// Dataset shape counters for the Data Summary section.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSummary {
    pub total_candidates: usize,
    pub new_token_candidates: usize,
    pub active_token_candidates: usize,
    pub price_points: usize,
    pub liquidity_points: usize,
    pub total_trades: usize,
    /// `(min, max)` timestamp over the normalized series.
    pub coverage_range_ms: Option<(i64, i64)>,
}

/// Everything one finished run knows about itself.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub generator_version: String,
    pub strategy_version: String,
    /// Commit hash the replay ran from, when the build recorded one.
    pub replay_commit: Option<String>,
    /// Verbatim command line that produced this report.
    pub replay_command: String,
    pub data_version: DataVersion,
    pub data_summary: DataSummary,
    pub sufficiency: SufficiencyReport,
    pub verification: VerificationReport,
    pub evaluations: Vec<StrategyEvaluation>,
    pub decision: GateDecision,
    pub aggregates: Vec<StrategyAggregate>,
    pub trades: Vec<TradeRecord>,
    pub strategy_count: usize,
    pub scenario_count: usize,
    pub simulation: SimulationStats,
}

/// Reporting failures.
#[derive(Debug)]
pub enum ReportError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Cancelled,
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "report I/O error: {}", e),
            Self::Serialization(e) => write!(f, "report serialization error: {}", e),
            Self::Cancelled => write!(f, "report writing cancelled"),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<std::io::Error> for ReportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

/// What the writer produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenArtifacts {
    pub written: Vec<String>,
    pub absent: Vec<String>,
}

/// Writes all artifacts for one run into a directory.
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write every artifact, then the checksum file over the results.
    /// Cancellation is checked before each file.
    pub fn write_all(
        &self,
        report: &RunReport,
        cancel: &CancellationToken,
    ) -> Result<WrittenArtifacts, ReportError> {
        fs::create_dir_all(&self.output_dir)?;

        let mut artifacts = WrittenArtifacts::default();

        // (name, content); None marks a deliberately absent artifact.
        let renders: Vec<(&str, Option<String>)> = vec![
            (
                REPORT_PHASE1_MD,
                Some(markdown::render_phase1_report(report)),
            ),
            (
                DECISION_GATE_REPORT_MD,
                Some(markdown::render_decision_gate_report(report)),
            ),
            (REPORT_JSON, Some(serde_json::to_string_pretty(report)?)),
            (
                STRATEGY_AGGREGATES_CSV,
                non_empty_table(csv::render_strategy_aggregates(&report.aggregates)),
            ),
            (
                TRADE_RECORDS_CSV,
                non_empty_table(csv::render_trade_records(&report.trades)),
            ),
            (
                SCENARIO_OUTCOMES_CSV,
                non_empty_table(csv::render_scenario_outcomes(&report.aggregates)),
            ),
            (METADATA_JSON, Some(self.render_metadata(report)?)),
            (METRICS_QUERIES_SQL, Some(METRICS_QUERIES.to_string())),
        ];

        for (name, content) in renders {
            if cancel.is_cancelled() {
                return Err(ReportError::Cancelled);
            }
            match content {
                Some(content) => {
                    self.write_file(name, content.as_bytes())?;
                    artifacts.written.push(name.to_string());
                }
                None => artifacts.absent.push(name.to_string()),
            }
        }

        if cancel.is_cancelled() {
            return Err(ReportError::Cancelled);
        }
        self.write_checksums(&artifacts)?;
        artifacts.written.push(CHECKSUMS_SHA256.to_string());

        info!(
            dir = %self.output_dir.display(),
            written = artifacts.written.len(),
            absent = artifacts.absent.len(),
            "report artifacts written"
        );
        Ok(artifacts)
    }

    /// Open, fully write, flush, close - one artifact at a time.
    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), ReportError> {
        let path = self.output_dir.join(name);
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn render_metadata(&self, report: &RunReport) -> Result<String, ReportError> {
        let metadata = json!({
            "report_timestamp": report
                .generated_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            "generator_version": report.generator_version,
            "data_version": report.data_version.version,
            "data_version_source": report.data_version.source.as_str(),
            "strategy_version": report.strategy_version,
            "replay_commit": report.replay_commit,
            "replay_command": report.replay_command,
            "strategy_count": report.strategy_count,
            "scenario_count": report.scenario_count,
            "decision": report.decision.as_str(),
        });
        Ok(serde_json::to_string_pretty(&metadata)?)
    }

    /// SHA-256 every written artifact (reading the closed files back) and
    /// record deliberate absences as comment lines.
    fn write_checksums(&self, artifacts: &WrittenArtifacts) -> Result<(), ReportError> {
        let mut names = artifacts.written.clone();
        names.sort();

        let mut out = String::new();
        for name in &names {
            let bytes = fs::read(self.output_dir.join(name))?;
            out.push_str(&format!("{}  {}\n", sha256_hex(&bytes), name));
        }

        let mut absent = artifacts.absent.clone();
        absent.sort();
        for name in &absent {
            out.push_str(&format!("# absent: {}\n", name));
        }

        self.write_file(CHECKSUMS_SHA256, out.as_bytes())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// A rendered table with only its header row is treated as absent.
fn non_empty_table(rendered: String) -> Option<String> {
    if rendered.lines().count() <= 1 {
        None
    } else {
        Some(rendered)
    }
}

/// Canonical read-side queries over the SQLite store schema, shipped
/// verbatim so a run can be inspected without this binary.
const METRICS_QUERIES: &str = r#"-- Canonical metric queries over the token-lab store schema.

-- Trade counts and mean outcome per strategy and scenario.
SELECT strategy_id,
       scenario_id,
       entry_event_type,
       COUNT(*)                  AS total_trades,
       AVG(outcome)              AS outcome_mean,
       SUM(outcome > 0)          AS wins,
       SUM(outcome <= 0)         AS losses
FROM trades
GROUP BY strategy_id, scenario_id, entry_event_type
ORDER BY strategy_id, scenario_id, entry_event_type;

-- Distinct traded tokens per strategy under the realistic scenario.
SELECT strategy_id,
       COUNT(DISTINCT candidate_id) AS total_tokens
FROM trades
WHERE scenario_id = 'realistic'
GROUP BY strategy_id
ORDER BY strategy_id;

-- Exit reason distribution.
SELECT strategy_id, exit_reason, COUNT(*) AS trades
FROM trades
GROUP BY strategy_id, exit_reason
ORDER BY strategy_id, exit_reason;

-- Worst trades by outcome.
SELECT trade_id, candidate_id, strategy_id, scenario_id, outcome
FROM trades
ORDER BY outcome ASC
LIMIT 50;

-- Candidate discovery volume per UTC day.
SELECT DATE(discovered_at / 1000, 'unixepoch') AS utc_day,
       source,
       COUNT(*) AS discoveries
FROM candidates
GROUP BY utc_day, source
ORDER BY utc_day, source;
"#;
