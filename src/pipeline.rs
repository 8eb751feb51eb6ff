//! End-to-End Pipeline
//!
//! Drives one full research run over a store set:
//!
//! ```text
//! normalize -> simulate -> verify replay -> aggregate
//!     -> sufficiency gate -> decision gate -> report assembly
//! ```
//!
//! The orchestrator is the only place error categories are decided:
//! expected edge conditions (no trades for a cell, duplicate trade ids,
//! already-normalized candidates) are skips; missing decision scenarios
//! downgrade the verdict to INSUFFICIENT_DATA; storage unavailability,
//! validation failures, and I/O stay fatal.

use crate::aggregate::{AggregateError, MetricAggregator, StrategyAggregate};
use crate::cancel::CancellationToken;
use crate::data_version::{compute_data_version, DataVersion};
use crate::decision::{
    self, DecisionError, GateDecision, StrategyEvaluation,
};
use crate::events::CandidateSource;
use crate::normalize::{NormalizeError, Normalizer};
use crate::report::{DataSummary, RunReport};
use crate::scenario::{Scenario, SCENARIO_PESSIMISTIC, SCENARIO_REALISTIC};
use crate::simulation::{SimulationError, SimulationRunner, SimulationStats};
use crate::storage::{StorageError, Stores};
use crate::strategy::{StrategyConfig, STRATEGY_VERSION};
use crate::sufficiency::{SufficiencyChecker, SufficiencyError};
use crate::verification::{ReplayVerifier, VerificationError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Run-level configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub strategies: Vec<StrategyConfig>,
    pub scenarios: Vec<Scenario>,
    /// Operability overrides keyed by `(strategy_id, entry_event_type)`;
    /// strategies absent from the map count as implementable.
    pub implementable: BTreeMap<(String, CandidateSource), bool>,
    /// Verbatim command line, captured into the envelope.
    pub replay_command: String,
    /// Strategy version stamped into the envelope; defaults to
    /// [`STRATEGY_VERSION`], overridable per run from the CLI.
    pub strategy_version: String,
    /// Report timestamp, supplied by the caller so the core itself never
    /// reads the wall clock.
    pub generated_at: DateTime<Utc>,
}

impl PipelineConfig {
    pub fn new(replay_command: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            strategies: StrategyConfig::defaults(),
            scenarios: Scenario::all(),
            implementable: BTreeMap::new(),
            replay_command: replay_command.into(),
            strategy_version: STRATEGY_VERSION.to_string(),
            generated_at,
        }
    }

    fn is_implementable(&self, strategy_id: &str, entry: CandidateSource) -> bool {
        *self
            .implementable
            .get(&(strategy_id.to_string(), entry))
            .unwrap_or(&true)
    }
}

/// Fatal pipeline failures.
#[derive(Debug)]
pub enum PipelineError {
    Storage(StorageError),
    Normalize(NormalizeError),
    Simulation(SimulationError),
    Verification(VerificationError),
    Sufficiency(SufficiencyError),
    Decision(DecisionError),
    Cancelled,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "pipeline storage error: {}", e),
            Self::Normalize(e) => write!(f, "{}", e),
            Self::Simulation(e) => write!(f, "{}", e),
            Self::Verification(e) => write!(f, "{}", e),
            Self::Sufficiency(e) => write!(f, "{}", e),
            Self::Decision(e) => write!(f, "{}", e),
            Self::Cancelled => write!(f, "pipeline cancelled"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<StorageError> for PipelineError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
impl From<NormalizeError> for PipelineError {
    fn from(e: NormalizeError) -> Self {
        Self::Normalize(e)
    }
}
impl From<SimulationError> for PipelineError {
    fn from(e: SimulationError) -> Self {
        Self::Simulation(e)
    }
}
impl From<VerificationError> for PipelineError {
    fn from(e: VerificationError) -> Self {
        Self::Verification(e)
    }
}
impl From<SufficiencyError> for PipelineError {
    fn from(e: SufficiencyError) -> Self {
        Self::Sufficiency(e)
    }
}

/// Execute the full pipeline and assemble the run report.
pub fn run_pipeline(
    stores: &Stores,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<RunReport, PipelineError> {
    let mut candidates = stores.candidates.all()?;
    candidates.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));
    info!(candidates = candidates.len(), "pipeline start");

    // -- Normalization -------------------------------------------------------
    let normalizer = Normalizer::new(stores.clone());
    let mut normalized = 0usize;
    for candidate in &candidates {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        // Already-normalized candidates (rerun over a shared store) keep
        // their derived rows; recomputation would only reject duplicates.
        let has_series = !stores
            .prices
            .get_by_candidate_id(&candidate.candidate_id)?
            .is_empty()
            || !stores
                .liquidity_series
                .get_by_candidate_id(&candidate.candidate_id)?
                .is_empty();
        if !has_series {
            normalizer.normalize_candidate(&candidate.candidate_id)?;
            normalized += 1;
        }
    }
    info!(normalized, total = candidates.len(), "normalization complete");

    // -- Simulation ----------------------------------------------------------
    let runner = SimulationRunner::new(stores.clone());
    let simulation: SimulationStats =
        runner.run_matrix(&candidates, &config.strategies, &config.scenarios, cancel)?;

    // -- Replay verification -------------------------------------------------
    let verifier = ReplayVerifier::new(stores.clone(), &config.strategies);
    let verification = verifier.verify_all(cancel)?;

    // -- Aggregation ---------------------------------------------------------
    let aggregator = MetricAggregator::new(stores.clone());
    let mut aggregates: Vec<StrategyAggregate> = Vec::new();
    for strategy in &config.strategies {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let strategy_id = strategy.strategy_id();
        for scenario in &config.scenarios {
            match aggregator.aggregate(&strategy_id, &scenario.scenario_id, strategy.entry_event_type)
            {
                Ok(aggregate) => {
                    // Reruns over a shared store hit the duplicate guard;
                    // the freshly computed aggregate is still reported.
                    match stores.aggregates.insert(aggregate.clone()) {
                        Ok(()) | Err(StorageError::DuplicateKey(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                    aggregates.push(aggregate);
                }
                Err(AggregateError::NoTrades { .. }) => {
                    warn!(
                        strategy_id = %strategy_id,
                        scenario_id = %scenario.scenario_id,
                        "no trades to aggregate"
                    );
                }
                Err(AggregateError::Storage(e)) => return Err(e.into()),
            }
        }
    }

    // -- Sufficiency ---------------------------------------------------------
    let sufficiency = SufficiencyChecker::new(stores.clone()).check(cancel)?;

    // -- Decision ------------------------------------------------------------
    let mut evaluations: Vec<StrategyEvaluation> = Vec::new();
    let mut downgraded = false;
    let decision = if !sufficiency.passed {
        GateDecision::InsufficientData
    } else {
        for strategy in &config.strategies {
            let strategy_id = strategy.strategy_id();
            let entry = strategy.entry_event_type;
            let realistic = aggregates.iter().find(|a| {
                a.strategy_id == strategy_id
                    && a.scenario_id == SCENARIO_REALISTIC
                    && a.entry_event_type == entry
            });
            let pessimistic = aggregates.iter().find(|a| {
                a.strategy_id == strategy_id
                    && a.scenario_id == SCENARIO_PESSIMISTIC
                    && a.entry_event_type == entry
            });

            let Some(realistic) = realistic else {
                // Nothing simulated for this strategy at all: not part of
                // the verdict.
                continue;
            };

            match decision::build_decision_input(
                realistic,
                pessimistic,
                config.is_implementable(&strategy_id, entry),
            ) {
                Ok(input) => {
                    let evaluation =
                        decision::evaluate(&input).map_err(PipelineError::Decision)?;
                    evaluations.push(evaluation);
                }
                Err(DecisionError::MissingPessimisticScenario { .. }) => {
                    warn!(strategy_id = %strategy_id, "missing pessimistic aggregate, downgrading");
                    downgraded = true;
                }
                Err(e) => return Err(PipelineError::Decision(e)),
            }
        }

        if downgraded || evaluations.is_empty() {
            GateDecision::InsufficientData
        } else {
            decision::overall_decision(&evaluations)
        }
    };

    // -- Envelope ------------------------------------------------------------
    let data_version: DataVersion = compute_data_version(stores)?;
    let data_summary = build_data_summary(stores, &candidates)?;
    let trades = stores.trades.all()?;

    info!(decision = %decision, trades = trades.len(), "pipeline complete");

    Ok(RunReport {
        generated_at: config.generated_at,
        generator_version: env!("CARGO_PKG_VERSION").to_string(),
        strategy_version: config.strategy_version.clone(),
        replay_commit: option_env!("GIT_COMMIT").map(|s| s.to_string()),
        replay_command: config.replay_command.clone(),
        data_version,
        data_summary,
        sufficiency,
        verification,
        evaluations,
        decision,
        aggregates,
        trades,
        strategy_count: config.strategies.len(),
        scenario_count: config.scenarios.len(),
        simulation,
    })
}

fn build_data_summary(
    stores: &Stores,
    candidates: &[crate::events::TokenCandidate],
) -> Result<DataSummary, StorageError> {
    let price_range = stores.prices.get_global_time_range()?;
    let liquidity_range = stores.liquidity_series.get_global_time_range()?;
    let coverage_range_ms = match (price_range, liquidity_range) {
        (Some((amin, amax)), Some((bmin, bmax))) => Some((amin.min(bmin), amax.max(bmax))),
        (Some(r), None) | (None, Some(r)) => Some(r),
        (None, None) => None,
    };

    Ok(DataSummary {
        total_candidates: candidates.len(),
        new_token_candidates: candidates
            .iter()
            .filter(|c| c.source == CandidateSource::NewToken)
            .count(),
        active_token_candidates: candidates
            .iter()
            .filter(|c| c.source == CandidateSource::ActiveToken)
            .count(),
        price_points: stores.prices.all()?.len(),
        liquidity_points: stores.liquidity_series.all()?.len(),
        total_trades: stores.trades.all()?.len(),
        coverage_range_ms,
    })
}
