//! Simulation Runner
//!
//! Drives one strategy execution per `(candidate, strategy, scenario)`
//! cell and persists the resulting trades. The runner is where expected
//! edge conditions become skips instead of failures:
//!
//! - source mismatch between candidate and strategy: skip
//! - no price data / no entry liquidity: skip, counted
//! - duplicate trade id on persist: skip (an identical simulation already
//!   ran; content-addressed ids make this safe)
//!
//! Malformed strategy inputs and storage unavailability stay fatal.

use crate::cancel::CancellationToken;
use crate::events::TokenCandidate;
use crate::scenario::Scenario;
use crate::storage::{StorageError, Stores};
use crate::strategy::{self, StrategyConfig, StrategyError, StrategyInput};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Why a simulation cell produced no trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkipReason {
    SourceMismatch,
    NoPriceData,
    NoEntryLiquidity,
    DuplicateTrade,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceMismatch => "source_mismatch",
            Self::NoPriceData => "no_price_data",
            Self::NoEntryLiquidity => "no_entry_liquidity",
            Self::DuplicateTrade => "duplicate_trade",
        }
    }
}

/// Result of one simulation cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellOutcome {
    Simulated { trade_id: String },
    Skipped(SkipReason),
}

/// Fatal simulation failures.
#[derive(Debug)]
pub enum SimulationError {
    Storage(StorageError),
    /// Invariant violation in a strategy input. Halts the pipeline.
    InvalidInput(String),
    Cancelled,
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "simulation storage error: {}", e),
            Self::InvalidInput(msg) => write!(f, "simulation input invalid: {}", msg),
            Self::Cancelled => write!(f, "simulation cancelled"),
        }
    }
}

impl std::error::Error for SimulationError {}

impl From<StorageError> for SimulationError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Counters over a full simulation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    pub cells: u64,
    pub trades_persisted: u64,
    pub skips: BTreeMap<&'static str, u64>,
}

impl SimulationStats {
    fn record_skip(&mut self, reason: SkipReason) {
        *self.skips.entry(reason.as_str()).or_insert(0) += 1;
    }
}

/// Candidate × strategy × scenario sweep over one store set.
pub struct SimulationRunner {
    stores: Stores,
}

impl SimulationRunner {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Run one cell: load series, build the strategy input, execute, and
    /// persist the trade.
    pub fn run_cell(
        &self,
        candidate: &TokenCandidate,
        config: &StrategyConfig,
        scenario: &Scenario,
    ) -> Result<CellOutcome, SimulationError> {
        if candidate.source != config.entry_event_type {
            return Ok(CellOutcome::Skipped(SkipReason::SourceMismatch));
        }

        let mut prices = self.stores.prices.get_by_candidate_id(&candidate.candidate_id)?;
        let mut liquidity = self
            .stores
            .liquidity_series
            .get_by_candidate_id(&candidate.candidate_id)?;
        prices.sort_by_key(|p| p.timestamp_ms);
        liquidity.sort_by_key(|l| l.timestamp_ms);

        let entry_signal_time = candidate.discovered_at;
        let entry_signal_price = match strategy::price_at(&prices, entry_signal_time) {
            Some(price) => price,
            None => {
                debug!(candidate_id = %candidate.candidate_id, "skip: no price data");
                return Ok(CellOutcome::Skipped(SkipReason::NoPriceData));
            }
        };
        let entry_liquidity =
            strategy::liquidity_at(&liquidity, entry_signal_time).map(|l| l.liquidity);

        let input = StrategyInput {
            candidate_id: &candidate.candidate_id,
            strategy_id: config.strategy_id(),
            entry_event_type: config.entry_event_type,
            scenario,
            entry_signal_time,
            entry_signal_price,
            entry_liquidity,
            prices: &prices,
            liquidity: &liquidity,
        };

        let trade = match strategy::execute(&config.params, &input) {
            Ok(trade) => trade,
            Err(StrategyError::NoPriceData(_)) => {
                return Ok(CellOutcome::Skipped(SkipReason::NoPriceData));
            }
            Err(StrategyError::NoEntryLiquidity(_)) => {
                debug!(candidate_id = %candidate.candidate_id, "skip: no entry liquidity");
                return Ok(CellOutcome::Skipped(SkipReason::NoEntryLiquidity));
            }
            Err(StrategyError::InvalidInput(msg)) => {
                return Err(SimulationError::InvalidInput(msg));
            }
        };

        let trade_id = trade.trade_id.clone();
        match self.stores.trades.insert(trade) {
            Ok(()) => Ok(CellOutcome::Simulated { trade_id }),
            // An identical simulation already persisted this trade.
            Err(StorageError::DuplicateKey(_)) => {
                Ok(CellOutcome::Skipped(SkipReason::DuplicateTrade))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run the full sweep, checking for cancellation once per candidate.
    pub fn run_matrix(
        &self,
        candidates: &[TokenCandidate],
        configs: &[StrategyConfig],
        scenarios: &[Scenario],
        cancel: &CancellationToken,
    ) -> Result<SimulationStats, SimulationError> {
        let mut stats = SimulationStats::default();

        for candidate in candidates {
            if cancel.is_cancelled() {
                warn!("simulation cancelled after {} cells", stats.cells);
                return Err(SimulationError::Cancelled);
            }
            for config in configs {
                for scenario in scenarios {
                    stats.cells += 1;
                    match self.run_cell(candidate, config, scenario)? {
                        CellOutcome::Simulated { .. } => stats.trades_persisted += 1,
                        CellOutcome::Skipped(reason) => stats.record_skip(reason),
                    }
                }
            }
        }

        info!(
            cells = stats.cells,
            trades = stats.trades_persisted,
            "simulation sweep complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CandidateSource, SwapEvent, SwapSide};
    use crate::normalize::Normalizer;
    use crate::strategy::StrategyParams;

    fn seed_candidate(stores: &Stores, source: CandidateSource) -> TokenCandidate {
        let candidate = TokenCandidate::from_discovery(
            source,
            "mintA",
            Some("poolA".to_string()),
            "sig0",
            0,
            100,
            1_000,
        );
        stores.candidates.insert(candidate.clone()).unwrap();
        for (i, (ts, price)) in [(1_000i64, 1.0f64), (61_000, 1.5), (301_000, 2.0)]
            .iter()
            .enumerate()
        {
            stores
                .swaps
                .insert(SwapEvent {
                    candidate_id: candidate.candidate_id.clone(),
                    tx_signature: format!("sig{}", i + 1),
                    event_index: 0,
                    slot: 100 + i as u64,
                    timestamp_ms: *ts,
                    side: SwapSide::Buy,
                    amount_in: 1.0,
                    amount_out: 1.0,
                    price: *price,
                })
                .unwrap();
        }
        Normalizer::new(stores.clone())
            .normalize_candidate(&candidate.candidate_id)
            .unwrap();
        candidate
    }

    fn time_exit_config(source: CandidateSource) -> StrategyConfig {
        StrategyConfig {
            params: StrategyParams::TimeExit {
                hold_duration_ms: 300_000,
            },
            entry_event_type: source,
        }
    }

    #[test]
    fn run_cell_persists_a_trade() {
        let stores = Stores::in_memory();
        let candidate = seed_candidate(&stores, CandidateSource::NewToken);
        let runner = SimulationRunner::new(stores.clone());

        let outcome = runner
            .run_cell(
                &candidate,
                &time_exit_config(CandidateSource::NewToken),
                &Scenario::realistic(),
            )
            .unwrap();

        match outcome {
            CellOutcome::Simulated { trade_id } => {
                let trade = stores.trades.get_by_id(&trade_id).unwrap();
                assert_eq!(trade.candidate_id, candidate.candidate_id);
                assert_eq!(trade.scenario_id, "realistic");
            }
            other => panic!("expected a trade, got {:?}", other),
        }
    }

    #[test]
    fn source_mismatch_is_a_skip() {
        let stores = Stores::in_memory();
        let candidate = seed_candidate(&stores, CandidateSource::ActiveToken);
        let runner = SimulationRunner::new(stores);

        let outcome = runner
            .run_cell(
                &candidate,
                &time_exit_config(CandidateSource::NewToken),
                &Scenario::realistic(),
            )
            .unwrap();
        assert_eq!(outcome, CellOutcome::Skipped(SkipReason::SourceMismatch));
    }

    #[test]
    fn rerun_skips_duplicate_trade() {
        let stores = Stores::in_memory();
        let candidate = seed_candidate(&stores, CandidateSource::NewToken);
        let runner = SimulationRunner::new(stores);
        let config = time_exit_config(CandidateSource::NewToken);
        let scenario = Scenario::realistic();

        let first = runner.run_cell(&candidate, &config, &scenario).unwrap();
        assert!(matches!(first, CellOutcome::Simulated { .. }));

        let second = runner.run_cell(&candidate, &config, &scenario).unwrap();
        assert_eq!(second, CellOutcome::Skipped(SkipReason::DuplicateTrade));
    }

    #[test]
    fn cancelled_sweep_stops_early() {
        let stores = Stores::in_memory();
        let candidate = seed_candidate(&stores, CandidateSource::NewToken);
        let runner = SimulationRunner::new(stores);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = runner
            .run_matrix(
                &[candidate],
                &[time_exit_config(CandidateSource::NewToken)],
                &Scenario::all(),
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, SimulationError::Cancelled));
    }
}
