//! Idempotent Replay Verification
//!
//! Re-executes every stored trade from the stores it was derived from and
//! compares the fresh record against the persisted one: non-float fields
//! must match exactly, float fields within 1e-7. A clean verification
//! demonstrates that the stored trades are a pure function of the raw
//! inputs, strategy version, and scenario constants.
//!
//! Unlike simulation, verification surfaces `NotFound`: a trade whose
//! candidate or strategy cannot be resolved is a report defect, not a
//! skippable edge.

use crate::cancel::CancellationToken;
use crate::events::CandidateSource;
use crate::scenario::Scenario;
use crate::storage::{StorageError, Stores};
use crate::strategy::{self, StrategyConfig, StrategyInput};
use crate::trade::TradeRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Float comparison tolerance.
pub const FLOAT_TOLERANCE: f64 = 1e-7;

/// One field that failed to replay identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMismatch {
    pub trade_id: String,
    pub field: String,
    pub stored: String,
    pub replayed: String,
}

/// Verification summary embedded in the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub total_trades: u32,
    pub matched_trades: u32,
    pub mismatches: Vec<TradeMismatch>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty() && self.matched_trades == self.total_trades
    }
}

/// Verification failures.
#[derive(Debug)]
pub enum VerificationError {
    Storage(StorageError),
    /// A stored trade references a strategy id outside the run's matrix.
    UnknownStrategy { trade_id: String, strategy_id: String },
    /// A stored trade references an unknown scenario id.
    UnknownScenario { trade_id: String, scenario_id: String },
    /// Replaying the trade failed outright where the original succeeded.
    ReplayFailed { trade_id: String, reason: String },
    Cancelled,
}

impl std::fmt::Display for VerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "verification storage error: {}", e),
            Self::UnknownStrategy { trade_id, strategy_id } => {
                write!(f, "trade {} uses unknown strategy {}", trade_id, strategy_id)
            }
            Self::UnknownScenario { trade_id, scenario_id } => {
                write!(f, "trade {} uses unknown scenario {}", trade_id, scenario_id)
            }
            Self::ReplayFailed { trade_id, reason } => {
                write!(f, "replaying trade {} failed: {}", trade_id, reason)
            }
            Self::Cancelled => write!(f, "verification cancelled"),
        }
    }
}

impl std::error::Error for VerificationError {}

impl From<StorageError> for VerificationError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Replays stored trades against the strategy matrix of the current run.
pub struct ReplayVerifier {
    stores: Stores,
    /// `(strategy_id, entry_event_type)` -> config. The same parameter
    /// set runs against both discovery sources under one strategy id, so
    /// the id alone is not a unique key.
    configs: BTreeMap<(String, CandidateSource), StrategyConfig>,
}

impl ReplayVerifier {
    pub fn new(stores: Stores, configs: &[StrategyConfig]) -> Self {
        let configs = configs
            .iter()
            .map(|c| ((c.strategy_id(), c.entry_event_type), c.clone()))
            .collect();
        Self { stores, configs }
    }

    /// Verify every stored trade. Checks cancellation once per trade.
    pub fn verify_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<VerificationReport, VerificationError> {
        let mut trades = self.stores.trades.all()?;
        trades.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));

        let mut report = VerificationReport {
            total_trades: trades.len() as u32,
            ..VerificationReport::default()
        };

        for stored in &trades {
            if cancel.is_cancelled() {
                return Err(VerificationError::Cancelled);
            }
            let replayed = self.replay_trade(stored)?;
            let mismatches = compare_trades(stored, &replayed);
            if mismatches.is_empty() {
                report.matched_trades += 1;
            } else {
                warn!(trade_id = %stored.trade_id, fields = mismatches.len(), "replay mismatch");
                report.mismatches.extend(mismatches);
            }
        }

        info!(
            total = report.total_trades,
            matched = report.matched_trades,
            "replay verification complete"
        );
        Ok(report)
    }

    fn replay_trade(&self, stored: &TradeRecord) -> Result<TradeRecord, VerificationError> {
        let config = self
            .configs
            .get(&(stored.strategy_id.clone(), stored.entry_event_type))
            .ok_or_else(|| VerificationError::UnknownStrategy {
                trade_id: stored.trade_id.clone(),
                strategy_id: stored.strategy_id.clone(),
            })?;
        let scenario = Scenario::by_id(&stored.scenario_id).ok_or_else(|| {
            VerificationError::UnknownScenario {
                trade_id: stored.trade_id.clone(),
                scenario_id: stored.scenario_id.clone(),
            }
        })?;

        // NotFound propagates: verification has no skip path.
        let candidate = self.stores.candidates.get_by_id(&stored.candidate_id)?;

        let mut prices = self.stores.prices.get_by_candidate_id(&candidate.candidate_id)?;
        let mut liquidity = self
            .stores
            .liquidity_series
            .get_by_candidate_id(&candidate.candidate_id)?;
        prices.sort_by_key(|p| p.timestamp_ms);
        liquidity.sort_by_key(|l| l.timestamp_ms);

        let entry_signal_time = candidate.discovered_at;
        let entry_signal_price = strategy::price_at(&prices, entry_signal_time).ok_or_else(|| {
            VerificationError::ReplayFailed {
                trade_id: stored.trade_id.clone(),
                reason: "price series is empty".to_string(),
            }
        })?;
        let entry_liquidity =
            strategy::liquidity_at(&liquidity, entry_signal_time).map(|l| l.liquidity);

        let input = StrategyInput {
            candidate_id: &candidate.candidate_id,
            strategy_id: stored.strategy_id.clone(),
            entry_event_type: config.entry_event_type,
            scenario: &scenario,
            entry_signal_time,
            entry_signal_price,
            entry_liquidity,
            prices: &prices,
            liquidity: &liquidity,
        };

        strategy::execute(&config.params, &input).map_err(|e| VerificationError::ReplayFailed {
            trade_id: stored.trade_id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Field-by-field comparison: exact on non-floats, 1e-7 on floats.
pub fn compare_trades(stored: &TradeRecord, replayed: &TradeRecord) -> Vec<TradeMismatch> {
    let mut out = Vec::new();

    let mut exact = |field: &'static str, a: &dyn std::fmt::Debug, b: &dyn std::fmt::Debug| {
        let (stored_repr, replayed_repr) = (format!("{:?}", a), format!("{:?}", b));
        if stored_repr != replayed_repr {
            out.push(TradeMismatch {
                trade_id: stored.trade_id.clone(),
                field: field.to_string(),
                stored: stored_repr,
                replayed: replayed_repr,
            });
        }
    };

    exact("trade_id", &stored.trade_id, &replayed.trade_id);
    exact("candidate_id", &stored.candidate_id, &replayed.candidate_id);
    exact("strategy_id", &stored.strategy_id, &replayed.strategy_id);
    exact("scenario_id", &stored.scenario_id, &replayed.scenario_id);
    exact(
        "entry_event_type",
        &stored.entry_event_type,
        &replayed.entry_event_type,
    );
    exact(
        "entry_signal_time",
        &stored.entry_signal_time,
        &replayed.entry_signal_time,
    );
    exact(
        "entry_actual_time",
        &stored.entry_actual_time,
        &replayed.entry_actual_time,
    );
    exact(
        "exit_signal_time",
        &stored.exit_signal_time,
        &replayed.exit_signal_time,
    );
    exact(
        "exit_actual_time",
        &stored.exit_actual_time,
        &replayed.exit_actual_time,
    );
    exact("exit_reason", &stored.exit_reason, &replayed.exit_reason);
    exact("outcome_class", &stored.outcome_class, &replayed.outcome_class);
    exact(
        "hold_duration_ms",
        &stored.hold_duration_ms,
        &replayed.hold_duration_ms,
    );

    let mut close = |field: &'static str, a: f64, b: f64| {
        if (a - b).abs() > FLOAT_TOLERANCE {
            out.push(TradeMismatch {
                trade_id: stored.trade_id.clone(),
                field: field.to_string(),
                stored: format!("{a}"),
                replayed: format!("{b}"),
            });
        }
    };

    close("entry_signal_price", stored.entry_signal_price, replayed.entry_signal_price);
    close("entry_actual_price", stored.entry_actual_price, replayed.entry_actual_price);
    close("exit_signal_price", stored.exit_signal_price, replayed.exit_signal_price);
    close("exit_actual_price", stored.exit_actual_price, replayed.exit_actual_price);
    close("entry_cost", stored.entry_cost, replayed.entry_cost);
    close("exit_cost", stored.exit_cost, replayed.exit_cost);
    close("mev_cost", stored.mev_cost, replayed.mev_cost);
    close("total_cost_pct", stored.total_cost_pct, replayed.total_cost_pct);
    close("position_size", stored.position_size, replayed.position_size);
    close("position_value", stored.position_value, replayed.position_value);
    close("gross_return", stored.gross_return, replayed.gross_return);
    close("outcome", stored.outcome, replayed.outcome);

    let mut close_opt = |field: &'static str, a: Option<f64>, b: Option<f64>| {
        let mismatch = match (a, b) {
            (Some(x), Some(y)) => (x - y).abs() > FLOAT_TOLERANCE,
            (None, None) => false,
            _ => true,
        };
        if mismatch {
            out.push(TradeMismatch {
                trade_id: stored.trade_id.clone(),
                field: field.to_string(),
                stored: format!("{:?}", a),
                replayed: format!("{:?}", b),
            });
        }
    };

    close_opt("entry_liquidity", stored.entry_liquidity, replayed.entry_liquidity);
    close_opt("peak_price", stored.peak_price, replayed.peak_price);
    close_opt("min_liquidity", stored.min_liquidity, replayed.min_liquidity);

    out
}
