//! Simulated Trade Records
//!
//! A trade record is the append-only result of executing one strategy on
//! one candidate under one scenario. `trade_id` is a content hash, so
//! re-running an identical simulation produces the identical record and
//! the store's duplicate rejection makes the pipeline idempotent.

use crate::events::CandidateSource;
use crate::ids;
use serde::{Deserialize, Serialize};

/// Win/loss classification of a trade outcome.
///
/// WIN requires a strictly positive outcome; a zero outcome is a LOSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeClass {
    Win,
    Loss,
}

impl OutcomeClass {
    pub fn from_outcome(outcome: f64) -> Self {
        if outcome > 0.0 {
            Self::Win
        } else {
            Self::Loss
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win => "WIN",
            Self::Loss => "LOSS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WIN" => Some(Self::Win),
            "LOSS" => Some(Self::Loss),
            _ => None,
        }
    }
}

/// Why a strategy exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    TimeExit,
    InitialStop,
    TrailingStop,
    LiquidityDrop,
    MaxDuration,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimeExit => "TIME_EXIT",
            Self::InitialStop => "INITIAL_STOP",
            Self::TrailingStop => "TRAILING_STOP",
            Self::LiquidityDrop => "LIQUIDITY_DROP",
            Self::MaxDuration => "MAX_DURATION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TIME_EXIT" => Some(Self::TimeExit),
            "INITIAL_STOP" => Some(Self::InitialStop),
            "TRAILING_STOP" => Some(Self::TrailingStop),
            "LIQUIDITY_DROP" => Some(Self::LiquidityDrop),
            "MAX_DURATION" => Some(Self::MaxDuration),
            _ => None,
        }
    }
}

/// One simulated trade. Append-only; duplicate insertion is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub candidate_id: String,
    pub strategy_id: String,
    pub scenario_id: String,
    pub entry_event_type: CandidateSource,

    /// Signal and actual entry, Unix ms UTC / quote price.
    pub entry_signal_time: i64,
    pub entry_actual_time: i64,
    pub entry_signal_price: f64,
    pub entry_actual_price: f64,
    /// Pool liquidity at entry, when observable.
    pub entry_liquidity: Option<f64>,

    pub exit_signal_time: i64,
    pub exit_actual_time: i64,
    pub exit_signal_price: f64,
    pub exit_actual_price: f64,
    pub exit_reason: ExitReason,

    /// Per-cost-kind amounts, quote units.
    pub entry_cost: f64,
    pub exit_cost: f64,
    pub mev_cost: f64,
    /// `(entry_cost + exit_cost + mev_cost) / position_value`.
    pub total_cost_pct: f64,

    pub position_size: f64,
    pub position_value: f64,

    /// `(exit_actual_price - entry_actual_price) / entry_actual_price`.
    pub gross_return: f64,
    /// `gross_return - total_cost_pct`.
    pub outcome: f64,
    pub outcome_class: OutcomeClass,

    pub hold_duration_ms: i64,
    /// Highest price seen during the hold, when the strategy walks prices.
    pub peak_price: Option<f64>,
    /// Lowest liquidity seen during the hold, when the strategy walks it.
    pub min_liquidity: Option<f64>,
}

impl TradeRecord {
    /// Derive the content-addressed trade id for this record's identity.
    pub fn derive_id(
        candidate_id: &str,
        strategy_id: &str,
        scenario_id: &str,
        entry_signal_time: i64,
    ) -> String {
        ids::trade_id(candidate_id, strategy_id, scenario_id, entry_signal_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_outcome_is_a_loss() {
        assert_eq!(OutcomeClass::from_outcome(0.0), OutcomeClass::Loss);
        assert_eq!(OutcomeClass::from_outcome(-0.01), OutcomeClass::Loss);
        assert_eq!(OutcomeClass::from_outcome(1e-9), OutcomeClass::Win);
    }

    #[test]
    fn exit_reason_round_trips() {
        for reason in [
            ExitReason::TimeExit,
            ExitReason::InitialStop,
            ExitReason::TrailingStop,
            ExitReason::LiquidityDrop,
            ExitReason::MaxDuration,
        ] {
            assert_eq!(ExitReason::parse(reason.as_str()), Some(reason));
        }
    }

    #[test]
    fn trade_id_matches_ids_module() {
        assert_eq!(
            TradeRecord::derive_id("c", "s", "realistic", 42),
            crate::ids::trade_id("c", "s", "realistic", 42)
        );
    }
}
