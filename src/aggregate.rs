//! Metric Aggregation
//!
//! Collapses trade records into per-`(strategy, scenario, entry source)`
//! aggregates: counts, win rates, outcome distribution, and the
//! order-dependent risk measures (max drawdown, loss streaks) computed
//! over trades sorted by `(entry_signal_time, trade_id)` - never by store
//! return order.
//!
//! Trades pointing at a candidate the registry no longer knows are counted
//! per candidate id for diagnostics and excluded from the aggregate; they
//! are never silently dropped.

use crate::events::CandidateSource;
use crate::scenario::{SCENARIO_DEGRADED, SCENARIO_PESSIMISTIC, SCENARIO_REALISTIC};
use crate::stats;
use crate::storage::{StorageError, Stores};
use crate::strategy::canonical_base_type;
use crate::trade::TradeRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Scenario-sensitivity slots. Only the slot matching the aggregate's own
/// scenario is populated; the optimistic slot never is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensitivitySlots {
    pub realistic_outcome_mean: Option<f64>,
    pub pessimistic_outcome_mean: Option<f64>,
    pub degraded_outcome_mean: Option<f64>,
}

/// Aggregated metrics for one `(strategy_id, scenario_id, entry_event_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAggregate {
    pub strategy_id: String,
    pub scenario_id: String,
    pub entry_event_type: CandidateSource,

    pub total_trades: u32,
    /// Distinct candidate ids among included trades.
    pub total_tokens: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    /// Fraction of candidates whose mean outcome is strictly positive.
    pub token_win_rate: f64,

    pub outcome_mean: f64,
    pub outcome_median: f64,
    pub outcome_min: f64,
    pub outcome_max: f64,
    pub outcome_stddev: f64,
    pub outcome_p10: f64,
    pub outcome_p25: f64,
    pub outcome_p75: f64,
    pub outcome_p90: f64,

    /// Over trades ordered by `(entry_signal_time, trade_id)`.
    pub max_drawdown: f64,
    pub max_consecutive_losses: u32,

    pub sensitivity: SensitivitySlots,

    /// Diagnostics: trades excluded because their candidate is missing,
    /// counted per candidate id.
    pub missing_candidate_trades: BTreeMap<String, u32>,
}

/// Aggregation failures.
#[derive(Debug)]
pub enum AggregateError {
    /// No trade matched the query after filtering.
    NoTrades {
        strategy_id: String,
        scenario_id: String,
        entry_event_type: CandidateSource,
    },
    Storage(StorageError),
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTrades {
                strategy_id,
                scenario_id,
                entry_event_type,
            } => write!(
                f,
                "no trades for strategy {} scenario {} entry {}",
                strategy_id, scenario_id, entry_event_type
            ),
            Self::Storage(e) => write!(f, "aggregation storage error: {}", e),
        }
    }
}

impl std::error::Error for AggregateError {}

impl From<StorageError> for AggregateError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Aggregator over one store set.
pub struct MetricAggregator {
    stores: Stores,
}

impl MetricAggregator {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Build the aggregate for one `(strategy, scenario, entry source)`.
    pub fn aggregate(
        &self,
        strategy_id: &str,
        scenario_id: &str,
        entry_event_type: CandidateSource,
    ) -> Result<StrategyAggregate, AggregateError> {
        let fetched = self.fetch_matching_trades(strategy_id, scenario_id)?;

        // Source filter plus missing-candidate diagnostics.
        let mut included: Vec<TradeRecord> = Vec::with_capacity(fetched.len());
        let mut missing: BTreeMap<String, u32> = BTreeMap::new();
        for trade in fetched {
            match self.stores.candidates.get_by_id(&trade.candidate_id) {
                Ok(candidate) => {
                    if candidate.source == entry_event_type {
                        included.push(trade);
                    }
                }
                Err(StorageError::NotFound(_)) => {
                    warn!(candidate_id = %trade.candidate_id, "trade references missing candidate");
                    *missing.entry(trade.candidate_id.clone()).or_insert(0) += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if included.is_empty() {
            return Err(AggregateError::NoTrades {
                strategy_id: strategy_id.to_string(),
                scenario_id: scenario_id.to_string(),
                entry_event_type,
            });
        }

        // Order-dependent metrics use the canonical trade order.
        included.sort_by(|a, b| {
            a.entry_signal_time
                .cmp(&b.entry_signal_time)
                .then_with(|| a.trade_id.cmp(&b.trade_id))
        });

        let ordered_outcomes: Vec<f64> = included.iter().map(|t| t.outcome).collect();
        let mut sorted_outcomes = ordered_outcomes.clone();
        sorted_outcomes.sort_by(f64::total_cmp);

        let total_trades = included.len() as u32;
        let wins = included.iter().filter(|t| t.outcome > 0.0).count() as u32;
        let losses = total_trades - wins;

        let mut per_token: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for trade in &included {
            per_token
                .entry(trade.candidate_id.as_str())
                .or_default()
                .push(trade.outcome);
        }
        let total_tokens = per_token.len() as u32;
        let winning_tokens = per_token
            .values()
            .filter(|outcomes| stats::mean(outcomes).is_some_and(|m| m > 0.0))
            .count() as u32;

        let outcome_mean = stats::mean(&ordered_outcomes).expect("non-empty");
        let mut sensitivity = SensitivitySlots::default();
        match scenario_id {
            SCENARIO_REALISTIC => sensitivity.realistic_outcome_mean = Some(outcome_mean),
            SCENARIO_PESSIMISTIC => sensitivity.pessimistic_outcome_mean = Some(outcome_mean),
            SCENARIO_DEGRADED => sensitivity.degraded_outcome_mean = Some(outcome_mean),
            // The optimistic slot stays empty on purpose.
            _ => {}
        }

        let aggregate = StrategyAggregate {
            strategy_id: strategy_id.to_string(),
            scenario_id: scenario_id.to_string(),
            entry_event_type,
            total_trades,
            total_tokens,
            wins,
            losses,
            win_rate: f64::from(wins) / f64::from(total_trades),
            token_win_rate: f64::from(winning_tokens) / f64::from(total_tokens),
            outcome_mean,
            outcome_median: stats::median_sorted(&sorted_outcomes).expect("non-empty"),
            outcome_min: sorted_outcomes[0],
            outcome_max: sorted_outcomes[sorted_outcomes.len() - 1],
            outcome_stddev: stats::sample_stddev(&ordered_outcomes),
            outcome_p10: stats::percentile_sorted(&sorted_outcomes, 0.10).expect("non-empty"),
            outcome_p25: stats::percentile_sorted(&sorted_outcomes, 0.25).expect("non-empty"),
            outcome_p75: stats::percentile_sorted(&sorted_outcomes, 0.75).expect("non-empty"),
            outcome_p90: stats::percentile_sorted(&sorted_outcomes, 0.90).expect("non-empty"),
            max_drawdown: stats::max_drawdown(&ordered_outcomes),
            max_consecutive_losses: stats::max_consecutive_losses(&ordered_outcomes),
            sensitivity,
            missing_candidate_trades: missing,
        };

        debug!(
            strategy_id,
            scenario_id,
            trades = aggregate.total_trades,
            tokens = aggregate.total_tokens,
            "aggregate built"
        );
        Ok(aggregate)
    }

    /// Fetch trades for the query id. A bare canonical base type matches
    /// every parameterization of that strategy; a parameterized id matches
    /// exactly.
    fn fetch_matching_trades(
        &self,
        strategy_id: &str,
        scenario_id: &str,
    ) -> Result<Vec<TradeRecord>, AggregateError> {
        if canonical_base_type(strategy_id) == Some(strategy_id) {
            let all = self.stores.trades.all()?;
            Ok(all
                .into_iter()
                .filter(|t| {
                    t.scenario_id == scenario_id
                        && canonical_base_type(&t.strategy_id) == Some(strategy_id)
                })
                .collect())
        } else {
            Ok(self
                .stores
                .trades
                .get_by_strategy_scenario(strategy_id, scenario_id)?)
        }
    }
}
