//! Exit Strategy Engine
//!
//! Three exit strategies over a closed parameter enum with one shared
//! `execute` entry point, so every call site handles the full strategy set
//! exhaustively. A strategy reads the candidate's normalized series,
//! decides exit signal time/price and reason, and the shared trade builder
//! applies the scenario's execution-cost model.
//!
//! # Lookup Semantics
//!
//! `price_at(t)` returns the row with the largest timestamp `<= t`, or the
//! first row when every row is later; it only fails on an empty series.
//! `liquidity_at(t)` returns the last row at-or-before `t`, or nothing.

use crate::events::CandidateSource;
use crate::scenario::Scenario;
use crate::series::{LiquidityPoint, PricePoint};
use crate::trade::{ExitReason, OutcomeClass, TradeRecord};
use serde::{Deserialize, Serialize};

/// Version stamp of the strategy implementations, recorded in the
/// reproducibility envelope.
pub const STRATEGY_VERSION: &str = "1.0.0";

pub const BASE_TIME_EXIT: &str = "time_exit";
pub const BASE_TRAILING_STOP: &str = "trailing_stop";
pub const BASE_LIQUIDITY_GUARD: &str = "liquidity_guard";

// =============================================================================
// CONFIGURATION
// =============================================================================

/// The closed set of strategy parameterizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrategyParams {
    TimeExit {
        hold_duration_ms: i64,
    },
    TrailingStop {
        /// Fractional trail, e.g. 0.15 for 15%.
        trail_pct: f64,
        /// Fractional hard stop below entry.
        initial_stop_pct: f64,
        max_hold_duration_ms: i64,
    },
    LiquidityGuard {
        /// Fractional drop below entry liquidity that forces an exit.
        liquidity_drop_pct: f64,
        max_hold_duration_ms: i64,
    },
}

impl StrategyParams {
    /// Canonical base type name.
    pub fn base_type(&self) -> &'static str {
        match self {
            Self::TimeExit { .. } => BASE_TIME_EXIT,
            Self::TrailingStop { .. } => BASE_TRAILING_STOP,
            Self::LiquidityGuard { .. } => BASE_LIQUIDITY_GUARD,
        }
    }

    /// Deterministic parameterized id. Fractions are encoded as integer
    /// basis points so the id never depends on float formatting.
    pub fn strategy_id(&self) -> String {
        match self {
            Self::TimeExit { hold_duration_ms } => {
                format!("{}_{}ms", BASE_TIME_EXIT, hold_duration_ms)
            }
            Self::TrailingStop {
                trail_pct,
                initial_stop_pct,
                max_hold_duration_ms,
            } => format!(
                "{}_{}bp_{}bp_{}ms",
                BASE_TRAILING_STOP,
                to_basis_points(*trail_pct),
                to_basis_points(*initial_stop_pct),
                max_hold_duration_ms
            ),
            Self::LiquidityGuard {
                liquidity_drop_pct,
                max_hold_duration_ms,
            } => format!(
                "{}_{}bp_{}ms",
                BASE_LIQUIDITY_GUARD,
                to_basis_points(*liquidity_drop_pct),
                max_hold_duration_ms
            ),
        }
    }
}

fn to_basis_points(fraction: f64) -> i64 {
    (fraction * 10_000.0).round() as i64
}

/// Map any strategy id (parameterized or bare) to its canonical base type.
pub fn canonical_base_type(strategy_id: &str) -> Option<&'static str> {
    for base in [BASE_TRAILING_STOP, BASE_LIQUIDITY_GUARD, BASE_TIME_EXIT] {
        if strategy_id == base || strategy_id.starts_with(&format!("{base}_")) {
            return Some(base);
        }
    }
    None
}

/// A strategy bound to the discovery source it trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub params: StrategyParams,
    pub entry_event_type: CandidateSource,
}

impl StrategyConfig {
    pub fn strategy_id(&self) -> String {
        self.params.strategy_id()
    }

    pub fn base_type(&self) -> &'static str {
        self.params.base_type()
    }

    /// The default strategy matrix: every strategy type against both
    /// discovery sources.
    pub fn defaults() -> Vec<Self> {
        let mut out = Vec::new();
        for entry_event_type in [CandidateSource::NewToken, CandidateSource::ActiveToken] {
            out.push(Self {
                params: StrategyParams::TimeExit {
                    hold_duration_ms: 300_000,
                },
                entry_event_type,
            });
            out.push(Self {
                params: StrategyParams::TrailingStop {
                    trail_pct: 0.15,
                    initial_stop_pct: 0.25,
                    max_hold_duration_ms: 600_000,
                },
                entry_event_type,
            });
            out.push(Self {
                params: StrategyParams::LiquidityGuard {
                    liquidity_drop_pct: 0.30,
                    max_hold_duration_ms: 600_000,
                },
                entry_event_type,
            });
        }
        out
    }
}

// =============================================================================
// INPUT & ERRORS
// =============================================================================

/// Everything a strategy needs for one execution.
#[derive(Debug, Clone)]
pub struct StrategyInput<'a> {
    pub candidate_id: &'a str,
    pub strategy_id: String,
    pub entry_event_type: CandidateSource,
    pub scenario: &'a Scenario,
    /// Candidate discovery time.
    pub entry_signal_time: i64,
    pub entry_signal_price: f64,
    /// Liquidity at entry, when observable.
    pub entry_liquidity: Option<f64>,
    /// Sorted by timestamp ascending.
    pub prices: &'a [PricePoint],
    /// Sorted by timestamp ascending.
    pub liquidity: &'a [LiquidityPoint],
}

impl StrategyInput<'_> {
    /// Fail fast on malformed inputs; these are invariant violations, not
    /// data conditions.
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.prices.is_empty() {
            return Err(StrategyError::NoPriceData(self.candidate_id.to_string()));
        }
        if self.entry_signal_price <= 0.0 {
            return Err(StrategyError::InvalidInput(format!(
                "entry price must be positive, got {} for candidate {}",
                self.entry_signal_price, self.candidate_id
            )));
        }
        if self.scenario.scenario_id.is_empty() {
            return Err(StrategyError::InvalidInput(
                "scenario id must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Strategy-level failures.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyError {
    /// The candidate has no price series.
    NoPriceData(String),
    /// Liquidity guard cannot establish entry liquidity.
    NoEntryLiquidity(String),
    /// Malformed strategy input; fatal upstream.
    InvalidInput(String),
}

impl std::fmt::Display for StrategyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPriceData(id) => write!(f, "no price data for candidate {}", id),
            Self::NoEntryLiquidity(id) => write!(f, "no entry liquidity for candidate {}", id),
            Self::InvalidInput(msg) => write!(f, "invalid strategy input: {}", msg),
        }
    }
}

impl std::error::Error for StrategyError {}

// =============================================================================
// LOOKUPS
// =============================================================================

/// Price of the row with the largest timestamp `<= t`; the first row's
/// price when every row is later; `None` only for an empty series.
pub fn price_at(prices: &[PricePoint], t: i64) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    let idx = prices.partition_point(|p| p.timestamp_ms <= t);
    if idx == 0 {
        Some(prices[0].price)
    } else {
        Some(prices[idx - 1].price)
    }
}

/// Last liquidity row at-or-before `t`; `None` when no such row exists.
pub fn liquidity_at(liquidity: &[LiquidityPoint], t: i64) -> Option<&LiquidityPoint> {
    let idx = liquidity.partition_point(|l| l.timestamp_ms <= t);
    if idx == 0 {
        None
    } else {
        Some(&liquidity[idx - 1])
    }
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Execute a strategy over one input, producing the finished trade record.
pub fn execute(params: &StrategyParams, input: &StrategyInput<'_>) -> Result<TradeRecord, StrategyError> {
    input.validate()?;
    match params {
        StrategyParams::TimeExit { hold_duration_ms } => run_time_exit(input, *hold_duration_ms),
        StrategyParams::TrailingStop {
            trail_pct,
            initial_stop_pct,
            max_hold_duration_ms,
        } => run_trailing_stop(input, *trail_pct, *initial_stop_pct, *max_hold_duration_ms),
        StrategyParams::LiquidityGuard {
            liquidity_drop_pct,
            max_hold_duration_ms,
        } => run_liquidity_guard(input, *liquidity_drop_pct, *max_hold_duration_ms),
    }
}

fn run_time_exit(input: &StrategyInput<'_>, hold_duration_ms: i64) -> Result<TradeRecord, StrategyError> {
    let exit_signal_time = input.entry_signal_time + hold_duration_ms;
    let exit_signal_price = price_at(input.prices, exit_signal_time)
        .ok_or_else(|| StrategyError::NoPriceData(input.candidate_id.to_string()))?;
    Ok(build_trade(
        input,
        exit_signal_time,
        exit_signal_price,
        ExitReason::TimeExit,
        None,
        None,
    ))
}

fn run_trailing_stop(
    input: &StrategyInput<'_>,
    trail_pct: f64,
    initial_stop_pct: f64,
    max_hold_duration_ms: i64,
) -> Result<TradeRecord, StrategyError> {
    let entry_price = input.entry_signal_price;
    let entry_time = input.entry_signal_time;
    let initial_stop_level = entry_price * (1.0 - initial_stop_pct);
    let deadline = entry_time + max_hold_duration_ms;

    let mut peak = entry_price;

    for point in input.prices.iter().filter(|p| p.timestamp_ms > entry_time) {
        if point.price > peak {
            peak = point.price;
        }

        // Trigger priority: hard stop, then trail, then duration.
        if point.price <= initial_stop_level {
            return Ok(build_trade(
                input,
                point.timestamp_ms,
                point.price,
                ExitReason::InitialStop,
                Some(peak),
                None,
            ));
        }
        if point.price <= peak * (1.0 - trail_pct) {
            return Ok(build_trade(
                input,
                point.timestamp_ms,
                point.price,
                ExitReason::TrailingStop,
                Some(peak),
                None,
            ));
        }
        if point.timestamp_ms - entry_time >= max_hold_duration_ms {
            let exit_price = price_at(input.prices, deadline)
                .ok_or_else(|| StrategyError::NoPriceData(input.candidate_id.to_string()))?;
            return Ok(build_trade(
                input,
                deadline,
                exit_price,
                ExitReason::MaxDuration,
                Some(peak),
                None,
            ));
        }
    }

    // Series ended before any trigger: duration exit at the deadline.
    let exit_price = price_at(input.prices, deadline)
        .ok_or_else(|| StrategyError::NoPriceData(input.candidate_id.to_string()))?;
    Ok(build_trade(
        input,
        deadline,
        exit_price,
        ExitReason::MaxDuration,
        Some(peak),
        None,
    ))
}

/// Merge key order for the guard walk: price events before liquidity
/// events on equal timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum GuardEventKind {
    Price = 0,
    Liquidity = 1,
}

fn run_liquidity_guard(
    input: &StrategyInput<'_>,
    liquidity_drop_pct: f64,
    max_hold_duration_ms: i64,
) -> Result<TradeRecord, StrategyError> {
    let entry_time = input.entry_signal_time;
    let entry_liquidity = input
        .entry_liquidity
        .ok_or_else(|| StrategyError::NoEntryLiquidity(input.candidate_id.to_string()))?;
    let floor = entry_liquidity * (1.0 - liquidity_drop_pct);
    let deadline = entry_time + max_hold_duration_ms;

    let mut timeline: Vec<(i64, GuardEventKind)> = input
        .prices
        .iter()
        .filter(|p| p.timestamp_ms > entry_time)
        .map(|p| (p.timestamp_ms, GuardEventKind::Price))
        .chain(
            input
                .liquidity
                .iter()
                .filter(|l| l.timestamp_ms > entry_time)
                .map(|l| (l.timestamp_ms, GuardEventKind::Liquidity)),
        )
        .collect();
    timeline.sort();

    let mut min_liquidity = entry_liquidity;

    for (ts, _kind) in timeline {
        let current_liquidity = liquidity_at(input.liquidity, ts)
            .map(|l| l.liquidity)
            .unwrap_or(entry_liquidity);
        if current_liquidity < min_liquidity {
            min_liquidity = current_liquidity;
        }

        if current_liquidity < floor {
            let exit_price = price_at(input.prices, ts)
                .ok_or_else(|| StrategyError::NoPriceData(input.candidate_id.to_string()))?;
            return Ok(build_trade(
                input,
                ts,
                exit_price,
                ExitReason::LiquidityDrop,
                None,
                Some(min_liquidity),
            ));
        }
        if ts - entry_time >= max_hold_duration_ms {
            let exit_price = price_at(input.prices, deadline)
                .ok_or_else(|| StrategyError::NoPriceData(input.candidate_id.to_string()))?;
            return Ok(build_trade(
                input,
                deadline,
                exit_price,
                ExitReason::MaxDuration,
                None,
                Some(min_liquidity),
            ));
        }
    }

    let exit_price = price_at(input.prices, deadline)
        .ok_or_else(|| StrategyError::NoPriceData(input.candidate_id.to_string()))?;
    Ok(build_trade(
        input,
        deadline,
        exit_price,
        ExitReason::MaxDuration,
        None,
        Some(min_liquidity),
    ))
}

// =============================================================================
// TRADE BUILDER
// =============================================================================

/// Apply the scenario execution model and assemble the trade record.
///
/// Slippage halves per side (`slippage_pct / 200`), delay shifts both
/// actual timestamps, and all flat costs are normalized by position value
/// into `total_cost_pct`.
fn build_trade(
    input: &StrategyInput<'_>,
    exit_signal_time: i64,
    exit_signal_price: f64,
    exit_reason: ExitReason,
    peak_price: Option<f64>,
    min_liquidity: Option<f64>,
) -> TradeRecord {
    let scenario = input.scenario;

    let entry_actual_time = input.entry_signal_time + scenario.delay_ms;
    let exit_actual_time = exit_signal_time + scenario.delay_ms;
    let entry_actual_price = input.entry_signal_price * (1.0 + scenario.slippage_pct / 200.0);
    let exit_actual_price = exit_signal_price * (1.0 - scenario.slippage_pct / 200.0);

    let entry_cost = scenario.fee + scenario.priority_fee;
    let exit_cost = scenario.fee + scenario.priority_fee;
    let position_size = 1.0;
    let position_value = entry_actual_price;
    let mev_cost = position_value * scenario.mev_penalty_pct / 100.0;

    let gross_return = (exit_actual_price - entry_actual_price) / entry_actual_price;
    let total_cost_pct = (entry_cost + exit_cost + mev_cost) / position_value;
    let outcome = gross_return - total_cost_pct;

    TradeRecord {
        trade_id: TradeRecord::derive_id(
            input.candidate_id,
            &input.strategy_id,
            &scenario.scenario_id,
            input.entry_signal_time,
        ),
        candidate_id: input.candidate_id.to_string(),
        strategy_id: input.strategy_id.clone(),
        scenario_id: scenario.scenario_id.clone(),
        entry_event_type: input.entry_event_type,
        entry_signal_time: input.entry_signal_time,
        entry_actual_time,
        entry_signal_price: input.entry_signal_price,
        entry_actual_price,
        entry_liquidity: input.entry_liquidity,
        exit_signal_time,
        exit_actual_time,
        exit_signal_price,
        exit_actual_price,
        exit_reason,
        entry_cost,
        exit_cost,
        mev_cost,
        total_cost_pct,
        position_size,
        position_value,
        gross_return,
        outcome,
        outcome_class: OutcomeClass::from_outcome(outcome),
        hold_duration_ms: exit_signal_time - input.entry_signal_time,
        peak_price,
        min_liquidity,
    }
}
