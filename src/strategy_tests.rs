//! Strategy engine tests: lookup semantics, trigger priority, and the
//! execution-cost model.

use crate::events::CandidateSource;
use crate::scenario::Scenario;
use crate::series::{LiquidityPoint, PricePoint};
use crate::strategy::{
    canonical_base_type, execute, liquidity_at, price_at, StrategyConfig, StrategyError,
    StrategyInput, StrategyParams,
};
use crate::trade::{ExitReason, OutcomeClass};

const EPS: f64 = 1e-9;

fn price_series(points: &[(i64, f64)]) -> Vec<PricePoint> {
    points
        .iter()
        .enumerate()
        .map(|(i, (ts, price))| PricePoint {
            candidate_id: "cand".into(),
            timestamp_ms: *ts,
            slot: i as u64,
            price: *price,
            volume: 1.0,
            swap_count: 1,
        })
        .collect()
}

fn liquidity_series(points: &[(i64, f64)]) -> Vec<LiquidityPoint> {
    points
        .iter()
        .enumerate()
        .map(|(i, (ts, liq))| LiquidityPoint {
            candidate_id: "cand".into(),
            timestamp_ms: *ts,
            slot: i as u64,
            liquidity: *liq,
            liquidity_token: *liq / 2.0,
            liquidity_quote: *liq / 2.0,
        })
        .collect()
}

/// A zero-cost scenario isolates the exit logic from the cost model.
fn free_scenario() -> Scenario {
    Scenario {
        scenario_id: "realistic".into(),
        delay_ms: 0,
        slippage_pct: 0.0,
        fee: 0.0,
        priority_fee: 0.0,
        mev_penalty_pct: 0.0,
    }
}

fn input<'a>(
    scenario: &'a Scenario,
    prices: &'a [PricePoint],
    liquidity: &'a [LiquidityPoint],
    entry_time: i64,
    entry_price: f64,
    entry_liquidity: Option<f64>,
) -> StrategyInput<'a> {
    StrategyInput {
        candidate_id: "cand",
        strategy_id: "test_strategy".into(),
        entry_event_type: CandidateSource::NewToken,
        scenario,
        entry_signal_time: entry_time,
        entry_signal_price: entry_price,
        entry_liquidity,
        prices,
        liquidity,
    }
}

// =============================================================================
// LOOKUPS
// =============================================================================

#[test]
fn price_at_picks_last_at_or_before() {
    let prices = price_series(&[(100, 1.0), (200, 2.0), (300, 3.0)]);
    assert_eq!(price_at(&prices, 250), Some(2.0));
    assert_eq!(price_at(&prices, 300), Some(3.0));
    assert_eq!(price_at(&prices, 1_000), Some(3.0));
}

#[test]
fn price_at_falls_back_to_first_row() {
    let prices = price_series(&[(100, 1.0), (200, 2.0)]);
    assert_eq!(price_at(&prices, 50), Some(1.0));
    assert_eq!(price_at(&[], 50), None);
}

#[test]
fn liquidity_at_is_nullable_before_first_row() {
    let liquidity = liquidity_series(&[(100, 10.0), (200, 20.0)]);
    assert!(liquidity_at(&liquidity, 50).is_none());
    assert_eq!(liquidity_at(&liquidity, 150).unwrap().liquidity, 10.0);
    assert_eq!(liquidity_at(&liquidity, 200).unwrap().liquidity, 20.0);
}

// =============================================================================
// TIME EXIT
// =============================================================================

#[test]
fn time_exit_exits_at_entry_plus_hold() {
    let scenario = free_scenario();
    let prices = price_series(&[(0, 1.0), (30_000, 1.5), (60_000, 2.0)]);
    let trade = execute(
        &StrategyParams::TimeExit {
            hold_duration_ms: 60_000,
        },
        &input(&scenario, &prices, &[], 0, 1.0, None),
    )
    .unwrap();

    assert_eq!(trade.exit_signal_time, 60_000);
    assert!((trade.exit_signal_price - 2.0).abs() < EPS);
    assert_eq!(trade.exit_reason, ExitReason::TimeExit);
    assert_eq!(trade.hold_duration_ms, 60_000);
    assert!(trade.peak_price.is_none());
    assert!(trade.min_liquidity.is_none());
}

// =============================================================================
// TRAILING STOP
// =============================================================================

#[test]
fn trailing_stop_triggers_after_peak_retrace() {
    // 1.0 -> 1.2 -> 1.3 -> 1.4 -> 1.25 with 10% trail and 10% hard stop:
    // trailing stop fires at 1.25 against peak 1.4.
    let scenario = free_scenario();
    let prices = price_series(&[(0, 1.0), (1_000, 1.2), (2_000, 1.3), (3_000, 1.4), (4_000, 1.25)]);
    let trade = execute(
        &StrategyParams::TrailingStop {
            trail_pct: 0.10,
            initial_stop_pct: 0.10,
            max_hold_duration_ms: 600_000,
        },
        &input(&scenario, &prices, &[], 0, 1.0, None),
    )
    .unwrap();

    assert_eq!(trade.exit_reason, ExitReason::TrailingStop);
    assert_eq!(trade.exit_signal_time, 4_000);
    assert!((trade.exit_signal_price - 1.25).abs() < EPS);
    assert!((trade.peak_price.unwrap() - 1.4).abs() < EPS);
}

#[test]
fn initial_stop_takes_priority_over_trailing() {
    // A crash through both levels must report the hard stop.
    let scenario = free_scenario();
    let prices = price_series(&[(0, 1.0), (1_000, 0.5)]);
    let trade = execute(
        &StrategyParams::TrailingStop {
            trail_pct: 0.10,
            initial_stop_pct: 0.25,
            max_hold_duration_ms: 600_000,
        },
        &input(&scenario, &prices, &[], 0, 1.0, None),
    )
    .unwrap();

    assert_eq!(trade.exit_reason, ExitReason::InitialStop);
    assert!((trade.exit_signal_price - 0.5).abs() < EPS);
}

#[test]
fn trailing_stop_times_out_at_max_duration() {
    let scenario = free_scenario();
    let prices = price_series(&[(0, 1.0), (1_000, 1.05)]);
    let trade = execute(
        &StrategyParams::TrailingStop {
            trail_pct: 0.10,
            initial_stop_pct: 0.25,
            max_hold_duration_ms: 10_000,
        },
        &input(&scenario, &prices, &[], 0, 1.0, None),
    )
    .unwrap();

    assert_eq!(trade.exit_reason, ExitReason::MaxDuration);
    assert_eq!(trade.exit_signal_time, 10_000);
    // price_at(10_000) is the last row at 1_000.
    assert!((trade.exit_signal_price - 1.05).abs() < EPS);
}

// =============================================================================
// LIQUIDITY GUARD
// =============================================================================

#[test]
fn liquidity_guard_requires_entry_liquidity() {
    let scenario = free_scenario();
    let prices = price_series(&[(0, 1.0)]);
    let err = execute(
        &StrategyParams::LiquidityGuard {
            liquidity_drop_pct: 0.30,
            max_hold_duration_ms: 10_000,
        },
        &input(&scenario, &prices, &[], 0, 1.0, None),
    )
    .unwrap_err();
    assert!(matches!(err, StrategyError::NoEntryLiquidity(_)));
}

#[test]
fn liquidity_guard_exits_on_drop() {
    let scenario = free_scenario();
    let prices = price_series(&[(0, 1.0), (1_000, 0.9), (2_000, 0.8)]);
    let liquidity = liquidity_series(&[(0, 100.0), (1_500, 60.0)]);
    let trade = execute(
        &StrategyParams::LiquidityGuard {
            liquidity_drop_pct: 0.30,
            max_hold_duration_ms: 600_000,
        },
        &input(&scenario, &prices, &liquidity, 0, 1.0, Some(100.0)),
    )
    .unwrap();

    // Liquidity falls below 70 at the 1_500 event.
    assert_eq!(trade.exit_reason, ExitReason::LiquidityDrop);
    assert_eq!(trade.exit_signal_time, 1_500);
    assert!((trade.exit_signal_price - 0.9).abs() < EPS);
    assert!((trade.min_liquidity.unwrap() - 60.0).abs() < EPS);
}

#[test]
fn liquidity_guard_times_out_when_liquidity_holds() {
    let scenario = free_scenario();
    let prices = price_series(&[(0, 1.0), (1_000, 1.1)]);
    let liquidity = liquidity_series(&[(0, 100.0), (500, 90.0)]);
    let trade = execute(
        &StrategyParams::LiquidityGuard {
            liquidity_drop_pct: 0.30,
            max_hold_duration_ms: 5_000,
        },
        &input(&scenario, &prices, &liquidity, 0, 1.0, Some(100.0)),
    )
    .unwrap();

    assert_eq!(trade.exit_reason, ExitReason::MaxDuration);
    assert_eq!(trade.exit_signal_time, 5_000);
    assert!((trade.min_liquidity.unwrap() - 90.0).abs() < EPS);
}

// =============================================================================
// EXECUTION MODEL
// =============================================================================

#[test]
fn cost_model_applies_delay_slippage_and_fees() {
    let scenario = Scenario {
        scenario_id: "realistic".into(),
        delay_ms: 1_000,
        slippage_pct: 2.0,
        fee: 0.01,
        priority_fee: 0.02,
        mev_penalty_pct: 1.0,
    };
    let prices = price_series(&[(0, 1.0), (60_000, 1.2)]);
    let trade = execute(
        &StrategyParams::TimeExit {
            hold_duration_ms: 60_000,
        },
        &input(&scenario, &prices, &[], 0, 1.0, None),
    )
    .unwrap();

    assert_eq!(trade.entry_actual_time, 1_000);
    assert_eq!(trade.exit_actual_time, 61_000);
    assert!((trade.entry_actual_price - 1.01).abs() < EPS);
    assert!((trade.exit_actual_price - 1.2 * 0.99).abs() < EPS);
    assert!((trade.entry_cost - 0.03).abs() < EPS);
    assert!((trade.exit_cost - 0.03).abs() < EPS);
    assert!((trade.position_value - 1.01).abs() < EPS);
    assert!((trade.mev_cost - 1.01 * 0.01).abs() < EPS);

    let gross = (1.2 * 0.99 - 1.01) / 1.01;
    assert!((trade.gross_return - gross).abs() < EPS);
    let cost_pct = (0.03 + 0.03 + 1.01 * 0.01) / 1.01;
    assert!((trade.total_cost_pct - cost_pct).abs() < EPS);
    assert!((trade.outcome - (gross - cost_pct)).abs() < EPS);
    assert_eq!(trade.outcome_class, OutcomeClass::Win);
}

#[test]
fn validation_rejects_bad_inputs() {
    let scenario = free_scenario();
    let prices = price_series(&[(0, 1.0)]);

    let empty = input(&scenario, &[], &[], 0, 1.0, None);
    assert!(matches!(
        execute(&StrategyParams::TimeExit { hold_duration_ms: 1 }, &empty),
        Err(StrategyError::NoPriceData(_))
    ));

    let negative = input(&scenario, &prices, &[], 0, -1.0, None);
    assert!(matches!(
        execute(&StrategyParams::TimeExit { hold_duration_ms: 1 }, &negative),
        Err(StrategyError::InvalidInput(_))
    ));
}

// =============================================================================
// IDENTIFIERS
// =============================================================================

#[test]
fn strategy_ids_are_parameterized_and_stable() {
    let configs = StrategyConfig::defaults();
    assert_eq!(configs.len(), 6);

    let ids: Vec<String> = configs.iter().map(|c| c.strategy_id()).collect();
    assert!(ids.contains(&"time_exit_300000ms".to_string()));
    assert!(ids.contains(&"trailing_stop_1500bp_2500bp_600000ms".to_string()));
    assert!(ids.contains(&"liquidity_guard_3000bp_600000ms".to_string()));
}

#[test]
fn canonical_base_type_strips_parameters() {
    assert_eq!(canonical_base_type("time_exit_300000ms"), Some("time_exit"));
    assert_eq!(
        canonical_base_type("trailing_stop_1500bp_2500bp_600000ms"),
        Some("trailing_stop")
    );
    assert_eq!(canonical_base_type("liquidity_guard"), Some("liquidity_guard"));
    assert_eq!(canonical_base_type("unknown_strategy"), None);
}
