//! Aggregator tests: filtering, distribution math, ordered risk measures,
//! sensitivity slots, and missing-candidate diagnostics.

use crate::aggregate::{AggregateError, MetricAggregator};
use crate::events::{CandidateSource, TokenCandidate};
use crate::storage::Stores;
use crate::trade::{ExitReason, OutcomeClass, TradeRecord};

const EPS: f64 = 1e-9;

fn seed_candidate(stores: &Stores, mint: &str, source: CandidateSource) -> String {
    let candidate =
        TokenCandidate::from_discovery(source, mint, None, format!("sig_{mint}"), 0, 1, 1_000);
    let id = candidate.candidate_id.clone();
    stores.candidates.insert(candidate).unwrap();
    id
}

fn insert_trade(
    stores: &Stores,
    candidate_id: &str,
    strategy_id: &str,
    scenario_id: &str,
    entry_signal_time: i64,
    outcome: f64,
) {
    let trade = TradeRecord {
        trade_id: TradeRecord::derive_id(candidate_id, strategy_id, scenario_id, entry_signal_time),
        candidate_id: candidate_id.to_string(),
        strategy_id: strategy_id.to_string(),
        scenario_id: scenario_id.to_string(),
        entry_event_type: CandidateSource::NewToken,
        entry_signal_time,
        entry_actual_time: entry_signal_time,
        entry_signal_price: 1.0,
        entry_actual_price: 1.0,
        entry_liquidity: None,
        exit_signal_time: entry_signal_time + 1_000,
        exit_actual_time: entry_signal_time + 1_000,
        exit_signal_price: 1.0 + outcome,
        exit_actual_price: 1.0 + outcome,
        exit_reason: ExitReason::TimeExit,
        entry_cost: 0.0,
        exit_cost: 0.0,
        mev_cost: 0.0,
        total_cost_pct: 0.0,
        position_size: 1.0,
        position_value: 1.0,
        gross_return: outcome,
        outcome,
        outcome_class: OutcomeClass::from_outcome(outcome),
        hold_duration_ms: 1_000,
        peak_price: None,
        min_liquidity: None,
    };
    stores.trades.insert(trade).unwrap();
}

const STRATEGY: &str = "time_exit_300000ms";

#[test]
fn counts_and_win_rates() {
    let stores = Stores::in_memory();
    let a = seed_candidate(&stores, "mintA", CandidateSource::NewToken);
    let b = seed_candidate(&stores, "mintB", CandidateSource::NewToken);

    insert_trade(&stores, &a, STRATEGY, "realistic", 1_000, 0.10);
    insert_trade(&stores, &a, STRATEGY, "realistic", 2_000, -0.02);
    insert_trade(&stores, &b, STRATEGY, "realistic", 3_000, -0.05);

    let agg = MetricAggregator::new(stores)
        .aggregate(STRATEGY, "realistic", CandidateSource::NewToken)
        .unwrap();

    assert_eq!(agg.total_trades, 3);
    assert_eq!(agg.total_tokens, 2);
    assert_eq!(agg.wins, 1);
    assert_eq!(agg.losses, 2);
    assert!((agg.win_rate - 1.0 / 3.0).abs() < EPS);
    // Token A mean = 0.04 > 0; token B mean = -0.05.
    assert!((agg.token_win_rate - 0.5).abs() < EPS);
}

#[test]
fn token_win_rate_requires_strictly_positive_mean() {
    let stores = Stores::in_memory();
    let a = seed_candidate(&stores, "mintA", CandidateSource::NewToken);

    // Mean exactly zero must not count as a winning token.
    insert_trade(&stores, &a, STRATEGY, "realistic", 1_000, 0.10);
    insert_trade(&stores, &a, STRATEGY, "realistic", 2_000, -0.10);

    let agg = MetricAggregator::new(stores)
        .aggregate(STRATEGY, "realistic", CandidateSource::NewToken)
        .unwrap();
    assert_eq!(agg.token_win_rate, 0.0);
}

#[test]
fn ordered_metrics_use_entry_time_order() {
    let stores = Stores::in_memory();
    let a = seed_candidate(&stores, "mintA", CandidateSource::NewToken);

    // Insert out of entry-time order; the aggregator must re-sort.
    // Reference sequence: 0.10, 0.20, -0.15, -0.10, 0.05, -0.25 -> dd 0.45.
    let outcomes = [0.10, 0.20, -0.15, -0.10, 0.05, -0.25];
    let order = [3usize, 0, 5, 1, 4, 2];
    for i in order {
        insert_trade(
            &stores,
            &a,
            STRATEGY,
            "realistic",
            1_000 + i as i64 * 1_000,
            outcomes[i],
        );
    }

    let agg = MetricAggregator::new(stores)
        .aggregate(STRATEGY, "realistic", CandidateSource::NewToken)
        .unwrap();
    assert!((agg.max_drawdown - 0.45).abs() < EPS);
    assert_eq!(agg.max_consecutive_losses, 2);
}

#[test]
fn percentiles_match_reference_distribution() {
    let stores = Stores::in_memory();
    let a = seed_candidate(&stores, "mintA", CandidateSource::NewToken);
    let values = [-0.20, -0.10, 0.00, 0.05, 0.10, 0.15, 0.20, 0.25, 0.30, 0.40];
    for (i, v) in values.iter().enumerate() {
        insert_trade(&stores, &a, STRATEGY, "realistic", 1_000 + i as i64, *v);
    }

    let agg = MetricAggregator::new(stores)
        .aggregate(STRATEGY, "realistic", CandidateSource::NewToken)
        .unwrap();
    assert!((agg.outcome_p25 - 0.0125).abs() < EPS);
    assert!((agg.outcome_median - 0.125).abs() < EPS);
    assert!((agg.outcome_p75 - 0.2375).abs() < EPS);
    assert!((agg.outcome_min + 0.20).abs() < EPS);
    assert!((agg.outcome_max - 0.40).abs() < EPS);
}

#[test]
fn source_filter_excludes_other_entry_types() {
    let stores = Stores::in_memory();
    let new_token = seed_candidate(&stores, "mintA", CandidateSource::NewToken);
    let active_token = seed_candidate(&stores, "mintB", CandidateSource::ActiveToken);

    insert_trade(&stores, &new_token, STRATEGY, "realistic", 1_000, 0.10);
    insert_trade(&stores, &active_token, STRATEGY, "realistic", 2_000, 0.20);

    let agg = MetricAggregator::new(stores)
        .aggregate(STRATEGY, "realistic", CandidateSource::NewToken)
        .unwrap();
    assert_eq!(agg.total_trades, 1);
}

#[test]
fn missing_candidates_are_counted_not_dropped_silently() {
    let stores = Stores::in_memory();
    let known = seed_candidate(&stores, "mintA", CandidateSource::NewToken);

    insert_trade(&stores, &known, STRATEGY, "realistic", 1_000, 0.10);
    insert_trade(&stores, "ghost_candidate", STRATEGY, "realistic", 2_000, 0.50);
    insert_trade(&stores, "ghost_candidate", STRATEGY, "realistic", 3_000, 0.60);

    let agg = MetricAggregator::new(stores)
        .aggregate(STRATEGY, "realistic", CandidateSource::NewToken)
        .unwrap();
    assert_eq!(agg.total_trades, 1);
    assert_eq!(agg.missing_candidate_trades.get("ghost_candidate"), Some(&2));
}

#[test]
fn base_type_query_matches_parameterized_ids() {
    let stores = Stores::in_memory();
    let a = seed_candidate(&stores, "mintA", CandidateSource::NewToken);

    insert_trade(&stores, &a, "time_exit_300000ms", "realistic", 1_000, 0.10);
    insert_trade(&stores, &a, "time_exit_60000ms", "realistic", 2_000, 0.20);
    insert_trade(&stores, &a, "trailing_stop_1500bp_2500bp_600000ms", "realistic", 3_000, 0.30);

    let agg = MetricAggregator::new(stores)
        .aggregate("time_exit", "realistic", CandidateSource::NewToken)
        .unwrap();
    assert_eq!(agg.total_trades, 2);
}

#[test]
fn sensitivity_slot_matches_own_scenario_only() {
    let stores = Stores::in_memory();
    let a = seed_candidate(&stores, "mintA", CandidateSource::NewToken);
    insert_trade(&stores, &a, STRATEGY, "realistic", 1_000, 0.10);
    insert_trade(&stores, &a, STRATEGY, "pessimistic", 1_000, -0.10);
    insert_trade(&stores, &a, STRATEGY, "optimistic", 1_000, 0.30);

    let aggregator = MetricAggregator::new(stores);

    let realistic = aggregator
        .aggregate(STRATEGY, "realistic", CandidateSource::NewToken)
        .unwrap();
    assert!((realistic.sensitivity.realistic_outcome_mean.unwrap() - 0.10).abs() < EPS);
    assert!(realistic.sensitivity.pessimistic_outcome_mean.is_none());
    assert!(realistic.sensitivity.degraded_outcome_mean.is_none());

    let pessimistic = aggregator
        .aggregate(STRATEGY, "pessimistic", CandidateSource::NewToken)
        .unwrap();
    assert!((pessimistic.sensitivity.pessimistic_outcome_mean.unwrap() + 0.10).abs() < EPS);

    // Optimistic aggregates populate no slot at all.
    let optimistic = aggregator
        .aggregate(STRATEGY, "optimistic", CandidateSource::NewToken)
        .unwrap();
    assert_eq!(optimistic.sensitivity, Default::default());
}

#[test]
fn empty_result_is_no_trades() {
    let stores = Stores::in_memory();
    seed_candidate(&stores, "mintA", CandidateSource::NewToken);
    let err = MetricAggregator::new(stores)
        .aggregate(STRATEGY, "realistic", CandidateSource::NewToken)
        .unwrap_err();
    assert!(matches!(err, AggregateError::NoTrades { .. }));
}

#[test]
fn single_trade_collapses_percentiles() {
    let stores = Stores::in_memory();
    let a = seed_candidate(&stores, "mintA", CandidateSource::NewToken);
    insert_trade(&stores, &a, STRATEGY, "realistic", 1_000, 0.07);

    let agg = MetricAggregator::new(stores)
        .aggregate(STRATEGY, "realistic", CandidateSource::NewToken)
        .unwrap();
    assert!((agg.outcome_p10 - 0.07).abs() < EPS);
    assert!((agg.outcome_median - 0.07).abs() < EPS);
    assert!((agg.outcome_p90 - 0.07).abs() < EPS);
    assert_eq!(agg.outcome_stddev, 0.0);
}
