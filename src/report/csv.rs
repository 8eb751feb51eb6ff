//! CSV Artifact Rendering
//!
//! Hand-rendered CSVs with fixed headers, stable sort keys, and 8-decimal
//! numeric precision. No field in these tables can contain a comma or
//! quote (ids are hex/snake-case, enums render as fixed tokens), so no
//! quoting layer is needed - and none may be added without a format
//! version bump.

use crate::aggregate::StrategyAggregate;
use crate::data_version::canonical_decimal;
use crate::trade::TradeRecord;

pub const STRATEGY_AGGREGATES_HEADER: &str = "strategy_id,scenario_id,entry_event_type,\
total_trades,total_tokens,wins,losses,win_rate,token_win_rate,outcome_mean,outcome_median,\
outcome_p10,outcome_p25,outcome_p75,outcome_p90,outcome_stddev,max_drawdown,\
max_consecutive_losses";

pub const TRADE_RECORDS_HEADER: &str = "trade_id,candidate_id,strategy_id,scenario_id,\
entry_event_type,entry_signal_time,entry_actual_time,entry_signal_price,entry_actual_price,\
entry_liquidity,exit_signal_time,exit_actual_time,exit_signal_price,exit_actual_price,\
exit_reason,entry_cost,exit_cost,mev_cost,total_cost_pct,position_size,position_value,\
gross_return,outcome,outcome_class,hold_duration_ms,peak_price,min_liquidity";

pub const SCENARIO_OUTCOMES_HEADER: &str =
    "strategy_id,entry_event_type,scenario_id,total_trades,outcome_mean,outcome_median";

fn optional_decimal(value: Option<f64>) -> String {
    value.map(canonical_decimal).unwrap_or_default()
}

/// `strategy_aggregates.csv`, sorted by `(strategy_id, scenario_id,
/// entry_event_type)`.
pub fn render_strategy_aggregates(aggregates: &[StrategyAggregate]) -> String {
    let mut rows: Vec<&StrategyAggregate> = aggregates.iter().collect();
    rows.sort_by(|a, b| {
        a.strategy_id
            .cmp(&b.strategy_id)
            .then_with(|| a.scenario_id.cmp(&b.scenario_id))
            .then_with(|| a.entry_event_type.as_str().cmp(b.entry_event_type.as_str()))
    });

    let mut out = String::from(STRATEGY_AGGREGATES_HEADER);
    out.push('\n');
    for a in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            a.strategy_id,
            a.scenario_id,
            a.entry_event_type.as_str(),
            a.total_trades,
            a.total_tokens,
            a.wins,
            a.losses,
            canonical_decimal(a.win_rate),
            canonical_decimal(a.token_win_rate),
            canonical_decimal(a.outcome_mean),
            canonical_decimal(a.outcome_median),
            canonical_decimal(a.outcome_p10),
            canonical_decimal(a.outcome_p25),
            canonical_decimal(a.outcome_p75),
            canonical_decimal(a.outcome_p90),
            canonical_decimal(a.outcome_stddev),
            canonical_decimal(a.max_drawdown),
            a.max_consecutive_losses,
        ));
    }
    out
}

/// `trade_records.csv`, sorted by trade id.
pub fn render_trade_records(trades: &[TradeRecord]) -> String {
    let mut rows: Vec<&TradeRecord> = trades.iter().collect();
    rows.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));

    let mut out = String::from(TRADE_RECORDS_HEADER);
    out.push('\n');
    for t in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            t.trade_id,
            t.candidate_id,
            t.strategy_id,
            t.scenario_id,
            t.entry_event_type.as_str(),
            t.entry_signal_time,
            t.entry_actual_time,
            canonical_decimal(t.entry_signal_price),
            canonical_decimal(t.entry_actual_price),
            optional_decimal(t.entry_liquidity),
            t.exit_signal_time,
            t.exit_actual_time,
            canonical_decimal(t.exit_signal_price),
            canonical_decimal(t.exit_actual_price),
            t.exit_reason.as_str(),
            canonical_decimal(t.entry_cost),
            canonical_decimal(t.exit_cost),
            canonical_decimal(t.mev_cost),
            canonical_decimal(t.total_cost_pct),
            canonical_decimal(t.position_size),
            canonical_decimal(t.position_value),
            canonical_decimal(t.gross_return),
            canonical_decimal(t.outcome),
            t.outcome_class.as_str(),
            t.hold_duration_ms,
            optional_decimal(t.peak_price),
            optional_decimal(t.min_liquidity),
        ));
    }
    out
}

/// `scenario_outcomes.csv`: one row per aggregate, sorted by
/// `(strategy_id, entry_event_type, scenario_id)`.
pub fn render_scenario_outcomes(aggregates: &[StrategyAggregate]) -> String {
    let mut rows: Vec<&StrategyAggregate> = aggregates.iter().collect();
    rows.sort_by(|a, b| {
        a.strategy_id
            .cmp(&b.strategy_id)
            .then_with(|| a.entry_event_type.as_str().cmp(b.entry_event_type.as_str()))
            .then_with(|| a.scenario_id.cmp(&b.scenario_id))
    });

    let mut out = String::from(SCENARIO_OUTCOMES_HEADER);
    out.push('\n');
    for a in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            a.strategy_id,
            a.entry_event_type.as_str(),
            a.scenario_id,
            a.total_trades,
            canonical_decimal(a.outcome_mean),
            canonical_decimal(a.outcome_median),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SensitivitySlots;
    use crate::events::CandidateSource;
    use std::collections::BTreeMap;

    fn aggregate(strategy: &str, scenario: &str) -> StrategyAggregate {
        StrategyAggregate {
            strategy_id: strategy.into(),
            scenario_id: scenario.into(),
            entry_event_type: CandidateSource::NewToken,
            total_trades: 2,
            total_tokens: 1,
            wins: 1,
            losses: 1,
            win_rate: 0.5,
            token_win_rate: 1.0,
            outcome_mean: 0.05,
            outcome_median: 0.05,
            outcome_min: -0.1,
            outcome_max: 0.2,
            outcome_stddev: 0.15,
            outcome_p10: -0.08,
            outcome_p25: -0.02,
            outcome_p75: 0.12,
            outcome_p90: 0.18,
            max_drawdown: 0.1,
            max_consecutive_losses: 1,
            sensitivity: SensitivitySlots::default(),
            missing_candidate_trades: BTreeMap::new(),
        }
    }

    #[test]
    fn aggregate_csv_has_18_columns_and_sorted_rows() {
        let csv = render_strategy_aggregates(&[
            aggregate("time_exit_300000ms", "realistic"),
            aggregate("liquidity_guard_3000bp_600000ms", "degraded"),
        ]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].split(',').count(), 18);
        assert!(lines[1].starts_with("liquidity_guard_3000bp_600000ms,degraded"));
        assert!(lines[2].starts_with("time_exit_300000ms,realistic"));
        for line in &lines[1..] {
            assert_eq!(line.split(',').count(), 18);
        }
    }

    #[test]
    fn trade_csv_has_27_columns() {
        assert_eq!(TRADE_RECORDS_HEADER.split(',').count(), 27);
        let csv = render_trade_records(&[]);
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn scenario_csv_has_6_columns() {
        let csv = render_scenario_outcomes(&[aggregate("time_exit_300000ms", "realistic")]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0].split(',').count(), 6);
        assert_eq!(lines[1].split(',').count(), 6);
    }
}
