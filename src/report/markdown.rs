//! Markdown Report Rendering
//!
//! `REPORT_PHASE1.md` (the full research report) and
//! `DECISION_GATE_REPORT.md` (criteria/trigger tables per strategy).
//! Numbers render at 4 decimals, timestamps as RFC 3339 UTC, and every
//! table is sorted by its primary key so reruns diff cleanly.

use super::RunReport;
use crate::aggregate::StrategyAggregate;
use crate::decision::StrategyEvaluation;
use crate::scenario::SCENARIO_REALISTIC;
use chrono::{DateTime, SecondsFormat};

fn fmt4(value: f64) -> String {
    format!("{:.4}", value)
}

fn rfc3339_ms(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("invalid timestamp {timestamp_ms}"))
}

fn sorted_aggregates(report: &RunReport) -> Vec<&StrategyAggregate> {
    let mut rows: Vec<&StrategyAggregate> = report.aggregates.iter().collect();
    rows.sort_by(|a, b| {
        a.strategy_id
            .cmp(&b.strategy_id)
            .then_with(|| a.scenario_id.cmp(&b.scenario_id))
            .then_with(|| a.entry_event_type.as_str().cmp(b.entry_event_type.as_str()))
    });
    rows
}

/// Render `REPORT_PHASE1.md`.
pub fn render_phase1_report(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("# Token Research Report - Phase 1\n\n");

    // -- Executive Summary ---------------------------------------------------
    out.push_str("## Executive Summary\n\n");
    out.push_str(&format!("- **Decision**: {}\n", report.decision));
    out.push_str(&format!(
        "- Generated: {}\n",
        report.generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    out.push_str(&format!(
        "- Data version: `{}` (source: {})\n",
        report.data_version.version,
        report.data_version.source.as_str()
    ));
    out.push_str(&format!(
        "- {} candidates, {} trades, {} strategy aggregates\n",
        report.data_summary.total_candidates,
        report.data_summary.total_trades,
        report.aggregates.len()
    ));
    out.push_str(&format!(
        "- Sufficiency: {}\n\n",
        if report.sufficiency.passed { "PASSED" } else { "FAILED" }
    ));

    // -- Data Summary --------------------------------------------------------
    out.push_str("## Data Summary\n\n");
    out.push_str("| metric | value |\n|---|---|\n");
    out.push_str(&format!(
        "| candidates (total) | {} |\n",
        report.data_summary.total_candidates
    ));
    out.push_str(&format!(
        "| candidates (NEW_TOKEN) | {} |\n",
        report.data_summary.new_token_candidates
    ));
    out.push_str(&format!(
        "| candidates (ACTIVE_TOKEN) | {} |\n",
        report.data_summary.active_token_candidates
    ));
    out.push_str(&format!("| price points | {} |\n", report.data_summary.price_points));
    out.push_str(&format!(
        "| liquidity points | {} |\n",
        report.data_summary.liquidity_points
    ));
    out.push_str(&format!("| trade records | {} |\n", report.data_summary.total_trades));
    match report.data_summary.coverage_range_ms {
        Some((from, to)) => {
            out.push_str(&format!("| coverage from | {} |\n", rfc3339_ms(from)));
            out.push_str(&format!("| coverage to | {} |\n", rfc3339_ms(to)));
        }
        None => out.push_str("| coverage | (no data) |\n"),
    }
    out.push('\n');

    // -- Data Quality --------------------------------------------------------
    out.push_str("## Data Quality\n\n");
    out.push_str("| check | status | observed | threshold |\n|---|---|---|---|\n");
    for check in &report.sufficiency.checks {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            check.check.name(),
            if check.passed { "PASS" } else { "FAIL" },
            check.observed,
            check.threshold
        ));
    }
    out.push('\n');
    if !report.sufficiency.messages.is_empty() {
        out.push_str("Integrity findings:\n\n");
        for message in &report.sufficiency.messages {
            out.push_str(&format!(
                "- [{}] {}\n",
                message.check.name(),
                message.message
            ));
        }
        out.push('\n');
    }

    // -- Strategy Metrics ----------------------------------------------------
    out.push_str("## Strategy Metrics\n\n");
    if report.aggregates.is_empty() {
        out.push_str("No aggregates were produced.\n\n");
    } else {
        out.push_str(
            "| strategy | scenario | entry | trades | tokens | win rate | token win rate \
             | mean | median | p25 | p75 | stddev | max dd | max losses |\n",
        );
        out.push_str("|---|---|---|---|---|---|---|---|---|---|---|---|---|---|\n");
        for a in sorted_aggregates(report) {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
                a.strategy_id,
                a.scenario_id,
                a.entry_event_type.as_str(),
                a.total_trades,
                a.total_tokens,
                fmt4(a.win_rate),
                fmt4(a.token_win_rate),
                fmt4(a.outcome_mean),
                fmt4(a.outcome_median),
                fmt4(a.outcome_p25),
                fmt4(a.outcome_p75),
                fmt4(a.outcome_stddev),
                fmt4(a.max_drawdown),
                a.max_consecutive_losses
            ));
        }
        out.push('\n');
    }

    // -- NEW_TOKEN vs ACTIVE_TOKEN -------------------------------------------
    out.push_str("## NEW_TOKEN vs ACTIVE_TOKEN\n\n");
    let realistic: Vec<&StrategyAggregate> = sorted_aggregates(report)
        .into_iter()
        .filter(|a| a.scenario_id == SCENARIO_REALISTIC)
        .collect();
    if realistic.is_empty() {
        out.push_str("No realistic-scenario aggregates to compare.\n\n");
    } else {
        out.push_str("| strategy | entry | trades | mean | median | token win rate |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for a in realistic {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                a.strategy_id,
                a.entry_event_type.as_str(),
                a.total_trades,
                fmt4(a.outcome_mean),
                fmt4(a.outcome_median),
                fmt4(a.token_win_rate)
            ));
        }
        out.push('\n');
    }

    // -- Scenario Sensitivity ------------------------------------------------
    out.push_str("## Scenario Sensitivity\n\n");
    if report.aggregates.is_empty() {
        out.push_str("No aggregates were produced.\n\n");
    } else {
        out.push_str("| strategy | entry | scenario | mean outcome | median outcome |\n");
        out.push_str("|---|---|---|---|---|\n");
        let mut rows: Vec<&StrategyAggregate> = report.aggregates.iter().collect();
        rows.sort_by(|a, b| {
            a.strategy_id
                .cmp(&b.strategy_id)
                .then_with(|| a.entry_event_type.as_str().cmp(b.entry_event_type.as_str()))
                .then_with(|| a.scenario_id.cmp(&b.scenario_id))
        });
        for a in rows {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                a.strategy_id,
                a.entry_event_type.as_str(),
                a.scenario_id,
                fmt4(a.outcome_mean),
                fmt4(a.outcome_median)
            ));
        }
        out.push('\n');
    }

    // -- Reproducibility -----------------------------------------------------
    out.push_str("## Reproducibility\n\n");
    out.push_str(&format!("- Data version: `{}`\n", report.data_version.version));
    out.push_str(&format!(
        "- Data version source: {}\n",
        report.data_version.source.as_str()
    ));
    for (component, hash) in &report.data_version.component_hashes {
        out.push_str(&format!("- H({component}): `{hash}`\n"));
    }
    out.push_str(&format!("- Strategy version: {}\n", report.strategy_version));
    out.push_str(&format!("- Generator version: {}\n", report.generator_version));
    out.push_str(&format!(
        "- Replay commit: {}\n",
        report.replay_commit.as_deref().unwrap_or("unknown")
    ));
    out.push_str(&format!("- Replay command: `{}`\n\n", report.replay_command));

    // -- Replay References ---------------------------------------------------
    out.push_str("## Replay References\n\n");
    out.push_str(&format!(
        "- Replay verification: {}/{} trades matched ({})\n",
        report.verification.matched_trades,
        report.verification.total_trades,
        if report.verification.passed() { "PASS" } else { "FAIL" }
    ));
    if !report.verification.mismatches.is_empty() {
        out.push_str("\nMismatched fields:\n\n");
        for mismatch in &report.verification.mismatches {
            out.push_str(&format!(
                "- trade `{}` field {}: stored {} vs replayed {}\n",
                mismatch.trade_id, mismatch.field, mismatch.stored, mismatch.replayed
            ));
        }
    }
    out.push_str(&format!(
        "\nTo reproduce this report run:\n\n```\n{}\n```\n",
        report.replay_command
    ));

    out
}

/// Render `DECISION_GATE_REPORT.md`.
pub fn render_decision_gate_report(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# Decision Gate Report\n\n");

    if report.evaluations.is_empty() {
        out.push_str("The gate was not evaluated: data sufficiency failed.\n\n");
    }

    let mut evaluations: Vec<&StrategyEvaluation> = report.evaluations.iter().collect();
    evaluations.sort_by(|a, b| {
        a.input
            .strategy_id
            .cmp(&b.input.strategy_id)
            .then_with(|| {
                a.input
                    .entry_event_type
                    .as_str()
                    .cmp(b.input.entry_event_type.as_str())
            })
    });

    for evaluation in evaluations {
        out.push_str(&format!(
            "## {} ({})\n\n",
            evaluation.input.strategy_id,
            evaluation.input.entry_event_type.as_str()
        ));

        out.push_str("### GO Criteria\n\n");
        out.push_str("| criterion | threshold | actual | result |\n|---|---|---|---|\n");
        for criterion in &evaluation.go_criteria {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                criterion.name,
                criterion.threshold,
                criterion.actual,
                if criterion.passed { "PASS" } else { "FAIL" }
            ));
        }

        out.push_str("\n### NO-GO Triggers\n\n");
        out.push_str("| trigger | condition | actual | result |\n|---|---|---|---|\n");
        for trigger in &evaluation.no_go_triggers {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                trigger.name,
                trigger.condition,
                trigger.actual,
                if trigger.fired { "FIRED" } else { "clear" }
            ));
        }

        out.push_str(&format!("\n**Strategy decision: {}**\n\n", evaluation.decision));
    }

    out.push_str("## Overall Decision\n\n");
    out.push_str(&format!("**{}**\n", report.decision));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_version::{DataVersion, DataVersionSource};
    use crate::decision::{evaluate, DecisionInput, GateDecision};
    use crate::events::CandidateSource;
    use crate::report::DataSummary;
    use crate::simulation::SimulationStats;
    use crate::sufficiency::SufficiencyReport;
    use crate::verification::VerificationReport;

    fn report_with_one_evaluation() -> RunReport {
        let input = DecisionInput {
            strategy_id: "time_exit_300000ms".into(),
            entry_event_type: CandidateSource::NewToken,
            scenario_id: "realistic".into(),
            positive_outcome_pct: 10.0,
            median_outcome: 0.05,
            realistic_mean: 0.06,
            realistic_median: 0.05,
            pessimistic_mean: 0.03,
            pessimistic_median: 0.03,
            p10: 0.01,
            p25: 0.02,
            p50: 0.05,
            p75: 0.10,
            p90: 0.20,
            strategy_implementable: true,
        };
        let evaluation = evaluate(&input).unwrap();

        RunReport {
            generated_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            generator_version: "0.1.0".into(),
            strategy_version: "1.0.0".into(),
            replay_commit: Some("abcdef12".into()),
            replay_command: "tokenlab --output-dir out".into(),
            data_version: DataVersion {
                version: "f".repeat(64),
                source: DataVersionSource::Stores,
                component_hashes: vec![("price_series".into(), "a".repeat(64))],
            },
            data_summary: DataSummary::default(),
            sufficiency: SufficiencyReport {
                passed: true,
                checks: vec![],
                messages: vec![],
            },
            verification: VerificationReport::default(),
            decision: evaluation.decision,
            evaluations: vec![evaluation],
            aggregates: vec![],
            trades: vec![],
            strategy_count: 1,
            scenario_count: 4,
            simulation: SimulationStats::default(),
        }
    }

    #[test]
    fn gate_report_renders_criteria_and_triggers() {
        let report = report_with_one_evaluation();
        let rendered = render_decision_gate_report(&report);

        assert!(rendered.contains("## time_exit_300000ms (NEW_TOKEN)"));
        assert!(rendered.contains("### GO Criteria"));
        assert!(rendered.contains("### NO-GO Triggers"));
        assert!(rendered.contains("positive_outcome_share"));
        assert!(rendered.contains("edge_disappears_pessimistic"));
        assert!(rendered.contains("## Overall Decision"));
        assert!(rendered.contains("**GO**"));
    }

    #[test]
    fn phase1_report_renders_fixed_precision_and_rfc3339() {
        let report = report_with_one_evaluation();
        let rendered = render_phase1_report(&report);

        assert!(rendered.contains("2023-11-14T22:13:20.000Z"));
        assert!(rendered.contains(&"f".repeat(64)));
        assert!(rendered.contains("- Replay commit: abcdef12"));
        assert_eq!(report.decision, GateDecision::Go);
    }
}
