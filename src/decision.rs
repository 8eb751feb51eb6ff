//! Decision Gate
//!
//! Evaluates each strategy's realistic-scenario aggregate against five
//! conjunctive GO criteria and four disjunctive NO-GO triggers, stressing
//! stability against the pessimistic scenario. The gate only runs when
//! data sufficiency holds; otherwise the run-level decision is
//! INSUFFICIENT_DATA and nothing here is consulted.
//!
//! Every criterion and trigger records its name, threshold, and observed
//! value so the gate report renders as auditable tables rather than a
//! bare verdict.

use crate::aggregate::StrategyAggregate;
use crate::events::CandidateSource;
use crate::scenario::SCENARIO_REALISTIC;
use serde::{Deserialize, Serialize};

/// GO criterion 1 / NO-GO trigger 1 threshold, percent of tokens with
/// positive mean outcome.
pub const MIN_POSITIVE_OUTCOME_PCT: f64 = 5.0;
/// GO criterion 3: pessimistic median must retain this fraction of the
/// realistic median.
pub const MIN_STABILITY_RATIO: f64 = 0.5;
/// GO criterion 4: maximum interquartile spread relative to the median.
pub const MAX_SPREAD_RATIO: f64 = 3.0;

/// Final gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Go,
    NoGo,
    InsufficientData,
}

impl GateDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Go => "GO",
            Self::NoGo => "NO-GO",
            Self::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluator input for one `(strategy, entry source)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub strategy_id: String,
    pub entry_event_type: CandidateSource,
    /// Must be the realistic scenario.
    pub scenario_id: String,
    /// `token_win_rate * 100`.
    pub positive_outcome_pct: f64,
    pub median_outcome: f64,
    pub realistic_mean: f64,
    pub realistic_median: f64,
    pub pessimistic_mean: f64,
    pub pessimistic_median: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    /// Externally supplied operability flag.
    pub strategy_implementable: bool,
}

impl DecisionInput {
    /// Fail fast on malformed inputs; a bad decision input is a pipeline
    /// bug, never a data condition.
    pub fn validate(&self) -> Result<(), DecisionError> {
        if self.strategy_id.is_empty() {
            return Err(DecisionError::InvalidInput("strategy_id is empty".into()));
        }
        if self.scenario_id.is_empty() {
            return Err(DecisionError::InvalidInput("scenario_id is empty".into()));
        }
        if self.scenario_id != SCENARIO_REALISTIC {
            return Err(DecisionError::InvalidInput(format!(
                "decision input must target the realistic scenario, got {}",
                self.scenario_id
            )));
        }
        if !(0.0..=100.0).contains(&self.positive_outcome_pct) {
            return Err(DecisionError::InvalidInput(format!(
                "positive_outcome_pct out of range: {}",
                self.positive_outcome_pct
            )));
        }
        Ok(())
    }
}

/// Decision-stage failures.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionError {
    /// No pessimistic aggregate for the strategy; downgrades the run to
    /// INSUFFICIENT_DATA.
    MissingPessimisticScenario {
        strategy_id: String,
        entry_event_type: CandidateSource,
    },
    /// No realistic aggregate at all; downgrades likewise.
    NoRealisticScenario {
        strategy_id: String,
        entry_event_type: CandidateSource,
    },
    /// Validation failure. Fatal.
    InvalidInput(String),
}

impl std::fmt::Display for DecisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPessimisticScenario {
                strategy_id,
                entry_event_type,
            } => write!(
                f,
                "missing pessimistic aggregate for {} / {}",
                strategy_id, entry_event_type
            ),
            Self::NoRealisticScenario {
                strategy_id,
                entry_event_type,
            } => write!(
                f,
                "missing realistic aggregate for {} / {}",
                strategy_id, entry_event_type
            ),
            Self::InvalidInput(msg) => write!(f, "invalid decision input: {}", msg),
        }
    }
}

impl std::error::Error for DecisionError {}

/// One evaluated GO criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub name: String,
    pub threshold: String,
    pub actual: String,
    pub passed: bool,
}

/// One evaluated NO-GO trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResult {
    pub name: String,
    pub condition: String,
    pub actual: String,
    pub fired: bool,
}

/// Full evaluation for one strategy input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEvaluation {
    pub input: DecisionInput,
    pub go_criteria: Vec<CriterionResult>,
    pub no_go_triggers: Vec<TriggerResult>,
    pub decision: GateDecision,
}

/// Build the evaluator input from the realistic aggregate, its
/// pessimistic counterpart, and the operability flag.
pub fn build_decision_input(
    realistic: &StrategyAggregate,
    pessimistic: Option<&StrategyAggregate>,
    strategy_implementable: bool,
) -> Result<DecisionInput, DecisionError> {
    let pessimistic = pessimistic.ok_or_else(|| DecisionError::MissingPessimisticScenario {
        strategy_id: realistic.strategy_id.clone(),
        entry_event_type: realistic.entry_event_type,
    })?;

    let input = DecisionInput {
        strategy_id: realistic.strategy_id.clone(),
        entry_event_type: realistic.entry_event_type,
        scenario_id: realistic.scenario_id.clone(),
        positive_outcome_pct: realistic.token_win_rate * 100.0,
        median_outcome: realistic.outcome_median,
        realistic_mean: realistic.outcome_mean,
        realistic_median: realistic.outcome_median,
        pessimistic_mean: pessimistic.outcome_mean,
        pessimistic_median: pessimistic.outcome_median,
        p10: realistic.outcome_p10,
        p25: realistic.outcome_p25,
        p50: realistic.outcome_median,
        p75: realistic.outcome_p75,
        p90: realistic.outcome_p90,
        strategy_implementable,
    };
    input.validate()?;
    Ok(input)
}

/// Evaluate the five GO criteria and four NO-GO triggers.
pub fn evaluate(input: &DecisionInput) -> Result<StrategyEvaluation, DecisionError> {
    input.validate()?;

    let mut go_criteria = Vec::with_capacity(5);
    let mut no_go_triggers = Vec::with_capacity(4);

    // GO 1: enough tokens end positive.
    go_criteria.push(CriterionResult {
        name: "positive_outcome_share".into(),
        threshold: format!(">= {:.1}%", MIN_POSITIVE_OUTCOME_PCT),
        actual: format!("{:.4}%", input.positive_outcome_pct),
        passed: input.positive_outcome_pct >= MIN_POSITIVE_OUTCOME_PCT,
    });

    // GO 2: the median trade makes money.
    go_criteria.push(CriterionResult {
        name: "median_outcome_positive".into(),
        threshold: "> 0".into(),
        actual: format!("{:.4}", input.median_outcome),
        passed: input.median_outcome > 0.0,
    });

    // GO 3: the edge survives the pessimistic scenario.
    let stability_ok = input.pessimistic_median > 0.0
        && input.realistic_median > 0.0
        && input.pessimistic_median / input.realistic_median >= MIN_STABILITY_RATIO;
    go_criteria.push(CriterionResult {
        name: "pessimistic_stability".into(),
        threshold: format!(
            "pessimistic_median > 0 and ratio >= {:.2}",
            MIN_STABILITY_RATIO
        ),
        actual: if input.realistic_median > 0.0 {
            format!(
                "pessimistic_median {:.4}, ratio {:.4}",
                input.pessimistic_median,
                input.pessimistic_median / input.realistic_median
            )
        } else {
            format!(
                "pessimistic_median {:.4}, realistic_median {:.4}",
                input.pessimistic_median, input.realistic_median
            )
        },
        passed: stability_ok,
    });

    // GO 4: not dominated by outliers.
    let spread_ok = input.p25 > 0.0
        || (input.median_outcome > 0.0
            && (input.p75 - input.p25) / input.median_outcome < MAX_SPREAD_RATIO);
    go_criteria.push(CriterionResult {
        name: "outlier_robustness".into(),
        threshold: format!("p25 > 0 or IQR/median < {:.1}", MAX_SPREAD_RATIO),
        actual: if input.median_outcome > 0.0 {
            format!(
                "p25 {:.4}, IQR/median {:.4}",
                input.p25,
                (input.p75 - input.p25) / input.median_outcome
            )
        } else {
            format!("p25 {:.4}, median {:.4}", input.p25, input.median_outcome)
        },
        passed: spread_ok,
    });

    // GO 5: the strategy is operable at all.
    go_criteria.push(CriterionResult {
        name: "strategy_implementable".into(),
        threshold: "true".into(),
        actual: input.strategy_implementable.to_string(),
        passed: input.strategy_implementable,
    });

    // Trigger 1: too few positive tokens.
    no_go_triggers.push(TriggerResult {
        name: "low_positive_outcome_share".into(),
        condition: format!("< {:.1}%", MIN_POSITIVE_OUTCOME_PCT),
        actual: format!("{:.4}%", input.positive_outcome_pct),
        fired: input.positive_outcome_pct < MIN_POSITIVE_OUTCOME_PCT,
    });

    // Trigger 2: the median trade loses.
    no_go_triggers.push(TriggerResult {
        name: "median_outcome_non_positive".into(),
        condition: "<= 0".into(),
        actual: format!("{:.4}", input.median_outcome),
        fired: input.median_outcome <= 0.0,
    });

    // Trigger 3: edge disappears under stress.
    no_go_triggers.push(TriggerResult {
        name: "edge_disappears_pessimistic".into(),
        condition: "realistic_median > 0 and pessimistic_median <= 0".into(),
        actual: format!(
            "realistic {:.4}, pessimistic {:.4}",
            input.realistic_median, input.pessimistic_median
        ),
        fired: input.realistic_median > 0.0 && input.pessimistic_median <= 0.0,
    });

    // Trigger 4: not implementable.
    no_go_triggers.push(TriggerResult {
        name: "not_implementable".into(),
        condition: "strategy_implementable == false".into(),
        actual: input.strategy_implementable.to_string(),
        fired: !input.strategy_implementable,
    });

    let decision = if go_criteria.iter().all(|c| c.passed)
        && no_go_triggers.iter().all(|t| !t.fired)
    {
        GateDecision::Go
    } else {
        GateDecision::NoGo
    };

    Ok(StrategyEvaluation {
        input: input.clone(),
        go_criteria,
        no_go_triggers,
        decision,
    })
}

/// Overall decision across several strategy evaluations: the verdict of
/// the strategy with the highest realistic median.
pub fn overall_decision(evaluations: &[StrategyEvaluation]) -> GateDecision {
    evaluations
        .iter()
        .max_by(|a, b| {
            a.input
                .realistic_median
                .total_cmp(&b.input.realistic_median)
                // Deterministic winner on exact median ties.
                .then_with(|| b.input.strategy_id.cmp(&a.input.strategy_id))
        })
        .map(|best| best.decision)
        .unwrap_or(GateDecision::InsufficientData)
}
