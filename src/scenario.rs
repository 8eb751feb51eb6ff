//! Execution Scenarios
//!
//! A scenario is a fixed execution-cost model applied to every simulated
//! trade: confirmation delay, slippage, flat fees, and an MEV penalty.
//! The four configurations are fixed constants: two run envelopes are
//! only comparable when they used the same scenario table.
//!
//! The decision gate reads the realistic scenario and stresses it against
//! the pessimistic one; optimistic and degraded exist for sensitivity
//! reporting only.

use serde::{Deserialize, Serialize};

pub const SCENARIO_OPTIMISTIC: &str = "optimistic";
pub const SCENARIO_REALISTIC: &str = "realistic";
pub const SCENARIO_PESSIMISTIC: &str = "pessimistic";
pub const SCENARIO_DEGRADED: &str = "degraded";

/// Execution-cost model for one simulation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    /// Signal-to-execution delay, ms.
    pub delay_ms: i64,
    /// Round-trip slippage in percent; half is applied per side.
    pub slippage_pct: f64,
    /// Flat network fee per side, quote units.
    pub fee: f64,
    /// Flat priority fee per side, quote units.
    pub priority_fee: f64,
    /// MEV penalty as a percentage of position value.
    pub mev_penalty_pct: f64,
}

impl Scenario {
    pub fn optimistic() -> Self {
        Self {
            scenario_id: SCENARIO_OPTIMISTIC.to_string(),
            delay_ms: 500,
            slippage_pct: 0.5,
            fee: 0.000005,
            priority_fee: 0.0001,
            mev_penalty_pct: 0.0,
        }
    }

    pub fn realistic() -> Self {
        Self {
            scenario_id: SCENARIO_REALISTIC.to_string(),
            delay_ms: 1_500,
            slippage_pct: 2.0,
            fee: 0.000005,
            priority_fee: 0.001,
            mev_penalty_pct: 0.5,
        }
    }

    pub fn pessimistic() -> Self {
        Self {
            scenario_id: SCENARIO_PESSIMISTIC.to_string(),
            delay_ms: 3_000,
            slippage_pct: 5.0,
            fee: 0.000005,
            priority_fee: 0.005,
            mev_penalty_pct: 2.0,
        }
    }

    pub fn degraded() -> Self {
        Self {
            scenario_id: SCENARIO_DEGRADED.to_string(),
            delay_ms: 8_000,
            slippage_pct: 10.0,
            fee: 0.000005,
            priority_fee: 0.01,
            mev_penalty_pct: 5.0,
        }
    }

    /// All scenarios in reporting order.
    pub fn all() -> Vec<Self> {
        vec![
            Self::optimistic(),
            Self::realistic(),
            Self::pessimistic(),
            Self::degraded(),
        ]
    }

    pub fn by_id(scenario_id: &str) -> Option<Self> {
        match scenario_id {
            SCENARIO_OPTIMISTIC => Some(Self::optimistic()),
            SCENARIO_REALISTIC => Some(Self::realistic()),
            SCENARIO_PESSIMISTIC => Some(Self::pessimistic()),
            SCENARIO_DEGRADED => Some(Self::degraded()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_scenarios_with_distinct_ids() {
        let all = Scenario::all();
        assert_eq!(all.len(), 4);
        let ids: Vec<&str> = all.iter().map(|s| s.scenario_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![SCENARIO_OPTIMISTIC, SCENARIO_REALISTIC, SCENARIO_PESSIMISTIC, SCENARIO_DEGRADED]
        );
    }

    #[test]
    fn by_id_round_trips() {
        for s in Scenario::all() {
            assert_eq!(Scenario::by_id(&s.scenario_id), Some(s.clone()));
        }
        assert_eq!(Scenario::by_id("nope"), None);
    }

    #[test]
    fn costs_increase_toward_degraded() {
        let all = Scenario::all();
        for pair in all.windows(2) {
            assert!(pair[0].delay_ms <= pair[1].delay_ms);
            assert!(pair[0].slippage_pct <= pair[1].slippage_pct);
            assert!(pair[0].mev_penalty_pct <= pair[1].mev_penalty_pct);
        }
    }
}
