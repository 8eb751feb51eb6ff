//! Raw Domain Entities
//!
//! Token candidates and the append-only raw event streams (swaps and
//! liquidity events) the pipeline replays. All timestamps are Unix
//! milliseconds UTC; `slot` is the chain-order source of truth.
//!
//! Entities are immutable after creation. Uniqueness is enforced by the
//! stores via primary keys, not here.

use crate::ids;
use crate::ordering::{EventKey, EventKind, Keyed};
use serde::{Deserialize, Serialize};

/// Discovery source of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CandidateSource {
    /// First swap ever seen for the mint.
    NewToken,
    /// Discovered through an activity spike on an existing mint.
    ActiveToken,
}

impl CandidateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewToken => "NEW_TOKEN",
            Self::ActiveToken => "ACTIVE_TOKEN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW_TOKEN" => Some(Self::NewToken),
            "ACTIVE_TOKEN" => Some(Self::ActiveToken),
            _ => None,
        }
    }
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token under study. Created once at discovery, immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCandidate {
    /// Content hash over the discovery event (see [`ids::candidate_id`]).
    pub candidate_id: String,
    pub source: CandidateSource,
    pub mint: String,
    pub pool: Option<String>,
    pub tx_signature: String,
    pub event_index: u32,
    pub slot: u64,
    /// Discovery time, Unix ms UTC.
    pub discovered_at: i64,
}

impl TokenCandidate {
    /// Build a candidate from its discovery event, deriving the content id.
    pub fn from_discovery(
        source: CandidateSource,
        mint: impl Into<String>,
        pool: Option<String>,
        tx_signature: impl Into<String>,
        event_index: u32,
        slot: u64,
        discovered_at: i64,
    ) -> Self {
        let mint = mint.into();
        let tx_signature = tx_signature.into();
        let candidate_id = ids::candidate_id(
            &mint,
            pool.as_deref(),
            source.as_str(),
            &tx_signature,
            event_index,
            slot,
        );
        Self {
            candidate_id,
            source,
            mint,
            pool,
            tx_signature,
            event_index,
            slot,
            discovered_at,
        }
    }
}

/// Side of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapSide {
    Buy,
    Sell,
}

impl SwapSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// A raw swap event, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapEvent {
    pub candidate_id: String,
    pub tx_signature: String,
    pub event_index: u32,
    pub slot: u64,
    pub timestamp_ms: i64,
    pub side: SwapSide,
    pub amount_in: f64,
    pub amount_out: f64,
    pub price: f64,
}

impl Keyed for SwapEvent {
    fn event_key(&self) -> EventKey {
        EventKey::new(self.slot, self.tx_signature.clone(), self.event_index, EventKind::Swap)
    }
}

/// Kind of a liquidity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityEventKind {
    Add,
    Remove,
}

impl LiquidityEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

/// A raw liquidity add/remove event, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityEvent {
    pub candidate_id: String,
    pub tx_signature: String,
    pub event_index: u32,
    pub slot: u64,
    pub timestamp_ms: i64,
    pub event_type: LiquidityEventKind,
    pub amount_token: f64,
    pub amount_quote: f64,
    /// Pool liquidity after this event applied.
    pub liquidity_after: f64,
}

impl Keyed for LiquidityEvent {
    fn event_key(&self) -> EventKey {
        EventKey::new(
            self.slot,
            self.tx_signature.clone(),
            self.event_index,
            EventKind::Liquidity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::sort_canonical;

    #[test]
    fn candidate_from_discovery_derives_content_id() {
        let c = TokenCandidate::from_discovery(
            CandidateSource::NewToken,
            "mintA",
            Some("poolA".to_string()),
            "sig1",
            2,
            500,
            1_700_000_000_000,
        );
        assert_eq!(
            c.candidate_id,
            ids::candidate_id("mintA", Some("poolA"), "NEW_TOKEN", "sig1", 2, 500)
        );
    }

    #[test]
    fn source_round_trips_through_str() {
        for source in [CandidateSource::NewToken, CandidateSource::ActiveToken] {
            assert_eq!(CandidateSource::parse(source.as_str()), Some(source));
        }
        assert_eq!(CandidateSource::parse("OTHER"), None);
    }

    #[test]
    fn swaps_sort_by_canonical_key() {
        let mk = |slot: u64, sig: &str, idx: u32| SwapEvent {
            candidate_id: "c".into(),
            tx_signature: sig.into(),
            event_index: idx,
            slot,
            timestamp_ms: 0,
            side: SwapSide::Buy,
            amount_in: 1.0,
            amount_out: 1.0,
            price: 1.0,
        };
        let mut swaps = vec![mk(2, "a", 0), mk(1, "b", 1), mk(1, "b", 0), mk(1, "a", 5)];
        sort_canonical(&mut swaps);
        let order: Vec<(u64, String, u32)> = swaps
            .iter()
            .map(|s| (s.slot, s.tx_signature.clone(), s.event_index))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, "a".to_string(), 5),
                (1, "b".to_string(), 0),
                (1, "b".to_string(), 1),
                (2, "a".to_string(), 0),
            ]
        );
    }
}
