//! Canonical Event Ordering
//!
//! Every raw event in the system is ordered by one composite key:
//!
//! 1. `slot` - ascending numeric, the source of truth for chain order
//! 2. `tx_signature` - ascending byte string
//! 3. `event_index` - ascending numeric, position within the transaction
//! 4. event kind - ascending by kind name (`"liquidity"` before `"swap"`)
//!
//! This ordering is the core invariant of the pipeline: producers may hand
//! us events in any order, but every consumer sorts by this key before
//! doing anything order-sensitive. The comparator is defined once here and
//! reused everywhere; ordering via map iteration is forbidden.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Event kind discriminant used as the final ordering tie-break.
///
/// Discriminant order matches the ascending kind-name order
/// (`"liquidity"` < `"swap"`), so deriving `Ord` is correct.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum EventKind {
    Liquidity = 0,
    Swap = 1,
}

impl EventKind {
    /// Canonical kind name used in the ordering contract.
    pub fn name(self) -> &'static str {
        match self {
            Self::Liquidity => "liquidity",
            Self::Swap => "swap",
        }
    }
}

/// Canonical composite key for a raw event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub slot: u64,
    pub tx_signature: String,
    pub event_index: u32,
    pub kind: EventKind,
}

impl EventKey {
    pub fn new(slot: u64, tx_signature: impl Into<String>, event_index: u32, kind: EventKind) -> Self {
        Self {
            slot,
            tx_signature: tx_signature.into(),
            event_index,
            kind,
        }
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.slot
            .cmp(&other.slot)
            .then_with(|| self.tx_signature.as_bytes().cmp(other.tx_signature.as_bytes()))
            .then_with(|| self.event_index.cmp(&other.event_index))
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

/// Anything that carries a canonical composite key.
pub trait Keyed {
    fn event_key(&self) -> EventKey;
}

/// Sort a slice of keyed items into canonical order.
///
/// Stable sort; equal keys (true duplicates) keep their input order, but a
/// store rejects those at insert time anyway.
pub fn sort_canonical<T: Keyed>(items: &mut [T]) {
    items.sort_by_cached_key(|item| item.event_key());
}
