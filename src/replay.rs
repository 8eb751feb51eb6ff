//! Deterministic Event Replay
//!
//! Merges a candidate's swap and liquidity streams into a single sequence
//! ordered by the canonical composite key and delivers each event to a
//! caller-supplied callback. Single-threaded, no look-ahead, no wall
//! clock: replaying the same stores twice yields the identical sequence.
//!
//! The engine asserts key monotonicity while draining - an out-of-order
//! pop indicates comparator misuse and is a bug, not an input pathology.

use crate::events::{LiquidityEvent, SwapEvent};
use crate::ordering::{EventKey, Keyed};
use crate::storage::{LiquidityEventStore, StorageError, SwapStore};
use std::sync::Arc;

/// One event of the merged stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayEvent {
    Swap(SwapEvent),
    Liquidity(LiquidityEvent),
}

impl ReplayEvent {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            Self::Swap(s) => s.timestamp_ms,
            Self::Liquidity(l) => l.timestamp_ms,
        }
    }
}

impl Keyed for ReplayEvent {
    fn event_key(&self) -> EventKey {
        match self {
            Self::Swap(s) => s.event_key(),
            Self::Liquidity(l) => l.event_key(),
        }
    }
}

/// Replay failures.
#[derive(Debug)]
pub enum ReplayError {
    Storage(StorageError),
    /// Merged sequence violated the canonical order. Internal invariant.
    OrderViolation { candidate_id: String, at: EventKey },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "replay storage error: {}", e),
            Self::OrderViolation { candidate_id, at } => write!(
                f,
                "replay order violation for candidate {} at slot {} sig {} index {}",
                candidate_id, at.slot, at.tx_signature, at.event_index
            ),
        }
    }
}

impl std::error::Error for ReplayError {}

impl From<StorageError> for ReplayError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Single-pass replay over a candidate's merged event streams.
pub struct ReplayEngine {
    swaps: Arc<dyn SwapStore>,
    liquidity_events: Arc<dyn LiquidityEventStore>,
}

impl ReplayEngine {
    pub fn new(swaps: Arc<dyn SwapStore>, liquidity_events: Arc<dyn LiquidityEventStore>) -> Self {
        Self {
            swaps,
            liquidity_events,
        }
    }

    /// Load and canonically sort the merged stream for a candidate.
    pub fn merged_events(&self, candidate_id: &str) -> Result<Vec<ReplayEvent>, ReplayError> {
        let swaps = self.swaps.get_by_candidate_id(candidate_id)?;
        let liquidity = self.liquidity_events.get_by_candidate_id(candidate_id)?;

        let mut merged: Vec<ReplayEvent> = swaps
            .into_iter()
            .map(ReplayEvent::Swap)
            .chain(liquidity.into_iter().map(ReplayEvent::Liquidity))
            .collect();
        crate::ordering::sort_canonical(&mut merged);
        Ok(merged)
    }

    /// Replay every event for `candidate_id` in canonical order.
    pub fn run_all<F>(&self, candidate_id: &str, mut on_event: F) -> Result<u64, ReplayError>
    where
        F: FnMut(&ReplayEvent),
    {
        self.run_filtered(candidate_id, |_| true, &mut on_event)
    }

    /// Replay events with `from_ms <= timestamp_ms < to_ms`.
    pub fn run_range<F>(
        &self,
        candidate_id: &str,
        from_ms: i64,
        to_ms: i64,
        mut on_event: F,
    ) -> Result<u64, ReplayError>
    where
        F: FnMut(&ReplayEvent),
    {
        self.run_filtered(
            candidate_id,
            |e| {
                let ts = e.timestamp_ms();
                ts >= from_ms && ts < to_ms
            },
            &mut on_event,
        )
    }

    fn run_filtered<P, F>(
        &self,
        candidate_id: &str,
        keep: P,
        on_event: &mut F,
    ) -> Result<u64, ReplayError>
    where
        P: Fn(&ReplayEvent) -> bool,
        F: FnMut(&ReplayEvent),
    {
        let merged = self.merged_events(candidate_id)?;

        let mut last_key: Option<EventKey> = None;
        let mut delivered = 0u64;
        for event in &merged {
            let key = event.event_key();
            if let Some(prev) = &last_key {
                if key < *prev {
                    return Err(ReplayError::OrderViolation {
                        candidate_id: candidate_id.to_string(),
                        at: key,
                    });
                }
            }
            last_key = Some(key);

            if keep(event) {
                on_event(event);
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}
