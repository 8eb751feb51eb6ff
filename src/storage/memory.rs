//! In-Memory Store Implementations
//!
//! `BTreeMap` tables behind `parking_lot::Mutex`, check-then-insert under
//! the lock. Iteration order of the maps is key order, but callers must
//! not rely on it - the contract leaves return order unspecified and
//! consumers re-sort canonically.
//!
//! `insert_bulk` is best-effort: rows before the first duplicate remain.

use crate::aggregate::StrategyAggregate;
use crate::events::{LiquidityEvent, SwapEvent, TokenCandidate};
use crate::series::{FeaturePoint, LiquidityPoint, PricePoint, VolumePoint};
use crate::storage::{
    AggregateStore, CandidateStore, FeatureStore, LiquidityEventStore, LiquiditySeriesStore,
    PriceSeriesStore, StorageError, StorageResult, Stores, SwapStore, TradeStore,
    VolumeSeriesStore,
};
use crate::trade::TradeRecord;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Build a complete in-memory store set.
pub fn in_memory_stores() -> Stores {
    Stores {
        candidates: Arc::new(MemoryCandidateStore::default()),
        swaps: Arc::new(MemorySwapStore::default()),
        liquidity_events: Arc::new(MemoryLiquidityEventStore::default()),
        prices: Arc::new(MemoryPriceSeriesStore::default()),
        liquidity_series: Arc::new(MemoryLiquiditySeriesStore::default()),
        volumes: Arc::new(MemoryVolumeSeriesStore::default()),
        features: Arc::new(MemoryFeatureStore::default()),
        trades: Arc::new(MemoryTradeStore::default()),
        aggregates: Arc::new(MemoryAggregateStore::default()),
    }
}

// =============================================================================
// CANDIDATES
// =============================================================================

#[derive(Default)]
pub struct MemoryCandidateStore {
    rows: Mutex<BTreeMap<String, TokenCandidate>>,
}

impl CandidateStore for MemoryCandidateStore {
    fn insert(&self, candidate: TokenCandidate) -> StorageResult<()> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&candidate.candidate_id) {
            return Err(StorageError::DuplicateKey(candidate.candidate_id));
        }
        rows.insert(candidate.candidate_id.clone(), candidate);
        Ok(())
    }

    fn get_by_id(&self, candidate_id: &str) -> StorageResult<TokenCandidate> {
        self.rows
            .lock()
            .get(candidate_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(candidate_id.to_string()))
    }

    fn all(&self) -> StorageResult<Vec<TokenCandidate>> {
        Ok(self.rows.lock().values().cloned().collect())
    }
}

// =============================================================================
// RAW EVENTS
// =============================================================================

/// Composite raw-event primary key: `(slot, tx_signature, event_index)`.
type RawKey = (u64, String, u32);

#[derive(Default)]
pub struct MemorySwapStore {
    rows: Mutex<BTreeMap<RawKey, SwapEvent>>,
}

impl SwapStore for MemorySwapStore {
    fn insert(&self, swap: SwapEvent) -> StorageResult<()> {
        let key = (swap.slot, swap.tx_signature.clone(), swap.event_index);
        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!(
                "swap {}:{}:{}",
                key.0, key.1, key.2
            )));
        }
        rows.insert(key, swap);
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<SwapEvent>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|s| s.candidate_id == candidate_id)
            .cloned()
            .collect())
    }

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>> {
        let rows = self.rows.lock();
        let min = rows.values().map(|s| s.timestamp_ms).min();
        let max = rows.values().map(|s| s.timestamp_ms).max();
        Ok(min.zip(max))
    }
}

#[derive(Default)]
pub struct MemoryLiquidityEventStore {
    rows: Mutex<BTreeMap<RawKey, LiquidityEvent>>,
}

impl LiquidityEventStore for MemoryLiquidityEventStore {
    fn insert(&self, event: LiquidityEvent) -> StorageResult<()> {
        let key = (event.slot, event.tx_signature.clone(), event.event_index);
        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!(
                "liquidity {}:{}:{}",
                key.0, key.1, key.2
            )));
        }
        rows.insert(key, event);
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<LiquidityEvent>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|e| e.candidate_id == candidate_id)
            .cloned()
            .collect())
    }

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>> {
        let rows = self.rows.lock();
        let min = rows.values().map(|e| e.timestamp_ms).min();
        let max = rows.values().map(|e| e.timestamp_ms).max();
        Ok(min.zip(max))
    }
}

// =============================================================================
// SERIES
// =============================================================================

type SeriesKey = (String, i64);

#[derive(Default)]
pub struct MemoryPriceSeriesStore {
    rows: Mutex<BTreeMap<SeriesKey, PricePoint>>,
}

impl PriceSeriesStore for MemoryPriceSeriesStore {
    fn insert(&self, point: PricePoint) -> StorageResult<()> {
        let key = (point.candidate_id.clone(), point.timestamp_ms);
        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!("price {}@{}", key.0, key.1)));
        }
        rows.insert(key, point);
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<PricePoint>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|p| p.candidate_id == candidate_id)
            .cloned()
            .collect())
    }

    fn get_by_time_range(
        &self,
        candidate_id: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StorageResult<Vec<PricePoint>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|p| {
                p.candidate_id == candidate_id && p.timestamp_ms >= from_ms && p.timestamp_ms < to_ms
            })
            .cloned()
            .collect())
    }

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>> {
        let rows = self.rows.lock();
        let min = rows.values().map(|p| p.timestamp_ms).min();
        let max = rows.values().map(|p| p.timestamp_ms).max();
        Ok(min.zip(max))
    }

    fn all(&self) -> StorageResult<Vec<PricePoint>> {
        Ok(self.rows.lock().values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryLiquiditySeriesStore {
    rows: Mutex<BTreeMap<SeriesKey, LiquidityPoint>>,
}

impl LiquiditySeriesStore for MemoryLiquiditySeriesStore {
    fn insert(&self, point: LiquidityPoint) -> StorageResult<()> {
        let key = (point.candidate_id.clone(), point.timestamp_ms);
        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!(
                "liquidity {}@{}",
                key.0, key.1
            )));
        }
        rows.insert(key, point);
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<LiquidityPoint>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|p| p.candidate_id == candidate_id)
            .cloned()
            .collect())
    }

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>> {
        let rows = self.rows.lock();
        let min = rows.values().map(|p| p.timestamp_ms).min();
        let max = rows.values().map(|p| p.timestamp_ms).max();
        Ok(min.zip(max))
    }

    fn all(&self) -> StorageResult<Vec<LiquidityPoint>> {
        Ok(self.rows.lock().values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryVolumeSeriesStore {
    rows: Mutex<BTreeMap<(String, u32, i64), VolumePoint>>,
}

impl VolumeSeriesStore for MemoryVolumeSeriesStore {
    fn insert(&self, point: VolumePoint) -> StorageResult<()> {
        let key = (
            point.candidate_id.clone(),
            point.interval_seconds,
            point.interval_start_ms,
        );
        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!(
                "volume {}:{}s@{}",
                key.0, key.1, key.2
            )));
        }
        rows.insert(key, point);
        Ok(())
    }

    fn get_by_candidate_id(
        &self,
        candidate_id: &str,
        interval_seconds: u32,
    ) -> StorageResult<Vec<VolumePoint>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|p| p.candidate_id == candidate_id && p.interval_seconds == interval_seconds)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryFeatureStore {
    rows: Mutex<BTreeMap<SeriesKey, FeaturePoint>>,
}

impl FeatureStore for MemoryFeatureStore {
    fn insert(&self, point: FeaturePoint) -> StorageResult<()> {
        let key = (point.candidate_id.clone(), point.timestamp_ms);
        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!(
                "feature {}@{}",
                key.0, key.1
            )));
        }
        rows.insert(key, point);
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<FeaturePoint>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|p| p.candidate_id == candidate_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// TRADES & AGGREGATES
// =============================================================================

#[derive(Default)]
pub struct MemoryTradeStore {
    rows: Mutex<BTreeMap<String, TradeRecord>>,
}

impl TradeStore for MemoryTradeStore {
    fn insert(&self, trade: TradeRecord) -> StorageResult<()> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&trade.trade_id) {
            return Err(StorageError::DuplicateKey(trade.trade_id));
        }
        rows.insert(trade.trade_id.clone(), trade);
        Ok(())
    }

    fn get_by_id(&self, trade_id: &str) -> StorageResult<TradeRecord> {
        self.rows
            .lock()
            .get(trade_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(trade_id.to_string()))
    }

    fn get_by_strategy_scenario(
        &self,
        strategy_id: &str,
        scenario_id: &str,
    ) -> StorageResult<Vec<TradeRecord>> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|t| t.strategy_id == strategy_id && t.scenario_id == scenario_id)
            .cloned()
            .collect())
    }

    fn all(&self) -> StorageResult<Vec<TradeRecord>> {
        Ok(self.rows.lock().values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryAggregateStore {
    rows: Mutex<BTreeMap<(String, String, String), StrategyAggregate>>,
}

impl AggregateStore for MemoryAggregateStore {
    fn insert(&self, aggregate: StrategyAggregate) -> StorageResult<()> {
        let key = (
            aggregate.strategy_id.clone(),
            aggregate.scenario_id.clone(),
            aggregate.entry_event_type.as_str().to_string(),
        );
        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!(
                "aggregate {}:{}:{}",
                key.0, key.1, key.2
            )));
        }
        rows.insert(key, aggregate);
        Ok(())
    }

    fn get(
        &self,
        strategy_id: &str,
        scenario_id: &str,
        entry_event_type: &str,
    ) -> StorageResult<StrategyAggregate> {
        let key = (
            strategy_id.to_string(),
            scenario_id.to_string(),
            entry_event_type.to_string(),
        );
        self.rows
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{}:{}:{}", key.0, key.1, key.2)))
    }

    fn all(&self) -> StorageResult<Vec<StrategyAggregate>> {
        Ok(self.rows.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SwapSide;

    fn swap(slot: u64, sig: &str, idx: u32) -> SwapEvent {
        SwapEvent {
            candidate_id: "cand".into(),
            tx_signature: sig.into(),
            event_index: idx,
            slot,
            timestamp_ms: 1_000,
            side: SwapSide::Buy,
            amount_in: 1.0,
            amount_out: 2.0,
            price: 0.5,
        }
    }

    #[test]
    fn swap_insert_rejects_duplicates() {
        let store = MemorySwapStore::default();
        store.insert(swap(1, "a", 0)).unwrap();
        let err = store.insert(swap(1, "a", 0)).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
        // Same slot, different index is fine.
        store.insert(swap(1, "a", 1)).unwrap();
    }

    #[test]
    fn candidate_get_reports_not_found() {
        let store = MemoryCandidateStore::default();
        let err = store.get_by_id("missing").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn global_time_range_covers_all_rows() {
        let store = MemorySwapStore::default();
        assert_eq!(store.get_global_time_range().unwrap(), None);
        let mut early = swap(1, "a", 0);
        early.timestamp_ms = 100;
        let mut late = swap(2, "b", 0);
        late.timestamp_ms = 900;
        store.insert(early).unwrap();
        store.insert(late).unwrap();
        assert_eq!(store.get_global_time_range().unwrap(), Some((100, 900)));
    }

    #[test]
    fn trade_queries_filter_by_strategy_and_scenario() {
        use crate::events::CandidateSource;
        use crate::trade::{ExitReason, OutcomeClass};

        let store = MemoryTradeStore::default();
        let mut t = TradeRecord {
            trade_id: "t1".into(),
            candidate_id: "c".into(),
            strategy_id: "time_exit_300000ms".into(),
            scenario_id: "realistic".into(),
            entry_event_type: CandidateSource::NewToken,
            entry_signal_time: 0,
            entry_actual_time: 0,
            entry_signal_price: 1.0,
            entry_actual_price: 1.0,
            entry_liquidity: None,
            exit_signal_time: 1,
            exit_actual_time: 1,
            exit_signal_price: 1.0,
            exit_actual_price: 1.0,
            exit_reason: ExitReason::TimeExit,
            entry_cost: 0.0,
            exit_cost: 0.0,
            mev_cost: 0.0,
            total_cost_pct: 0.0,
            position_size: 1.0,
            position_value: 1.0,
            gross_return: 0.0,
            outcome: 0.0,
            outcome_class: OutcomeClass::Loss,
            hold_duration_ms: 1,
            peak_price: None,
            min_liquidity: None,
        };
        store.insert(t.clone()).unwrap();
        t.trade_id = "t2".into();
        t.scenario_id = "pessimistic".into();
        store.insert(t).unwrap();

        let hits = store
            .get_by_strategy_scenario("time_exit_300000ms", "realistic")
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].trade_id, "t1");
    }
}
