//! Storage Contracts
//!
//! Abstract, synchronous, append-only stores for every persisted entity.
//! Two implementations share these contracts: an in-memory store (tests,
//! fixtures) and a SQLite store (durable datasets). See [`memory`] and
//! [`sqlite`].
//!
//! # Contract
//!
//! - `insert` rejects duplicates with [`StorageError::DuplicateKey`];
//!   rows are never updated in place.
//! - Stores do NOT guarantee any return order. Consumers that need order
//!   sort by the canonical composite key (or `(candidate_id,
//!   timestamp_ms)` for series rows) themselves.
//! - Reading the same store twice without intervening writes yields the
//!   same sequence.

use crate::aggregate::StrategyAggregate;
use crate::events::{LiquidityEvent, SwapEvent, TokenCandidate};
use crate::series::{FeaturePoint, LiquidityPoint, PricePoint, VolumePoint};
use crate::trade::TradeRecord;
use std::sync::Arc;

pub mod memory;
pub mod sqlite;

/// Store-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No row for the requested key.
    NotFound(String),
    /// A row with the same primary key already exists.
    DuplicateKey(String),
    /// The backing store cannot be reached or is corrupt. Fatal.
    Unavailable(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "not found: {}", key),
            Self::DuplicateKey(key) => write!(f, "duplicate key: {}", key),
            Self::Unavailable(reason) => write!(f, "storage unavailable: {}", reason),
        }
    }
}

impl std::error::Error for StorageError {}

pub type StorageResult<T> = Result<T, StorageError>;

/// Candidate registry.
pub trait CandidateStore: Send + Sync {
    fn insert(&self, candidate: TokenCandidate) -> StorageResult<()>;

    /// Best-effort bulk insert; rows before the first duplicate stay
    /// inserted unless the implementation documents atomicity.
    fn insert_bulk(&self, candidates: Vec<TokenCandidate>) -> StorageResult<()> {
        for candidate in candidates {
            self.insert(candidate)?;
        }
        Ok(())
    }

    fn get_by_id(&self, candidate_id: &str) -> StorageResult<TokenCandidate>;

    /// Every candidate, in unspecified order.
    fn all(&self) -> StorageResult<Vec<TokenCandidate>>;
}

/// Raw swap stream.
pub trait SwapStore: Send + Sync {
    fn insert(&self, swap: SwapEvent) -> StorageResult<()>;

    fn insert_bulk(&self, swaps: Vec<SwapEvent>) -> StorageResult<()> {
        for swap in swaps {
            self.insert(swap)?;
        }
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<SwapEvent>>;

    /// `(min, max)` of `timestamp_ms` across all rows; `None` when empty.
    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>>;
}

/// Raw liquidity-event stream.
pub trait LiquidityEventStore: Send + Sync {
    fn insert(&self, event: LiquidityEvent) -> StorageResult<()>;

    fn insert_bulk(&self, events: Vec<LiquidityEvent>) -> StorageResult<()> {
        for event in events {
            self.insert(event)?;
        }
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<LiquidityEvent>>;

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>>;
}

/// Normalized price series.
pub trait PriceSeriesStore: Send + Sync {
    fn insert(&self, point: PricePoint) -> StorageResult<()>;

    fn insert_bulk(&self, points: Vec<PricePoint>) -> StorageResult<()> {
        for point in points {
            self.insert(point)?;
        }
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<PricePoint>>;

    /// Rows with `from <= timestamp_ms < to`.
    fn get_by_time_range(
        &self,
        candidate_id: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StorageResult<Vec<PricePoint>>;

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>>;

    fn all(&self) -> StorageResult<Vec<PricePoint>>;
}

/// Normalized liquidity series.
pub trait LiquiditySeriesStore: Send + Sync {
    fn insert(&self, point: LiquidityPoint) -> StorageResult<()>;

    fn insert_bulk(&self, points: Vec<LiquidityPoint>) -> StorageResult<()> {
        for point in points {
            self.insert(point)?;
        }
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<LiquidityPoint>>;

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>>;

    fn all(&self) -> StorageResult<Vec<LiquidityPoint>>;
}

/// Interval volume series.
pub trait VolumeSeriesStore: Send + Sync {
    fn insert(&self, point: VolumePoint) -> StorageResult<()>;

    fn insert_bulk(&self, points: Vec<VolumePoint>) -> StorageResult<()> {
        for point in points {
            self.insert(point)?;
        }
        Ok(())
    }

    fn get_by_candidate_id(
        &self,
        candidate_id: &str,
        interval_seconds: u32,
    ) -> StorageResult<Vec<VolumePoint>>;
}

/// Derived feature rows.
pub trait FeatureStore: Send + Sync {
    fn insert(&self, point: FeaturePoint) -> StorageResult<()>;

    fn insert_bulk(&self, points: Vec<FeaturePoint>) -> StorageResult<()> {
        for point in points {
            self.insert(point)?;
        }
        Ok(())
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<FeaturePoint>>;
}

/// Simulated trade records.
pub trait TradeStore: Send + Sync {
    fn insert(&self, trade: TradeRecord) -> StorageResult<()>;

    fn get_by_id(&self, trade_id: &str) -> StorageResult<TradeRecord>;

    /// Trades with exactly matching strategy and scenario ids.
    fn get_by_strategy_scenario(
        &self,
        strategy_id: &str,
        scenario_id: &str,
    ) -> StorageResult<Vec<TradeRecord>>;

    fn all(&self) -> StorageResult<Vec<TradeRecord>>;
}

/// Strategy aggregates, keyed by `(strategy_id, scenario_id, entry_event_type)`.
pub trait AggregateStore: Send + Sync {
    fn insert(&self, aggregate: StrategyAggregate) -> StorageResult<()>;

    fn get(
        &self,
        strategy_id: &str,
        scenario_id: &str,
        entry_event_type: &str,
    ) -> StorageResult<StrategyAggregate>;

    fn all(&self) -> StorageResult<Vec<StrategyAggregate>>;
}

/// The full set of stores one pipeline run operates on.
#[derive(Clone)]
pub struct Stores {
    pub candidates: Arc<dyn CandidateStore>,
    pub swaps: Arc<dyn SwapStore>,
    pub liquidity_events: Arc<dyn LiquidityEventStore>,
    pub prices: Arc<dyn PriceSeriesStore>,
    pub liquidity_series: Arc<dyn LiquiditySeriesStore>,
    pub volumes: Arc<dyn VolumeSeriesStore>,
    pub features: Arc<dyn FeatureStore>,
    pub trades: Arc<dyn TradeStore>,
    pub aggregates: Arc<dyn AggregateStore>,
}

impl Stores {
    /// A fresh, fully in-memory store set.
    pub fn in_memory() -> Self {
        memory::in_memory_stores()
    }
}
