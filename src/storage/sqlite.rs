//! SQLite Store Implementations
//!
//! Durable implementation of the storage contracts. One database file
//! holds every table; uniqueness is enforced by primary-key constraints,
//! so duplicate inserts surface as [`StorageError::DuplicateKey`] without
//! a read-modify-write race.
//!
//! `insert_bulk` here is atomic: all rows commit in one transaction or
//! none do.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE candidates (
//!     candidate_id TEXT PRIMARY KEY,
//!     source TEXT NOT NULL,
//!     mint TEXT NOT NULL,
//!     pool TEXT,
//!     tx_signature TEXT NOT NULL,
//!     event_index INTEGER NOT NULL,
//!     slot INTEGER NOT NULL,
//!     discovered_at INTEGER NOT NULL
//! );
//! -- raw events keyed by (slot, tx_signature, event_index),
//! -- series keyed by (candidate_id, timestamp_ms),
//! -- trades keyed by trade_id, aggregates stored as JSON blobs
//! -- under (strategy_id, scenario_id, entry_event_type).
//! ```

use crate::aggregate::StrategyAggregate;
use crate::events::{
    CandidateSource, LiquidityEvent, LiquidityEventKind, SwapEvent, SwapSide, TokenCandidate,
};
use crate::series::{FeaturePoint, LiquidityPoint, PricePoint, VolumePoint};
use crate::storage::{
    AggregateStore, CandidateStore, FeatureStore, LiquidityEventStore, LiquiditySeriesStore,
    PriceSeriesStore, StorageError, StorageResult, Stores, SwapStore, TradeStore,
    VolumeSeriesStore,
};
use crate::trade::{ExitReason, OutcomeClass, TradeRecord};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const SCHEMA_VERSION: u32 = 1;

/// Shared handle to one SQLite database backing every store.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(unavailable)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize_schema()?;
        Ok(db)
    }

    /// In-memory database (tests).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize_schema()?;
        Ok(db)
    }

    /// A complete store set backed by this database.
    pub fn stores(&self) -> Stores {
        Stores {
            candidates: Arc::new(SqliteCandidateStore { db: self.clone() }),
            swaps: Arc::new(SqliteSwapStore { db: self.clone() }),
            liquidity_events: Arc::new(SqliteLiquidityEventStore { db: self.clone() }),
            prices: Arc::new(SqlitePriceSeriesStore { db: self.clone() }),
            liquidity_series: Arc::new(SqliteLiquiditySeriesStore { db: self.clone() }),
            volumes: Arc::new(SqliteVolumeSeriesStore { db: self.clone() }),
            features: Arc::new(SqliteFeatureStore { db: self.clone() }),
            trades: Arc::new(SqliteTradeStore { db: self.clone() }),
            aggregates: Arc::new(SqliteAggregateStore { db: self.clone() }),
        }
    }

    fn initialize_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )
        .map_err(unavailable)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )
        .map_err(unavailable)?;

        let current: Option<u32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(unavailable)?;

        match current {
            None => {
                self.create_schema(&conn)?;
                conn.execute("INSERT INTO schema_version (version) VALUES (?)", [SCHEMA_VERSION])
                    .map_err(unavailable)?;
                info!("created token-lab store schema v{}", SCHEMA_VERSION);
            }
            Some(v) if v == SCHEMA_VERSION => {
                debug!("token-lab store schema at v{}", SCHEMA_VERSION);
            }
            Some(v) => {
                return Err(StorageError::Unavailable(format!(
                    "schema version mismatch: expected {}, got {}",
                    SCHEMA_VERSION, v
                )));
            }
        }

        Ok(())
    }

    fn create_schema(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                candidate_id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                mint TEXT NOT NULL,
                pool TEXT,
                tx_signature TEXT NOT NULL,
                event_index INTEGER NOT NULL,
                slot INTEGER NOT NULL,
                discovered_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS swaps (
                slot INTEGER NOT NULL,
                tx_signature TEXT NOT NULL,
                event_index INTEGER NOT NULL,
                candidate_id TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                side TEXT NOT NULL,
                amount_in REAL NOT NULL,
                amount_out REAL NOT NULL,
                price REAL NOT NULL,
                PRIMARY KEY (slot, tx_signature, event_index)
            );
            CREATE INDEX IF NOT EXISTS idx_swaps_candidate ON swaps(candidate_id);

            CREATE TABLE IF NOT EXISTS liquidity_events (
                slot INTEGER NOT NULL,
                tx_signature TEXT NOT NULL,
                event_index INTEGER NOT NULL,
                candidate_id TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                amount_token REAL NOT NULL,
                amount_quote REAL NOT NULL,
                liquidity_after REAL NOT NULL,
                PRIMARY KEY (slot, tx_signature, event_index)
            );
            CREATE INDEX IF NOT EXISTS idx_liq_events_candidate
                ON liquidity_events(candidate_id);

            CREATE TABLE IF NOT EXISTS price_series (
                candidate_id TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                slot INTEGER NOT NULL,
                price REAL NOT NULL,
                volume REAL NOT NULL,
                swap_count INTEGER NOT NULL,
                PRIMARY KEY (candidate_id, timestamp_ms)
            );

            CREATE TABLE IF NOT EXISTS liquidity_series (
                candidate_id TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                slot INTEGER NOT NULL,
                liquidity REAL NOT NULL,
                liquidity_token REAL NOT NULL,
                liquidity_quote REAL NOT NULL,
                PRIMARY KEY (candidate_id, timestamp_ms)
            );

            CREATE TABLE IF NOT EXISTS volume_series (
                candidate_id TEXT NOT NULL,
                interval_seconds INTEGER NOT NULL,
                interval_start_ms INTEGER NOT NULL,
                volume REAL NOT NULL,
                swap_count INTEGER NOT NULL,
                buy_volume REAL NOT NULL,
                sell_volume REAL NOT NULL,
                PRIMARY KEY (candidate_id, interval_seconds, interval_start_ms)
            );

            CREATE TABLE IF NOT EXISTS features (
                candidate_id TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                price_delta REAL,
                price_velocity REAL,
                price_acceleration REAL,
                liquidity_delta REAL,
                liquidity_velocity REAL,
                last_swap_interval_ms INTEGER,
                last_liq_event_interval_ms INTEGER,
                token_lifetime_ms INTEGER,
                PRIMARY KEY (candidate_id, timestamp_ms)
            );

            CREATE TABLE IF NOT EXISTS trades (
                trade_id TEXT PRIMARY KEY,
                candidate_id TEXT NOT NULL,
                strategy_id TEXT NOT NULL,
                scenario_id TEXT NOT NULL,
                entry_event_type TEXT NOT NULL,
                entry_signal_time INTEGER NOT NULL,
                entry_actual_time INTEGER NOT NULL,
                entry_signal_price REAL NOT NULL,
                entry_actual_price REAL NOT NULL,
                entry_liquidity REAL,
                exit_signal_time INTEGER NOT NULL,
                exit_actual_time INTEGER NOT NULL,
                exit_signal_price REAL NOT NULL,
                exit_actual_price REAL NOT NULL,
                exit_reason TEXT NOT NULL,
                entry_cost REAL NOT NULL,
                exit_cost REAL NOT NULL,
                mev_cost REAL NOT NULL,
                total_cost_pct REAL NOT NULL,
                position_size REAL NOT NULL,
                position_value REAL NOT NULL,
                gross_return REAL NOT NULL,
                outcome REAL NOT NULL,
                outcome_class TEXT NOT NULL,
                hold_duration_ms INTEGER NOT NULL,
                peak_price REAL,
                min_liquidity REAL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_strategy_scenario
                ON trades(strategy_id, scenario_id);

            CREATE TABLE IF NOT EXISTS aggregates (
                strategy_id TEXT NOT NULL,
                scenario_id TEXT NOT NULL,
                entry_event_type TEXT NOT NULL,
                aggregate_blob TEXT NOT NULL,
                PRIMARY KEY (strategy_id, scenario_id, entry_event_type)
            );
        "#,
        )
        .map_err(unavailable)
    }
}

/// Map a rusqlite failure onto the storage contract.
fn map_sqlite(key: impl Into<String>, e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::DuplicateKey(key.into())
        }
        rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound(key.into()),
        _ => StorageError::Unavailable(e.to_string()),
    }
}

fn unavailable(e: rusqlite::Error) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

fn parse_err(what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("invalid {}: {}", what, value).into(),
    )
}

fn row_candidate(row: &rusqlite::Row<'_>) -> rusqlite::Result<TokenCandidate> {
    let source: String = row.get(1)?;
    Ok(TokenCandidate {
        candidate_id: row.get(0)?,
        source: CandidateSource::parse(&source).ok_or_else(|| parse_err("source", &source))?,
        mint: row.get(2)?,
        pool: row.get(3)?,
        tx_signature: row.get(4)?,
        event_index: row.get(5)?,
        slot: row.get(6)?,
        discovered_at: row.get(7)?,
    })
}

fn row_swap(row: &rusqlite::Row<'_>) -> rusqlite::Result<SwapEvent> {
    let side: String = row.get(5)?;
    Ok(SwapEvent {
        slot: row.get(0)?,
        tx_signature: row.get(1)?,
        event_index: row.get(2)?,
        candidate_id: row.get(3)?,
        timestamp_ms: row.get(4)?,
        side: SwapSide::parse(&side).ok_or_else(|| parse_err("side", &side))?,
        amount_in: row.get(6)?,
        amount_out: row.get(7)?,
        price: row.get(8)?,
    })
}

fn row_liquidity_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<LiquidityEvent> {
    let kind: String = row.get(5)?;
    Ok(LiquidityEvent {
        slot: row.get(0)?,
        tx_signature: row.get(1)?,
        event_index: row.get(2)?,
        candidate_id: row.get(3)?,
        timestamp_ms: row.get(4)?,
        event_type: LiquidityEventKind::parse(&kind)
            .ok_or_else(|| parse_err("event_type", &kind))?,
        amount_token: row.get(6)?,
        amount_quote: row.get(7)?,
        liquidity_after: row.get(8)?,
    })
}

fn row_trade(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeRecord> {
    let entry_event_type: String = row.get(4)?;
    let exit_reason: String = row.get(14)?;
    let outcome_class: String = row.get(23)?;
    Ok(TradeRecord {
        trade_id: row.get(0)?,
        candidate_id: row.get(1)?,
        strategy_id: row.get(2)?,
        scenario_id: row.get(3)?,
        entry_event_type: CandidateSource::parse(&entry_event_type)
            .ok_or_else(|| parse_err("entry_event_type", &entry_event_type))?,
        entry_signal_time: row.get(5)?,
        entry_actual_time: row.get(6)?,
        entry_signal_price: row.get(7)?,
        entry_actual_price: row.get(8)?,
        entry_liquidity: row.get(9)?,
        exit_signal_time: row.get(10)?,
        exit_actual_time: row.get(11)?,
        exit_signal_price: row.get(12)?,
        exit_actual_price: row.get(13)?,
        exit_reason: ExitReason::parse(&exit_reason)
            .ok_or_else(|| parse_err("exit_reason", &exit_reason))?,
        entry_cost: row.get(15)?,
        exit_cost: row.get(16)?,
        mev_cost: row.get(17)?,
        total_cost_pct: row.get(18)?,
        position_size: row.get(19)?,
        position_value: row.get(20)?,
        gross_return: row.get(21)?,
        outcome: row.get(22)?,
        outcome_class: OutcomeClass::parse(&outcome_class)
            .ok_or_else(|| parse_err("outcome_class", &outcome_class))?,
        hold_duration_ms: row.get(24)?,
        peak_price: row.get(25)?,
        min_liquidity: row.get(26)?,
    })
}

// =============================================================================
// CANDIDATES
// =============================================================================

pub struct SqliteCandidateStore {
    db: SqliteDatabase,
}

impl SqliteCandidateStore {
    fn insert_on(conn: &Connection, c: &TokenCandidate) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO candidates
             (candidate_id, source, mint, pool, tx_signature, event_index, slot, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                c.candidate_id,
                c.source.as_str(),
                c.mint,
                c.pool,
                c.tx_signature,
                c.event_index,
                c.slot,
                c.discovered_at,
            ],
        )
        .map_err(|e| map_sqlite(c.candidate_id.as_str(), e))?;
        Ok(())
    }
}

impl CandidateStore for SqliteCandidateStore {
    fn insert(&self, candidate: TokenCandidate) -> StorageResult<()> {
        let conn = self.db.conn.lock();
        Self::insert_on(&conn, &candidate)
    }

    /// Atomic: all candidates commit or none do.
    fn insert_bulk(&self, candidates: Vec<TokenCandidate>) -> StorageResult<()> {
        let mut conn = self.db.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        for candidate in &candidates {
            Self::insert_on(&tx, candidate)?;
        }
        tx.commit().map_err(unavailable)
    }

    fn get_by_id(&self, candidate_id: &str) -> StorageResult<TokenCandidate> {
        let conn = self.db.conn.lock();
        conn.query_row(
            "SELECT candidate_id, source, mint, pool, tx_signature, event_index, slot,
                    discovered_at
             FROM candidates WHERE candidate_id = ?1",
            [candidate_id],
            row_candidate,
        )
        .map_err(|e| map_sqlite(candidate_id, e))
    }

    fn all(&self) -> StorageResult<Vec<TokenCandidate>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT candidate_id, source, mint, pool, tx_signature, event_index, slot,
                        discovered_at
                 FROM candidates",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], row_candidate)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }
}

// =============================================================================
// RAW EVENTS
// =============================================================================

pub struct SqliteSwapStore {
    db: SqliteDatabase,
}

impl SqliteSwapStore {
    fn insert_on(conn: &Connection, s: &SwapEvent) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO swaps
             (slot, tx_signature, event_index, candidate_id, timestamp_ms, side,
              amount_in, amount_out, price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                s.slot,
                s.tx_signature,
                s.event_index,
                s.candidate_id,
                s.timestamp_ms,
                s.side.as_str(),
                s.amount_in,
                s.amount_out,
                s.price,
            ],
        )
        .map_err(|e| {
            map_sqlite(format!("swap {}:{}:{}", s.slot, s.tx_signature, s.event_index), e)
        })?;
        Ok(())
    }
}

impl SwapStore for SqliteSwapStore {
    fn insert(&self, swap: SwapEvent) -> StorageResult<()> {
        let conn = self.db.conn.lock();
        Self::insert_on(&conn, &swap)
    }

    /// Atomic bulk insert.
    fn insert_bulk(&self, swaps: Vec<SwapEvent>) -> StorageResult<()> {
        let mut conn = self.db.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        for swap in &swaps {
            Self::insert_on(&tx, swap)?;
        }
        tx.commit().map_err(unavailable)
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<SwapEvent>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT slot, tx_signature, event_index, candidate_id, timestamp_ms, side,
                        amount_in, amount_out, price
                 FROM swaps WHERE candidate_id = ?1",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([candidate_id], row_swap)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>> {
        let conn = self.db.conn.lock();
        let range: (Option<i64>, Option<i64>) = conn
            .query_row("SELECT MIN(timestamp_ms), MAX(timestamp_ms) FROM swaps", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(unavailable)?;
        Ok(range.0.zip(range.1))
    }
}

pub struct SqliteLiquidityEventStore {
    db: SqliteDatabase,
}

impl SqliteLiquidityEventStore {
    fn insert_on(conn: &Connection, e: &LiquidityEvent) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO liquidity_events
             (slot, tx_signature, event_index, candidate_id, timestamp_ms, event_type,
              amount_token, amount_quote, liquidity_after)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                e.slot,
                e.tx_signature,
                e.event_index,
                e.candidate_id,
                e.timestamp_ms,
                e.event_type.as_str(),
                e.amount_token,
                e.amount_quote,
                e.liquidity_after,
            ],
        )
        .map_err(|err| {
            map_sqlite(
                format!("liquidity {}:{}:{}", e.slot, e.tx_signature, e.event_index),
                err,
            )
        })?;
        Ok(())
    }
}

impl LiquidityEventStore for SqliteLiquidityEventStore {
    fn insert(&self, event: LiquidityEvent) -> StorageResult<()> {
        let conn = self.db.conn.lock();
        Self::insert_on(&conn, &event)
    }

    /// Atomic bulk insert.
    fn insert_bulk(&self, events: Vec<LiquidityEvent>) -> StorageResult<()> {
        let mut conn = self.db.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        for event in &events {
            Self::insert_on(&tx, event)?;
        }
        tx.commit().map_err(unavailable)
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<LiquidityEvent>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT slot, tx_signature, event_index, candidate_id, timestamp_ms,
                        event_type, amount_token, amount_quote, liquidity_after
                 FROM liquidity_events WHERE candidate_id = ?1",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([candidate_id], row_liquidity_event)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>> {
        let conn = self.db.conn.lock();
        let range: (Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT MIN(timestamp_ms), MAX(timestamp_ms) FROM liquidity_events",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(unavailable)?;
        Ok(range.0.zip(range.1))
    }
}

// =============================================================================
// SERIES
// =============================================================================

pub struct SqlitePriceSeriesStore {
    db: SqliteDatabase,
}

fn row_price(row: &rusqlite::Row<'_>) -> rusqlite::Result<PricePoint> {
    Ok(PricePoint {
        candidate_id: row.get(0)?,
        timestamp_ms: row.get(1)?,
        slot: row.get(2)?,
        price: row.get(3)?,
        volume: row.get(4)?,
        swap_count: row.get(5)?,
    })
}

impl SqlitePriceSeriesStore {
    fn insert_on(conn: &Connection, p: &PricePoint) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO price_series
             (candidate_id, timestamp_ms, slot, price, volume, swap_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![p.candidate_id, p.timestamp_ms, p.slot, p.price, p.volume, p.swap_count],
        )
        .map_err(|e| map_sqlite(format!("price {}@{}", p.candidate_id, p.timestamp_ms), e))?;
        Ok(())
    }
}

impl PriceSeriesStore for SqlitePriceSeriesStore {
    fn insert(&self, point: PricePoint) -> StorageResult<()> {
        let conn = self.db.conn.lock();
        Self::insert_on(&conn, &point)
    }

    /// Atomic bulk insert.
    fn insert_bulk(&self, points: Vec<PricePoint>) -> StorageResult<()> {
        let mut conn = self.db.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        for point in &points {
            Self::insert_on(&tx, point)?;
        }
        tx.commit().map_err(unavailable)
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<PricePoint>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT candidate_id, timestamp_ms, slot, price, volume, swap_count
                 FROM price_series WHERE candidate_id = ?1",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([candidate_id], row_price)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }

    fn get_by_time_range(
        &self,
        candidate_id: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StorageResult<Vec<PricePoint>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT candidate_id, timestamp_ms, slot, price, volume, swap_count
                 FROM price_series
                 WHERE candidate_id = ?1 AND timestamp_ms >= ?2 AND timestamp_ms < ?3",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![candidate_id, from_ms, to_ms], row_price)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>> {
        let conn = self.db.conn.lock();
        let range: (Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT MIN(timestamp_ms), MAX(timestamp_ms) FROM price_series",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(unavailable)?;
        Ok(range.0.zip(range.1))
    }

    fn all(&self) -> StorageResult<Vec<PricePoint>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT candidate_id, timestamp_ms, slot, price, volume, swap_count
                 FROM price_series",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], row_price)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }
}

pub struct SqliteLiquiditySeriesStore {
    db: SqliteDatabase,
}

fn row_liquidity_point(row: &rusqlite::Row<'_>) -> rusqlite::Result<LiquidityPoint> {
    Ok(LiquidityPoint {
        candidate_id: row.get(0)?,
        timestamp_ms: row.get(1)?,
        slot: row.get(2)?,
        liquidity: row.get(3)?,
        liquidity_token: row.get(4)?,
        liquidity_quote: row.get(5)?,
    })
}

impl SqliteLiquiditySeriesStore {
    fn insert_on(conn: &Connection, p: &LiquidityPoint) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO liquidity_series
             (candidate_id, timestamp_ms, slot, liquidity, liquidity_token, liquidity_quote)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                p.candidate_id,
                p.timestamp_ms,
                p.slot,
                p.liquidity,
                p.liquidity_token,
                p.liquidity_quote,
            ],
        )
        .map_err(|e| map_sqlite(format!("liquidity {}@{}", p.candidate_id, p.timestamp_ms), e))?;
        Ok(())
    }
}

impl LiquiditySeriesStore for SqliteLiquiditySeriesStore {
    fn insert(&self, point: LiquidityPoint) -> StorageResult<()> {
        let conn = self.db.conn.lock();
        Self::insert_on(&conn, &point)
    }

    /// Atomic bulk insert.
    fn insert_bulk(&self, points: Vec<LiquidityPoint>) -> StorageResult<()> {
        let mut conn = self.db.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        for point in &points {
            Self::insert_on(&tx, point)?;
        }
        tx.commit().map_err(unavailable)
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<LiquidityPoint>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT candidate_id, timestamp_ms, slot, liquidity, liquidity_token,
                        liquidity_quote
                 FROM liquidity_series WHERE candidate_id = ?1",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([candidate_id], row_liquidity_point)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }

    fn get_global_time_range(&self) -> StorageResult<Option<(i64, i64)>> {
        let conn = self.db.conn.lock();
        let range: (Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT MIN(timestamp_ms), MAX(timestamp_ms) FROM liquidity_series",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(unavailable)?;
        Ok(range.0.zip(range.1))
    }

    fn all(&self) -> StorageResult<Vec<LiquidityPoint>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT candidate_id, timestamp_ms, slot, liquidity, liquidity_token,
                        liquidity_quote
                 FROM liquidity_series",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], row_liquidity_point)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }
}

pub struct SqliteVolumeSeriesStore {
    db: SqliteDatabase,
}

impl SqliteVolumeSeriesStore {
    fn insert_on(conn: &Connection, p: &VolumePoint) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO volume_series
             (candidate_id, interval_seconds, interval_start_ms, volume, swap_count,
              buy_volume, sell_volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                p.candidate_id,
                p.interval_seconds,
                p.interval_start_ms,
                p.volume,
                p.swap_count,
                p.buy_volume,
                p.sell_volume,
            ],
        )
        .map_err(|e| {
            map_sqlite(
                format!("volume {}:{}s@{}", p.candidate_id, p.interval_seconds, p.interval_start_ms),
                e,
            )
        })?;
        Ok(())
    }
}

impl VolumeSeriesStore for SqliteVolumeSeriesStore {
    fn insert(&self, point: VolumePoint) -> StorageResult<()> {
        let conn = self.db.conn.lock();
        Self::insert_on(&conn, &point)
    }

    /// Atomic bulk insert.
    fn insert_bulk(&self, points: Vec<VolumePoint>) -> StorageResult<()> {
        let mut conn = self.db.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        for point in &points {
            Self::insert_on(&tx, point)?;
        }
        tx.commit().map_err(unavailable)
    }

    fn get_by_candidate_id(
        &self,
        candidate_id: &str,
        interval_seconds: u32,
    ) -> StorageResult<Vec<VolumePoint>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT candidate_id, interval_seconds, interval_start_ms, volume, swap_count,
                        buy_volume, sell_volume
                 FROM volume_series WHERE candidate_id = ?1 AND interval_seconds = ?2",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![candidate_id, interval_seconds], |row| {
                Ok(VolumePoint {
                    candidate_id: row.get(0)?,
                    interval_seconds: row.get(1)?,
                    interval_start_ms: row.get(2)?,
                    volume: row.get(3)?,
                    swap_count: row.get(4)?,
                    buy_volume: row.get(5)?,
                    sell_volume: row.get(6)?,
                })
            })
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }
}

pub struct SqliteFeatureStore {
    db: SqliteDatabase,
}

impl SqliteFeatureStore {
    fn insert_on(conn: &Connection, p: &FeaturePoint) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO features
             (candidate_id, timestamp_ms, price_delta, price_velocity, price_acceleration,
              liquidity_delta, liquidity_velocity, last_swap_interval_ms,
              last_liq_event_interval_ms, token_lifetime_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                p.candidate_id,
                p.timestamp_ms,
                p.price_delta,
                p.price_velocity,
                p.price_acceleration,
                p.liquidity_delta,
                p.liquidity_velocity,
                p.last_swap_interval_ms,
                p.last_liq_event_interval_ms,
                p.token_lifetime_ms,
            ],
        )
        .map_err(|e| map_sqlite(format!("feature {}@{}", p.candidate_id, p.timestamp_ms), e))?;
        Ok(())
    }
}

impl FeatureStore for SqliteFeatureStore {
    fn insert(&self, point: FeaturePoint) -> StorageResult<()> {
        let conn = self.db.conn.lock();
        Self::insert_on(&conn, &point)
    }

    /// Atomic bulk insert.
    fn insert_bulk(&self, points: Vec<FeaturePoint>) -> StorageResult<()> {
        let mut conn = self.db.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        for point in &points {
            Self::insert_on(&tx, point)?;
        }
        tx.commit().map_err(unavailable)
    }

    fn get_by_candidate_id(&self, candidate_id: &str) -> StorageResult<Vec<FeaturePoint>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT candidate_id, timestamp_ms, price_delta, price_velocity,
                        price_acceleration, liquidity_delta, liquidity_velocity,
                        last_swap_interval_ms, last_liq_event_interval_ms, token_lifetime_ms
                 FROM features WHERE candidate_id = ?1",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([candidate_id], |row| {
                Ok(FeaturePoint {
                    candidate_id: row.get(0)?,
                    timestamp_ms: row.get(1)?,
                    price_delta: row.get(2)?,
                    price_velocity: row.get(3)?,
                    price_acceleration: row.get(4)?,
                    liquidity_delta: row.get(5)?,
                    liquidity_velocity: row.get(6)?,
                    last_swap_interval_ms: row.get(7)?,
                    last_liq_event_interval_ms: row.get(8)?,
                    token_lifetime_ms: row.get(9)?,
                })
            })
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }
}

// =============================================================================
// TRADES & AGGREGATES
// =============================================================================

pub struct SqliteTradeStore {
    db: SqliteDatabase,
}

const TRADE_COLUMNS: &str = "trade_id, candidate_id, strategy_id, scenario_id, entry_event_type,
     entry_signal_time, entry_actual_time, entry_signal_price, entry_actual_price,
     entry_liquidity, exit_signal_time, exit_actual_time, exit_signal_price,
     exit_actual_price, exit_reason, entry_cost, exit_cost, mev_cost, total_cost_pct,
     position_size, position_value, gross_return, outcome, outcome_class,
     hold_duration_ms, peak_price, min_liquidity";

impl TradeStore for SqliteTradeStore {
    fn insert(&self, t: TradeRecord) -> StorageResult<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO trades ({TRADE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)"
            ),
            params![
                t.trade_id,
                t.candidate_id,
                t.strategy_id,
                t.scenario_id,
                t.entry_event_type.as_str(),
                t.entry_signal_time,
                t.entry_actual_time,
                t.entry_signal_price,
                t.entry_actual_price,
                t.entry_liquidity,
                t.exit_signal_time,
                t.exit_actual_time,
                t.exit_signal_price,
                t.exit_actual_price,
                t.exit_reason.as_str(),
                t.entry_cost,
                t.exit_cost,
                t.mev_cost,
                t.total_cost_pct,
                t.position_size,
                t.position_value,
                t.gross_return,
                t.outcome,
                t.outcome_class.as_str(),
                t.hold_duration_ms,
                t.peak_price,
                t.min_liquidity,
            ],
        )
        .map_err(|e| map_sqlite(t.trade_id.as_str(), e))?;
        Ok(())
    }

    fn get_by_id(&self, trade_id: &str) -> StorageResult<TradeRecord> {
        let conn = self.db.conn.lock();
        conn.query_row(
            &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE trade_id = ?1"),
            [trade_id],
            row_trade,
        )
        .map_err(|e| map_sqlite(trade_id, e))
    }

    fn get_by_strategy_scenario(
        &self,
        strategy_id: &str,
        scenario_id: &str,
    ) -> StorageResult<Vec<TradeRecord>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TRADE_COLUMNS} FROM trades
                 WHERE strategy_id = ?1 AND scenario_id = ?2"
            ))
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![strategy_id, scenario_id], row_trade)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }

    fn all(&self) -> StorageResult<Vec<TradeRecord>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {TRADE_COLUMNS} FROM trades"))
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], row_trade)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(rows)
    }
}

pub struct SqliteAggregateStore {
    db: SqliteDatabase,
}

impl AggregateStore for SqliteAggregateStore {
    fn insert(&self, aggregate: StrategyAggregate) -> StorageResult<()> {
        let key = format!(
            "{}:{}:{}",
            aggregate.strategy_id,
            aggregate.scenario_id,
            aggregate.entry_event_type.as_str()
        );
        let blob = serde_json::to_string(&aggregate)
            .map_err(|e| StorageError::Unavailable(format!("aggregate serialization: {}", e)))?;
        let conn = self.db.conn.lock();
        conn.execute(
            "INSERT INTO aggregates (strategy_id, scenario_id, entry_event_type, aggregate_blob)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                aggregate.strategy_id,
                aggregate.scenario_id,
                aggregate.entry_event_type.as_str(),
                blob,
            ],
        )
        .map_err(|e| map_sqlite(key, e))?;
        Ok(())
    }

    fn get(
        &self,
        strategy_id: &str,
        scenario_id: &str,
        entry_event_type: &str,
    ) -> StorageResult<StrategyAggregate> {
        let conn = self.db.conn.lock();
        let blob: String = conn
            .query_row(
                "SELECT aggregate_blob FROM aggregates
                 WHERE strategy_id = ?1 AND scenario_id = ?2 AND entry_event_type = ?3",
                params![strategy_id, scenario_id, entry_event_type],
                |row| row.get(0),
            )
            .map_err(|e| map_sqlite(format!("{}:{}:{}", strategy_id, scenario_id, entry_event_type), e))?;
        serde_json::from_str(&blob)
            .map_err(|e| StorageError::Unavailable(format!("aggregate deserialization: {}", e)))
    }

    fn all(&self) -> StorageResult<Vec<StrategyAggregate>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn
            .prepare("SELECT aggregate_blob FROM aggregates")
            .map_err(unavailable)?;
        let blobs = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        blobs
            .iter()
            .map(|blob| {
                serde_json::from_str(blob).map_err(|e| {
                    StorageError::Unavailable(format!("aggregate deserialization: {}", e))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SwapSide;

    fn swap(slot: u64, sig: &str, idx: u32, ts: i64) -> SwapEvent {
        SwapEvent {
            candidate_id: "cand".into(),
            tx_signature: sig.into(),
            event_index: idx,
            slot,
            timestamp_ms: ts,
            side: SwapSide::Sell,
            amount_in: 2.0,
            amount_out: 1.0,
            price: 0.5,
        }
    }

    #[test]
    fn schema_initializes_and_reopens() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        // Second initialization against the same connection is a no-op.
        db.initialize_schema().unwrap();
    }

    #[test]
    fn duplicate_swap_maps_to_duplicate_key() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let stores = db.stores();
        stores.swaps.insert(swap(1, "sig", 0, 100)).unwrap();
        let err = stores.swaps.insert(swap(1, "sig", 0, 200)).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
    }

    #[test]
    fn bulk_insert_is_atomic() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let stores = db.stores();
        stores.swaps.insert(swap(5, "dup", 0, 100)).unwrap();

        // Batch contains a duplicate; nothing from the batch must survive.
        let batch = vec![swap(1, "a", 0, 100), swap(5, "dup", 0, 100), swap(2, "b", 0, 100)];
        assert!(stores.swaps.insert_bulk(batch).is_err());

        let rows = stores.swaps.get_by_candidate_id("cand").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tx_signature, "dup");
    }

    #[test]
    fn candidate_round_trips() {
        use crate::events::TokenCandidate;
        let db = SqliteDatabase::open_in_memory().unwrap();
        let stores = db.stores();
        let candidate = TokenCandidate::from_discovery(
            CandidateSource::ActiveToken,
            "mintX",
            None,
            "sigX",
            3,
            777,
            1_700_000_000_000,
        );
        stores.candidates.insert(candidate.clone()).unwrap();
        let loaded = stores.candidates.get_by_id(&candidate.candidate_id).unwrap();
        assert_eq!(loaded, candidate);
    }

    #[test]
    fn time_range_queries_use_half_open_interval() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let stores = db.stores();
        for (i, ts) in [100, 200, 300].into_iter().enumerate() {
            stores
                .prices
                .insert(PricePoint {
                    candidate_id: "cand".into(),
                    timestamp_ms: ts,
                    slot: i as u64,
                    price: 1.0,
                    volume: 1.0,
                    swap_count: 1,
                })
                .unwrap();
        }
        let rows = stores.prices.get_by_time_range("cand", 100, 300).unwrap();
        let times: Vec<i64> = rows.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(times.len(), 2);
        assert!(times.contains(&100) && times.contains(&200));
    }
}
