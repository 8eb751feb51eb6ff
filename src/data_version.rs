//! Content Address of the Input Universe
//!
//! The data version is a SHA-256 over deterministically serialized dumps
//! of the raw input stores:
//!
//! ```text
//! data_version = SHA256(H_price || H_liquidity || H_candidates)
//! ```
//!
//! Each component hash covers one store, dumped as pipe-separated rows
//! with fixed field order, fixed `%.8f` decimal precision, and rows
//! sorted by primary key. Any single-row edit changes the version.
//!
//! When the raw stores are all empty (trade records imported without
//! their inputs), the version falls back to a hash over the canonical
//! trade dump. The two coverages are NOT comparable; the envelope records
//! which one is in force and consumers must check it before comparing.

use crate::ids::sha256_hex;
use crate::storage::{StorageError, Stores};
use serde::{Deserialize, Serialize};

/// Which dump the data version covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataVersionSource {
    /// Primary path: price series, liquidity series, and candidates.
    Stores,
    /// Fallback path: trade records only.
    Trades,
}

impl DataVersionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stores => "stores",
            Self::Trades => "trades",
        }
    }
}

/// The computed content address plus its component hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVersion {
    /// Final SHA-256, hex.
    pub version: String,
    pub source: DataVersionSource,
    /// `(component, sha256 hex)` pairs in hash order.
    pub component_hashes: Vec<(String, String)>,
}

/// Fixed-precision decimal rendering for hashed dumps.
///
/// Free-form float formatting would break reproducibility across
/// runtimes; every numeric field in a dump goes through this.
pub fn canonical_decimal(value: f64) -> String {
    format!("{:.8}", value)
}

fn canonical_optional_decimal(value: Option<f64>) -> String {
    value.map(canonical_decimal).unwrap_or_default()
}

/// Compute the data version for a store set.
pub fn compute_data_version(stores: &Stores) -> Result<DataVersion, StorageError> {
    let mut prices = stores.prices.all()?;
    let mut liquidity = stores.liquidity_series.all()?;
    let mut candidates = stores.candidates.all()?;

    if prices.is_empty() && liquidity.is_empty() && candidates.is_empty() {
        return compute_trade_fallback(stores);
    }

    prices.sort_by(|a, b| {
        a.candidate_id
            .cmp(&b.candidate_id)
            .then_with(|| a.timestamp_ms.cmp(&b.timestamp_ms))
    });
    liquidity.sort_by(|a, b| {
        a.candidate_id
            .cmp(&b.candidate_id)
            .then_with(|| a.timestamp_ms.cmp(&b.timestamp_ms))
    });
    candidates.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));

    let price_dump: String = prices
        .iter()
        .map(|p| {
            format!(
                "{}|{}|{}|{}|{}|{}\n",
                p.candidate_id,
                p.timestamp_ms,
                p.slot,
                canonical_decimal(p.price),
                canonical_decimal(p.volume),
                p.swap_count
            )
        })
        .collect();

    let liquidity_dump: String = liquidity
        .iter()
        .map(|l| {
            format!(
                "{}|{}|{}|{}|{}|{}\n",
                l.candidate_id,
                l.timestamp_ms,
                l.slot,
                canonical_decimal(l.liquidity),
                canonical_decimal(l.liquidity_token),
                canonical_decimal(l.liquidity_quote)
            )
        })
        .collect();

    let candidate_dump: String = candidates
        .iter()
        .map(|c| {
            format!(
                "{}|{}|{}|{}|{}|{}|{}|{}\n",
                c.candidate_id,
                c.source.as_str(),
                c.mint,
                c.pool.as_deref().unwrap_or(""),
                c.tx_signature,
                c.event_index,
                c.slot,
                c.discovered_at
            )
        })
        .collect();

    let h_price = sha256_hex(price_dump.as_bytes());
    let h_liquidity = sha256_hex(liquidity_dump.as_bytes());
    let h_candidates = sha256_hex(candidate_dump.as_bytes());

    let version = sha256_hex(format!("{h_price}{h_liquidity}{h_candidates}").as_bytes());

    Ok(DataVersion {
        version,
        source: DataVersionSource::Stores,
        component_hashes: vec![
            ("price_series".to_string(), h_price),
            ("liquidity_series".to_string(), h_liquidity),
            ("candidates".to_string(), h_candidates),
        ],
    })
}

fn compute_trade_fallback(stores: &Stores) -> Result<DataVersion, StorageError> {
    let mut trades = stores.trades.all()?;
    trades.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));

    let trade_dump: String = trades
        .iter()
        .map(|t| {
            format!(
                "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
                t.trade_id,
                t.candidate_id,
                t.strategy_id,
                t.scenario_id,
                t.entry_event_type.as_str(),
                t.entry_signal_time,
                canonical_decimal(t.entry_signal_price),
                t.exit_signal_time,
                canonical_decimal(t.exit_signal_price),
                canonical_decimal(t.outcome),
                t.exit_reason.as_str(),
                canonical_optional_decimal(t.peak_price),
                canonical_optional_decimal(t.min_liquidity)
            )
        })
        .collect();

    let h_trades = sha256_hex(trade_dump.as_bytes());
    let version = sha256_hex(h_trades.as_bytes());

    Ok(DataVersion {
        version,
        source: DataVersionSource::Trades,
        component_hashes: vec![("trade_records".to_string(), h_trades)],
    })
}
