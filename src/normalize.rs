//! Raw Event Normalization
//!
//! Turns a candidate's raw swap and liquidity streams into the normalized
//! time series and derived features the simulator and aggregator consume.
//!
//! # Pipeline (per candidate)
//!
//! 1. Load swaps and liquidity events, sort by the canonical composite key
//!    (unordered input is handled here, never assumed away).
//! 2. Bucket by `(candidate_id, timestamp_ms)` into price and liquidity
//!    points: value fields come from the canonical-last event of the
//!    bucket, volume fields sum over the bucket.
//! 3. Bucket swaps into interval volume points (60 s / 300 s / 3600 s,
//!    floor alignment).
//! 4. Derive features in one left-to-right pass over the price series.
//!
//! Outputs are produced sorted by `(candidate_id, timestamp_ms)` and
//! written back through the series stores.

use crate::events::{LiquidityEvent, SwapEvent, SwapSide};
use crate::ordering::sort_canonical;
use crate::series::{
    FeaturePoint, LiquidityPoint, PricePoint, VolumePoint, VOLUME_INTERVALS_SECONDS,
};
use crate::storage::{StorageError, Stores};
use std::collections::BTreeMap;
use tracing::debug;

/// Normalization failures. Storage problems are the only failure mode;
/// an event-less candidate normalizes to empty series.
#[derive(Debug)]
pub enum NormalizeError {
    Storage(StorageError),
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "normalization storage error: {}", e),
        }
    }
}

impl std::error::Error for NormalizeError {}

impl From<StorageError> for NormalizeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Row counts produced for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizationSummary {
    pub price_points: usize,
    pub liquidity_points: usize,
    pub volume_points: usize,
    pub feature_points: usize,
}

/// Normalizer over one store set.
pub struct Normalizer {
    stores: Stores,
}

impl Normalizer {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Normalize one candidate and persist every derived row.
    pub fn normalize_candidate(
        &self,
        candidate_id: &str,
    ) -> Result<NormalizationSummary, NormalizeError> {
        let mut swaps = self.stores.swaps.get_by_candidate_id(candidate_id)?;
        let mut liquidity = self.stores.liquidity_events.get_by_candidate_id(candidate_id)?;
        sort_canonical(&mut swaps);
        sort_canonical(&mut liquidity);

        let prices = build_price_series(candidate_id, &swaps);
        let liquidity_points = build_liquidity_series(candidate_id, &liquidity);
        let volumes = build_volume_series(candidate_id, &swaps);
        let features = build_features(candidate_id, &prices, &liquidity_points);

        let summary = NormalizationSummary {
            price_points: prices.len(),
            liquidity_points: liquidity_points.len(),
            volume_points: volumes.len(),
            feature_points: features.len(),
        };

        self.stores.prices.insert_bulk(prices)?;
        self.stores.liquidity_series.insert_bulk(liquidity_points)?;
        self.stores.volumes.insert_bulk(volumes)?;
        self.stores.features.insert_bulk(features)?;

        debug!(
            candidate_id,
            price_points = summary.price_points,
            liquidity_points = summary.liquidity_points,
            "normalized candidate"
        );
        Ok(summary)
    }
}

/// Bucket canonically sorted swaps into price points.
pub fn build_price_series(candidate_id: &str, sorted_swaps: &[SwapEvent]) -> Vec<PricePoint> {
    let mut buckets: BTreeMap<i64, PricePoint> = BTreeMap::new();
    for swap in sorted_swaps {
        let point = buckets.entry(swap.timestamp_ms).or_insert_with(|| PricePoint {
            candidate_id: candidate_id.to_string(),
            timestamp_ms: swap.timestamp_ms,
            slot: swap.slot,
            price: swap.price,
            volume: 0.0,
            swap_count: 0,
        });
        // Canonical-last swap of the bucket wins the value fields.
        point.slot = swap.slot;
        point.price = swap.price;
        point.volume += swap.amount_out;
        point.swap_count += 1;
    }
    buckets.into_values().collect()
}

/// Bucket canonically sorted liquidity events into liquidity points.
pub fn build_liquidity_series(
    candidate_id: &str,
    sorted_events: &[LiquidityEvent],
) -> Vec<LiquidityPoint> {
    let mut buckets: BTreeMap<i64, LiquidityPoint> = BTreeMap::new();
    for event in sorted_events {
        let point = buckets.entry(event.timestamp_ms).or_insert_with(|| LiquidityPoint {
            candidate_id: candidate_id.to_string(),
            timestamp_ms: event.timestamp_ms,
            slot: event.slot,
            liquidity: event.liquidity_after,
            liquidity_token: event.amount_token,
            liquidity_quote: event.amount_quote,
        });
        point.slot = event.slot;
        point.liquidity = event.liquidity_after;
        point.liquidity_token = event.amount_token;
        point.liquidity_quote = event.amount_quote;
    }
    buckets.into_values().collect()
}

/// Aggregate swaps into interval volume points for every supported interval.
pub fn build_volume_series(candidate_id: &str, swaps: &[SwapEvent]) -> Vec<VolumePoint> {
    let mut out = Vec::new();
    for interval_seconds in VOLUME_INTERVALS_SECONDS {
        let interval_ms = i64::from(interval_seconds) * 1_000;
        let mut buckets: BTreeMap<i64, VolumePoint> = BTreeMap::new();
        for swap in swaps {
            let start = swap.timestamp_ms.div_euclid(interval_ms) * interval_ms;
            let point = buckets.entry(start).or_insert_with(|| VolumePoint {
                candidate_id: candidate_id.to_string(),
                interval_seconds,
                interval_start_ms: start,
                volume: 0.0,
                swap_count: 0,
                buy_volume: 0.0,
                sell_volume: 0.0,
            });
            point.volume += swap.amount_out;
            point.swap_count += 1;
            match swap.side {
                SwapSide::Buy => point.buy_volume += swap.amount_out,
                SwapSide::Sell => point.sell_volume += swap.amount_out,
            }
        }
        out.extend(buckets.into_values());
    }
    out
}

/// Derive features in a single left-to-right pass over the price series.
///
/// `prices` and `liquidity` must already be sorted by timestamp.
pub fn build_features(
    candidate_id: &str,
    prices: &[PricePoint],
    liquidity: &[LiquidityPoint],
) -> Vec<FeaturePoint> {
    let liq_timestamps: Vec<i64> = liquidity.iter().map(|l| l.timestamp_ms).collect();

    // Earliest activity across both series anchors the token lifetime.
    let first_ts = match (prices.first(), liquidity.first()) {
        (Some(p), Some(l)) => Some(p.timestamp_ms.min(l.timestamp_ms)),
        (Some(p), None) => Some(p.timestamp_ms),
        (None, Some(l)) => Some(l.timestamp_ms),
        (None, None) => None,
    };

    let mut out = Vec::with_capacity(prices.len());
    let mut prev: Option<&PricePoint> = None;
    let mut prev_velocity: Option<f64> = None;

    for point in prices {
        let mut feature = FeaturePoint {
            candidate_id: candidate_id.to_string(),
            timestamp_ms: point.timestamp_ms,
            ..FeaturePoint::default()
        };

        if let Some(prev_point) = prev {
            let dt = point.timestamp_ms - prev_point.timestamp_ms;
            feature.price_delta = Some(point.price - prev_point.price);
            feature.last_swap_interval_ms = Some(dt);
            if dt != 0 {
                let velocity = (point.price - prev_point.price) / dt as f64;
                feature.price_velocity = Some(velocity);
                if let Some(pv) = prev_velocity {
                    feature.price_acceleration = Some((velocity - pv) / dt as f64);
                }
            }
        }

        // Liquidity delta only where the price timestamp hits a liquidity
        // row exactly and a strictly earlier liquidity row exists.
        if let Ok(idx) = liq_timestamps.binary_search(&point.timestamp_ms) {
            if idx > 0 {
                let current = &liquidity[idx];
                let previous = &liquidity[idx - 1];
                let dt = current.timestamp_ms - previous.timestamp_ms;
                let delta = current.liquidity - previous.liquidity;
                feature.liquidity_delta = Some(delta);
                if dt != 0 {
                    feature.liquidity_velocity = Some(delta / dt as f64);
                }
            }
        }

        // Distance to the last liquidity timestamp strictly before t, over
        // the full liquidity list (not just price-matching timestamps).
        let before = liq_timestamps.partition_point(|&ts| ts < point.timestamp_ms);
        if before > 0 {
            feature.last_liq_event_interval_ms =
                Some(point.timestamp_ms - liq_timestamps[before - 1]);
        }

        if let Some(first) = first_ts {
            feature.token_lifetime_ms = Some(point.timestamp_ms - first);
        }

        prev_velocity = feature.price_velocity;
        prev = Some(point);
        out.push(feature);
    }
    out
}
