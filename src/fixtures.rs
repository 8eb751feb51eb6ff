//! Deterministic Fixture Dataset
//!
//! Generates a complete raw dataset (candidates, swaps, liquidity events)
//! from a seeded LCG so the whole pipeline can run hermetically with
//! `--use-fixtures` and in tests. No RNG crate: the generator must yield
//! byte-identical datasets on every platform for a given seed.
//!
//! The default shape satisfies the sufficiency gate: 320 NEW_TOKEN
//! candidates spread over 15 consecutive UTC days, every candidate with
//! both swap and liquidity streams.

use crate::events::{
    CandidateSource, LiquidityEvent, LiquidityEventKind, SwapEvent, SwapSide, TokenCandidate,
};
use crate::storage::{StorageError, Stores};
use tracing::info;

const DAY_MS: i64 = 86_400_000;
/// 2023-01-01T00:00:00Z; fixture timestamps are anchored, never wall-clock.
const FIXTURE_EPOCH_MS: i64 = 1_672_531_200_000;

/// Simple LCG, same constants as the synthetic generators used for
/// zero-edge gate testing.
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    /// Uniform in [0, 1).
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn next_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// Fixture shape parameters.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub seed: u64,
    pub new_token_candidates: usize,
    pub active_token_candidates: usize,
    /// Consecutive UTC days discoveries are spread over.
    pub days: usize,
    /// Swaps per candidate.
    pub swaps_per_candidate: usize,
    /// Liquidity events per candidate.
    pub liquidity_events_per_candidate: usize,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            new_token_candidates: 320,
            active_token_candidates: 40,
            days: 15,
            swaps_per_candidate: 12,
            liquidity_events_per_candidate: 4,
        }
    }
}

/// Row counts loaded into the stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureSummary {
    pub candidates: usize,
    pub swaps: usize,
    pub liquidity_events: usize,
}

/// Generate the fixture dataset and load it into the raw stores.
pub fn load_fixtures(stores: &Stores, config: &FixtureConfig) -> Result<FixtureSummary, StorageError> {
    let mut rng = Lcg::new(config.seed);
    let mut summary = FixtureSummary::default();
    let mut slot = 1_000u64;

    let total = config.new_token_candidates + config.active_token_candidates;
    for index in 0..total {
        let source = if index < config.new_token_candidates {
            CandidateSource::NewToken
        } else {
            CandidateSource::ActiveToken
        };

        let day = (index % config.days) as i64;
        let offset_ms = (rng.next_f64() * 60_000.0) as i64;
        let discovered_at = FIXTURE_EPOCH_MS + day * DAY_MS + index as i64 * 2_000 + offset_ms;

        slot += 1;
        let candidate = TokenCandidate::from_discovery(
            source,
            format!("FixtureMint{index:05}"),
            Some(format!("FixturePool{index:05}")),
            format!("fixture_disc_{index:05}"),
            0,
            slot,
            discovered_at,
        );
        let candidate_id = candidate.candidate_id.clone();
        stores.candidates.insert(candidate)?;
        summary.candidates += 1;

        // Multiplicative price walk starting in a plausible micro-cap
        // range; clamped away from zero so returns stay finite.
        let mut price = rng.next_range(1e-5, 1e-3);
        let mut swaps = Vec::with_capacity(config.swaps_per_candidate);
        for n in 0..config.swaps_per_candidate {
            slot += 1;
            let step = rng.next_range(-0.12, 0.14);
            price = (price * (1.0 + step)).max(1e-9);
            let amount_out = rng.next_range(10.0, 5_000.0);
            swaps.push(SwapEvent {
                candidate_id: candidate_id.clone(),
                tx_signature: format!("fixture_swap_{index:05}_{n:03}"),
                event_index: 0,
                slot,
                timestamp_ms: discovered_at + n as i64 * 45_000,
                side: if rng.next_f64() < 0.55 {
                    SwapSide::Buy
                } else {
                    SwapSide::Sell
                },
                amount_in: amount_out * price,
                amount_out,
                price,
            });
        }
        summary.swaps += swaps.len();
        stores.swaps.insert_bulk(swaps)?;

        let mut liquidity = rng.next_range(5_000.0, 50_000.0);
        let mut events = Vec::with_capacity(config.liquidity_events_per_candidate);
        for n in 0..config.liquidity_events_per_candidate {
            slot += 1;
            let add = rng.next_f64() < 0.6;
            let amount_quote = rng.next_range(100.0, 2_000.0);
            liquidity = if add {
                liquidity + amount_quote
            } else {
                (liquidity - amount_quote).max(100.0)
            };
            events.push(LiquidityEvent {
                candidate_id: candidate_id.clone(),
                tx_signature: format!("fixture_liq_{index:05}_{n:03}"),
                event_index: 0,
                slot,
                timestamp_ms: discovered_at + n as i64 * 120_000,
                event_type: if add {
                    LiquidityEventKind::Add
                } else {
                    LiquidityEventKind::Remove
                },
                amount_token: amount_quote / price.max(1e-9),
                amount_quote,
                liquidity_after: liquidity,
            });
        }
        summary.liquidity_events += events.len();
        stores.liquidity_events.insert_bulk(events)?;
    }

    info!(
        candidates = summary.candidates,
        swaps = summary.swaps,
        liquidity_events = summary.liquidity_events,
        seed = config.seed,
        "fixture dataset loaded"
    );
    Ok(summary)
}
