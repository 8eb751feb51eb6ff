//! Sufficiency checker tests over seeded in-memory datasets.

use crate::cancel::CancellationToken;
use crate::events::{
    CandidateSource, LiquidityEvent, LiquidityEventKind, SwapEvent, SwapSide, TokenCandidate,
};
use crate::storage::Stores;
use crate::sufficiency::{
    longest_contiguous_discovery_run, SufficiencyCheck, SufficiencyChecker,
    MIN_NEW_TOKEN_CANDIDATES,
};

const DAY_MS: i64 = 86_400_000;
/// 2023-01-01T00:00:00Z, a fixed anchor for fabricated timestamps.
const EPOCH: i64 = 1_672_531_200_000;

fn seed_complete_candidate(stores: &Stores, index: usize, discovered_at: i64) -> String {
    let candidate = TokenCandidate::from_discovery(
        CandidateSource::NewToken,
        format!("mint{index}"),
        None,
        format!("disc{index}"),
        0,
        index as u64,
        discovered_at,
    );
    let id = candidate.candidate_id.clone();
    stores.candidates.insert(candidate).unwrap();

    stores
        .swaps
        .insert(SwapEvent {
            candidate_id: id.clone(),
            tx_signature: format!("swap{index}"),
            event_index: 0,
            slot: index as u64,
            timestamp_ms: discovered_at,
            side: SwapSide::Buy,
            amount_in: 1.0,
            amount_out: 1.0,
            price: 1.0,
        })
        .unwrap();
    stores
        .liquidity_events
        .insert(LiquidityEvent {
            candidate_id: id.clone(),
            tx_signature: format!("liq{index}"),
            event_index: 0,
            slot: index as u64,
            timestamp_ms: discovered_at,
            event_type: LiquidityEventKind::Add,
            amount_token: 1.0,
            amount_quote: 1.0,
            liquidity_after: 100.0,
        })
        .unwrap();
    id
}

/// Dataset that satisfies all six predicates: 300 NEW_TOKEN candidates
/// spread across 15 consecutive UTC days.
fn sufficient_stores() -> Stores {
    let stores = Stores::in_memory();
    for i in 0..MIN_NEW_TOKEN_CANDIDATES {
        let day = (i % 15) as i64;
        seed_complete_candidate(&stores, i, EPOCH + day * DAY_MS + i as i64);
    }
    stores
}

#[test]
fn sufficient_dataset_passes_all_checks() {
    let report = SufficiencyChecker::new(sufficient_stores())
        .check(&CancellationToken::new())
        .unwrap();
    assert!(report.passed, "findings: {:?}", report.messages);
    assert_eq!(report.checks.len(), 6);
    assert!(report.messages.is_empty());
}

#[test]
fn too_few_candidates_fails_check_one() {
    let stores = Stores::in_memory();
    for i in 0..10 {
        seed_complete_candidate(&stores, i, EPOCH + (i % 15) as i64 * DAY_MS);
    }
    let report = SufficiencyChecker::new(stores)
        .check(&CancellationToken::new())
        .unwrap();
    assert!(!report.passed);
    let check = report
        .checks
        .iter()
        .find(|c| c.check == SufficiencyCheck::NewTokenCandidateCount)
        .unwrap();
    assert!(!check.passed);
    assert_eq!(check.observed, "10");
}

#[test]
fn discovery_gap_breaks_uptime() {
    let stores = Stores::in_memory();
    // Plenty of data volume, but discoveries cluster on 6 consecutive
    // days followed by every-other-day stragglers.
    for i in 0..MIN_NEW_TOKEN_CANDIDATES {
        let day = match i % 15 {
            d if d < 6 => d as i64,
            d => 7 + (d as i64 - 6) * 2,
        };
        seed_complete_candidate(&stores, i, EPOCH + day * DAY_MS + i as i64);
    }
    let report = SufficiencyChecker::new(stores)
        .check(&CancellationToken::new())
        .unwrap();
    let check = report
        .checks
        .iter()
        .find(|c| c.check == SufficiencyCheck::DiscoveryUptime)
        .unwrap();
    assert!(!check.passed);
}

#[test]
fn candidate_without_liquidity_reports_missing_kind() {
    let stores = sufficient_stores();
    // One extra candidate with a swap but no liquidity event.
    let candidate = TokenCandidate::from_discovery(
        CandidateSource::NewToken,
        "mint_no_liq",
        None,
        "disc_no_liq",
        0,
        99_999,
        EPOCH,
    );
    let id = candidate.candidate_id.clone();
    stores.candidates.insert(candidate).unwrap();
    stores
        .swaps
        .insert(SwapEvent {
            candidate_id: id.clone(),
            tx_signature: "swap_no_liq".into(),
            event_index: 0,
            slot: 99_999,
            timestamp_ms: EPOCH,
            side: SwapSide::Buy,
            amount_in: 1.0,
            amount_out: 1.0,
            price: 1.0,
        })
        .unwrap();

    let report = SufficiencyChecker::new(stores)
        .check(&CancellationToken::new())
        .unwrap();
    assert!(!report.passed);
    let finding = report
        .messages
        .iter()
        .find(|m| m.check == SufficiencyCheck::EventCompleteness)
        .unwrap();
    assert_eq!(finding.candidate_id.as_deref(), Some(id.as_str()));
    assert!(finding.message.contains("liquidity"));
    assert!(!finding.message.contains("swap and"));
}

#[test]
fn messages_are_sorted_by_candidate_then_check() {
    let stores = Stores::in_memory();
    // Two incomplete candidates and too little of everything else: the
    // report carries several findings whose order must be stable.
    for i in 0..2 {
        let candidate = TokenCandidate::from_discovery(
            CandidateSource::NewToken,
            format!("bare{i}"),
            None,
            format!("bare{i}"),
            0,
            i as u64,
            EPOCH,
        );
        stores.candidates.insert(candidate).unwrap();
    }

    let report = SufficiencyChecker::new(stores)
        .check(&CancellationToken::new())
        .unwrap();
    let keys: Vec<(String, u8)> = report
        .messages
        .iter()
        .map(|m| (m.candidate_id.clone().unwrap_or_default(), m.check.index()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn uptime_run_length_math() {
    // Three consecutive days, a gap, two consecutive days -> 3.
    let stamps = [
        EPOCH,
        EPOCH + DAY_MS,
        EPOCH + 2 * DAY_MS,
        EPOCH + 5 * DAY_MS,
        EPOCH + 6 * DAY_MS,
    ];
    assert_eq!(longest_contiguous_discovery_run(stamps.into_iter()), 3);
    // Several discoveries on the same day count once.
    let same_day = [EPOCH, EPOCH + 1, EPOCH + 2];
    assert_eq!(longest_contiguous_discovery_run(same_day.into_iter()), 1);
    assert_eq!(longest_contiguous_discovery_run(std::iter::empty()), 0);
}
