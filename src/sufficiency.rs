//! Data Sufficiency Checks
//!
//! Six predicates gate the decision stage. All must hold; each failure
//! produces a human-readable integrity message, and messages are emitted
//! in a deterministic order (candidate id, then check index) so reports
//! diff cleanly across runs.
//!
//! The checker is constructed over the full store set - there is no
//! "unwired" state in which the missing-events check silently passes.

use crate::cancel::CancellationToken;
use crate::events::CandidateSource;
use crate::replay::ReplayEngine;
use crate::storage::{StorageError, Stores};
use chrono::{DateTime, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Minimum distinct NEW_TOKEN candidates.
pub const MIN_NEW_TOKEN_CANDIDATES: usize = 300;
/// Required contiguous discovery uptime, UTC calendar days.
pub const REQUIRED_UPTIME_DAYS: usize = 7;
/// Required backtest data coverage, days.
pub const REQUIRED_COVERAGE_DAYS: i64 = 14;

const MS_PER_DAY: i64 = 86_400_000;

/// The six sufficiency predicates, in check-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SufficiencyCheck {
    NewTokenCandidateCount = 1,
    DiscoveryUptime = 2,
    BacktestCoverage = 3,
    DuplicateCandidateIds = 4,
    EventCompleteness = 5,
    Replayability = 6,
}

impl SufficiencyCheck {
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NewTokenCandidateCount => "new_token_candidate_count",
            Self::DiscoveryUptime => "discovery_uptime",
            Self::BacktestCoverage => "backtest_coverage",
            Self::DuplicateCandidateIds => "duplicate_candidate_ids",
            Self::EventCompleteness => "event_completeness",
            Self::Replayability => "replayability",
        }
    }
}

/// One failure finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityMessage {
    pub check: SufficiencyCheck,
    /// Candidate the finding concerns; empty for dataset-level findings.
    pub candidate_id: Option<String>,
    pub message: String,
}

/// Pass/fail plus observed value for one predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: SufficiencyCheck,
    pub passed: bool,
    pub observed: String,
    pub threshold: String,
}

/// Complete sufficiency verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SufficiencyReport {
    pub passed: bool,
    pub checks: Vec<CheckResult>,
    pub messages: Vec<IntegrityMessage>,
}

/// Checker failures (storage only; a failing predicate is a report, not
/// an error).
#[derive(Debug)]
pub enum SufficiencyError {
    Storage(StorageError),
    Cancelled,
}

impl std::fmt::Display for SufficiencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "sufficiency storage error: {}", e),
            Self::Cancelled => write!(f, "sufficiency check cancelled"),
        }
    }
}

impl std::error::Error for SufficiencyError {}

impl From<StorageError> for SufficiencyError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Six-predicate sufficiency checker.
pub struct SufficiencyChecker {
    stores: Stores,
}

impl SufficiencyChecker {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Run every predicate and assemble the deterministic report.
    pub fn check(&self, cancel: &CancellationToken) -> Result<SufficiencyReport, SufficiencyError> {
        let candidates = self.stores.candidates.all()?;
        let mut checks = Vec::with_capacity(6);
        let mut messages = Vec::new();

        // 1. NEW_TOKEN candidate volume.
        let new_token_count = candidates
            .iter()
            .filter(|c| c.source == CandidateSource::NewToken)
            .count();
        let passed = new_token_count >= MIN_NEW_TOKEN_CANDIDATES;
        if !passed {
            messages.push(IntegrityMessage {
                check: SufficiencyCheck::NewTokenCandidateCount,
                candidate_id: None,
                message: format!(
                    "only {} NEW_TOKEN candidates discovered, need {}",
                    new_token_count, MIN_NEW_TOKEN_CANDIDATES
                ),
            });
        }
        checks.push(CheckResult {
            check: SufficiencyCheck::NewTokenCandidateCount,
            passed,
            observed: new_token_count.to_string(),
            threshold: format!(">= {}", MIN_NEW_TOKEN_CANDIDATES),
        });

        // 2. Contiguous discovery uptime by UTC calendar day.
        let uptime_days = longest_contiguous_discovery_run(
            candidates.iter().map(|c| c.discovered_at),
        );
        let passed = uptime_days >= REQUIRED_UPTIME_DAYS;
        if !passed {
            messages.push(IntegrityMessage {
                check: SufficiencyCheck::DiscoveryUptime,
                candidate_id: None,
                message: format!(
                    "longest contiguous discovery run is {} UTC days, need {}",
                    uptime_days, REQUIRED_UPTIME_DAYS
                ),
            });
        }
        checks.push(CheckResult {
            check: SufficiencyCheck::DiscoveryUptime,
            passed,
            observed: format!("{} days", uptime_days),
            threshold: format!(">= {} days", REQUIRED_UPTIME_DAYS),
        });

        // 3. Backtest coverage: series span, falling back to raw events.
        let coverage_ms = self.coverage_span_ms()?;
        let coverage_days = coverage_ms.map(|ms| ms / MS_PER_DAY).unwrap_or(0);
        let passed = coverage_days >= REQUIRED_COVERAGE_DAYS;
        if !passed {
            messages.push(IntegrityMessage {
                check: SufficiencyCheck::BacktestCoverage,
                candidate_id: None,
                message: format!(
                    "backtest data covers {} days, need {}",
                    coverage_days, REQUIRED_COVERAGE_DAYS
                ),
            });
        }
        checks.push(CheckResult {
            check: SufficiencyCheck::BacktestCoverage,
            passed,
            observed: format!("{} days", coverage_days),
            threshold: format!(">= {} days", REQUIRED_COVERAGE_DAYS),
        });

        // 4. Duplicate candidate ids. The stores reject duplicates at
        // insert, so anything found here is store corruption.
        let mut seen = std::collections::BTreeSet::new();
        let mut duplicates = Vec::new();
        for candidate in &candidates {
            if !seen.insert(candidate.candidate_id.as_str()) {
                duplicates.push(candidate.candidate_id.clone());
            }
        }
        let passed = duplicates.is_empty();
        for duplicate in &duplicates {
            messages.push(IntegrityMessage {
                check: SufficiencyCheck::DuplicateCandidateIds,
                candidate_id: Some(duplicate.clone()),
                message: format!("duplicate candidate_id {}", duplicate),
            });
        }
        checks.push(CheckResult {
            check: SufficiencyCheck::DuplicateCandidateIds,
            passed,
            observed: duplicates.len().to_string(),
            threshold: "= 0".to_string(),
        });

        // 5. Event completeness: each candidate needs at least one swap
        // and one liquidity event.
        let mut incomplete = 0usize;
        for candidate in &candidates {
            if cancel.is_cancelled() {
                return Err(SufficiencyError::Cancelled);
            }
            let swaps = self.stores.swaps.get_by_candidate_id(&candidate.candidate_id)?;
            let liquidity = self
                .stores
                .liquidity_events
                .get_by_candidate_id(&candidate.candidate_id)?;
            let mut missing = Vec::new();
            if swaps.is_empty() {
                missing.push("swap");
            }
            if liquidity.is_empty() {
                missing.push("liquidity");
            }
            if !missing.is_empty() {
                incomplete += 1;
                messages.push(IntegrityMessage {
                    check: SufficiencyCheck::EventCompleteness,
                    candidate_id: Some(candidate.candidate_id.clone()),
                    message: format!(
                        "candidate {} is missing {} events",
                        candidate.candidate_id,
                        missing.join(" and ")
                    ),
                });
            }
        }
        checks.push(CheckResult {
            check: SufficiencyCheck::EventCompleteness,
            passed: incomplete == 0,
            observed: format!("{} incomplete candidates", incomplete),
            threshold: "= 0".to_string(),
        });

        // 6. Replayability: a no-op replay over every candidate's merged
        // stream must succeed.
        let engine = ReplayEngine::new(
            self.stores.swaps.clone(),
            self.stores.liquidity_events.clone(),
        );
        let mut replay_failures = 0usize;
        for candidate in &candidates {
            if cancel.is_cancelled() {
                return Err(SufficiencyError::Cancelled);
            }
            if let Err(e) = engine.run_all(&candidate.candidate_id, |_| {}) {
                replay_failures += 1;
                messages.push(IntegrityMessage {
                    check: SufficiencyCheck::Replayability,
                    candidate_id: Some(candidate.candidate_id.clone()),
                    message: format!("replay failed for {}: {}", candidate.candidate_id, e),
                });
            }
        }
        let replayable = candidates.len() - replay_failures;
        checks.push(CheckResult {
            check: SufficiencyCheck::Replayability,
            passed: replay_failures == 0,
            observed: format!("{}/{} candidates replayable", replayable, candidates.len()),
            threshold: "100%".to_string(),
        });

        // Deterministic message order: candidate id, then check index.
        messages.sort_by(|a, b| {
            a.candidate_id
                .as_deref()
                .unwrap_or("")
                .cmp(b.candidate_id.as_deref().unwrap_or(""))
                .then_with(|| a.check.index().cmp(&b.check.index()))
        });

        let passed = checks.iter().all(|c| c.passed);
        if passed {
            info!("sufficiency: all {} checks passed", checks.len());
        } else {
            warn!(
                failed = checks.iter().filter(|c| !c.passed).count(),
                findings = messages.len(),
                "sufficiency: checks failed"
            );
        }

        Ok(SufficiencyReport {
            passed,
            checks,
            messages,
        })
    }

    /// Combined span of the normalized series; raw event span when both
    /// series are empty.
    fn coverage_span_ms(&self) -> Result<Option<i64>, StorageError> {
        let price_range = self.stores.prices.get_global_time_range()?;
        let liquidity_range = self.stores.liquidity_series.get_global_time_range()?;

        let combined = combine_ranges(price_range, liquidity_range);
        if let Some((min, max)) = combined {
            return Ok(Some(max - min));
        }

        let swap_range = self.stores.swaps.get_global_time_range()?;
        let liq_event_range = self.stores.liquidity_events.get_global_time_range()?;
        Ok(combine_ranges(swap_range, liq_event_range).map(|(min, max)| max - min))
    }
}

fn combine_ranges(a: Option<(i64, i64)>, b: Option<(i64, i64)>) -> Option<(i64, i64)> {
    match (a, b) {
        (Some((amin, amax)), Some((bmin, bmax))) => Some((amin.min(bmin), amax.max(bmax))),
        (Some(r), None) | (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

/// Longest run of consecutive UTC calendar days that each saw at least
/// one discovery.
pub fn longest_contiguous_discovery_run(discovered_at: impl Iterator<Item = i64>) -> usize {
    let mut days: Vec<NaiveDate> = discovered_at
        .filter_map(|ms| DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive()))
        .collect();
    days.sort();
    days.dedup();

    let mut longest = 0usize;
    let mut current = 0usize;
    let mut prev: Option<NaiveDate> = None;
    for day in days {
        current = match prev {
            Some(p) if p.checked_add_days(Days::new(1)) == Some(day) => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        prev = Some(day);
    }
    longest
}
