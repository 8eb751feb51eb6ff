//! Content-Addressed Identifiers
//!
//! Candidate and trade identifiers are SHA-256 content hashes over a fixed
//! field ordering with an explicit separator. Content addressing lets any
//! machine re-derive the same identifier from the same raw event, so partial
//! replays and de-duplication work without a central ID issuer.
//!
//! # Identity Contracts
//!
//! ```text
//! candidate_id = SHA256(mint | pool | source | tx_signature | event_index | slot)
//! trade_id     = SHA256(candidate_id | strategy_id | scenario_id | entry_signal_time)
//! ```
//!
//! `pool` is the empty string when absent. Changing any single input field
//! MUST change the output hash; this is covered by tests below.

use sha2::{Digest, Sha256};

/// Field separator inside hashed identity payloads.
///
/// The separator is part of the identity contract: moving a character
/// between adjacent fields must change the hash.
pub const ID_FIELD_SEPARATOR: &str = "|";

/// Compute the candidate identifier for a discovery event.
///
/// Returns a 64-character lowercase hex string.
pub fn candidate_id(
    mint: &str,
    pool: Option<&str>,
    source: &str,
    tx_signature: &str,
    event_index: u32,
    slot: u64,
) -> String {
    let payload = [
        mint,
        pool.unwrap_or(""),
        source,
        tx_signature,
        &event_index.to_string(),
        &slot.to_string(),
    ]
    .join(ID_FIELD_SEPARATOR);

    sha256_hex(payload.as_bytes())
}

/// Compute the trade identifier for a simulated trade.
///
/// `entry_signal_time` is Unix milliseconds UTC.
pub fn trade_id(
    candidate_id: &str,
    strategy_id: &str,
    scenario_id: &str,
    entry_signal_time: i64,
) -> String {
    let payload = [
        candidate_id,
        strategy_id,
        scenario_id,
        &entry_signal_time.to_string(),
    ]
    .join(ID_FIELD_SEPARATOR);

    sha256_hex(payload.as_bytes())
}

/// SHA-256 of raw bytes as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_id() -> String {
        candidate_id("mintA", Some("poolA"), "NEW_TOKEN", "sig1", 0, 100)
    }

    #[test]
    fn candidate_id_is_64_hex_chars() {
        let id = base_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn candidate_id_is_stable() {
        assert_eq!(base_id(), base_id());
    }

    #[test]
    fn candidate_id_changes_on_every_field() {
        let base = base_id();
        let variants = [
            candidate_id("mintB", Some("poolA"), "NEW_TOKEN", "sig1", 0, 100),
            candidate_id("mintA", Some("poolB"), "NEW_TOKEN", "sig1", 0, 100),
            candidate_id("mintA", Some("poolA"), "ACTIVE_TOKEN", "sig1", 0, 100),
            candidate_id("mintA", Some("poolA"), "NEW_TOKEN", "sig2", 0, 100),
            candidate_id("mintA", Some("poolA"), "NEW_TOKEN", "sig1", 1, 100),
            candidate_id("mintA", Some("poolA"), "NEW_TOKEN", "sig1", 0, 101),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn absent_pool_hashes_as_empty_string() {
        let with_none = candidate_id("mintA", None, "NEW_TOKEN", "sig1", 0, 100);
        let with_empty = candidate_id("mintA", Some(""), "NEW_TOKEN", "sig1", 0, 100);
        assert_eq!(with_none, with_empty);
        assert_ne!(with_none, base_id());
    }

    #[test]
    fn trade_id_changes_on_entry_time() {
        let a = trade_id("cand", "strat", "realistic", 1_000);
        let b = trade_id("cand", "strat", "realistic", 1_001);
        assert_ne!(a, b);
    }

    #[test]
    fn separator_prevents_field_bleed() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = candidate_id("ab", Some("c"), "NEW_TOKEN", "sig", 0, 1);
        let b = candidate_id("a", Some("bc"), "NEW_TOKEN", "sig", 0, 1);
        assert_ne!(a, b);
    }
}
