//! Outcome Hashing
//!
//! Deterministic SHA-256 digests for:
//! - Settlement outcome digests submitted to the ledger
//! - Snapshot comparison in determinism checks

use serde::Serialize;
use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type OutcomeHash = [u8; 32];

/// Domain separator for settlement digests.
pub const OUTCOME_DOMAIN: &[u8] = b"BITARENA_OUTCOME_V1";

/// Deterministic hasher with a domain separator.
///
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for match outcomes.
    pub fn for_outcome() -> Self {
        Self::new(OUTCOME_DOMAIN)
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u32(value.len() as u32);
        self.hasher.update(value.as_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> OutcomeHash {
        self.hasher.finalize().into()
    }
}

/// Canonical JSON encoding: object keys sorted at every depth.
///
/// Going through `serde_json::Value` sorts keys, since its map type is
/// ordered by key.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let tree = serde_json::to_value(value)?;
    serde_json::to_vec(&tree)
}

/// Digest of a finished match: winner plus canonical final state.
pub fn outcome_digest<T: Serialize>(
    match_id: &str,
    winner: &str,
    final_state: &T,
) -> serde_json::Result<OutcomeHash> {
    let body = canonical_json(final_state)?;

    let mut hasher = StateHasher::for_outcome();
    hasher.update_str(match_id);
    hasher.update_str(winner);
    hasher.update_bytes(&body);
    Ok(hasher.finalize())
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> OutcomeHash {
    let mut hasher = StateHasher::new(domain);
    hasher.update_bytes(data);
    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_hasher_determinism() {
        let mut h1 = StateHasher::for_outcome();
        h1.update_u32(42);
        h1.update_str("winner");

        let mut h2 = StateHasher::for_outcome();
        h2.update_u32(42);
        h2.update_str("winner");

        assert_eq!(h1.finalize(), h2.finalize());
    }

    #[test]
    fn test_domain_separation() {
        assert_ne!(hash_with_domain(b"A", b"data"), hash_with_domain(b"B", b"data"));
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let mut map = HashMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("mid", 3);
        let bytes = canonical_json(&map).unwrap();
        assert_eq!(bytes, br#"{"alpha":2,"mid":3,"zeta":1}"#.to_vec());
    }

    #[test]
    fn test_outcome_digest_independent_of_insertion_order() {
        let mut a = HashMap::new();
        a.insert("p1".to_string(), 3);
        a.insert("p2".to_string(), 5);

        let mut b = HashMap::new();
        b.insert("p2".to_string(), 5);
        b.insert("p1".to_string(), 3);

        assert_eq!(
            outcome_digest("m", "p2", &a).unwrap(),
            outcome_digest("m", "p2", &b).unwrap()
        );
    }

    #[test]
    fn test_outcome_digest_binds_winner() {
        let state = vec![1, 2, 3];
        assert_ne!(
            outcome_digest("m", "p1", &state).unwrap(),
            outcome_digest("m", "p2", &state).unwrap()
        );
    }
}
