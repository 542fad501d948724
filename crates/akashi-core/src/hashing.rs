// crates/akashi-core/src/hashing.rs
// ============================================================================
// Module: Akashi Content Hashing
// Description: Canonical decision content hashes and Merkle batch roots.
// Purpose: Provide deterministic, tamper-evident digests over decision content.
// Dependencies: serde, sha2, subtle, time
// ============================================================================

//! ## Overview
//! The content hash covers the immutable fields of a decision in a fixed,
//! newline-joined canonical encoding. Recomputing the hash from a stored row
//! must reproduce the stored digest exactly; a mismatch is a fatal
//! tamper-evidence signal. Merkle roots aggregate batches of content hashes
//! for the integrity proof chain. Digest comparisons that gate security
//! decisions use constant-time equality.
//!
//! Canonical encoding, in order, joined by `\n`:
//! decision id (hyphenated UUID), decision type (verbatim), outcome,
//! confidence (shortest round-trip decimal form), reasoning, and
//! `valid_from` as RFC 3339 UTC with exactly six fractional digits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::identifiers::DecisionId;
use crate::core::identifiers::DecisionType;
use crate::core::time::format_micros;
use crate::core::time::truncate_micros;

// ============================================================================
// SECTION: Digest Type
// ============================================================================

/// SHA-256 digest with a lowercase hex wire form.
///
/// # Invariants
/// - Always exactly 32 bytes; the wire form is 64 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Compares two digests in constant time.
    #[must_use]
    pub fn ct_eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Malformed digest wire form.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    /// Wire form has the wrong length.
    #[error("digest must be 64 hex characters, got {0}")]
    Length(usize),
    /// Wire form contains a non-hex character.
    #[error("digest contains non-hex characters")]
    Encoding,
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 64 {
            return Err(HashParseError::Length(value.len()));
        }
        let mut bytes = [0_u8; 32];
        for (index, chunk) in value.as_bytes().chunks_exact(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|_| HashParseError::Encoding)?;
            bytes[index] = u8::from_str_radix(hex, 16).map_err(|_| HashParseError::Encoding)?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Content Hashing
// ============================================================================

/// Renders a confidence value in its canonical (shortest round-trip) form.
///
/// # Invariants
/// - Callers validate finiteness before hashing; non-finite inputs are
///   rejected at the draft validation boundary.
#[must_use]
pub fn canonical_confidence(confidence: f64) -> String {
    format!("{confidence}")
}

/// Computes the canonical content hash over a decision's immutable fields.
///
/// # Invariants
/// - `valid_from` is truncated to microseconds before encoding so recomputes
///   against stored rows reproduce the original digest.
#[must_use]
pub fn decision_content_hash(
    id: DecisionId,
    decision_type: &DecisionType,
    outcome: &str,
    confidence: f64,
    reasoning: &str,
    valid_from: OffsetDateTime,
) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(id.as_uuid().hyphenated().to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(decision_type.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(outcome.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_confidence(confidence).as_bytes());
    hasher.update(b"\n");
    hasher.update(reasoning.as_bytes());
    hasher.update(b"\n");
    hasher.update(format_micros(truncate_micros(valid_from)).as_bytes());
    ContentHash(hasher.finalize().into())
}

// ============================================================================
// SECTION: Merkle Roots
// ============================================================================

/// Hashes one pair of sibling nodes.
fn hash_pair(left: &ContentHash, right: &ContentHash) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    ContentHash(hasher.finalize().into())
}

/// Computes the Merkle root over a batch of content hashes.
///
/// Returns `None` for an empty batch. A single leaf is its own root. Odd
/// levels duplicate their last node before pairing.
#[must_use]
pub fn merkle_root(leaves: &[ContentHash]) -> Option<ContentHash> {
    if leaves.is_empty() {
        return None;
    }
    let mut level: Vec<ContentHash> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(hash_pair(left, right));
        }
        level = next;
    }
    level.into_iter().next()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::ContentHash;
    use super::canonical_confidence;
    use super::decision_content_hash;
    use super::merkle_root;
    use crate::core::identifiers::DecisionId;
    use crate::core::identifiers::DecisionType;

    /// Returns a fixed decision identifier for deterministic digests.
    fn fixed_id() -> DecisionId {
        DecisionId::from_uuid(Uuid::from_u128(0x1234_5678_9abc_def0))
    }

    #[test]
    fn hex_round_trip() {
        let digest = decision_content_hash(
            fixed_id(),
            &DecisionType::new("architecture"),
            "monolith",
            0.8,
            "simpler ops",
            OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp"),
        );
        let parsed: ContentHash = digest.to_hex().parse().expect("parse");
        assert_eq!(parsed, digest);
        assert!(parsed.ct_eq(&digest));
    }

    #[test]
    fn hash_is_stable_for_equal_inputs() {
        let when = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let a = decision_content_hash(
            fixed_id(),
            &DecisionType::new("caching"),
            "Redis",
            0.9,
            "latency",
            when,
        );
        let b = decision_content_hash(
            fixed_id(),
            &DecisionType::new("caching"),
            "Redis",
            0.9,
            "latency",
            when,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn hash_changes_with_any_field() {
        let when = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let base = decision_content_hash(
            fixed_id(),
            &DecisionType::new("caching"),
            "Redis",
            0.9,
            "latency",
            when,
        );
        let outcome = decision_content_hash(
            fixed_id(),
            &DecisionType::new("caching"),
            "Memcached",
            0.9,
            "latency",
            when,
        );
        let confidence = decision_content_hash(
            fixed_id(),
            &DecisionType::new("caching"),
            "Redis",
            0.8,
            "latency",
            when,
        );
        assert_ne!(base, outcome);
        assert_ne!(base, confidence);
    }

    #[test]
    fn confidence_uses_shortest_form() {
        assert_eq!(canonical_confidence(0.8), "0.8");
        assert_eq!(canonical_confidence(1.0), "1");
        assert_eq!(canonical_confidence(0.0), "0");
    }

    #[test]
    fn merkle_empty_is_none() {
        assert!(merkle_root(&[]).is_none());
    }

    #[test]
    fn merkle_single_leaf_is_root() {
        let leaf = ContentHash::from_bytes([7; 32]);
        assert_eq!(merkle_root(&[leaf]), Some(leaf));
    }

    #[test]
    fn merkle_odd_batch_duplicates_last() {
        let a = ContentHash::from_bytes([1; 32]);
        let b = ContentHash::from_bytes([2; 32]);
        let c = ContentHash::from_bytes([3; 32]);
        let root_three = merkle_root(&[a, b, c]).expect("root");
        let root_four = merkle_root(&[a, b, c, c]).expect("root");
        assert_eq!(root_three, root_four);
    }

    #[test]
    fn merkle_is_order_sensitive() {
        let a = ContentHash::from_bytes([1; 32]);
        let b = ContentHash::from_bytes([2; 32]);
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }
}
