// crates/akashi-core/src/runtime/claims.rs
// ============================================================================
// Module: Outcome Claim Splitting
// Description: Sentence-level claim extraction from decision outcomes.
// Purpose: Feed claim-level contradiction detection with bounded fragments.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Multi-topic outcomes can agree in aggregate while disagreeing on one
//! specific claim. Claim splitting cuts an outcome into sentence-level
//! fragments so each can carry its own embedding. Splitting is conservative:
//! fragments below the minimum length are dropped, and the count is capped.

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum fragment length in characters; shorter fragments are dropped.
pub const MIN_CLAIM_CHARS: usize = 12;

/// Default cap on extracted claims per outcome.
pub const DEFAULT_MAX_CLAIMS: usize = 16;

// ============================================================================
// SECTION: Splitting
// ============================================================================

/// Splits an outcome into sentence-level claims.
///
/// Sentences end at `.`, `!`, or `?` followed by whitespace or end of input.
/// Fragments are trimmed; fragments shorter than [`MIN_CLAIM_CHARS`] are
/// dropped; at most `max_claims` fragments are returned, in order.
#[must_use]
pub fn split_claims(outcome: &str, max_claims: usize) -> Vec<String> {
    let mut claims = Vec::new();
    let mut start = 0;
    let bytes = outcome.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        let is_terminator = byte == b'.' || byte == b'!' || byte == b'?';
        let at_boundary = is_terminator
            && bytes.get(index + 1).is_none_or(|next| next.is_ascii_whitespace());
        if at_boundary {
            push_claim(&mut claims, &outcome[start..=index], max_claims);
            start = index + 1;
        }
        index += 1;
        if claims.len() >= max_claims {
            return claims;
        }
    }
    if start < outcome.len() {
        push_claim(&mut claims, &outcome[start..], max_claims);
    }
    claims
}

/// Trims and appends one candidate fragment, enforcing the length floor.
fn push_claim(claims: &mut Vec<String>, fragment: &str, max_claims: usize) {
    if claims.len() >= max_claims {
        return;
    }
    let trimmed = fragment.trim();
    if trimmed.len() >= MIN_CLAIM_CHARS {
        claims.push(trimmed.to_string());
    }
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

    use super::DEFAULT_MAX_CLAIMS;
    use super::split_claims;

    #[test]
    fn splits_on_sentence_boundaries() {
        let outcome = "Use Redis for caching. Keep Postgres as the primary store.";
        let claims = split_claims(outcome, DEFAULT_MAX_CLAIMS);
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0], "Use Redis for caching.");
        assert_eq!(claims[1], "Keep Postgres as the primary store.");
    }

    #[test]
    fn keeps_unterminated_tail() {
        let outcome = "Use Redis for caching. Keep Postgres for durability";
        let claims = split_claims(outcome, DEFAULT_MAX_CLAIMS);
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[1], "Keep Postgres for durability");
    }

    #[test]
    fn drops_short_fragments() {
        let outcome = "Yes. Adopt the queue-based ingestion design.";
        let claims = split_claims(outcome, DEFAULT_MAX_CLAIMS);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0], "Adopt the queue-based ingestion design.");
    }

    #[test]
    fn does_not_split_inside_version_numbers() {
        let outcome = "Pin sqlx to 0.7.4 across the workspace for driver stability.";
        let claims = split_claims(outcome, DEFAULT_MAX_CLAIMS);
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn respects_the_cap() {
        let outcome = "First claim sentence. Second claim sentence. Third claim sentence.";
        let claims = split_claims(outcome, 2);
        assert_eq!(claims.len(), 2);
    }

    #[test]
    fn empty_outcome_yields_nothing() {
        assert!(split_claims("", DEFAULT_MAX_CLAIMS).is_empty());
    }
}
