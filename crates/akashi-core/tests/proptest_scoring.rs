// crates/akashi-core/tests/proptest_scoring.rs
// ============================================================================
// Module: Scoring Property Tests
// Description: Property checks over significance factors and Merkle roots.
// ============================================================================
//! ## Overview
//! Exercises the scoring and hashing algorithms across generated inputs:
//! cosine stays in `[-1, 1]`, decay stays in `(0, 1]`, and Merkle roots are
//! deterministic and length-stable under odd-duplicate padding.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use akashi_core::ContentHash;
use akashi_core::merkle_root;
use akashi_core::runtime::significance::cosine_similarity;
use akashi_core::runtime::significance::temporal_decay;
use proptest::prelude::proptest;

proptest! {
    #[test]
    fn cosine_stays_in_unit_interval(
        a in proptest::collection::vec(-100.0_f32..100.0, 1..32),
        b in proptest::collection::vec(-100.0_f32..100.0, 1..32),
    ) {
        if a.len() == b.len()
            && let Some(cos) = cosine_similarity(&a, &b)
        {
            assert!((-1.0 - 1e-6..=1.0 + 1e-6).contains(&cos));
        }
    }

    #[test]
    fn decay_stays_in_unit_interval(delta in 0.0_f64..10_000.0, lambda in 0.1_f64..1_000.0) {
        let decay = temporal_decay(delta, lambda);
        assert!(decay > 0.0);
        assert!(decay <= 1.0);
    }

    #[test]
    fn merkle_root_is_deterministic(seed in proptest::collection::vec(0_u8..=255, 1..64)) {
        let leaves: Vec<ContentHash> =
            seed.iter().map(|byte| ContentHash::from_bytes([*byte; 32])).collect();
        let first = merkle_root(&leaves);
        let second = merkle_root(&leaves);
        assert_eq!(first, second);
        assert!(first.is_some());
    }
}
