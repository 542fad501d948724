// crates/akashi-core/src/runtime/significance.rs
// ============================================================================
// Module: Conflict Significance Scoring
// Description: Pure scalar scoring for candidate conflict pairs.
// Purpose: Combine topic similarity, outcome divergence, decay, and confidence.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Significance scoring is the cheap stage of conflict detection. For a
//! target/candidate pair it combines four factors:
//! `significance = topic_similarity * outcome_divergence * temporal_decay *
//! confidence_weight`, where decay is `1 / (1 + delta_days / lambda)` and
//! the confidence weight is the minimum of the two confidences. All
//! functions are pure and deterministic; I/O stays with the scorer.

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default significance threshold below which a pair is skipped.
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 0.30;

/// Default temporal decay half-scale in days.
pub const DEFAULT_DECAY_LAMBDA_DAYS: f64 = 30.0;

// ============================================================================
// SECTION: Vector Math
// ============================================================================

/// Computes the cosine similarity of two vectors.
///
/// Returns `None` on dimension mismatch, empty input, or a zero-norm vector.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Computes outcome divergence from an outcome cosine similarity.
///
/// # Invariants
/// - Result lies in `[0, 2]` and is clamped at zero.
#[must_use]
pub fn outcome_divergence(outcome_cosine: f64) -> f64 {
    (1.0 - outcome_cosine).max(0.0)
}

/// Computes the temporal decay factor for a pair separated by `delta_days`.
///
/// # Invariants
/// - Result lies in `(0, 1]` for non-negative deltas and positive lambda.
#[must_use]
pub fn temporal_decay(delta_days: f64, lambda_days: f64) -> f64 {
    let delta = delta_days.max(0.0);
    let lambda = if lambda_days > 0.0 { lambda_days } else { DEFAULT_DECAY_LAMBDA_DAYS };
    1.0 / (1.0 + delta / lambda)
}

/// Computes the confidence weight for a pair.
#[must_use]
pub fn confidence_weight(confidence_a: f64, confidence_b: f64) -> f64 {
    confidence_a.min(confidence_b)
}

// ============================================================================
// SECTION: Significance
// ============================================================================

/// Inputs to significance scoring for one candidate pair.
///
/// # Invariants
/// - Embedding slices are non-empty and dimension-matched per side.
#[derive(Debug, Clone, Copy)]
pub struct SignificanceInputs<'a> {
    /// Target decision embedding.
    pub target_embedding: &'a [f32],
    /// Candidate decision embedding.
    pub candidate_embedding: &'a [f32],
    /// Target outcome embedding.
    pub target_outcome: &'a [f32],
    /// Candidate outcome embedding.
    pub candidate_outcome: &'a [f32],
    /// Target confidence.
    pub target_confidence: f64,
    /// Candidate confidence.
    pub candidate_confidence: f64,
    /// Absolute age difference between the decisions in days.
    pub delta_days: f64,
    /// Decay half-scale in days.
    pub lambda_days: f64,
}

/// Factor-by-factor significance breakdown persisted with the conflict row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignificanceBreakdown {
    /// Cosine similarity of the decision embeddings.
    pub topic_similarity: f64,
    /// Divergence of the outcome embeddings.
    pub outcome_divergence: f64,
    /// Temporal decay factor.
    pub temporal_decay: f64,
    /// Minimum of the two confidences.
    pub confidence_weight: f64,
    /// Combined significance score.
    pub significance: f64,
}

/// Scores one candidate pair.
///
/// Returns `None` when either embedding pair is unusable (dimension mismatch
/// or zero norm); the scorer skips such candidates.
#[must_use]
pub fn score(inputs: &SignificanceInputs<'_>) -> Option<SignificanceBreakdown> {
    let topic = cosine_similarity(inputs.target_embedding, inputs.candidate_embedding)?;
    let outcome_cosine = cosine_similarity(inputs.target_outcome, inputs.candidate_outcome)?;
    let divergence = outcome_divergence(outcome_cosine);
    let decay = temporal_decay(inputs.delta_days, inputs.lambda_days);
    let weight = confidence_weight(inputs.target_confidence, inputs.candidate_confidence);
    Some(SignificanceBreakdown {
        topic_similarity: topic,
        outcome_divergence: divergence,
        temporal_decay: decay,
        confidence_weight: weight,
        significance: topic * divergence * decay * weight,
    })
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
        clippy::float_cmp,
        reason = "Test-only panic-based assertions and exact float checks are permitted."
    )]

    use super::SignificanceInputs;
    use super::cosine_similarity;
    use super::outcome_divergence;
    use super::score;
    use super::temporal_decay;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [1.0_f32, 2.0, 3.0];
        let cos = cosine_similarity(&v, &v).expect("cosine");
        assert!((cos - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_opposed_vectors_is_minus_one() {
        let a = [1.0_f32, 0.0];
        let b = [-1.0_f32, 0.0];
        let cos = cosine_similarity(&a, &b).expect("cosine");
        assert!((cos + 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_rejects_mismatched_dimensions() {
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn cosine_rejects_zero_norm() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn divergence_clamps_at_zero() {
        assert_eq!(outcome_divergence(1.5), 0.0);
        assert!((outcome_divergence(-1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn decay_halves_at_lambda() {
        assert!((temporal_decay(30.0, 30.0) - 0.5).abs() < 1e-9);
        assert!((temporal_decay(0.0, 30.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn identical_topic_divergent_outcome_scores_high() {
        let topic = [1.0_f32, 0.0];
        let outcome_a = [1.0_f32, 0.0];
        let outcome_b = [-1.0_f32, 0.0];
        let breakdown = score(&SignificanceInputs {
            target_embedding: &topic,
            candidate_embedding: &topic,
            target_outcome: &outcome_a,
            candidate_outcome: &outcome_b,
            target_confidence: 0.9,
            candidate_confidence: 0.8,
            delta_days: 0.0,
            lambda_days: 30.0,
        })
        .expect("breakdown");
        assert!((breakdown.topic_similarity - 1.0).abs() < 1e-9);
        assert!((breakdown.outcome_divergence - 2.0).abs() < 1e-9);
        assert!((breakdown.confidence_weight - 0.8).abs() < 1e-9);
        assert!(breakdown.significance > 1.0);
    }

    #[test]
    fn identical_outcomes_score_zero() {
        let topic = [1.0_f32, 0.0];
        let outcome = [0.5_f32, 0.5];
        let breakdown = score(&SignificanceInputs {
            target_embedding: &topic,
            candidate_embedding: &topic,
            target_outcome: &outcome,
            candidate_outcome: &outcome,
            target_confidence: 1.0,
            candidate_confidence: 1.0,
            delta_days: 0.0,
            lambda_days: 30.0,
        })
        .expect("breakdown");
        assert!(breakdown.significance.abs() < 1e-9);
    }
}
