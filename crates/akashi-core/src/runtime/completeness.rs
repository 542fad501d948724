// crates/akashi-core/src/runtime/completeness.rs
// ============================================================================
// Module: Decision Completeness Scoring
// Description: Rule-based completeness score over decision content.
// Purpose: Grade how fully a trace documents its decision.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The completeness score grades a decision in `[0, 1]` from the presence
//! and depth of its documentation: reasoning, alternatives, evidence, a
//! standard decision type, a substantive outcome, and a non-extreme
//! confidence. Inputs are explicit so the write path and the backfill path
//! score from the same facts and produce the same value for the same
//! decision. The score is advisory enrichment; it never gates a write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::decision::DecisionDraft;
use crate::core::identifiers::DecisionType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Decision type labels considered standard vocabulary.
const STANDARD_DECISION_TYPES: &[&str] = &[
    "architecture",
    "caching",
    "database",
    "dependency",
    "deployment",
    "design",
    "implementation",
    "infrastructure",
    "library",
    "naming",
    "process",
    "refactoring",
    "security",
    "testing",
    "tooling",
];

/// Reasoning length granting full reasoning credit.
const FULL_REASONING_CHARS: usize = 50;

/// Outcome length granting full outcome credit.
const FULL_OUTCOME_CHARS: usize = 20;

/// Confidence band `[low, high]` considered non-extreme.
const CONFIDENCE_BAND: (f64, f64) = (0.05, 0.95);

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Facts graded by completeness scoring.
///
/// # Invariants
/// - Child presence reflects the stored rows, not a caller's claim, so the
///   score is independent of which path computed it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletenessInputs<'a> {
    /// Decision type label.
    pub decision_type: &'a DecisionType,
    /// Chosen outcome text.
    pub outcome: &'a str,
    /// Reasoning behind the outcome.
    pub reasoning: &'a str,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// True when the decision has at least one alternative.
    pub has_alternatives: bool,
    /// True when the decision has at least one evidence row.
    pub has_evidence: bool,
}

impl<'a> CompletenessInputs<'a> {
    /// Builds inputs from a trace draft.
    #[must_use]
    pub fn from_draft(draft: &'a DecisionDraft) -> Self {
        Self {
            decision_type: &draft.decision_type,
            outcome: &draft.outcome,
            reasoning: &draft.reasoning,
            confidence: draft.confidence,
            has_alternatives: !draft.alternatives.is_empty(),
            has_evidence: !draft.evidence.is_empty(),
        }
    }
}

// ============================================================================
// SECTION: Scoring
// ============================================================================

/// Computes the rule-based completeness score.
///
/// Component weights: reasoning 0.25, alternatives 0.20, evidence 0.20,
/// substantive outcome 0.15, standard decision type 0.10, non-extreme
/// confidence 0.10. Reasoning and outcome grant half credit below their
/// full-length thresholds.
#[must_use]
pub fn completeness_score(inputs: &CompletenessInputs<'_>) -> f64 {
    let mut total: f64 = 0.0;

    let reasoning_len = inputs.reasoning.trim().len();
    if reasoning_len >= FULL_REASONING_CHARS {
        total += 0.25;
    } else if reasoning_len > 0 {
        total += 0.125;
    }

    if inputs.has_alternatives {
        total += 0.20;
    }
    if inputs.has_evidence {
        total += 0.20;
    }

    let outcome_len = inputs.outcome.trim().len();
    if outcome_len >= FULL_OUTCOME_CHARS {
        total += 0.15;
    } else if outcome_len > 0 {
        total += 0.075;
    }

    if STANDARD_DECISION_TYPES.contains(&inputs.decision_type.normalized().as_str()) {
        total += 0.10;
    }

    if inputs.confidence >= CONFIDENCE_BAND.0 && inputs.confidence <= CONFIDENCE_BAND.1 {
        total += 0.10;
    }

    total.clamp(0.0, 1.0)
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

    use serde_json::Value;

    use super::CompletenessInputs;
    use super::completeness_score;
    use crate::core::decision::AgentContext;
    use crate::core::decision::AlternativeDraft;
    use crate::core::decision::DecisionDraft;
    use crate::core::decision::EvidenceDraft;
    use crate::core::identifiers::DecisionType;

    /// Builds a minimal draft for scoring tests.
    fn draft(outcome: &str, reasoning: &str, confidence: f64) -> DecisionDraft {
        DecisionDraft {
            decision_type: DecisionType::new("caching"),
            outcome: outcome.to_string(),
            confidence,
            reasoning: reasoning.to_string(),
            alternatives: Vec::new(),
            evidence: Vec::new(),
            agent_context: AgentContext::default(),
            session_id: None,
            metadata: Value::Null,
        }
    }

    #[test]
    fn fully_documented_decision_scores_one() {
        let mut full = draft(
            "Use Redis for the request cache layer",
            "Redis offers the latency profile we measured and the team already operates it.",
            0.8,
        );
        full.alternatives.push(AlternativeDraft {
            label: "Memcached".to_string(),
            score: Some(0.4),
            selected: false,
            rejection_reason: Some("no persistence".to_string()),
        });
        full.evidence.push(EvidenceDraft {
            source_type: "benchmark".to_string(),
            uri: None,
            content: Some("p99 latency table".to_string()),
            relevance: Some(0.9),
        });
        let score = completeness_score(&CompletenessInputs::from_draft(&full));
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bare_decision_scores_low() {
        let bare = draft("x", "", 1.0);
        assert!(completeness_score(&CompletenessInputs::from_draft(&bare)) < 0.3);
    }

    #[test]
    fn short_reasoning_grants_half_credit() {
        let short = draft("Use Redis for the request cache layer", "fast", 0.8);
        let long = draft(
            "Use Redis for the request cache layer",
            "Redis offers the latency profile we measured and the team already operates it.",
            0.8,
        );
        let short_score = completeness_score(&CompletenessInputs::from_draft(&short));
        let long_score = completeness_score(&CompletenessInputs::from_draft(&long));
        assert!(short_score < long_score);
    }

    #[test]
    fn extreme_confidence_loses_credit() {
        let hedged = draft("Use Redis for the request cache layer", "measured latency wins", 0.8);
        let certain = draft("Use Redis for the request cache layer", "measured latency wins", 1.0);
        let hedged_score = completeness_score(&CompletenessInputs::from_draft(&hedged));
        let certain_score = completeness_score(&CompletenessInputs::from_draft(&certain));
        assert!(certain_score < hedged_score);
    }

    #[test]
    fn explicit_presence_matches_draft_presence() {
        let mut documented = draft(
            "Use Redis for the request cache layer",
            "Redis offers the latency profile we measured and the team already operates it.",
            0.8,
        );
        documented.alternatives.push(AlternativeDraft {
            label: "Memcached".to_string(),
            score: None,
            selected: false,
            rejection_reason: None,
        });
        let via_draft = completeness_score(&CompletenessInputs::from_draft(&documented));
        let via_fields = completeness_score(&CompletenessInputs {
            decision_type: &documented.decision_type,
            outcome: &documented.outcome,
            reasoning: &documented.reasoning,
            confidence: documented.confidence,
            has_alternatives: true,
            has_evidence: false,
        });
        assert_eq!(via_draft, via_fields);
    }
}
