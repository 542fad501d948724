// crates/akashi-core/src/runtime/validation.rs
// ============================================================================
// Module: Trace Draft Validation
// Description: Fail-closed validation of caller-supplied decision drafts.
// Purpose: Reject malformed traces before any write is attempted.
// Dependencies: crate::core::decision, thiserror
// ============================================================================

//! ## Overview
//! Draft validation is the precondition gate of the trace operation. It
//! checks ranges, lengths, and formats only; semantic enrichment (hashing,
//! scoring, embeddings) happens after a draft passes. Validation errors map
//! to the `Invalid` error kind at the service boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::decision::DecisionDraft;
use crate::core::decision::is_valid_source_type;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Size limits applied to trace drafts.
///
/// # Invariants
/// - All limits are greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftLimits {
    /// Maximum outcome length in bytes.
    pub max_outcome_bytes: usize,
    /// Maximum reasoning length in bytes.
    pub max_reasoning_bytes: usize,
    /// Maximum number of alternatives.
    pub max_alternatives: usize,
    /// Maximum number of evidence entries.
    pub max_evidence: usize,
}

impl Default for DraftLimits {
    fn default() -> Self {
        Self {
            max_outcome_bytes: 64 * 1024,
            max_reasoning_bytes: 256 * 1024,
            max_alternatives: 64,
            max_evidence: 64,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Draft validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DraftError {
    /// Decision type label is empty after trimming.
    #[error("decision_type must not be empty")]
    EmptyDecisionType,
    /// Outcome text is empty after trimming.
    #[error("outcome must not be empty")]
    EmptyOutcome,
    /// Outcome text exceeds the configured maximum.
    #[error("outcome exceeds {max_bytes} bytes (got {actual_bytes})")]
    OutcomeTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual outcome size in bytes.
        actual_bytes: usize,
    },
    /// Reasoning text exceeds the configured maximum.
    #[error("reasoning exceeds {max_bytes} bytes (got {actual_bytes})")]
    ReasoningTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual reasoning size in bytes.
        actual_bytes: usize,
    },
    /// Confidence is outside `[0, 1]` or non-finite.
    #[error("confidence must be a finite value in [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),
    /// Too many alternatives supplied.
    #[error("at most {max} alternatives allowed (got {actual})")]
    TooManyAlternatives {
        /// Maximum allowed count.
        max: usize,
        /// Actual count.
        actual: usize,
    },
    /// Too many evidence entries supplied.
    #[error("at most {max} evidence entries allowed (got {actual})")]
    TooManyEvidence {
        /// Maximum allowed count.
        max: usize,
        /// Actual count.
        actual: usize,
    },
    /// An alternative label is empty after trimming.
    #[error("alternative {index} has an empty label")]
    EmptyAlternativeLabel {
        /// Zero-based alternative index.
        index: usize,
    },
    /// More than one alternative is marked selected.
    #[error("at most one alternative may be selected")]
    MultipleSelected,
    /// An evidence source type fails the format check.
    #[error("evidence {index} has invalid source_type {source_type:?}")]
    InvalidSourceType {
        /// Zero-based evidence index.
        index: usize,
        /// Offending source type label.
        source_type: String,
    },
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a trace draft against the configured limits.
///
/// # Errors
///
/// Returns the first [`DraftError`] encountered; the caller maps it to the
/// `Invalid` error kind. Empty alternative and evidence lists are accepted.
pub fn validate_draft(draft: &DecisionDraft, limits: &DraftLimits) -> Result<(), DraftError> {
    if draft.decision_type.as_str().trim().is_empty() {
        return Err(DraftError::EmptyDecisionType);
    }
    if draft.outcome.trim().is_empty() {
        return Err(DraftError::EmptyOutcome);
    }
    if draft.outcome.len() > limits.max_outcome_bytes {
        return Err(DraftError::OutcomeTooLarge {
            max_bytes: limits.max_outcome_bytes,
            actual_bytes: draft.outcome.len(),
        });
    }
    if draft.reasoning.len() > limits.max_reasoning_bytes {
        return Err(DraftError::ReasoningTooLarge {
            max_bytes: limits.max_reasoning_bytes,
            actual_bytes: draft.reasoning.len(),
        });
    }
    if !draft.confidence.is_finite() || !(0.0..=1.0).contains(&draft.confidence) {
        return Err(DraftError::ConfidenceOutOfRange(draft.confidence));
    }
    if draft.alternatives.len() > limits.max_alternatives {
        return Err(DraftError::TooManyAlternatives {
            max: limits.max_alternatives,
            actual: draft.alternatives.len(),
        });
    }
    if draft.evidence.len() > limits.max_evidence {
        return Err(DraftError::TooManyEvidence {
            max: limits.max_evidence,
            actual: draft.evidence.len(),
        });
    }
    let mut selected = 0_usize;
    for (index, alternative) in draft.alternatives.iter().enumerate() {
        if alternative.label.trim().is_empty() {
            return Err(DraftError::EmptyAlternativeLabel {
                index,
            });
        }
        if alternative.selected {
            selected += 1;
        }
    }
    if selected > 1 {
        return Err(DraftError::MultipleSelected);
    }
    for (index, evidence) in draft.evidence.iter().enumerate() {
        if !is_valid_source_type(&evidence.source_type) {
            return Err(DraftError::InvalidSourceType {
                index,
                source_type: evidence.source_type.clone(),
            });
        }
    }
    Ok(())
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

    use serde_json::Value;

    use super::DraftError;
    use super::DraftLimits;
    use super::validate_draft;
    use crate::core::decision::AgentContext;
    use crate::core::decision::DecisionDraft;
    use crate::core::decision::EvidenceDraft;
    use crate::core::identifiers::DecisionType;

    /// Builds a valid baseline draft.
    fn base_draft() -> DecisionDraft {
        DecisionDraft {
            decision_type: DecisionType::new("caching"),
            outcome: "Use Redis".to_string(),
            confidence: 0.8,
            reasoning: "latency".to_string(),
            alternatives: Vec::new(),
            evidence: Vec::new(),
            agent_context: AgentContext::default(),
            session_id: None,
            metadata: Value::Null,
        }
    }

    #[test]
    fn baseline_draft_passes() {
        assert!(validate_draft(&base_draft(), &DraftLimits::default()).is_ok());
    }

    #[test]
    fn confidence_boundaries_accepted() {
        let mut draft = base_draft();
        draft.confidence = 0.0;
        assert!(validate_draft(&draft, &DraftLimits::default()).is_ok());
        draft.confidence = 1.0;
        assert!(validate_draft(&draft, &DraftLimits::default()).is_ok());
    }

    #[test]
    fn confidence_outside_range_rejected() {
        let mut draft = base_draft();
        draft.confidence = 1.01;
        assert!(matches!(
            validate_draft(&draft, &DraftLimits::default()),
            Err(DraftError::ConfidenceOutOfRange(_))
        ));
        draft.confidence = f64::NAN;
        assert!(matches!(
            validate_draft(&draft, &DraftLimits::default()),
            Err(DraftError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn oversized_outcome_rejected() {
        let mut draft = base_draft();
        draft.outcome = "x".repeat(100);
        let limits = DraftLimits {
            max_outcome_bytes: 64,
            ..DraftLimits::default()
        };
        assert!(matches!(
            validate_draft(&draft, &limits),
            Err(DraftError::OutcomeTooLarge { .. })
        ));
    }

    #[test]
    fn invalid_source_type_rejected() {
        let mut draft = base_draft();
        draft.evidence.push(EvidenceDraft {
            source_type: "Not Valid!".to_string(),
            uri: None,
            content: None,
            relevance: None,
        });
        assert!(matches!(
            validate_draft(&draft, &DraftLimits::default()),
            Err(DraftError::InvalidSourceType { index: 0, .. })
        ));
    }
}
