// crates/akashi-core/src/core/conflict.rs
// ============================================================================
// Module: Akashi Conflict Model
// Description: Scored conflicts, relationship labels, and the resolution state machine.
// Purpose: Represent detected contradictions between decisions.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! A scored conflict is an unordered pair of decisions with a significance
//! score and an optional LLM-classified relationship. Pairs are stored with
//! `decision_a_id < decision_b_id` (bytewise UUID order) so repeated scoring
//! converges onto one row. Resolution follows a small state machine:
//! `open` may be acknowledged, resolved, or marked `wont_fix`; `acknowledged`
//! may only be resolved.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::identifiers::AgentId;
pub use crate::core::identifiers::ConflictId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Conflict kind derived from the deciding agents.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The two decisions were made by different agents.
    CrossAgent,
    /// The two decisions were made by the same agent.
    SelfContradiction,
}

impl ConflictKind {
    /// Returns the stable label used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CrossAgent => "cross_agent",
            Self::SelfContradiction => "self_contradiction",
        }
    }

    /// Parses a stable label back into a kind.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "cross_agent" => Some(Self::CrossAgent),
            "self_contradiction" => Some(Self::SelfContradiction),
            _ => None,
        }
    }

    /// Derives the kind from the two deciding agents.
    #[must_use]
    pub fn from_agents(a: &AgentId, b: &AgentId) -> Self {
        if a == b { Self::SelfContradiction } else { Self::CrossAgent }
    }
}

/// Scoring method that produced a conflict row.
///
/// # Invariants
/// - Variants are stable; adding a method widens the store check constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    /// Embedding-based significance scoring.
    Embedding,
    /// Text-search fallback scoring.
    Text,
    /// Claim-level contradiction scoring.
    Claim,
    /// LLM relationship classification.
    Llm,
    /// Second-generation LLM relationship classification.
    LlmV2,
}

impl ScoringMethod {
    /// Returns the stable label used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Text => "text",
            Self::Claim => "claim",
            Self::Llm => "llm",
            Self::LlmV2 => "llm_v2",
        }
    }

    /// Parses a stable label back into a method.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "embedding" => Some(Self::Embedding),
            "text" => Some(Self::Text),
            "claim" => Some(Self::Claim),
            "llm" => Some(Self::Llm),
            "llm_v2" => Some(Self::LlmV2),
            _ => None,
        }
    }
}

/// LLM-classified relationship between the two decisions of a pair.
///
/// # Invariants
/// - Only [`ConflictRelationship::Contradiction`] and
///   [`ConflictRelationship::Supersession`] persist as conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRelationship {
    /// The decisions contradict each other.
    Contradiction,
    /// One decision supersedes the other.
    Supersession,
    /// The decisions complement each other.
    Complementary,
    /// One decision refines the other.
    Refinement,
    /// The decisions are unrelated.
    Unrelated,
}

impl ConflictRelationship {
    /// Returns the stable label used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contradiction => "contradiction",
            Self::Supersession => "supersession",
            Self::Complementary => "complementary",
            Self::Refinement => "refinement",
            Self::Unrelated => "unrelated",
        }
    }

    /// Parses a stable label back into a relationship.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "contradiction" => Some(Self::Contradiction),
            "supersession" => Some(Self::Supersession),
            "complementary" => Some(Self::Complementary),
            "refinement" => Some(Self::Refinement),
            "unrelated" => Some(Self::Unrelated),
            _ => None,
        }
    }

    /// Returns true when the relationship produces a persisted conflict.
    #[must_use]
    pub const fn is_conflicting(self) -> bool {
        matches!(self, Self::Contradiction | Self::Supersession)
    }
}

// ============================================================================
// SECTION: Resolution State Machine
// ============================================================================

/// Conflict resolution status.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Newly detected, unhandled conflict.
    Open,
    /// Conflict acknowledged by an operator.
    Acknowledged,
    /// Conflict resolved with a winning decision.
    Resolved,
    /// Conflict intentionally left unresolved.
    WontFix,
}

impl ConflictStatus {
    /// Returns the stable label used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
            Self::WontFix => "wont_fix",
        }
    }

    /// Parses a stable label back into a status.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "open" => Some(Self::Open),
            "acknowledged" => Some(Self::Acknowledged),
            "resolved" => Some(Self::Resolved),
            "wont_fix" => Some(Self::WontFix),
            _ => None,
        }
    }
}

/// Requested resolution transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictTransition {
    /// Mark the conflict acknowledged.
    Acknowledge,
    /// Resolve the conflict.
    Resolve,
    /// Mark the conflict as intentionally unresolved.
    WontFix,
}

impl ConflictTransition {
    /// Returns the status the transition lands in.
    #[must_use]
    pub const fn target(self) -> ConflictStatus {
        match self {
            Self::Acknowledge => ConflictStatus::Acknowledged,
            Self::Resolve => ConflictStatus::Resolved,
            Self::WontFix => ConflictStatus::WontFix,
        }
    }
}

/// Invalid conflict status transition.
///
/// # Invariants
/// - Carries the attempted transition for structured error envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid conflict transition from {from:?} via {via:?}")]
pub struct InvalidTransition {
    /// Current status.
    pub from: ConflictStatus,
    /// Attempted transition.
    pub via: ConflictTransition,
}

/// Applies a resolution transition to a status, fail-closed on invalid moves.
///
/// # Errors
///
/// Returns [`InvalidTransition`] when the move is not permitted by the state
/// machine: `acknowledge` requires `open`; `resolve` requires `open` or
/// `acknowledged`; `wont_fix` requires `open`.
pub const fn apply_transition(
    from: ConflictStatus,
    via: ConflictTransition,
) -> Result<ConflictStatus, InvalidTransition> {
    let allowed = match via {
        ConflictTransition::Acknowledge => matches!(from, ConflictStatus::Open),
        ConflictTransition::Resolve => {
            matches!(from, ConflictStatus::Open | ConflictStatus::Acknowledged)
        }
        ConflictTransition::WontFix => matches!(from, ConflictStatus::Open),
    };
    if allowed {
        Ok(via.target())
    } else {
        Err(InvalidTransition {
            from,
            via,
        })
    }
}

// ============================================================================
// SECTION: Conflict Pairs
// ============================================================================

/// Ordered decision pair with `a < b` in bytewise UUID order.
///
/// # Invariants
/// - `a < b` always holds; construction sorts the operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictPair {
    /// Lower decision identifier.
    pub a: DecisionId,
    /// Higher decision identifier.
    pub b: DecisionId,
}

impl ConflictPair {
    /// Builds an ordered pair from two distinct decision identifiers.
    ///
    /// Returns `None` when both identifiers are equal.
    #[must_use]
    pub fn ordered(x: DecisionId, y: DecisionId) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self {
                a: x,
                b: y,
            }),
            std::cmp::Ordering::Greater => Some(Self {
                a: y,
                b: x,
            }),
            std::cmp::Ordering::Equal => None,
        }
    }
}

// ============================================================================
// SECTION: Scored Conflicts
// ============================================================================

/// Scored conflict row.
///
/// # Invariants
/// - `pair.a < pair.b` (bytewise UUID order).
/// - Repeated scoring upserts onto the `(org_id, pair)` key.
/// - `significance` lies in `[0, 1]` when produced by the embedding method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredConflict {
    /// Conflict identifier.
    pub id: ConflictId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Ordered decision pair.
    pub pair: ConflictPair,
    /// Conflict kind derived from the deciding agents.
    pub kind: ConflictKind,
    /// Scoring method that produced the row.
    pub method: ScoringMethod,
    /// Cosine similarity of the decision embeddings, in `[-1, 1]`.
    pub topic_similarity: f64,
    /// Divergence of the outcome embeddings, in `[0, 2]` clamped at 0.
    pub outcome_divergence: f64,
    /// Combined significance score.
    pub significance: f64,
    /// Minimum of the two confidences, when both were known.
    pub confidence_weight: Option<f64>,
    /// Temporal decay factor applied to the score.
    pub temporal_decay: Option<f64>,
    /// LLM-classified relationship, when a validator ran.
    pub relationship: Option<ConflictRelationship>,
    /// Validator-assigned category label.
    pub category: Option<String>,
    /// Validator-assigned severity label.
    pub severity: Option<String>,
    /// Validator explanation.
    pub explanation: Option<String>,
    /// Resolution status.
    pub status: ConflictStatus,
    /// Agent that resolved the conflict.
    pub resolved_by: Option<AgentId>,
    /// Resolution timestamp.
    pub resolved_at: Option<OffsetDateTime>,
    /// Free-form resolution note.
    pub resolution_note: Option<String>,
    /// Decision that resolved the conflict, when one was recorded.
    pub resolution_decision_id: Option<DecisionId>,
    /// Winning decision of the pair, when chosen.
    pub winning_decision_id: Option<DecisionId>,
    /// Detection timestamp.
    pub detected_at: OffsetDateTime,
    /// Last update timestamp.
    pub updated_at: OffsetDateTime,
}
