// crates/akashi-core/src/core/decision.rs
// ============================================================================
// Module: Akashi Decision Model
// Description: Decisions, alternatives, evidence, claims, and agent runs.
// Purpose: Represent the bi-temporal decision trace and its children.
// Dependencies: serde, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! A decision trace is one atomic record of what an agent chose, why, which
//! alternatives were rejected, and what evidence supported the choice.
//! Decisions are bi-temporal: `valid_from`/`valid_to` carry business
//! validity while `transaction_time` carries system time, enabling
//! point-in-time queries. Content fields are immutable after insert and are
//! covered by the content hash; embeddings and enrichment fields are
//! backfilled asynchronously and excluded from the hash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use time::OffsetDateTime;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::AlternativeId;
use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::ClaimId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::DecisionType;
use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SessionId;
use crate::hashing::ContentHash;

// ============================================================================
// SECTION: Agent Runs
// ============================================================================

/// Run lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is active and accepting events.
    Running,
    /// Run has completed successfully.
    Completed,
    /// Run has failed.
    Failed,
}

impl RunStatus {
    /// Returns the stable label used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a stable label back into a status.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Agent execution context grouping events and decisions.
///
/// # Invariants
/// - Immutable after insert except `status` and `completed_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    /// Run identifier.
    pub id: RunId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Agent executing the run.
    pub agent_id: AgentId,
    /// Optional caller-provided session grouping.
    pub session_id: Option<SessionId>,
    /// Optional parent run for nested executions.
    pub parent_run_id: Option<RunId>,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Start timestamp.
    pub started_at: OffsetDateTime,
    /// Completion timestamp once the run leaves [`RunStatus::Running`].
    pub completed_at: Option<OffsetDateTime>,
}

// ============================================================================
// SECTION: Agent Context
// ============================================================================

/// Structured execution context captured with each decision.
///
/// # Invariants
/// - Unknown keys are preserved verbatim in `extra` for round-tripping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentContext {
    /// Tool driving the agent, e.g. an editor or CI job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Model identifier used for the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Project the decision belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Task label within the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Repository hint used for conflict classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Additional caller-provided context keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentContext {
    /// Returns the project hint, falling back to the repository hint.
    #[must_use]
    pub fn project_hint(&self) -> Option<&str> {
        self.project.as_deref().or(self.repo.as_deref())
    }
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Bi-temporal decision record.
///
/// # Invariants
/// - Content fields (type, outcome, confidence, reasoning, `content_hash`,
///   `valid_from`, `transaction_time`, `created_at`) are immutable after
///   insert; the store enforces this with a trigger.
/// - At most one decision per revision chain has `valid_to = None`.
/// - `content_hash` equals the canonical hash recomputed from the content
///   fields at any later time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Decision identifier.
    pub id: DecisionId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Deciding agent.
    pub agent_id: AgentId,
    /// Run the decision was recorded in.
    pub run_id: RunId,
    /// API key used for the write, when known.
    pub api_key_id: Option<ApiKeyId>,
    /// Optional caller-provided session grouping.
    pub session_id: Option<SessionId>,
    /// Decision type label.
    pub decision_type: DecisionType,
    /// Chosen outcome text.
    pub outcome: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Reasoning behind the outcome.
    pub reasoning: String,
    /// Canonical content hash over the immutable fields.
    pub content_hash: ContentHash,
    /// Business validity start.
    pub valid_from: OffsetDateTime,
    /// Business validity end; `None` while the decision is current.
    pub valid_to: Option<OffsetDateTime>,
    /// System time the row was written.
    pub transaction_time: OffsetDateTime,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Predecessor in the revision chain.
    pub supersedes_id: Option<DecisionId>,
    /// Influential prior decision referenced by the caller.
    pub precedent_ref: Option<DecisionId>,
    /// Decision-level embedding, backfilled asynchronously.
    pub embedding: Option<Vec<f32>>,
    /// Outcome-only embedding, backfilled asynchronously.
    pub outcome_embedding: Option<Vec<f32>>,
    /// Structured execution context.
    pub agent_context: AgentContext,
    /// Caller-provided metadata.
    pub metadata: Value,
    /// Rule-based completeness score in `[0, 1]`, backfilled asynchronously.
    pub completeness_score: Option<f64>,
    /// Timestamp of the last conflict scoring pass over this decision.
    pub conflict_scored_at: Option<OffsetDateTime>,
}

impl Decision {
    /// Returns true when the decision is currently valid.
    #[must_use]
    pub const fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Returns true when both embeddings required for scoring are present.
    #[must_use]
    pub const fn has_embeddings(&self) -> bool {
        self.embedding.is_some() && self.outcome_embedding.is_some()
    }
}

// ============================================================================
// SECTION: Alternatives
// ============================================================================

/// Option the agent considered alongside the chosen outcome.
///
/// # Invariants
/// - Immutable after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    /// Alternative identifier.
    pub id: AlternativeId,
    /// Parent decision.
    pub decision_id: DecisionId,
    /// Short option label.
    pub label: String,
    /// Optional score assigned by the agent.
    pub score: Option<f64>,
    /// True for the option that became the outcome.
    pub selected: bool,
    /// Reason the option was rejected, when it was not selected.
    pub rejection_reason: Option<String>,
}

// ============================================================================
// SECTION: Evidence
// ============================================================================

/// Supporting input for a decision.
///
/// # Invariants
/// - Immutable after insert.
/// - `source_type` satisfies [`is_valid_source_type`].
/// - Carries the parent decision's `org_id` for direct tenant filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Evidence identifier.
    pub id: EvidenceId,
    /// Owning organization, copied from the parent decision.
    pub org_id: OrgId,
    /// Parent decision.
    pub decision_id: DecisionId,
    /// Source class label, e.g. `file`, `url`, `benchmark`.
    pub source_type: String,
    /// Optional source locator.
    pub uri: Option<String>,
    /// Evidence content text.
    pub content: Option<String>,
    /// Relevance weight assigned by the agent.
    pub relevance: Option<f64>,
    /// Evidence embedding, backfilled asynchronously.
    pub embedding: Option<Vec<f32>>,
}

/// Validates an evidence source type label.
///
/// # Invariants
/// - Accepts `[a-z][a-z0-9_]{0,63}`; everything else is rejected.
#[must_use]
pub fn is_valid_source_type(label: &str) -> bool {
    let mut chars = label.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() {
        return false;
    }
    if label.len() > 64 {
        return false;
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

// ============================================================================
// SECTION: Decision Claims
// ============================================================================

/// Sentence-level fragment of a decision outcome with its own embedding.
///
/// # Invariants
/// - Cascade-deleted with the parent decision at the store level.
/// - `position` is the zero-based order of the claim within the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionClaim {
    /// Claim identifier.
    pub id: ClaimId,
    /// Parent decision.
    pub decision_id: DecisionId,
    /// Zero-based position within the outcome.
    pub position: u32,
    /// Claim text.
    pub text: String,
    /// Claim embedding, backfilled asynchronously.
    pub embedding: Option<Vec<f32>>,
}

// ============================================================================
// SECTION: Trace Drafts
// ============================================================================

/// Alternative supplied by the caller in a trace request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeDraft {
    /// Short option label.
    pub label: String,
    /// Optional score assigned by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// True for the option that became the outcome.
    #[serde(default)]
    pub selected: bool,
    /// Reason the option was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Evidence supplied by the caller in a trace request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDraft {
    /// Source class label.
    pub source_type: String,
    /// Optional source locator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Evidence content text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Relevance weight assigned by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

/// Caller-facing decision payload for the trace operation.
///
/// # Invariants
/// - Validation happens at the service boundary via
///   [`crate::runtime::validation::validate_draft`]; this is a pure request
///   container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDraft {
    /// Decision type label.
    pub decision_type: DecisionType,
    /// Chosen outcome text.
    pub outcome: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Reasoning behind the outcome.
    #[serde(default)]
    pub reasoning: String,
    /// Alternatives the agent considered.
    #[serde(default)]
    pub alternatives: Vec<AlternativeDraft>,
    /// Evidence supporting the outcome.
    #[serde(default)]
    pub evidence: Vec<EvidenceDraft>,
    /// Structured execution context.
    #[serde(default)]
    pub agent_context: AgentContext,
    /// Optional caller-provided session grouping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Caller-provided metadata.
    #[serde(default)]
    pub metadata: Value,
}

/// Receipt returned by the trace operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceReceipt {
    /// Run the decision was recorded in.
    pub run_id: RunId,
    /// New decision identifier.
    pub decision_id: DecisionId,
    /// Number of events recorded alongside the trace.
    pub event_count: u64,
}
