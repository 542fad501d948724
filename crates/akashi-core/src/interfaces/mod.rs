// crates/akashi-core/src/interfaces/mod.rs
// ============================================================================
// Module: Akashi Interfaces
// Description: Backend-agnostic interfaces for storage, indexing, and providers.
// Purpose: Define the contract surfaces used by the Akashi engine.
// Dependencies: crate::core, async-trait, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the engine integrates with the relational store,
//! the external vector index, embedding providers, and conflict validators
//! without embedding backend-specific details. Implementations must fail
//! closed on missing or invalid data, accept cancellation through their
//! async callers, and keep tenant (`org_id`) filtering server-side.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;

use crate::core::agent::AccessGrant;
use crate::core::agent::Agent;
use crate::core::agent::ApiKey;
use crate::core::conflict::ConflictId;
use crate::core::conflict::ConflictKind;
use crate::core::conflict::ConflictRelationship;
use crate::core::conflict::ConflictStatus;
use crate::core::conflict::ConflictTransition;
use crate::core::conflict::ScoredConflict;
use crate::core::decision::AgentRun;
use crate::core::decision::Alternative;
use crate::core::decision::Decision;
use crate::core::decision::DecisionClaim;
use crate::core::decision::Evidence;
use crate::core::decision::RunStatus;
use crate::core::event::AgentEvent;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::DecisionType;
use crate::core::identifiers::EventId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::OutboxEntryId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SessionId;
use crate::core::integrity::IntegrityProof;
use crate::hashing::ContentHash;

// ============================================================================
// SECTION: Error Taxonomy
// ============================================================================

/// Store and engine error taxonomy.
///
/// # Invariants
/// - Variants are stable; callers distinguish errors by kind, never by
///   message content.
/// - Messages never embed decision outcomes, reasonings, or key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Caller input violates a precondition.
    #[error("invalid input: {0}")]
    Invalid(String),
    /// Referenced entity is absent or outside the caller's access set.
    #[error("not found: {0}")]
    NotFound(String),
    /// Role or grant denies the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Uniqueness violation or idempotency reuse with a different request.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Retryable failure (transport, pool exhaustion, backend unavailable).
    #[error("transient failure: {0}")]
    Transient(String),
    /// Invariant violation, e.g. a stored content hash mismatch.
    #[error("fatal invariant violation: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Returns true when the error is retryable.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

// ============================================================================
// SECTION: Notification Channels
// ============================================================================

/// Notification channel names used for LISTEN/NOTIFY fan-out.
///
/// # Invariants
/// - Labels are stable; they double as the PostgreSQL channel names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    /// New decision written.
    Decisions,
    /// New or updated scored conflict.
    Conflicts,
    /// Agent directory change.
    Agents,
    /// Run lifecycle change.
    Runs,
}

impl NotifyChannel {
    /// All channels the broker listens on.
    pub const ALL: [Self; 4] = [Self::Decisions, Self::Conflicts, Self::Agents, Self::Runs];

    /// Returns the stable channel name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decisions => "decisions",
            Self::Conflicts => "conflicts",
            Self::Agents => "agents",
            Self::Runs => "runs",
        }
    }

    /// Parses a channel name.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "decisions" => Some(Self::Decisions),
            "conflicts" => Some(Self::Conflicts),
            "agents" => Some(Self::Agents),
            "runs" => Some(Self::Runs),
            _ => None,
        }
    }
}

/// Parsed notification payload fanned out to subscribers.
///
/// # Invariants
/// - `org_id` is always present; payloads without one are dropped at the
///   broker boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Channel the payload arrived on.
    pub channel: NotifyChannel,
    /// Organization the payload belongs to.
    pub org_id: OrgId,
    /// Kind-specific payload fields.
    pub payload: Value,
}

/// Emits notifications on a channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publishes a payload on the channel.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the notification cannot be published.
    async fn notify(&self, channel: NotifyChannel, payload: &Value) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Query Types
// ============================================================================

/// Structured decision query filters.
///
/// # Invariants
/// - `agent_ids` carries the caller's effective read set; `None` means the
///   admin bypass (org filter still applies).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionQuery {
    /// Effective agent filter; `None` bypasses agent filtering.
    pub agent_ids: Option<Vec<AgentId>>,
    /// Decision type filter.
    pub decision_type: Option<DecisionType>,
    /// Minimum confidence filter.
    pub confidence_min: Option<f64>,
    /// Substring filter on the outcome text.
    pub outcome_contains: Option<String>,
    /// Session filter.
    pub session_id: Option<SessionId>,
    /// Tool filter over the generated context column.
    pub tool: Option<String>,
    /// Model filter over the generated context column.
    pub model: Option<String>,
    /// Project filter over the generated context column.
    pub project: Option<String>,
    /// Only decisions currently valid (`valid_to IS NULL`).
    pub current_only: bool,
    /// Maximum rows returned; zero means the store default.
    pub limit: u32,
    /// Row offset for pagination.
    pub offset: u32,
}

/// Structured conflict query filters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConflictQuery {
    /// Decision type filter applied to either side of the pair.
    pub decision_type: Option<DecisionType>,
    /// Agent filter applied to either side of the pair.
    pub agent_id: Option<AgentId>,
    /// Conflict kind filter.
    pub kind: Option<ConflictKind>,
    /// Status filter.
    pub status: Option<ConflictStatus>,
    /// Maximum rows returned; zero means the store default.
    pub limit: u32,
    /// Row offset for pagination.
    pub offset: u32,
}

/// Text search hit with its relevance rank.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSearchHit {
    /// Matching decision.
    pub decision: Decision,
    /// Backend-specific relevance rank; higher is more relevant.
    pub rank: f64,
}

/// Presence of a decision's stored children.
///
/// # Invariants
/// - Reflects committed rows; children commit in the trace transaction, so
///   enrichment on any path observes the same presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildrenPresence {
    /// True when at least one alternative row exists.
    pub has_alternatives: bool,
    /// True when at least one evidence row exists.
    pub has_evidence: bool,
}

// ============================================================================
// SECTION: Decision Store
// ============================================================================

/// Atomic write bundle for one decision trace.
///
/// # Invariants
/// - Children reference `decision.id` and carry `decision.org_id` where the
///   schema requires it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionWrite {
    /// Decision row.
    pub decision: Decision,
    /// Alternatives considered.
    pub alternatives: Vec<Alternative>,
    /// Supporting evidence.
    pub evidence: Vec<Evidence>,
}

/// Decision persistence interface.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Inserts a decision with its children and outbox row in one
    /// transaction, then fires `NOTIFY decisions`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transactional write fails.
    async fn create_decision(&self, write: &DecisionWrite) -> Result<(), StoreError>;

    /// Closes the predecessor's validity and inserts the successor linked
    /// via `supersedes_id`, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for a missing predecessor and
    /// [`StoreError::Invalid`] for an already superseded predecessor.
    async fn revise_decision(
        &self,
        predecessor: DecisionId,
        write: &DecisionWrite,
    ) -> Result<(), StoreError>;

    /// Loads one decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent in the org.
    async fn decision(&self, org_id: OrgId, id: DecisionId) -> Result<Decision, StoreError>;

    /// Loads the full revision chain containing `id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the decision is absent.
    async fn revision_chain(
        &self,
        org_id: OrgId,
        id: DecisionId,
    ) -> Result<Vec<Decision>, StoreError>;

    /// Queries decisions with structured filters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn query_decisions(
        &self,
        org_id: OrgId,
        query: &DecisionQuery,
    ) -> Result<Vec<Decision>, StoreError>;

    /// Point-in-time query: decisions whose transaction time is at or
    /// before `as_of` and whose validity covers `as_of`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn decisions_as_of(
        &self,
        org_id: OrgId,
        as_of: OffsetDateTime,
        query: &DecisionQuery,
    ) -> Result<Vec<Decision>, StoreError>;

    /// Full-text fallback search over decision content. A decision type,
    /// when provided, constrains the search server-side so `limit` bounds
    /// typed results.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn search_decisions_text(
        &self,
        org_id: OrgId,
        text: &str,
        decision_type: Option<&DecisionType>,
        agent_ids: Option<&[AgentId]>,
        limit: u32,
    ) -> Result<Vec<TextSearchHit>, StoreError>;

    /// Reports whether a decision has stored alternatives and evidence;
    /// used by enrichment so completeness scores are path-independent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn decision_children_presence(
        &self,
        id: DecisionId,
    ) -> Result<ChildrenPresence, StoreError>;

    /// Embedding similarity search in the relational store, excluding the
    /// listed decisions (self plus revision chain).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn find_similar_decisions(
        &self,
        org_id: OrgId,
        embedding: &[f32],
        exclude: &[DecisionId],
        limit: u32,
    ) -> Result<Vec<Decision>, StoreError>;

    /// Stores backfilled embeddings for a decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    async fn set_embeddings(
        &self,
        id: DecisionId,
        embedding: &[f32],
        outcome_embedding: &[f32],
    ) -> Result<(), StoreError>;

    /// Stores the backfilled completeness score for a decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    async fn set_completeness(&self, id: DecisionId, score: f64) -> Result<(), StoreError>;

    /// Replaces the claims extracted from a decision's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the replacement fails.
    async fn replace_claims(
        &self,
        id: DecisionId,
        claims: &[DecisionClaim],
    ) -> Result<(), StoreError>;

    /// Lists decisions missing either embedding, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn decisions_missing_embeddings(&self, limit: u32) -> Result<Vec<Decision>, StoreError>;

    /// Lists decisions with both embeddings and `conflict_scored_at IS
    /// NULL`, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn decisions_pending_conflict_scoring(
        &self,
        limit: u32,
    ) -> Result<Vec<Decision>, StoreError>;

    /// Marks a decision as conflict-scored at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    async fn mark_conflict_scored(
        &self,
        id: DecisionId,
        at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Clears `conflict_scored_at` for every decision, forcing a rescore.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    async fn reset_conflict_scored(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Run Store
// ============================================================================

/// Run persistence interface.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    async fn create_run(&self, run: &AgentRun) -> Result<(), StoreError>;

    /// Loads one run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent in the org.
    async fn run(&self, org_id: OrgId, id: RunId) -> Result<AgentRun, StoreError>;

    /// Returns the latest running run for `(org, agent, session)`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn latest_running_run(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        session_id: Option<&SessionId>,
    ) -> Result<Option<AgentRun>, StoreError>;

    /// Updates the run status and completion timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    async fn update_run_status(
        &self,
        org_id: OrgId,
        id: RunId,
        status: RunStatus,
        completed_at: Option<OffsetDateTime>,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Event Store
// ============================================================================

/// Event persistence interface for the ingestion buffer.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Reserves `count` values from the global event sequence, returned in
    /// strictly increasing order. Stamping queued events in submission
    /// order with these values preserves per-run monotonicity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the reservation fails.
    async fn reserve_sequence_block(&self, count: u32) -> Result<Vec<i64>, StoreError>;

    /// Bulk-inserts sequenced events; the whole batch commits or none of it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the bulk insert fails.
    async fn insert_events(&self, events: &[AgentEvent]) -> Result<u64, StoreError>;

    /// Returns the subset of `ids` already present in the store, for WAL
    /// replay deduplication.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn existing_event_ids(&self, ids: &[EventId]) -> Result<Vec<EventId>, StoreError>;

    /// Lists events for a run ordered by sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn events_for_run(
        &self,
        org_id: OrgId,
        run_id: RunId,
        limit: u32,
    ) -> Result<Vec<AgentEvent>, StoreError>;

    /// Archives events older than `cutoff` into the archive table, then
    /// purges them; returns the archived row count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the archive pass fails.
    async fn archive_and_purge_before(
        &self,
        org_id: OrgId,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Conflict Store
// ============================================================================

/// Resolution request applied to a conflict row.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictResolution {
    /// Requested transition.
    pub transition: ConflictTransition,
    /// Agent performing the transition.
    pub resolved_by: AgentId,
    /// Optional resolving decision reference.
    pub resolution_decision_id: Option<DecisionId>,
    /// Optional winning decision of the pair.
    pub winning_decision_id: Option<DecisionId>,
    /// Optional free-form note.
    pub note: Option<String>,
}

/// Scored conflict persistence interface.
#[async_trait]
pub trait ConflictStore: Send + Sync {
    /// Upserts a scored conflict onto its `(org, pair)` key and fires
    /// `NOTIFY conflicts`; returns the row identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the upsert fails.
    async fn upsert_scored_conflict(
        &self,
        conflict: &ScoredConflict,
    ) -> Result<ConflictId, StoreError>;

    /// Loads one conflict.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent in the org.
    async fn conflict(&self, org_id: OrgId, id: ConflictId) -> Result<ScoredConflict, StoreError>;

    /// Queries conflicts ordered by significance, descending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn query_conflicts(
        &self,
        org_id: OrgId,
        query: &ConflictQuery,
    ) -> Result<Vec<ScoredConflict>, StoreError>;

    /// Lists open conflicts involving decisions of `decision_type`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn open_conflicts_for_type(
        &self,
        org_id: OrgId,
        decision_type: &DecisionType,
        limit: u32,
    ) -> Result<Vec<ScoredConflict>, StoreError>;

    /// Applies a resolution transition, fail-closed on invalid moves.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a transition the state machine
    /// rejects and [`StoreError::NotFound`] for a missing conflict.
    async fn resolve_conflict(
        &self,
        org_id: OrgId,
        id: ConflictId,
        resolution: &ConflictResolution,
    ) -> Result<ScoredConflict, StoreError>;

    /// Counts conflicts without an LLM-classified relationship.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    async fn count_unvalidated_conflicts(&self) -> Result<u64, StoreError>;

    /// Deletes conflicts without an LLM-classified relationship; used when
    /// the validator class changes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    async fn clear_unvalidated_conflicts(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Outbox Store
// ============================================================================

/// Pending vector index operation kind.
///
/// # Invariants
/// - Labels are stable for store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxOperation {
    /// Upsert the decision's vectors into the index.
    Upsert,
    /// Delete the decision from the index.
    Delete,
}

impl OutboxOperation {
    /// Returns the stable label used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    /// Parses a stable label back into an operation.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "upsert" => Some(Self::Upsert),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Search outbox row pending propagation to the vector index.
///
/// # Invariants
/// - Inserted in the same transaction as the source decision mutation, so a
///   pending operation always references a visible decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Entry identifier.
    pub id: OutboxEntryId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Decision the operation applies to.
    pub decision_id: DecisionId,
    /// Pending operation kind.
    pub operation: OutboxOperation,
    /// Delivery attempts so far.
    pub attempts: i32,
    /// Display form of the most recent failure.
    pub last_error: Option<String>,
    /// Lease expiry; the row is claimable once the lease lapses.
    pub locked_until: Option<OffsetDateTime>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

/// Search outbox persistence interface.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Leases up to `batch` claimable rows (attempts below `max_attempts`,
    /// lease lapsed), oldest first, setting `locked_until = now + lease`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lease acquisition fails.
    async fn lease_outbox_batch(
        &self,
        batch: u32,
        lease: Duration,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Deletes a delivered row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    async fn complete_outbox_entry(&self, id: OutboxEntryId) -> Result<(), StoreError>;

    /// Records a failed attempt and releases the lease.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    async fn fail_outbox_entry(&self, id: OutboxEntryId, error: &str) -> Result<(), StoreError>;

    /// Moves rows at or beyond `max_attempts` into the dead-letter archive;
    /// returns the moved count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the move fails.
    async fn dead_letter_exhausted(&self, max_attempts: i32) -> Result<u64, StoreError>;

    /// Counts rows still pending delivery.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    async fn pending_outbox_count(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Integrity Store
// ============================================================================

/// Integrity proof persistence interface.
#[async_trait]
pub trait IntegrityStore: Send + Sync {
    /// Lists organizations present in the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn org_ids(&self) -> Result<Vec<OrgId>, StoreError>;

    /// Returns the most recent proof for an organization.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn latest_proof(&self, org_id: OrgId) -> Result<Option<IntegrityProof>, StoreError>;

    /// Appends a proof row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    async fn insert_proof(&self, proof: &IntegrityProof) -> Result<(), StoreError>;

    /// Lists proofs for an organization, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn proofs(&self, org_id: OrgId, limit: u32) -> Result<Vec<IntegrityProof>, StoreError>;

    /// Collects `(id, content_hash)` for decisions created in
    /// `(after, until]`, ordered by decision identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn content_hashes_in_window(
        &self,
        org_id: OrgId,
        after: Option<OffsetDateTime>,
        until: OffsetDateTime,
    ) -> Result<Vec<(DecisionId, ContentHash)>, StoreError>;
}

// ============================================================================
// SECTION: Agent Store
// ============================================================================

/// Row counts returned by archive-before-delete agent erasure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentErasure {
    /// Rows archived into the deletion audit log.
    pub archived_rows: u64,
    /// Rows physically removed.
    pub removed_rows: u64,
}

/// Agent directory and credential interface.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Creates an organization row when absent; used by bootstrap seeding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    async fn ensure_org(&self, org_id: OrgId, name: &str) -> Result<(), StoreError>;

    /// Inserts an agent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on a duplicate `(org, agent_id)`.
    async fn create_agent(&self, agent: &Agent) -> Result<(), StoreError>;

    /// Loads one agent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when absent in the org.
    async fn agent(&self, org_id: OrgId, agent_id: &AgentId) -> Result<Agent, StoreError>;

    /// Counts agents across all organizations; used by the admin seed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    async fn count_agents(&self) -> Result<u64, StoreError>;

    /// Erases an agent, archiving affected rows to the deletion audit log
    /// before removal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the agent is absent.
    async fn erase_agent(&self, org_id: OrgId, agent_id: &AgentId)
    -> Result<AgentErasure, StoreError>;

    /// Lists agent identifiers sharing at least one of `tags` in the org.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn agents_with_tag_overlap(
        &self,
        org_id: OrgId,
        tags: &[String],
    ) -> Result<Vec<AgentId>, StoreError>;

    /// Lists active `agent_traces` grants where `grantee` is the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn active_grants_for(
        &self,
        org_id: OrgId,
        grantee: &AgentId,
    ) -> Result<Vec<AccessGrant>, StoreError>;

    /// Inserts an access grant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    async fn create_grant(&self, grant: &AccessGrant) -> Result<(), StoreError>;

    /// Inserts an API key record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on a duplicate prefix.
    async fn create_api_key(&self, key: &ApiKey) -> Result<(), StoreError>;

    /// Verifies an API key by prefix lookup and constant-time hash compare,
    /// performing a dummy compare when the prefix is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails; an unknown or inactive
    /// key yields `Ok(None)`, never an error.
    async fn verify_api_key(
        &self,
        prefix: &str,
        raw_key: &str,
    ) -> Result<Option<(Agent, ApiKeyId)>, StoreError>;

    /// Migrates legacy agent-embedded key hashes into the `api_keys` table;
    /// returns the migrated count. Safe to re-run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the migration fails.
    async fn migrate_agent_keys_to_api_keys(&self) -> Result<u64, StoreError>;

    /// Refreshes the derived agent-state materialized view.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the refresh fails.
    async fn refresh_agent_state(&self) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Idempotency Store
// ============================================================================

/// Outcome of registering an idempotency key for a write.
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyOutcome {
    /// The key is new; the caller proceeds with the write.
    Started,
    /// The key completed earlier with this response; replay it.
    Replay(Value),
    /// The key exists with a different request hash.
    Mismatch,
    /// The key exists but its write has not completed yet.
    InProgress,
}

/// Idempotency key persistence interface.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Registers `(org, agent, endpoint, key)` with the request hash,
    /// returning the replay outcome.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the registration fails.
    async fn begin_idempotent(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        endpoint: &str,
        key: &str,
        request_hash: &ContentHash,
    ) -> Result<IdempotencyOutcome, StoreError>;

    /// Stores the response for a completed key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    async fn complete_idempotent(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        endpoint: &str,
        key: &str,
        response: &Value,
    ) -> Result<(), StoreError>;

    /// Purges keys past their TTLs; returns the purged count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the purge fails.
    async fn purge_idempotency_keys(
        &self,
        completed_ttl: Duration,
        abandoned_ttl: Duration,
    ) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Vector Index
// ============================================================================

/// Vector index errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Index is unreachable or unhealthy; callers fall back to text search.
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
    /// Request construction or transport failure.
    #[error("vector index request failed: {0}")]
    Request(String),
    /// Response could not be parsed or reported an error.
    #[error("vector index response invalid: {0}")]
    Response(String),
}

/// Named vector selected for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryVector {
    /// Search over whole-decision embeddings.
    Decision,
    /// Search over outcome-only embeddings.
    Outcome,
}

impl QueryVector {
    /// Returns the stable named-vector label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Outcome => "outcome",
        }
    }
}

/// Point upserted into the vector index for one decision.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    /// Decision identifier, doubling as the point identifier.
    pub decision_id: DecisionId,
    /// Owning organization, stored as a payload filter field.
    pub org_id: OrgId,
    /// Whole-decision embedding.
    pub decision_vector: Vec<f32>,
    /// Outcome-only embedding.
    pub outcome_vector: Vec<f32>,
    /// Normalized decision type, stored as a payload filter field.
    pub decision_type: String,
    /// Deciding agent, stored as a payload field.
    pub agent_id: String,
}

/// Search request against the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Named vector to search.
    pub using: QueryVector,
    /// Optional normalized decision type filter.
    pub decision_type: Option<String>,
    /// Point identifiers excluded from the result.
    pub exclude: Vec<DecisionId>,
    /// Maximum hits returned.
    pub limit: u32,
}

/// Search hit returned by the vector index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    /// Matching decision identifier.
    pub decision_id: DecisionId,
    /// Backend similarity score; higher is more similar.
    pub score: f64,
}

/// External approximate-nearest-neighbor index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the collection when absent, with the configured dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when collection setup fails.
    async fn ensure_collection(&self) -> Result<(), IndexError>;

    /// Upserts one decision point.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the upsert fails.
    async fn upsert(&self, point: &IndexPoint) -> Result<(), IndexError>;

    /// Deletes one decision point by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the delete fails.
    async fn delete(&self, decision_id: DecisionId) -> Result<(), IndexError>;

    /// Searches within an organization; the org filter is applied
    /// server-side.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the search fails.
    async fn search(&self, org_id: OrgId, query: &IndexQuery)
    -> Result<Vec<IndexHit>, IndexError>;

    /// Reports index health; unhealthy indexes push callers onto the text
    /// fallback.
    async fn healthy(&self) -> bool;

    /// Releases client resources.
    async fn close(&self) {}
}

// ============================================================================
// SECTION: Embedding Provider
// ============================================================================

/// Embedding provider errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbeddingError {
    /// Provider is unreachable.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Request construction or transport failure.
    #[error("embedding request failed: {0}")]
    Request(String),
    /// Response could not be parsed or had the wrong shape.
    #[error("embedding response invalid: {0}")]
    Response(String),
}

/// Text embedding provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] when embedding fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embeds a batch of texts, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] when embedding fails.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Returns the embedding dimensionality.
    fn dimensions(&self) -> usize;

    /// Returns a stable provider name for logging.
    fn name(&self) -> &'static str;
}

// ============================================================================
// SECTION: Conflict Validator
// ============================================================================

/// Conflict validator errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidatorError {
    /// Per-call timeout elapsed.
    #[error("validator call timed out after {0} ms")]
    Timeout(u64),
    /// Request construction or transport failure.
    #[error("validator request failed: {0}")]
    Request(String),
    /// Response could not be parsed; treated as rejection by the scorer.
    #[error("validator response invalid: {0}")]
    Response(String),
}

/// Validator implementation class; drives worker caps and scoring method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorClass {
    /// No validator configured; embedding scores stand alone.
    Noop,
    /// Local chat model; single-threaded with a generous timeout.
    LocalChat,
    /// External chat API; parallel with a tighter timeout.
    ExternalChat,
}

impl ValidatorClass {
    /// Returns the scoring method recorded for conflicts this class scores.
    #[must_use]
    pub const fn scoring_method(self) -> crate::core::conflict::ScoringMethod {
        match self {
            Self::Noop => crate::core::conflict::ScoringMethod::Embedding,
            Self::LocalChat => crate::core::conflict::ScoringMethod::Llm,
            Self::ExternalChat => crate::core::conflict::ScoringMethod::LlmV2,
        }
    }

    /// Returns the maximum concurrent backfill workers for this class.
    #[must_use]
    pub const fn max_backfill_workers(self, configured: usize) -> usize {
        match self {
            Self::LocalChat => 1,
            Self::Noop | Self::ExternalChat => configured,
        }
    }
}

/// Structured input for LLM relationship classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationInput {
    /// Target decision outcome.
    pub outcome_a: String,
    /// Candidate decision outcome.
    pub outcome_b: String,
    /// Target decision reasoning.
    pub reasoning_a: String,
    /// Candidate decision reasoning.
    pub reasoning_b: String,
    /// Target deciding agent.
    pub agent_a: AgentId,
    /// Candidate deciding agent.
    pub agent_b: AgentId,
    /// Absolute age difference in days.
    pub delta_days: f64,
    /// Project hint shared with the validator.
    pub project_hint: Option<String>,
    /// Repository hint shared with the validator.
    pub repo_hint: Option<String>,
    /// True when both decisions share a session identifier.
    pub same_session: bool,
}

/// Parsed validator verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Classified relationship.
    pub relationship: ConflictRelationship,
    /// Optional category label.
    pub category: Option<String>,
    /// Optional severity label.
    pub severity: Option<String>,
    /// Optional explanation.
    pub explanation: Option<String>,
}

/// LLM-backed relationship classifier for candidate pairs.
#[async_trait]
pub trait ConflictValidator: Send + Sync {
    /// Returns the validator implementation class.
    fn class(&self) -> ValidatorClass;

    /// Classifies the relationship between a candidate pair.
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError`] when the call fails; the scorer treats an
    /// unparseable response as a rejection, not a retryable failure.
    async fn validate(&self, input: &ValidationInput) -> Result<ValidationVerdict, ValidatorError>;
}
