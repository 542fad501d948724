// crates/akashi-store/src/postgres.rs
// ============================================================================
// Module: PostgreSQL Store
// Description: Pooled PostgreSQL adapter and shared row mapping.
// Purpose: Own the connection pool and the row-to-domain conversions.
// Dependencies: akashi-core, pgvector, serde_json, sqlx
// ============================================================================

//! ## Overview
//! [`PostgresStore`] owns the pooled connection set and implements every
//! store interface from `akashi-core`. All statements use bind parameters;
//! row mapping is explicit so a schema drift surfaces as a decode failure
//! (`Fatal`) rather than silently misread data. The dedicated LISTEN
//! connection is not owned here; the broker dials it separately because
//! session-scoped LISTEN does not survive pooling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::AccessGrant;
use akashi_core::Agent;
use akashi_core::AgentContext;
use akashi_core::AgentEvent;
use akashi_core::AgentId;
use akashi_core::AgentRole;
use akashi_core::AgentRun;
use akashi_core::Alternative;
use akashi_core::AlternativeId;
use akashi_core::ConflictId;
use akashi_core::ConflictKind;
use akashi_core::ConflictPair;
use akashi_core::ConflictRelationship;
use akashi_core::ConflictStatus;
use akashi_core::ContentHash;
use akashi_core::Decision;
use akashi_core::DecisionId;
use akashi_core::DecisionType;
use akashi_core::EventId;
use akashi_core::EventKind;
use akashi_core::Evidence;
use akashi_core::EvidenceId;
use akashi_core::GrantId;
use akashi_core::GrantResource;
use akashi_core::IntegrityProof;
use akashi_core::Notifier;
use akashi_core::NotifyChannel;
use akashi_core::OrgId;
use akashi_core::OutboxEntry;
use akashi_core::OutboxEntryId;
use akashi_core::OutboxOperation;
use akashi_core::ProofId;
use akashi_core::RunId;
use akashi_core::RunStatus;
use akashi_core::ScoredConflict;
use akashi_core::ScoringMethod;
use akashi_core::SessionId;
use akashi_core::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::Row;
use sqlx::postgres::PgPoolOptions;
use sqlx::postgres::PgRow;

use crate::error::map_decode_error;
use crate::error::map_sqlx_error;

// ============================================================================
// SECTION: Store
// ============================================================================

/// PostgreSQL-backed store implementing every core persistence interface.
///
/// # Invariants
/// - All statements bind parameters; no SQL is built from caller text.
/// - Every org-scoped query filters by `org_id`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    /// Shared connection pool.
    pool: PgPool,
}

impl PostgresStore {
    /// Connects the pool and returns the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`] when the pool cannot connect.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self {
            pool,
        })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Reports store readiness by round-tripping a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`] when the store is unreachable.
    pub async fn readiness(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Notifier for PostgresStore {
    async fn notify(&self, channel: NotifyChannel, payload: &Value) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel.as_str())
            .bind(payload.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Shared Column Lists
// ============================================================================

/// Decision column list shared by every decision SELECT.
pub(crate) const DECISION_COLUMNS: &str = "id, org_id, agent_id, run_id, api_key_id, \
    session_id, decision_type, outcome, confidence, reasoning, content_hash, valid_from, \
    valid_to, transaction_time, created_at, supersedes_id, precedent_ref, embedding, \
    outcome_embedding, agent_context, metadata, completeness_score, conflict_scored_at";

/// Conflict column list shared by every conflict SELECT.
pub(crate) const CONFLICT_COLUMNS: &str = "id, org_id, decision_a_id, decision_b_id, kind, \
    method, topic_similarity, outcome_divergence, significance, confidence_weight, \
    temporal_decay, relationship, category, severity, explanation, status, resolved_by, \
    resolved_at, resolution_note, resolution_decision_id, winning_decision_id, detected_at, \
    updated_at";

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Reads an optional pgvector column into a float vector.
fn vector_column(row: &PgRow, column: &str) -> Result<Option<Vec<f32>>, StoreError> {
    row.try_get::<Option<pgvector::Vector>, _>(column)
        .map(|value| value.map(|vector| vector.to_vec()))
        .map_err(|err| map_decode_error(column, err))
}

/// Parses a stored enum label through its domain parser.
fn label_column<T>(
    row: &PgRow,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, StoreError> {
    let label: String = row.try_get(column).map_err(|err| map_decode_error(column, err))?;
    parse(&label).ok_or_else(|| StoreError::Fatal(format!("unknown {column} label: {label}")))
}

/// Maps one decision row.
pub(crate) fn decision_from_row(row: &PgRow) -> Result<Decision, StoreError> {
    let content_hash: String =
        row.try_get("content_hash").map_err(|err| map_decode_error("content_hash", err))?;
    let content_hash: ContentHash = content_hash
        .parse()
        .map_err(|err| map_decode_error("content_hash", err))?;
    let agent_context: Value =
        row.try_get("agent_context").map_err(|err| map_decode_error("agent_context", err))?;
    let agent_context: AgentContext = serde_json::from_value(agent_context)
        .map_err(|err| map_decode_error("agent_context", err))?;
    Ok(Decision {
        id: DecisionId::from_uuid(
            row.try_get("id").map_err(|err| map_decode_error("id", err))?,
        ),
        org_id: OrgId::from_uuid(
            row.try_get("org_id").map_err(|err| map_decode_error("org_id", err))?,
        ),
        agent_id: AgentId::new(
            row.try_get::<String, _>("agent_id")
                .map_err(|err| map_decode_error("agent_id", err))?,
        ),
        run_id: RunId::from_uuid(
            row.try_get("run_id").map_err(|err| map_decode_error("run_id", err))?,
        ),
        api_key_id: row
            .try_get::<Option<uuid::Uuid>, _>("api_key_id")
            .map_err(|err| map_decode_error("api_key_id", err))?
            .map(akashi_core::ApiKeyId::from_uuid),
        session_id: row
            .try_get::<Option<String>, _>("session_id")
            .map_err(|err| map_decode_error("session_id", err))?
            .map(SessionId::new),
        decision_type: DecisionType::new(
            row.try_get::<String, _>("decision_type")
                .map_err(|err| map_decode_error("decision_type", err))?,
        ),
        outcome: row.try_get("outcome").map_err(|err| map_decode_error("outcome", err))?,
        confidence: row
            .try_get("confidence")
            .map_err(|err| map_decode_error("confidence", err))?,
        reasoning: row.try_get("reasoning").map_err(|err| map_decode_error("reasoning", err))?,
        content_hash,
        valid_from: row
            .try_get("valid_from")
            .map_err(|err| map_decode_error("valid_from", err))?,
        valid_to: row.try_get("valid_to").map_err(|err| map_decode_error("valid_to", err))?,
        transaction_time: row
            .try_get("transaction_time")
            .map_err(|err| map_decode_error("transaction_time", err))?,
        created_at: row
            .try_get("created_at")
            .map_err(|err| map_decode_error("created_at", err))?,
        supersedes_id: row
            .try_get::<Option<uuid::Uuid>, _>("supersedes_id")
            .map_err(|err| map_decode_error("supersedes_id", err))?
            .map(DecisionId::from_uuid),
        precedent_ref: row
            .try_get::<Option<uuid::Uuid>, _>("precedent_ref")
            .map_err(|err| map_decode_error("precedent_ref", err))?
            .map(DecisionId::from_uuid),
        embedding: vector_column(row, "embedding")?,
        outcome_embedding: vector_column(row, "outcome_embedding")?,
        agent_context,
        metadata: row.try_get("metadata").map_err(|err| map_decode_error("metadata", err))?,
        completeness_score: row
            .try_get("completeness_score")
            .map_err(|err| map_decode_error("completeness_score", err))?,
        conflict_scored_at: row
            .try_get("conflict_scored_at")
            .map_err(|err| map_decode_error("conflict_scored_at", err))?,
    })
}

/// Maps one alternative row.
#[allow(dead_code, reason = "no current call site reads alternative rows back")]
pub(crate) fn alternative_from_row(row: &PgRow) -> Result<Alternative, StoreError> {
    Ok(Alternative {
        id: AlternativeId::from_uuid(
            row.try_get("id").map_err(|err| map_decode_error("id", err))?,
        ),
        decision_id: DecisionId::from_uuid(
            row.try_get("decision_id").map_err(|err| map_decode_error("decision_id", err))?,
        ),
        label: row.try_get("label").map_err(|err| map_decode_error("label", err))?,
        score: row.try_get("score").map_err(|err| map_decode_error("score", err))?,
        selected: row.try_get("selected").map_err(|err| map_decode_error("selected", err))?,
        rejection_reason: row
            .try_get("rejection_reason")
            .map_err(|err| map_decode_error("rejection_reason", err))?,
    })
}

/// Maps one evidence row.
#[allow(dead_code, reason = "no current call site reads evidence rows back")]
pub(crate) fn evidence_from_row(row: &PgRow) -> Result<Evidence, StoreError> {
    Ok(Evidence {
        id: EvidenceId::from_uuid(
            row.try_get("id").map_err(|err| map_decode_error("id", err))?,
        ),
        org_id: OrgId::from_uuid(
            row.try_get("org_id").map_err(|err| map_decode_error("org_id", err))?,
        ),
        decision_id: DecisionId::from_uuid(
            row.try_get("decision_id").map_err(|err| map_decode_error("decision_id", err))?,
        ),
        source_type: row
            .try_get("source_type")
            .map_err(|err| map_decode_error("source_type", err))?,
        uri: row.try_get("uri").map_err(|err| map_decode_error("uri", err))?,
        content: row.try_get("content").map_err(|err| map_decode_error("content", err))?,
        relevance: row.try_get("relevance").map_err(|err| map_decode_error("relevance", err))?,
        embedding: vector_column(row, "embedding")?,
    })
}

/// Maps one run row.
pub(crate) fn run_from_row(row: &PgRow) -> Result<AgentRun, StoreError> {
    Ok(AgentRun {
        id: RunId::from_uuid(row.try_get("id").map_err(|err| map_decode_error("id", err))?),
        org_id: OrgId::from_uuid(
            row.try_get("org_id").map_err(|err| map_decode_error("org_id", err))?,
        ),
        agent_id: AgentId::new(
            row.try_get::<String, _>("agent_id")
                .map_err(|err| map_decode_error("agent_id", err))?,
        ),
        session_id: row
            .try_get::<Option<String>, _>("session_id")
            .map_err(|err| map_decode_error("session_id", err))?
            .map(SessionId::new),
        parent_run_id: row
            .try_get::<Option<uuid::Uuid>, _>("parent_run_id")
            .map_err(|err| map_decode_error("parent_run_id", err))?
            .map(RunId::from_uuid),
        status: label_column(row, "status", RunStatus::parse)?,
        started_at: row
            .try_get("started_at")
            .map_err(|err| map_decode_error("started_at", err))?,
        completed_at: row
            .try_get("completed_at")
            .map_err(|err| map_decode_error("completed_at", err))?,
    })
}

/// Maps one event row.
pub(crate) fn event_from_row(row: &PgRow) -> Result<AgentEvent, StoreError> {
    let kind: String = row.try_get("kind").map_err(|err| map_decode_error("kind", err))?;
    Ok(AgentEvent {
        id: EventId::from_uuid(row.try_get("id").map_err(|err| map_decode_error("id", err))?),
        org_id: OrgId::from_uuid(
            row.try_get("org_id").map_err(|err| map_decode_error("org_id", err))?,
        ),
        agent_id: AgentId::new(
            row.try_get::<String, _>("agent_id")
                .map_err(|err| map_decode_error("agent_id", err))?,
        ),
        run_id: RunId::from_uuid(
            row.try_get("run_id").map_err(|err| map_decode_error("run_id", err))?,
        ),
        sequence_num: row
            .try_get("sequence_num")
            .map_err(|err| map_decode_error("sequence_num", err))?,
        kind: EventKind::parse(&kind),
        occurred_at: row
            .try_get("occurred_at")
            .map_err(|err| map_decode_error("occurred_at", err))?,
        recorded_at: row
            .try_get("recorded_at")
            .map_err(|err| map_decode_error("recorded_at", err))?,
        payload: row.try_get("payload").map_err(|err| map_decode_error("payload", err))?,
    })
}

/// Maps one conflict row.
pub(crate) fn conflict_from_row(row: &PgRow) -> Result<ScoredConflict, StoreError> {
    let a = DecisionId::from_uuid(
        row.try_get("decision_a_id").map_err(|err| map_decode_error("decision_a_id", err))?,
    );
    let b = DecisionId::from_uuid(
        row.try_get("decision_b_id").map_err(|err| map_decode_error("decision_b_id", err))?,
    );
    let pair = ConflictPair::ordered(a, b)
        .ok_or_else(|| StoreError::Fatal("conflict pair is degenerate".to_string()))?;
    let relationship = row
        .try_get::<Option<String>, _>("relationship")
        .map_err(|err| map_decode_error("relationship", err))?
        .map(|label| {
            ConflictRelationship::parse(&label)
                .ok_or_else(|| StoreError::Fatal(format!("unknown relationship label: {label}")))
        })
        .transpose()?;
    Ok(ScoredConflict {
        id: ConflictId::from_uuid(
            row.try_get("id").map_err(|err| map_decode_error("id", err))?,
        ),
        org_id: OrgId::from_uuid(
            row.try_get("org_id").map_err(|err| map_decode_error("org_id", err))?,
        ),
        pair,
        kind: label_column(row, "kind", ConflictKind::parse)?,
        method: label_column(row, "method", ScoringMethod::parse)?,
        topic_similarity: row
            .try_get("topic_similarity")
            .map_err(|err| map_decode_error("topic_similarity", err))?,
        outcome_divergence: row
            .try_get("outcome_divergence")
            .map_err(|err| map_decode_error("outcome_divergence", err))?,
        significance: row
            .try_get("significance")
            .map_err(|err| map_decode_error("significance", err))?,
        confidence_weight: row
            .try_get("confidence_weight")
            .map_err(|err| map_decode_error("confidence_weight", err))?,
        temporal_decay: row
            .try_get("temporal_decay")
            .map_err(|err| map_decode_error("temporal_decay", err))?,
        relationship,
        category: row.try_get("category").map_err(|err| map_decode_error("category", err))?,
        severity: row.try_get("severity").map_err(|err| map_decode_error("severity", err))?,
        explanation: row
            .try_get("explanation")
            .map_err(|err| map_decode_error("explanation", err))?,
        status: label_column(row, "status", ConflictStatus::parse)?,
        resolved_by: row
            .try_get::<Option<String>, _>("resolved_by")
            .map_err(|err| map_decode_error("resolved_by", err))?
            .map(AgentId::new),
        resolved_at: row
            .try_get("resolved_at")
            .map_err(|err| map_decode_error("resolved_at", err))?,
        resolution_note: row
            .try_get("resolution_note")
            .map_err(|err| map_decode_error("resolution_note", err))?,
        resolution_decision_id: row
            .try_get::<Option<uuid::Uuid>, _>("resolution_decision_id")
            .map_err(|err| map_decode_error("resolution_decision_id", err))?
            .map(DecisionId::from_uuid),
        winning_decision_id: row
            .try_get::<Option<uuid::Uuid>, _>("winning_decision_id")
            .map_err(|err| map_decode_error("winning_decision_id", err))?
            .map(DecisionId::from_uuid),
        detected_at: row
            .try_get("detected_at")
            .map_err(|err| map_decode_error("detected_at", err))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|err| map_decode_error("updated_at", err))?,
    })
}

/// Maps one outbox row.
pub(crate) fn outbox_from_row(row: &PgRow) -> Result<OutboxEntry, StoreError> {
    Ok(OutboxEntry {
        id: OutboxEntryId::from_uuid(
            row.try_get("id").map_err(|err| map_decode_error("id", err))?,
        ),
        org_id: OrgId::from_uuid(
            row.try_get("org_id").map_err(|err| map_decode_error("org_id", err))?,
        ),
        decision_id: DecisionId::from_uuid(
            row.try_get("decision_id").map_err(|err| map_decode_error("decision_id", err))?,
        ),
        operation: label_column(row, "operation", OutboxOperation::parse)?,
        attempts: row.try_get("attempts").map_err(|err| map_decode_error("attempts", err))?,
        last_error: row
            .try_get("last_error")
            .map_err(|err| map_decode_error("last_error", err))?,
        locked_until: row
            .try_get("locked_until")
            .map_err(|err| map_decode_error("locked_until", err))?,
        created_at: row
            .try_get("created_at")
            .map_err(|err| map_decode_error("created_at", err))?,
    })
}

/// Maps one integrity proof row.
pub(crate) fn proof_from_row(row: &PgRow) -> Result<IntegrityProof, StoreError> {
    let root_hash: String =
        row.try_get("root_hash").map_err(|err| map_decode_error("root_hash", err))?;
    let previous_root: Option<String> =
        row.try_get("previous_root").map_err(|err| map_decode_error("previous_root", err))?;
    Ok(IntegrityProof {
        id: ProofId::from_uuid(row.try_get("id").map_err(|err| map_decode_error("id", err))?),
        org_id: OrgId::from_uuid(
            row.try_get("org_id").map_err(|err| map_decode_error("org_id", err))?,
        ),
        batch_start: row
            .try_get("batch_start")
            .map_err(|err| map_decode_error("batch_start", err))?,
        batch_end: row
            .try_get("batch_end")
            .map_err(|err| map_decode_error("batch_end", err))?,
        decision_count: row
            .try_get("decision_count")
            .map_err(|err| map_decode_error("decision_count", err))?,
        root_hash: root_hash.parse().map_err(|err| map_decode_error("root_hash", err))?,
        previous_root: previous_root
            .map(|raw| raw.parse().map_err(|err| map_decode_error("previous_root", err)))
            .transpose()?,
        created_at: row
            .try_get("created_at")
            .map_err(|err| map_decode_error("created_at", err))?,
    })
}

/// Maps one agent row.
pub(crate) fn agent_from_row(row: &PgRow) -> Result<Agent, StoreError> {
    Ok(Agent {
        org_id: OrgId::from_uuid(
            row.try_get("org_id").map_err(|err| map_decode_error("org_id", err))?,
        ),
        agent_id: AgentId::new(
            row.try_get::<String, _>("agent_id")
                .map_err(|err| map_decode_error("agent_id", err))?,
        ),
        display_name: row
            .try_get("display_name")
            .map_err(|err| map_decode_error("display_name", err))?,
        role: label_column(row, "role", AgentRole::parse)?,
        tags: row.try_get("tags").map_err(|err| map_decode_error("tags", err))?,
        legacy_key_hash: row
            .try_get("legacy_key_hash")
            .map_err(|err| map_decode_error("legacy_key_hash", err))?,
        created_at: row
            .try_get("created_at")
            .map_err(|err| map_decode_error("created_at", err))?,
    })
}

/// Maps one access grant row.
pub(crate) fn grant_from_row(row: &PgRow) -> Result<AccessGrant, StoreError> {
    Ok(AccessGrant {
        id: GrantId::from_uuid(row.try_get("id").map_err(|err| map_decode_error("id", err))?),
        org_id: OrgId::from_uuid(
            row.try_get("org_id").map_err(|err| map_decode_error("org_id", err))?,
        ),
        grantor: AgentId::new(
            row.try_get::<String, _>("grantor").map_err(|err| map_decode_error("grantor", err))?,
        ),
        grantee: AgentId::new(
            row.try_get::<String, _>("grantee").map_err(|err| map_decode_error("grantee", err))?,
        ),
        resource: label_column(row, "resource", GrantResource::parse)?,
        resource_id: row
            .try_get("resource_id")
            .map_err(|err| map_decode_error("resource_id", err))?,
        created_at: row
            .try_get("created_at")
            .map_err(|err| map_decode_error("created_at", err))?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|err| map_decode_error("expires_at", err))?,
    })
}
