// crates/akashi-store/src/decisions.rs
// ============================================================================
// Module: Decision Persistence
// Description: DecisionStore implementation over PostgreSQL.
// Purpose: Atomic trace writes, revisions, queries, and enrichment updates.
// Dependencies: akashi-core, pgvector, sqlx
// ============================================================================

//! ## Overview
//! The trace write is one transaction: decision row, alternatives, evidence,
//! and the search outbox row commit together, then `NOTIFY decisions` fires.
//! Revision closes the predecessor's validity and inserts the successor in
//! the same transaction, rejecting predecessors that are already superseded.
//! Revision chains are walked in both directions with a bounded depth.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::ChildrenPresence;
use akashi_core::Decision;
use akashi_core::DecisionClaim;
use akashi_core::DecisionId;
use akashi_core::DecisionQuery;
use akashi_core::DecisionStore;
use akashi_core::DecisionType;
use akashi_core::DecisionWrite;
use akashi_core::NotifyChannel;
use akashi_core::Notifier;
use akashi_core::OrgId;
use akashi_core::OutboxOperation;
use akashi_core::StoreError;
use akashi_core::TextSearchHit;
use akashi_core::core::identifiers::AgentId;
use async_trait::async_trait;
use serde_json::json;
use sqlx::Postgres;
use sqlx::QueryBuilder;
use sqlx::Row;
use sqlx::Transaction;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::map_decode_error;
use crate::error::map_sqlx_error;
use crate::postgres::DECISION_COLUMNS;
use crate::postgres::PostgresStore;
use crate::postgres::decision_from_row;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default page size when a query does not set one.
const DEFAULT_QUERY_LIMIT: u32 = 50;
/// Hard page size cap.
const MAX_QUERY_LIMIT: u32 = 500;
/// Depth cap when walking a revision chain in either direction.
const MAX_CHAIN_DEPTH: usize = 64;

/// Clamps a caller-provided limit into the permitted page range.
fn effective_limit(limit: u32) -> i64 {
    let limit = if limit == 0 { DEFAULT_QUERY_LIMIT } else { limit.min(MAX_QUERY_LIMIT) };
    i64::from(limit)
}

// ============================================================================
// SECTION: Insert Helpers
// ============================================================================

/// Converts an optional embedding into its pgvector bind form.
fn vector_bind(embedding: Option<&Vec<f32>>) -> Option<pgvector::Vector> {
    embedding.map(|values| pgvector::Vector::from(values.clone()))
}

/// Inserts the decision row with its children and outbox row inside `tx`.
async fn insert_write_tx(
    tx: &mut Transaction<'_, Postgres>,
    write: &DecisionWrite,
) -> Result<(), StoreError> {
    let decision = &write.decision;
    sqlx::query(
        "INSERT INTO decisions (id, org_id, agent_id, run_id, api_key_id, session_id, \
         decision_type, outcome, confidence, reasoning, content_hash, valid_from, valid_to, \
         transaction_time, supersedes_id, precedent_ref, embedding, outcome_embedding, \
         agent_context, metadata, completeness_score) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
         $18, $19, $20, $21)",
    )
    .bind(decision.id.as_uuid())
    .bind(decision.org_id.as_uuid())
    .bind(decision.agent_id.as_str())
    .bind(decision.run_id.as_uuid())
    .bind(decision.api_key_id.map(akashi_core::ApiKeyId::as_uuid))
    .bind(decision.session_id.as_ref().map(|session| session.as_str().to_string()))
    .bind(decision.decision_type.as_str())
    .bind(&decision.outcome)
    .bind(decision.confidence)
    .bind(&decision.reasoning)
    .bind(decision.content_hash.to_hex())
    .bind(decision.valid_from)
    .bind(decision.valid_to)
    .bind(decision.transaction_time)
    .bind(decision.supersedes_id.map(DecisionId::as_uuid))
    .bind(decision.precedent_ref.map(DecisionId::as_uuid))
    .bind(vector_bind(decision.embedding.as_ref()))
    .bind(vector_bind(decision.outcome_embedding.as_ref()))
    .bind(
        serde_json::to_value(&decision.agent_context)
            .map_err(|err| StoreError::Invalid(format!("agent_context: {err}")))?,
    )
    .bind(&decision.metadata)
    .bind(decision.completeness_score)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    for alternative in &write.alternatives {
        sqlx::query(
            "INSERT INTO decision_alternatives (id, decision_id, label, score, selected, \
             rejection_reason) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(alternative.id.as_uuid())
        .bind(alternative.decision_id.as_uuid())
        .bind(&alternative.label)
        .bind(alternative.score)
        .bind(alternative.selected)
        .bind(&alternative.rejection_reason)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    }

    for evidence in &write.evidence {
        sqlx::query(
            "INSERT INTO decision_evidence (id, org_id, decision_id, source_type, uri, \
             content, relevance, embedding) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(evidence.id.as_uuid())
        .bind(evidence.org_id.as_uuid())
        .bind(evidence.decision_id.as_uuid())
        .bind(&evidence.source_type)
        .bind(&evidence.uri)
        .bind(&evidence.content)
        .bind(evidence.relevance)
        .bind(vector_bind(evidence.embedding.as_ref()))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    }

    sqlx::query(
        "INSERT INTO search_outbox (id, org_id, decision_id, operation) VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(decision.org_id.as_uuid())
    .bind(decision.id.as_uuid())
    .bind(OutboxOperation::Upsert.as_str())
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

/// Emits the post-commit decision notification.
async fn notify_decision(store: &PostgresStore, decision: &Decision) -> Result<(), StoreError> {
    store
        .notify(
            NotifyChannel::Decisions,
            &json!({
                "org_id": decision.org_id,
                "decision_id": decision.id,
                "agent_id": decision.agent_id,
                "decision_type": decision.decision_type,
            }),
        )
        .await
}

/// Applies the structured filters of a decision query to a builder.
fn push_query_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &DecisionQuery) {
    if let Some(agent_ids) = &query.agent_ids {
        let ids: Vec<String> =
            agent_ids.iter().map(|agent| agent.as_str().to_string()).collect();
        builder.push(" AND agent_id = ANY(");
        builder.push_bind(ids);
        builder.push(")");
    }
    if let Some(decision_type) = &query.decision_type {
        builder.push(" AND lower(trim(decision_type)) = ");
        builder.push_bind(decision_type.normalized());
    }
    if let Some(confidence_min) = query.confidence_min {
        builder.push(" AND confidence >= ");
        builder.push_bind(confidence_min);
    }
    if let Some(outcome) = &query.outcome_contains {
        builder.push(" AND outcome ILIKE ");
        builder.push_bind(format!("%{outcome}%"));
    }
    if let Some(session) = &query.session_id {
        builder.push(" AND session_id = ");
        builder.push_bind(session.as_str().to_string());
    }
    if let Some(tool) = &query.tool {
        builder.push(" AND tool = ");
        builder.push_bind(tool.clone());
    }
    if let Some(model) = &query.model {
        builder.push(" AND model = ");
        builder.push_bind(model.clone());
    }
    if let Some(project) = &query.project {
        builder.push(" AND project = ");
        builder.push_bind(project.clone());
    }
    if query.current_only {
        builder.push(" AND valid_to IS NULL");
    }
}

// ============================================================================
// SECTION: DecisionStore Implementation
// ============================================================================

#[async_trait]
impl DecisionStore for PostgresStore {
    async fn create_decision(&self, write: &DecisionWrite) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        insert_write_tx(&mut tx, write).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        notify_decision(self, &write.decision).await
    }

    async fn revise_decision(
        &self,
        predecessor: DecisionId,
        write: &DecisionWrite,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query(
            "SELECT valid_to FROM decisions WHERE id = $1 AND org_id = $2 FOR UPDATE",
        )
        .bind(predecessor.as_uuid())
        .bind(write.decision.org_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let Some(row) = row else {
            return Err(StoreError::NotFound(format!("decision {predecessor}")));
        };
        let valid_to: Option<OffsetDateTime> =
            row.try_get("valid_to").map_err(|err| map_decode_error("valid_to", err))?;
        if valid_to.is_some() {
            return Err(StoreError::Invalid(format!(
                "decision {predecessor} is already superseded"
            )));
        }

        sqlx::query("UPDATE decisions SET valid_to = $1 WHERE id = $2")
            .bind(write.decision.valid_from)
            .bind(predecessor.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        insert_write_tx(&mut tx, write).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        notify_decision(self, &write.decision).await
    }

    async fn decision(&self, org_id: OrgId, id: DecisionId) -> Result<Decision, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = $1 AND id = $2"
        ))
        .bind(org_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map_or_else(
            || Err(StoreError::NotFound(format!("decision {id}"))),
            |row| decision_from_row(&row),
        )
    }

    async fn revision_chain(
        &self,
        org_id: OrgId,
        id: DecisionId,
    ) -> Result<Vec<Decision>, StoreError> {
        let target = self.decision(org_id, id).await?;

        let mut chain = vec![target];
        // Walk predecessors via supersedes_id.
        for _ in 0..MAX_CHAIN_DEPTH {
            let Some(previous) = chain[0].supersedes_id else {
                break;
            };
            let predecessor = self.decision(org_id, previous).await?;
            chain.insert(0, predecessor);
        }
        // Walk successors: rows naming the current tail as their predecessor.
        for _ in 0..MAX_CHAIN_DEPTH {
            let tail = chain[chain.len() - 1].id;
            let row = sqlx::query(&format!(
                "SELECT {DECISION_COLUMNS} FROM decisions \
                 WHERE org_id = $1 AND supersedes_id = $2"
            ))
            .bind(org_id.as_uuid())
            .bind(tail.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
            let Some(row) = row else {
                break;
            };
            chain.push(decision_from_row(&row)?);
        }
        Ok(chain)
    }

    async fn query_decisions(
        &self,
        org_id: OrgId,
        query: &DecisionQuery,
    ) -> Result<Vec<Decision>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = "
        ));
        builder.push_bind(org_id.as_uuid());
        push_query_filters(&mut builder, query);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(effective_limit(query.limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(query.offset));

        let rows = builder.build().fetch_all(self.pool()).await.map_err(map_sqlx_error)?;
        rows.iter().map(decision_from_row).collect()
    }

    async fn decisions_as_of(
        &self,
        org_id: OrgId,
        as_of: OffsetDateTime,
        query: &DecisionQuery,
    ) -> Result<Vec<Decision>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = "
        ));
        builder.push_bind(org_id.as_uuid());
        builder.push(" AND transaction_time <= ");
        builder.push_bind(as_of);
        builder.push(" AND (valid_to IS NULL OR valid_to > ");
        builder.push_bind(as_of);
        builder.push(")");
        push_query_filters(&mut builder, query);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(effective_limit(query.limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(query.offset));

        let rows = builder.build().fetch_all(self.pool()).await.map_err(map_sqlx_error)?;
        rows.iter().map(decision_from_row).collect()
    }

    async fn search_decisions_text(
        &self,
        org_id: OrgId,
        text: &str,
        decision_type: Option<&DecisionType>,
        agent_ids: Option<&[AgentId]>,
        limit: u32,
    ) -> Result<Vec<TextSearchHit>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DECISION_COLUMNS}, \
             ts_rank_cd(search_vector, plainto_tsquery('english', "
        ));
        builder.push_bind(text.to_string());
        builder.push(")) AS rank FROM decisions WHERE org_id = ");
        builder.push_bind(org_id.as_uuid());
        builder.push(" AND search_vector @@ plainto_tsquery('english', ");
        builder.push_bind(text.to_string());
        builder.push(")");
        if let Some(decision_type) = decision_type {
            builder.push(" AND lower(trim(decision_type)) = ");
            builder.push_bind(decision_type.normalized());
        }
        if let Some(agent_ids) = agent_ids {
            let ids: Vec<String> =
                agent_ids.iter().map(|agent| agent.as_str().to_string()).collect();
            builder.push(" AND agent_id = ANY(");
            builder.push_bind(ids);
            builder.push(")");
        }
        builder.push(" ORDER BY rank DESC, created_at DESC LIMIT ");
        builder.push_bind(effective_limit(limit));

        let rows = builder.build().fetch_all(self.pool()).await.map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| {
                let rank: f32 =
                    row.try_get("rank").map_err(|err| map_decode_error("rank", err))?;
                Ok(TextSearchHit {
                    decision: decision_from_row(row)?,
                    rank: f64::from(rank),
                })
            })
            .collect()
    }

    async fn decision_children_presence(
        &self,
        id: DecisionId,
    ) -> Result<ChildrenPresence, StoreError> {
        let row = sqlx::query(
            "SELECT \
                 EXISTS (SELECT 1 FROM decision_alternatives WHERE decision_id = $1) \
                     AS has_alternatives, \
                 EXISTS (SELECT 1 FROM decision_evidence WHERE decision_id = $1) \
                     AS has_evidence",
        )
        .bind(id.as_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(ChildrenPresence {
            has_alternatives: row
                .try_get("has_alternatives")
                .map_err(|err| map_decode_error("has_alternatives", err))?,
            has_evidence: row
                .try_get("has_evidence")
                .map_err(|err| map_decode_error("has_evidence", err))?,
        })
    }

    async fn find_similar_decisions(
        &self,
        org_id: OrgId,
        embedding: &[f32],
        exclude: &[DecisionId],
        limit: u32,
    ) -> Result<Vec<Decision>, StoreError> {
        let excluded: Vec<Uuid> = exclude.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions \
             WHERE org_id = $1 AND embedding IS NOT NULL AND NOT (id = ANY($2)) \
             ORDER BY embedding <=> $3 LIMIT $4"
        ))
        .bind(org_id.as_uuid())
        .bind(&excluded)
        .bind(pgvector::Vector::from(embedding.to_vec()))
        .bind(effective_limit(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(decision_from_row).collect()
    }

    async fn set_embeddings(
        &self,
        id: DecisionId,
        embedding: &[f32],
        outcome_embedding: &[f32],
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE decisions SET embedding = $1, outcome_embedding = $2 WHERE id = $3")
            .bind(pgvector::Vector::from(embedding.to_vec()))
            .bind(pgvector::Vector::from(outcome_embedding.to_vec()))
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn set_completeness(&self, id: DecisionId, score: f64) -> Result<(), StoreError> {
        sqlx::query("UPDATE decisions SET completeness_score = $1 WHERE id = $2")
            .bind(score)
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn replace_claims(
        &self,
        id: DecisionId,
        claims: &[DecisionClaim],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        sqlx::query("DELETE FROM decision_claims WHERE decision_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        for claim in claims {
            sqlx::query(
                "INSERT INTO decision_claims (id, decision_id, position, text, embedding) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(claim.id.as_uuid())
            .bind(claim.decision_id.as_uuid())
            .bind(i32::try_from(claim.position).unwrap_or(i32::MAX))
            .bind(&claim.text)
            .bind(vector_bind(claim.embedding.as_ref()))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn decisions_missing_embeddings(&self, limit: u32) -> Result<Vec<Decision>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions \
             WHERE embedding IS NULL OR outcome_embedding IS NULL \
             ORDER BY created_at ASC LIMIT $1"
        ))
        .bind(effective_limit(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(decision_from_row).collect()
    }

    async fn decisions_pending_conflict_scoring(
        &self,
        limit: u32,
    ) -> Result<Vec<Decision>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions \
             WHERE conflict_scored_at IS NULL \
               AND embedding IS NOT NULL AND outcome_embedding IS NOT NULL \
             ORDER BY created_at ASC LIMIT $1"
        ))
        .bind(effective_limit(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(decision_from_row).collect()
    }

    async fn mark_conflict_scored(
        &self,
        id: DecisionId,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE decisions SET conflict_scored_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn reset_conflict_scored(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE decisions SET conflict_scored_at = NULL WHERE conflict_scored_at IS NOT NULL",
        )
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
