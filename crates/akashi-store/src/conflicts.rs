// crates/akashi-store/src/conflicts.rs
// ============================================================================
// Module: Conflict Persistence
// Description: ConflictStore implementation over PostgreSQL.
// Purpose: Converging conflict upserts, queries, and resolution transitions.
// Dependencies: akashi-core, sqlx
// ============================================================================

//! ## Overview
//! Scored conflicts upsert onto `(org_id, decision_a_id, decision_b_id)` so
//! repeated scoring converges onto one row; resolution fields are preserved
//! across rescoring. Resolution transitions are validated by the core state
//! machine inside a row-locked transaction. Every upsert fires
//! `NOTIFY conflicts`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::ConflictId;
use akashi_core::ConflictQuery;
use akashi_core::ConflictResolution;
use akashi_core::ConflictRelationship;
use akashi_core::ConflictStatus;
use akashi_core::ConflictStore;
use akashi_core::ConflictTransition;
use akashi_core::DecisionId;
use akashi_core::DecisionType;
use akashi_core::NotifyChannel;
use akashi_core::Notifier;
use akashi_core::OrgId;
use akashi_core::ScoredConflict;
use akashi_core::StoreError;
use akashi_core::apply_transition;
use async_trait::async_trait;
use serde_json::json;
use sqlx::Postgres;
use sqlx::QueryBuilder;
use sqlx::Row;
use time::OffsetDateTime;

use crate::error::map_sqlx_error;
use crate::postgres::CONFLICT_COLUMNS;
use crate::postgres::PostgresStore;
use crate::postgres::conflict_from_row;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default page size when a query does not set one.
const DEFAULT_CONFLICT_LIMIT: u32 = 50;
/// Hard page size cap.
const MAX_CONFLICT_LIMIT: u32 = 500;

/// Clamps a caller-provided limit into the permitted page range.
fn effective_limit(limit: u32) -> i64 {
    let limit = if limit == 0 { DEFAULT_CONFLICT_LIMIT } else { limit.min(MAX_CONFLICT_LIMIT) };
    i64::from(limit)
}

// ============================================================================
// SECTION: ConflictStore Implementation
// ============================================================================

#[async_trait]
impl ConflictStore for PostgresStore {
    async fn upsert_scored_conflict(
        &self,
        conflict: &ScoredConflict,
    ) -> Result<ConflictId, StoreError> {
        let row = sqlx::query(
            "INSERT INTO scored_conflicts (id, org_id, decision_a_id, decision_b_id, kind, \
             method, topic_similarity, outcome_divergence, significance, confidence_weight, \
             temporal_decay, relationship, category, severity, explanation, status, \
             detected_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18) \
             ON CONFLICT (org_id, decision_a_id, decision_b_id) DO UPDATE SET \
                 kind = EXCLUDED.kind, \
                 method = EXCLUDED.method, \
                 topic_similarity = EXCLUDED.topic_similarity, \
                 outcome_divergence = EXCLUDED.outcome_divergence, \
                 significance = EXCLUDED.significance, \
                 confidence_weight = EXCLUDED.confidence_weight, \
                 temporal_decay = EXCLUDED.temporal_decay, \
                 relationship = EXCLUDED.relationship, \
                 category = EXCLUDED.category, \
                 severity = EXCLUDED.severity, \
                 explanation = EXCLUDED.explanation, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING id",
        )
        .bind(conflict.id.as_uuid())
        .bind(conflict.org_id.as_uuid())
        .bind(conflict.pair.a.as_uuid())
        .bind(conflict.pair.b.as_uuid())
        .bind(conflict.kind.as_str())
        .bind(conflict.method.as_str())
        .bind(conflict.topic_similarity)
        .bind(conflict.outcome_divergence)
        .bind(conflict.significance)
        .bind(conflict.confidence_weight)
        .bind(conflict.temporal_decay)
        .bind(conflict.relationship.map(ConflictRelationship::as_str))
        .bind(&conflict.category)
        .bind(&conflict.severity)
        .bind(&conflict.explanation)
        .bind(conflict.status.as_str())
        .bind(conflict.detected_at)
        .bind(conflict.updated_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        let id = ConflictId::from_uuid(row.try_get("id").map_err(map_sqlx_error)?);

        self.notify(
            NotifyChannel::Conflicts,
            &json!({
                "org_id": conflict.org_id,
                "conflict_id": id,
                "kind": conflict.kind,
                "significance": conflict.significance,
            }),
        )
        .await?;
        Ok(id)
    }

    async fn conflict(&self, org_id: OrgId, id: ConflictId) -> Result<ScoredConflict, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM scored_conflicts WHERE org_id = $1 AND id = $2"
        ))
        .bind(org_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map_or_else(
            || Err(StoreError::NotFound(format!("conflict {id}"))),
            |row| conflict_from_row(&row),
        )
    }

    async fn query_conflicts(
        &self,
        org_id: OrgId,
        query: &ConflictQuery,
    ) -> Result<Vec<ScoredConflict>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CONFLICT_COLUMNS} FROM scored_conflicts WHERE org_id = "
        ));
        builder.push_bind(org_id.as_uuid());
        if let Some(kind) = query.kind {
            builder.push(" AND kind = ");
            builder.push_bind(kind.as_str());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(agent_id) = &query.agent_id {
            builder.push(
                " AND EXISTS (SELECT 1 FROM decisions d WHERE d.agent_id = ",
            );
            builder.push_bind(agent_id.as_str().to_string());
            builder.push(
                " AND d.id IN (scored_conflicts.decision_a_id, scored_conflicts.decision_b_id))",
            );
        }
        if let Some(decision_type) = &query.decision_type {
            builder.push(
                " AND EXISTS (SELECT 1 FROM decisions d WHERE lower(trim(d.decision_type)) = ",
            );
            builder.push_bind(decision_type.normalized());
            builder.push(
                " AND d.id IN (scored_conflicts.decision_a_id, scored_conflicts.decision_b_id))",
            );
        }
        builder.push(" ORDER BY significance DESC LIMIT ");
        builder.push_bind(effective_limit(query.limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(query.offset));

        let rows = builder.build().fetch_all(self.pool()).await.map_err(map_sqlx_error)?;
        rows.iter().map(conflict_from_row).collect()
    }

    async fn open_conflicts_for_type(
        &self,
        org_id: OrgId,
        decision_type: &DecisionType,
        limit: u32,
    ) -> Result<Vec<ScoredConflict>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM scored_conflicts c \
             WHERE c.org_id = $1 AND c.status = 'open' AND EXISTS (
                 SELECT 1 FROM decisions d \
                 WHERE lower(trim(d.decision_type)) = $2 \
                   AND d.id IN (c.decision_a_id, c.decision_b_id)
             ) \
             ORDER BY c.significance DESC LIMIT $3"
        ))
        .bind(org_id.as_uuid())
        .bind(decision_type.normalized())
        .bind(effective_limit(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(conflict_from_row).collect()
    }

    async fn resolve_conflict(
        &self,
        org_id: OrgId,
        id: ConflictId,
        resolution: &ConflictResolution,
    ) -> Result<ScoredConflict, StoreError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let row = sqlx::query(
            "SELECT status FROM scored_conflicts WHERE org_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(org_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let Some(row) = row else {
            return Err(StoreError::NotFound(format!("conflict {id}")));
        };
        let status_label: String = row.try_get("status").map_err(map_sqlx_error)?;
        let current = ConflictStatus::parse(&status_label)
            .ok_or_else(|| StoreError::Fatal(format!("unknown status label: {status_label}")))?;
        let next = apply_transition(current, resolution.transition)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;

        let resolved_fields = matches!(
            resolution.transition,
            ConflictTransition::Resolve | ConflictTransition::WontFix
        );
        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "UPDATE scored_conflicts SET status = $1, resolved_by = $2, resolved_at = $3, \
             resolution_note = $4, resolution_decision_id = $5, winning_decision_id = $6, \
             updated_at = $7 WHERE org_id = $8 AND id = $9",
        )
        .bind(next.as_str())
        .bind(resolution.resolved_by.as_str())
        .bind(resolved_fields.then_some(now))
        .bind(&resolution.note)
        .bind(resolution.resolution_decision_id.map(DecisionId::as_uuid))
        .bind(resolution.winning_decision_id.map(DecisionId::as_uuid))
        .bind(now)
        .bind(org_id.as_uuid())
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        self.conflict(org_id, id).await
    }

    async fn count_unvalidated_conflicts(&self) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT count(*) FROM scored_conflicts WHERE relationship IS NULL")
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn clear_unvalidated_conflicts(&self) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM scored_conflicts WHERE relationship IS NULL")
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

