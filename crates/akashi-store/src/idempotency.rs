// crates/akashi-store/src/idempotency.rs
// ============================================================================
// Module: Idempotency Key Persistence
// Description: IdempotencyStore implementation over PostgreSQL.
// Purpose: Replay protection for write endpoints with independent TTLs.
// Dependencies: akashi-core, sqlx
// ============================================================================

//! ## Overview
//! Registering a key is a conditional insert on the composite primary key:
//! a fresh insert means the caller proceeds; an existing row either replays
//! the stored response (same request hash, completed), reports an
//! in-progress write, or signals a request-hash mismatch the service maps
//! to the `Conflict` kind. Completed and abandoned keys expire on
//! independent TTLs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::AgentId;
use akashi_core::ContentHash;
use akashi_core::IdempotencyOutcome;
use akashi_core::IdempotencyStore;
use akashi_core::OrgId;
use akashi_core::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use time::Duration;

use crate::error::map_sqlx_error;
use crate::postgres::PostgresStore;

// ============================================================================
// SECTION: IdempotencyStore Implementation
// ============================================================================

#[async_trait]
impl IdempotencyStore for PostgresStore {
    async fn begin_idempotent(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        endpoint: &str,
        key: &str,
        request_hash: &ContentHash,
    ) -> Result<IdempotencyOutcome, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO idempotency_keys (org_id, agent_id, endpoint, idem_key, request_hash) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (org_id, agent_id, endpoint, idem_key) DO NOTHING",
        )
        .bind(org_id.as_uuid())
        .bind(agent_id.as_str())
        .bind(endpoint)
        .bind(key)
        .bind(request_hash.to_hex())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        if inserted.rows_affected() == 1 {
            return Ok(IdempotencyOutcome::Started);
        }

        let row = sqlx::query(
            "SELECT request_hash, status, response FROM idempotency_keys \
             WHERE org_id = $1 AND agent_id = $2 AND endpoint = $3 AND idem_key = $4",
        )
        .bind(org_id.as_uuid())
        .bind(agent_id.as_str())
        .bind(endpoint)
        .bind(key)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let stored_hash: String = row.try_get("request_hash").map_err(map_sqlx_error)?;
        if stored_hash != request_hash.to_hex() {
            return Ok(IdempotencyOutcome::Mismatch);
        }
        let status: String = row.try_get("status").map_err(map_sqlx_error)?;
        if status == "completed" {
            let response: Option<Value> = row.try_get("response").map_err(map_sqlx_error)?;
            return Ok(IdempotencyOutcome::Replay(response.unwrap_or(Value::Null)));
        }
        Ok(IdempotencyOutcome::InProgress)
    }

    async fn complete_idempotent(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        endpoint: &str,
        key: &str,
        response: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE idempotency_keys \
             SET status = 'completed', response = $1, completed_at = now() \
             WHERE org_id = $2 AND agent_id = $3 AND endpoint = $4 AND idem_key = $5",
        )
        .bind(response)
        .bind(org_id.as_uuid())
        .bind(agent_id.as_str())
        .bind(endpoint)
        .bind(key)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn purge_idempotency_keys(
        &self,
        completed_ttl: Duration,
        abandoned_ttl: Duration,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM idempotency_keys \
             WHERE (status = 'completed' \
                    AND completed_at < now() - make_interval(secs => $1)) \
                OR (status = 'in_progress' \
                    AND created_at < now() - make_interval(secs => $2))",
        )
        .bind(completed_ttl.as_seconds_f64().max(0.0))
        .bind(abandoned_ttl.as_seconds_f64().max(0.0))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
