// crates/akashi-store/src/agents.rs
// ============================================================================
// Module: Agent Directory Persistence
// Description: AgentStore implementation with constant-time key verification.
// Purpose: Agents, credentials, grants, erasure, and the state refresh.
// Dependencies: akashi-core, sha2, subtle, sqlx
// ============================================================================

//! ## Overview
//! API keys verify by prefix lookup and a constant-time hash compare; an
//! unknown prefix still performs a dummy compare so verification time does
//! not reveal key existence. Agent erasure archives full row contents into
//! the deletion audit log before any destructive delete. The legacy key
//! migration is a one-shot, re-runnable statement pair.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::AccessGrant;
use akashi_core::Agent;
use akashi_core::AgentErasure;
use akashi_core::AgentId;
use akashi_core::AgentStore;
use akashi_core::ApiKey;
use akashi_core::ApiKeyId;
use akashi_core::NotifyChannel;
use akashi_core::Notifier;
use akashi_core::OrgId;
use akashi_core::StoreError;
use akashi_core::core::agent::hash_key;
use async_trait::async_trait;
use serde_json::json;
use sqlx::Row;
use subtle::ConstantTimeEq;

use crate::error::map_sqlx_error;
use crate::postgres::PostgresStore;
use crate::postgres::agent_from_row;
use crate::postgres::grant_from_row;

// ============================================================================
// SECTION: Constant-Time Verification
// ============================================================================

/// Compares a candidate hash against a stored hash in constant time.
#[must_use]
pub fn hashes_match(candidate: &str, stored: &str) -> bool {
    if candidate.len() != stored.len() {
        // Equalize by comparing the candidate against itself, then reject.
        let _ = candidate.as_bytes().ct_eq(candidate.as_bytes());
        return false;
    }
    candidate.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Stored hash consumed by the dummy compare on unknown prefixes.
const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ============================================================================
// SECTION: AgentStore Implementation
// ============================================================================

/// Agent column list shared by every agent SELECT.
const AGENT_COLUMNS: &str =
    "org_id, agent_id, display_name, role, tags, legacy_key_hash, created_at";

#[async_trait]
impl AgentStore for PostgresStore {
    async fn ensure_org(&self, org_id: OrgId, name: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO organizations (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(org_id.as_uuid())
        .bind(name)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn create_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agents (org_id, agent_id, display_name, role, tags, legacy_key_hash, \
             created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(agent.org_id.as_uuid())
        .bind(agent.agent_id.as_str())
        .bind(&agent.display_name)
        .bind(agent.role.as_str())
        .bind(&agent.tags)
        .bind(&agent.legacy_key_hash)
        .bind(agent.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.notify(
            NotifyChannel::Agents,
            &json!({"org_id": agent.org_id, "agent_id": agent.agent_id, "action": "created"}),
        )
        .await
    }

    async fn agent(&self, org_id: OrgId, agent_id: &AgentId) -> Result<Agent, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE org_id = $1 AND agent_id = $2"
        ))
        .bind(org_id.as_uuid())
        .bind(agent_id.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map_or_else(
            || Err(StoreError::NotFound(format!("agent {agent_id}"))),
            |row| agent_from_row(&row),
        )
    }

    async fn count_agents(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM agents")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn erase_agent(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
    ) -> Result<AgentErasure, StoreError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM agents WHERE org_id = $1 AND agent_id = $2)",
        )
        .bind(org_id.as_uuid())
        .bind(agent_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if !exists {
            return Err(StoreError::NotFound(format!("agent {agent_id}")));
        }

        let mut archived: u64 = 0;
        for (table, filter_sql) in [
            ("agent_events", "org_id = $1 AND agent_id = $2"),
            ("decisions", "org_id = $1 AND agent_id = $2"),
            ("agent_runs", "org_id = $1 AND agent_id = $2"),
            ("api_keys", "org_id = $1 AND agent_id = $2"),
            ("agents", "org_id = $1 AND agent_id = $2"),
        ] {
            let result = sqlx::query(&format!(
                "INSERT INTO deletion_audit_log (org_id, table_name, row_data, deleted_by) \
                 SELECT $1, '{table}', to_jsonb(t), $2 FROM {table} t WHERE {filter_sql}"
            ))
            .bind(org_id.as_uuid())
            .bind(agent_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            archived += result.rows_affected();
        }

        // Children first; the run-delete guard requires events to go before runs,
        // and decisions reference runs.
        let mut removed: u64 = 0;
        let events = sqlx::query("DELETE FROM agent_events WHERE org_id = $1 AND agent_id = $2")
            .bind(org_id.as_uuid())
            .bind(agent_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        removed += events.rows_affected();
        let decisions = sqlx::query("DELETE FROM decisions WHERE org_id = $1 AND agent_id = $2")
            .bind(org_id.as_uuid())
            .bind(agent_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        removed += decisions.rows_affected();
        let runs = sqlx::query("DELETE FROM agent_runs WHERE org_id = $1 AND agent_id = $2")
            .bind(org_id.as_uuid())
            .bind(agent_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        removed += runs.rows_affected();
        let agents = sqlx::query("DELETE FROM agents WHERE org_id = $1 AND agent_id = $2")
            .bind(org_id.as_uuid())
            .bind(agent_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        removed += agents.rows_affected();

        tx.commit().await.map_err(map_sqlx_error)?;

        self.notify(
            NotifyChannel::Agents,
            &json!({"org_id": org_id, "agent_id": agent_id, "action": "erased"}),
        )
        .await?;

        Ok(AgentErasure {
            archived_rows: archived,
            removed_rows: removed,
        })
    }

    async fn agents_with_tag_overlap(
        &self,
        org_id: OrgId,
        tags: &[String],
    ) -> Result<Vec<AgentId>, StoreError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT agent_id FROM agents WHERE org_id = $1 AND tags && $2")
            .bind(org_id.as_uuid())
            .bind(tags)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(AgentId::new(row.try_get::<String, _>("agent_id").map_err(map_sqlx_error)?));
        }
        Ok(ids)
    }

    async fn active_grants_for(
        &self,
        org_id: OrgId,
        grantee: &AgentId,
    ) -> Result<Vec<AccessGrant>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, org_id, grantor, grantee, resource, resource_id, created_at, expires_at \
             FROM access_grants \
             WHERE org_id = $1 AND grantee = $2 AND resource = 'agent_traces' \
               AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(org_id.as_uuid())
        .bind(grantee.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(grant_from_row).collect()
    }

    async fn create_grant(&self, grant: &AccessGrant) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO access_grants (id, org_id, grantor, grantee, resource, resource_id, \
             created_at, expires_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(grant.id.as_uuid())
        .bind(grant.org_id.as_uuid())
        .bind(grant.grantor.as_str())
        .bind(grant.grantee.as_str())
        .bind(grant.resource.as_str())
        .bind(&grant.resource_id)
        .bind(grant.created_at)
        .bind(grant.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn create_api_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO api_keys (id, org_id, agent_id, prefix, key_hash, label, created_at, \
             last_used_at, revoked_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(key.id.as_uuid())
        .bind(key.org_id.as_uuid())
        .bind(key.agent_id.as_str())
        .bind(&key.prefix)
        .bind(&key.key_hash)
        .bind(&key.label)
        .bind(key.created_at)
        .bind(key.last_used_at)
        .bind(key.revoked_at)
        .bind(key.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn verify_api_key(
        &self,
        prefix: &str,
        raw_key: &str,
    ) -> Result<Option<(Agent, ApiKeyId)>, StoreError> {
        let candidate = hash_key(raw_key);
        let row = sqlx::query(&format!(
            "SELECT k.id AS key_id, k.key_hash, k.revoked_at, k.expires_at, {AGENT_COLUMNS} \
             FROM api_keys k \
             JOIN agents USING (org_id, agent_id) \
             WHERE k.prefix = $1"
        ))
        .bind(prefix)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            // Burn the same compare cost on unknown prefixes.
            let _ = hashes_match(&candidate, DUMMY_HASH);
            return Ok(None);
        };

        let stored: String = row.try_get("key_hash").map_err(map_sqlx_error)?;
        if !hashes_match(&candidate, &stored) {
            return Ok(None);
        }
        let revoked: Option<time::OffsetDateTime> =
            row.try_get("revoked_at").map_err(map_sqlx_error)?;
        let expires: Option<time::OffsetDateTime> =
            row.try_get("expires_at").map_err(map_sqlx_error)?;
        let now = time::OffsetDateTime::now_utc();
        if revoked.is_some() || expires.is_some_and(|at| at <= now) {
            return Ok(None);
        }

        let key_id = ApiKeyId::from_uuid(row.try_get("key_id").map_err(map_sqlx_error)?);
        let agent = agent_from_row(&row)?;

        // Best-effort usage stamp; verification does not depend on it.
        let _ = sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(key_id.as_uuid())
            .execute(self.pool())
            .await;

        Ok(Some((agent, key_id)))
    }

    async fn migrate_agent_keys_to_api_keys(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "WITH migrated AS (
                INSERT INTO api_keys (id, org_id, agent_id, prefix, key_hash, label)
                SELECT gen_random_uuid(), org_id, agent_id,
                       'legacy:' || org_id::text || ':' || agent_id,
                       legacy_key_hash, 'migrated legacy key'
                FROM agents
                WHERE legacy_key_hash IS NOT NULL
                ON CONFLICT (prefix) DO NOTHING
                RETURNING org_id, agent_id
            )
            UPDATE agents a SET legacy_key_hash = NULL
            FROM migrated m
            WHERE a.org_id = m.org_id AND a.agent_id = m.agent_id",
        )
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn refresh_agent_state(&self) -> Result<(), StoreError> {
        sqlx::query("REFRESH MATERIALIZED VIEW CONCURRENTLY agent_state")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
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

    use akashi_core::core::agent::hash_key;
    use akashi_core::core::agent::key_prefix;

    use super::hashes_match;

    #[test]
    fn hash_is_stable_hex() {
        let a = hash_key("ak_live_0123456789abcdef");
        let b = hash_key("ak_live_0123456789abcdef");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn prefix_is_bounded() {
        assert_eq!(key_prefix("ak_live_0123456789abcdef"), "ak_live_0123");
        assert_eq!(key_prefix("short"), "short");
    }

    #[test]
    fn compare_accepts_equal_and_rejects_different() {
        let stored = hash_key("secret");
        assert!(hashes_match(&hash_key("secret"), &stored));
        assert!(!hashes_match(&hash_key("other"), &stored));
        assert!(!hashes_match("short", &stored));
    }
}
