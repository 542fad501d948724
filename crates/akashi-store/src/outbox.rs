// crates/akashi-store/src/outbox.rs
// ============================================================================
// Module: Search Outbox Persistence
// Description: OutboxStore implementation with timed leases.
// Purpose: Claimable delivery queue for the vector index worker.
// Dependencies: akashi-core, sqlx
// ============================================================================

//! ## Overview
//! Outbox rows are claimed with `FOR UPDATE SKIP LOCKED` plus a timed lease
//! so concurrent workers never double-deliver and a crashed worker's claims
//! lapse on their own. Exhausted rows move to the append-only dead-letter
//! table in one statement.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::OutboxEntry;
use akashi_core::OutboxEntryId;
use akashi_core::OutboxStore;
use akashi_core::StoreError;
use async_trait::async_trait;
use time::Duration;

use crate::error::map_sqlx_error;
use crate::postgres::PostgresStore;
use crate::postgres::outbox_from_row;

// ============================================================================
// SECTION: OutboxStore Implementation
// ============================================================================

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn lease_outbox_batch(
        &self,
        batch: u32,
        lease: Duration,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let lease_seconds = lease.as_seconds_f64().max(1.0);
        let rows = sqlx::query(
            "WITH claimable AS (
                SELECT id FROM search_outbox
                WHERE attempts < $1 AND (locked_until IS NULL OR locked_until < now())
                ORDER BY created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE search_outbox s
            SET locked_until = now() + make_interval(secs => $3)
            FROM claimable c
            WHERE s.id = c.id
            RETURNING s.id, s.org_id, s.decision_id, s.operation, s.attempts, s.last_error, \
                      s.locked_until, s.created_at",
        )
        .bind(max_attempts)
        .bind(i64::from(batch.max(1)))
        .bind(lease_seconds)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        let mut entries: Vec<OutboxEntry> =
            rows.iter().map(outbox_from_row).collect::<Result<_, _>>()?;
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }

    async fn complete_outbox_entry(&self, id: OutboxEntryId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM search_outbox WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn fail_outbox_entry(&self, id: OutboxEntryId, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE search_outbox \
             SET attempts = attempts + 1, last_error = $1, locked_until = NULL \
             WHERE id = $2",
        )
        .bind(error)
        .bind(id.as_uuid())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn dead_letter_exhausted(&self, max_attempts: i32) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "WITH moved AS (
                DELETE FROM search_outbox WHERE attempts >= $1 RETURNING *
            )
            INSERT INTO search_outbox_dead_letters \
                (id, org_id, decision_id, operation, attempts, last_error, created_at)
            SELECT id, org_id, decision_id, operation, attempts, last_error, created_at
            FROM moved",
        )
        .bind(max_attempts)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn pending_outbox_count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM search_outbox")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
