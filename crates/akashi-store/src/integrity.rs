// crates/akashi-store/src/integrity.rs
// ============================================================================
// Module: Integrity Proof Persistence
// Description: IntegrityStore implementation over PostgreSQL.
// Purpose: Append proof rows and collect batch content hashes.
// Dependencies: akashi-core, sqlx
// ============================================================================

//! ## Overview
//! Proof rows are append-only (a trigger rejects mutation); the store only
//! appends and reads. Batch windows collect content hashes ordered by
//! decision identifier so Merkle roots are reproducible during
//! verification.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::ContentHash;
use akashi_core::DecisionId;
use akashi_core::IntegrityProof;
use akashi_core::IntegrityStore;
use akashi_core::OrgId;
use akashi_core::StoreError;
use async_trait::async_trait;
use sqlx::Row;
use time::OffsetDateTime;

use crate::error::map_decode_error;
use crate::error::map_sqlx_error;
use crate::postgres::PostgresStore;
use crate::postgres::proof_from_row;

// ============================================================================
// SECTION: IntegrityStore Implementation
// ============================================================================

/// Proof column list shared by every proof SELECT.
const PROOF_COLUMNS: &str =
    "id, org_id, batch_start, batch_end, decision_count, root_hash, previous_root, created_at";

#[async_trait]
impl IntegrityStore for PostgresStore {
    async fn org_ids(&self) -> Result<Vec<OrgId>, StoreError> {
        let rows = sqlx::query("SELECT id FROM organizations ORDER BY created_at")
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(OrgId::from_uuid(row.try_get("id").map_err(map_sqlx_error)?));
        }
        Ok(ids)
    }

    async fn latest_proof(&self, org_id: OrgId) -> Result<Option<IntegrityProof>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PROOF_COLUMNS} FROM integrity_proofs \
             WHERE org_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(org_id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(proof_from_row).transpose()
    }

    async fn insert_proof(&self, proof: &IntegrityProof) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO integrity_proofs (id, org_id, batch_start, batch_end, decision_count, \
             root_hash, previous_root, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(proof.id.as_uuid())
        .bind(proof.org_id.as_uuid())
        .bind(proof.batch_start)
        .bind(proof.batch_end)
        .bind(proof.decision_count)
        .bind(proof.root_hash.to_hex())
        .bind(proof.previous_root.as_ref().map(ContentHash::to_hex))
        .bind(proof.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn proofs(&self, org_id: OrgId, limit: u32) -> Result<Vec<IntegrityProof>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROOF_COLUMNS} FROM integrity_proofs \
             WHERE org_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(org_id.as_uuid())
        .bind(i64::from(limit.max(1)))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(proof_from_row).collect()
    }

    async fn content_hashes_in_window(
        &self,
        org_id: OrgId,
        after: Option<OffsetDateTime>,
        until: OffsetDateTime,
    ) -> Result<Vec<(DecisionId, ContentHash)>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, content_hash FROM decisions \
             WHERE org_id = $1 AND created_at <= $2 \
               AND ($3::timestamptz IS NULL OR created_at > $3) \
             ORDER BY id ASC",
        )
        .bind(org_id.as_uuid())
        .bind(until)
        .bind(after)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        let mut hashes = Vec::with_capacity(rows.len());
        for row in rows {
            let id = DecisionId::from_uuid(row.try_get("id").map_err(map_sqlx_error)?);
            let raw: String = row.try_get("content_hash").map_err(map_sqlx_error)?;
            let hash =
                raw.parse().map_err(|err| map_decode_error("content_hash", err))?;
            hashes.push((id, hash));
        }
        Ok(hashes)
    }
}
