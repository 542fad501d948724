// crates/akashi-engine/src/integrity.rs
// ============================================================================
// Module: Integrity Engine
// Description: Periodic Merkle-chained proof batches per organization.
// Purpose: Produce tamper-evident, verifiable history over decision hashes.
// Dependencies: akashi-core, time, tokio
// ============================================================================

//! ## Overview
//! Each pass walks every organization: decisions created since the last
//! proof's window end are collected (ordered by identifier), their content
//! hashes roll up into a Merkle root, and a proof row links to the prior
//! root. Verification recomputes a proof's root from current store data
//! and compares in constant time; any mismatch or broken link marks the
//! chain as tampered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use akashi_core::ContentHash;
use akashi_core::IntegrityProof;
use akashi_core::IntegrityStore;
use akashi_core::OrgId;
use akashi_core::ProofId;
use akashi_core::StoreError;
use akashi_core::merkle_root;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Periodic Merkle proof producer.
pub struct IntegrityEngine {
    /// Proof and hash store.
    store: Arc<dyn IntegrityStore>,
}

impl IntegrityEngine {
    /// Builds the engine.
    #[must_use]
    pub const fn new(store: Arc<dyn IntegrityStore>) -> Self {
        Self {
            store,
        }
    }

    /// Runs one proof pass over every organization.
    ///
    /// Returns the number of proofs appended. Organizations with no new
    /// decisions since their last proof are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a store operation fails; the pass stops
    /// at the first failing organization.
    pub async fn run_once(&self) -> Result<u32, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut appended = 0;
        for org_id in self.store.org_ids().await? {
            if self.prove_org(org_id, now).await?.is_some() {
                appended += 1;
            }
        }
        if appended > 0 {
            tracing::info!(appended, "integrity proofs appended");
        }
        Ok(appended)
    }

    /// Appends one proof for an organization, when new decisions exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a store operation fails.
    pub async fn prove_org(
        &self,
        org_id: OrgId,
        until: OffsetDateTime,
    ) -> Result<Option<IntegrityProof>, StoreError> {
        let previous = self.store.latest_proof(org_id).await?;
        let after = previous.as_ref().map(|proof| proof.batch_end);
        let hashes = self.store.content_hashes_in_window(org_id, after, until).await?;
        if hashes.is_empty() {
            return Ok(None);
        }

        let leaves: Vec<ContentHash> = hashes.iter().map(|(_, hash)| *hash).collect();
        let Some(root) = merkle_root(&leaves) else {
            return Ok(None);
        };
        let proof = IntegrityProof {
            id: ProofId::generate(),
            org_id,
            batch_start: after.unwrap_or(OffsetDateTime::UNIX_EPOCH),
            batch_end: until,
            decision_count: i64::try_from(leaves.len())
                .map_err(|_| StoreError::Invalid("batch too large".to_string()))?,
            root_hash: root,
            previous_root: previous.map(|proof| proof.root_hash),
            created_at: until,
        };
        self.store.insert_proof(&proof).await?;
        Ok(Some(proof))
    }

    /// Verifies one proof against current store contents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the hash window cannot be read.
    pub async fn verify_proof(&self, proof: &IntegrityProof) -> Result<bool, StoreError> {
        let after = (proof.batch_start != OffsetDateTime::UNIX_EPOCH).then_some(proof.batch_start);
        let hashes =
            self.store.content_hashes_in_window(proof.org_id, after, proof.batch_end).await?;
        let leaves: Vec<ContentHash> = hashes.iter().map(|(_, hash)| *hash).collect();
        let Some(root) = merkle_root(&leaves) else {
            return Ok(false);
        };
        Ok(root.ct_eq(&proof.root_hash))
    }

    /// Verifies the newest `depth` proofs and their chain links.
    ///
    /// Returns true only when every recomputed root matches and every
    /// `previous_root` equals the prior proof's root.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the proof list cannot be read.
    pub async fn verify_chain(&self, org_id: OrgId, depth: u32) -> Result<bool, StoreError> {
        let proofs = self.store.proofs(org_id, depth).await?;
        for (index, proof) in proofs.iter().enumerate() {
            if !self.verify_proof(proof).await? {
                tracing::error!(org = %org_id, proof = %proof.id, "proof root mismatch");
                return Ok(false);
            }
            if let Some(older) = proofs.get(index + 1) {
                let linked = proof
                    .previous_root
                    .as_ref()
                    .is_some_and(|previous| previous.ct_eq(&older.root_hash));
                if !linked {
                    tracing::error!(org = %org_id, proof = %proof.id, "proof chain link broken");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
