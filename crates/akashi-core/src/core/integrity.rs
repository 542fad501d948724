// crates/akashi-core/src/core/integrity.rs
// ============================================================================
// Module: Akashi Integrity Proofs
// Description: Merkle-chained batch proofs over decision content hashes.
// Purpose: Represent the append-only tamper-evidence chain per organization.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! An integrity proof covers the decisions created in `(batch_start,
//! batch_end]` for one organization. The proof stores the Merkle root over
//! the batch's content hashes (ordered by decision identifier) and links to
//! the previous proof via `previous_root`, forming a chain whose break
//! indicates tampering or missing data. Proof rows are append-only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::OrgId;
use crate::core::identifiers::ProofId;
use crate::hashing::ContentHash;

// ============================================================================
// SECTION: Proof Records
// ============================================================================

/// Merkle-chained integrity proof row.
///
/// # Invariants
/// - Append-only; the store rejects updates and deletes.
/// - `previous_root` equals the prior proof's `root_hash` for the same org,
///   or `None` for the first proof.
/// - `decision_count` equals the number of leaves hashed into `root_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityProof {
    /// Proof identifier.
    pub id: ProofId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Exclusive lower bound of the covered creation window.
    pub batch_start: OffsetDateTime,
    /// Inclusive upper bound of the covered creation window.
    pub batch_end: OffsetDateTime,
    /// Number of decisions covered by the proof.
    pub decision_count: i64,
    /// Merkle root over the covered content hashes.
    pub root_hash: ContentHash,
    /// Root hash of the previous proof in the chain.
    pub previous_root: Option<ContentHash>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}
