// crates/akashi-engine/src/lib.rs
// ============================================================================
// Module: Akashi Engine Library
// Description: Decision service, conflict scorer, outbox worker, integrity.
// Purpose: Orchestrate the audit trail's behavior over the core interfaces.
// Dependencies: akashi-core, akashi-ingest, serde_json, sha2, tokio
// ============================================================================

//! ## Overview
//! The engine composes the backend-agnostic interfaces into the system's
//! behavior: the decision service drives atomic trace writes with async
//! enrichment; the two-stage conflict scorer finds and classifies
//! contradictions; the outbox worker propagates vectors to the external
//! index with leases and dead letters; the integrity engine appends
//! Merkle-chained proofs; and the access resolver scopes every read to the
//! caller's effective agent set.
//! Invariants:
//! - User writes fail only when the transactional core fails.
//! - Enrichment and scoring are asynchronous and idempotent.
//! - Reads are always org- and scope-filtered.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod access;
pub mod integrity;
pub mod outbox;
pub mod scorer;
pub mod service;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::access::AccessResolver;
pub use crate::integrity::IntegrityEngine;
pub use crate::outbox::OutboxWorker;
pub use crate::outbox::OutboxWorkerOptions;
pub use crate::scorer::ConflictScorer;
pub use crate::scorer::ScorerOptions;
pub use crate::service::CheckReport;
pub use crate::service::DecisionService;
pub use crate::service::ReviseRequest;
pub use crate::service::SearchBackend;
pub use crate::service::SearchHit;
pub use crate::service::SearchOutcome;
pub use crate::service::ServiceOptions;
pub use crate::service::TraceRequest;
pub use crate::service::VerifyReport;
